//! Typed failures surfaced at the codec call boundary (see `codec`).
//!
//! The schema front-end (`lexer`, `parser`, `resolve`, `eval`, `size`)
//! collapses its failures into a single diagnostic string at the
//! `schema::parse_cbuf_schema` boundary. The codec boundary is different:
//! callers need to match on `InvalidMagic` vs `TruncatedRecord` vs
//! `UnknownHash` etc., so it gets a real enum instead of an opaque string.

use std::fmt;

/// Failures from `codec::reader` and `codec::writer`.
#[derive(Debug, Clone, PartialEq)]
pub enum CodecError {
    /// Caller-supplied offset is outside the buffer.
    InvalidOffset { offset: usize, len: usize },
    /// Framing header magic did not match `0x56444E54`.
    InvalidMagic { found: u32 },
    /// Header declares more bytes than are available in the buffer.
    TruncatedRecord { declared: u32, available: usize },
    /// Hash is not present in the hash index and is not the bootstrap
    /// metadata hash.
    UnknownHash { hash: u64 },
    /// A compact array's wire count exceeded its declared upper bound.
    CompactOverflow { upper_bound: u32, found: u32 },
    /// Bytes consumed while decoding the payload did not match the
    /// header's declared size.
    SizeMismatch { declared: u32, consumed: usize },
    /// Missing or ill-typed field value during serialization, or an
    /// unsupported type token.
    Encoding(String),
    /// Two distinct descriptors share the same hash.
    AmbiguousHash { hash: u64 },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::InvalidOffset { offset, len } => {
                write!(f, "offset {offset} is out of range for a buffer of {len} bytes")
            }
            CodecError::InvalidMagic { found } => {
                write!(f, "invalid record magic {found:#010X}, expected 0x56444E54")
            }
            CodecError::TruncatedRecord { declared, available } => write!(
                f,
                "record declares {declared} bytes but only {available} are available"
            ),
            CodecError::UnknownHash { hash } => {
                write!(f, "no descriptor registered for hash {hash:#018X}")
            }
            CodecError::CompactOverflow { upper_bound, found } => write!(
                f,
                "compact array count {found} exceeds declared upper bound {upper_bound}"
            ),
            CodecError::SizeMismatch { declared, consumed } => write!(
                f,
                "record declared {declared} bytes but decoding consumed {consumed}"
            ),
            CodecError::Encoding(msg) => write!(f, "{msg}"),
            CodecError::AmbiguousHash { hash } => {
                write!(f, "hash {hash:#018X} is shared by two distinct descriptors")
            }
        }
    }
}

impl std::error::Error for CodecError {}

pub type CbufResult<T> = Result<T, CodecError>;
