//! The decoded/encoded value tree shared by both codec directions
//! (`codec::reader` produces it, `codec::writer` consumes it).
//!
//! Numeric arrays get the same owned/borrowed split as a zero-copy string
//! type: `NumericView<'a>` aliases the caller's decode buffer and decodes
//! each element lazily via `from_le_bytes`; `OwnedNumeric` is a plain
//! `Vec<T>` for values built by hand rather than decoded. Neither needs
//! `unsafe` — there is no pointer cast, so there is no alignment
//! precondition to uphold.

use std::collections::HashMap;

use serde::{Serialize, Serializer};

/// Which primitive an array's elements decode as. `Bool` decodes as a raw
/// byte per element (non-zero = true), matching the wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericKind {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Bool,
}

impl NumericKind {
    pub fn elem_size(self) -> usize {
        use NumericKind::*;
        match self {
            U8 | I8 | Bool => 1,
            U16 | I16 => 2,
            U32 | I32 | F32 => 4,
            U64 | I64 | F64 => 8,
        }
    }
}

/// A single decoded element, returned by `NumericArray::get`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NumericScalar {
    U(u64),
    I(i64),
    F(f64),
}

fn decode_at(kind: NumericKind, bytes: &[u8], i: usize) -> NumericScalar {
    let w = kind.elem_size();
    let b = &bytes[i * w..i * w + w];
    use NumericKind::*;
    match kind {
        U8 | Bool => NumericScalar::U(b[0] as u64),
        U16 => NumericScalar::U(u16::from_le_bytes(b.try_into().unwrap()) as u64),
        U32 => NumericScalar::U(u32::from_le_bytes(b.try_into().unwrap()) as u64),
        U64 => NumericScalar::U(u64::from_le_bytes(b.try_into().unwrap())),
        I8 => NumericScalar::I(b[0] as i8 as i64),
        I16 => NumericScalar::I(i16::from_le_bytes(b.try_into().unwrap()) as i64),
        I32 => NumericScalar::I(i32::from_le_bytes(b.try_into().unwrap()) as i64),
        I64 => NumericScalar::I(i64::from_le_bytes(b.try_into().unwrap())),
        F32 => NumericScalar::F(f32::from_le_bytes(b.try_into().unwrap()) as f64),
        F64 => NumericScalar::F(f64::from_le_bytes(b.try_into().unwrap())),
    }
}

/// Borrows a caller-supplied byte slice containing `count` LE-encoded
/// elements of `kind`. Elements are decoded on access rather than through a
/// pointer cast, so this never requires the slice to be aligned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericView<'a> {
    kind: NumericKind,
    bytes: &'a [u8],
    count: usize,
}

impl<'a> NumericView<'a> {
    /// `bytes` must be exactly `count * kind.elem_size()` long.
    pub fn new(kind: NumericKind, bytes: &'a [u8], count: usize) -> Self {
        debug_assert_eq!(bytes.len(), count * kind.elem_size());
        NumericView { kind, bytes, count }
    }

    pub fn kind(&self) -> NumericKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The raw wire bytes backing this view, already little-endian.
    pub fn raw_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn get(&self, i: usize) -> NumericScalar {
        decode_at(self.kind, self.bytes, i)
    }

    pub fn iter(&self) -> impl Iterator<Item = NumericScalar> + '_ {
        (0..self.count).map(move |i| self.get(i))
    }

    pub fn to_owned(&self) -> OwnedNumeric {
        owned_from_bytes(self.kind, self.bytes, self.count)
    }
}

fn owned_from_bytes(kind: NumericKind, bytes: &[u8], count: usize) -> OwnedNumeric {
    use NumericKind::*;
    match kind {
        U8 => OwnedNumeric::U8(bytes[..count].to_vec()),
        Bool => OwnedNumeric::Bool(bytes[..count].to_vec()),
        U16 => OwnedNumeric::U16((0..count).map(|i| le16(bytes, i)).collect()),
        U32 => OwnedNumeric::U32((0..count).map(|i| le32(bytes, i)).collect()),
        U64 => OwnedNumeric::U64((0..count).map(|i| le64(bytes, i)).collect()),
        I8 => OwnedNumeric::I8(bytes[..count].iter().map(|&b| b as i8).collect()),
        I16 => OwnedNumeric::I16((0..count).map(|i| le16(bytes, i) as i16).collect()),
        I32 => OwnedNumeric::I32((0..count).map(|i| le32(bytes, i) as i32).collect()),
        I64 => OwnedNumeric::I64((0..count).map(|i| le64(bytes, i) as i64).collect()),
        F32 => OwnedNumeric::F32((0..count).map(|i| f32::from_bits(le32(bytes, i))).collect()),
        F64 => OwnedNumeric::F64((0..count).map(|i| f64::from_bits(le64(bytes, i))).collect()),
    }
}

fn le16(bytes: &[u8], i: usize) -> u16 {
    u16::from_le_bytes(bytes[i * 2..i * 2 + 2].try_into().unwrap())
}
fn le32(bytes: &[u8], i: usize) -> u32 {
    u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap())
}
fn le64(bytes: &[u8], i: usize) -> u64 {
    u64::from_le_bytes(bytes[i * 8..i * 8 + 8].try_into().unwrap())
}

/// A numeric array built by hand (as opposed to decoded from a buffer).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OwnedNumeric {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    /// One raw byte per element, non-zero meaning true.
    Bool(Vec<u8>),
}

impl OwnedNumeric {
    pub fn kind(&self) -> NumericKind {
        use OwnedNumeric::*;
        match self {
            U8(_) => NumericKind::U8,
            U16(_) => NumericKind::U16,
            U32(_) => NumericKind::U32,
            U64(_) => NumericKind::U64,
            I8(_) => NumericKind::I8,
            I16(_) => NumericKind::I16,
            I32(_) => NumericKind::I32,
            I64(_) => NumericKind::I64,
            F32(_) => NumericKind::F32,
            F64(_) => NumericKind::F64,
            Bool(_) => NumericKind::Bool,
        }
    }

    pub fn len(&self) -> usize {
        use OwnedNumeric::*;
        match self {
            U8(v) | Bool(v) => v.len(),
            U16(v) => v.len(),
            U32(v) => v.len(),
            U64(v) => v.len(),
            I8(v) => v.len(),
            I16(v) => v.len(),
            I32(v) => v.len(),
            I64(v) => v.len(),
            F32(v) => v.len(),
            F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> NumericScalar {
        use OwnedNumeric::*;
        match self {
            U8(v) | Bool(v) => NumericScalar::U(v[i] as u64),
            U16(v) => NumericScalar::U(v[i] as u64),
            U32(v) => NumericScalar::U(v[i] as u64),
            U64(v) => NumericScalar::U(v[i]),
            I8(v) => NumericScalar::I(v[i] as i64),
            I16(v) => NumericScalar::I(v[i] as i64),
            I32(v) => NumericScalar::I(v[i] as i64),
            I64(v) => NumericScalar::I(v[i]),
            F32(v) => NumericScalar::F(v[i] as f64),
            F64(v) => NumericScalar::F(v[i]),
        }
    }

    /// Encodes every element as little-endian bytes, in order.
    pub fn write_le(&self, out: &mut Vec<u8>) {
        use OwnedNumeric::*;
        match self {
            U8(v) | Bool(v) => out.extend_from_slice(v),
            U16(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            U32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            U64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            I8(v) => v.iter().for_each(|x| out.push(*x as u8)),
            I16(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            I32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            I64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            F32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            F64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
        }
    }
}

/// Either a borrowed, lazily-decoded view over a decode buffer, or an
/// owned array built by hand. `len`/`kind`/`write_le` are uniform across
/// both so `codec::writer` doesn't need to care which one it has.
#[derive(Debug, Clone)]
pub enum NumericArray<'a> {
    Borrowed(NumericView<'a>),
    Owned(OwnedNumeric),
}

/// Compares by decoded element value rather than by representation, so a
/// decoded `Borrowed` view and a hand-built `Owned` array with the same
/// contents are equal.
impl<'a> PartialEq for NumericArray<'a> {
    fn eq(&self, other: &Self) -> bool {
        if self.kind() != other.kind() || self.len() != other.len() {
            return false;
        }
        (0..self.len()).all(|i| self.get(i) == other.get(i))
    }
}

impl<'a> NumericArray<'a> {
    pub fn kind(&self) -> NumericKind {
        match self {
            NumericArray::Borrowed(v) => v.kind(),
            NumericArray::Owned(o) => o.kind(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            NumericArray::Borrowed(v) => v.len(),
            NumericArray::Owned(o) => o.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> NumericScalar {
        match self {
            NumericArray::Borrowed(v) => v.get(i),
            NumericArray::Owned(o) => o.get(i),
        }
    }

    /// Writes the wire bytes for this array. The borrowed variant copies
    /// its backing slice directly since it is already little-endian; the
    /// owned variant encodes each element.
    pub fn write_le(&self, out: &mut Vec<u8>) {
        match self {
            NumericArray::Borrowed(v) => out.extend_from_slice(v.raw_bytes()),
            NumericArray::Owned(o) => o.write_le(out),
        }
    }

    pub fn into_owned(self) -> OwnedNumeric {
        match self {
            NumericArray::Borrowed(v) => v.to_owned(),
            NumericArray::Owned(o) => o,
        }
    }
}

impl<'a> Serialize for NumericArray<'a> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            NumericArray::Borrowed(v) => {
                let owned = v.to_owned();
                owned.serialize(serializer)
            }
            NumericArray::Owned(o) => o.serialize(serializer),
        }
    }
}

/// A decoded or to-be-encoded field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value<'a> {
    UInt(u64),
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Numeric(NumericArray<'a>),
    StringArray(Vec<String>),
    Struct(Box<Message<'a>>),
    StructArray(Vec<Message<'a>>),
}

/// A struct's decoded (or not-yet-encoded) fields, keyed by name. Field
/// order is irrelevant here: both codec directions walk the struct's
/// descriptor, not the message, to decide wire order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Message<'a> {
    pub fields: HashMap<String, Value<'a>>,
}

impl<'a> Message<'a> {
    pub fn new() -> Self {
        Message { fields: HashMap::new() }
    }

    pub fn get(&self, name: &str) -> Option<&Value<'a>> {
        self.fields.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value<'a>) -> &mut Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// A fully decoded framed record: framing metadata plus the payload's
/// decoded fields (for a naked top-level record, `message` is the same
/// shape but there was no header to report).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record<'a> {
    pub type_name: String,
    pub size: u32,
    /// `Some(n)` when the source word's variant bit was set (`n` in
    /// 0..=15); `None` when it was unset. Preserving this distinction,
    /// not just folding to `variant: 0`, is what makes re-encoding
    /// byte-exact.
    pub variant: Option<u8>,
    pub hash_value: u64,
    pub timestamp: f64,
    pub message: Message<'a>,
}

impl<'a> Record<'a> {
    /// Builds a record for encoding from scratch; `type_name` and `size`
    /// are decode-only bookkeeping and are ignored by `codec::writer`
    /// (which recomputes the size and never needs the name).
    pub fn new(hash_value: u64, variant: Option<u8>, timestamp: f64, message: Message<'a>) -> Self {
        Record { type_name: String::new(), size: 0, variant, hash_value, timestamp, message }
    }
}
