//! Bootstrap metadata descriptor: a built-in, immutable
//! descriptor for `cbufmsg::metadata`, equivalent to parsing
//!
//! ```text
//! namespace cbufmsg { struct metadata { u64 msg_hash; string msg_name; string msg_meta; } }
//! ```
//!
//! hard-coded rather than produced by running that text through the real
//! parser, so the bootstrap descriptor a binary ships with can never drift
//! from what decoding self-describing streams expects.

use crate::descriptor::{ElementDescriptor, StructDescriptor};

/// `hashValue` of the bootstrap `cbufmsg::metadata` descriptor.
pub const METADATA_HASH: u64 = 0xBE6738D544AB72C6;

pub const METADATA_QUALIFIED_NAME: &str = "cbufmsg::metadata";

fn element(name: &str, type_name: &str) -> ElementDescriptor {
    ElementDescriptor {
        name: name.to_string(),
        type_name: type_name.to_string(),
        is_array: false,
        array_length: None,
        array_upper_bound: None,
        upper_bound: None,
        is_complex: false,
        default_value: None,
    }
}

/// Builds the bootstrap descriptor. Used when an incoming record's hash
/// matches `METADATA_HASH` but no equivalent descriptor is present in the
/// supplied schema, enabling self-describing streams whose first record
/// carries the schema for the records that follow.
pub fn bootstrap_descriptor() -> StructDescriptor {
    StructDescriptor {
        name: METADATA_QUALIFIED_NAME.to_string(),
        hash_value: METADATA_HASH,
        line: 1,
        column: 28,
        naked: false,
        elements: vec![
            element("msg_hash", "uint64"),
            element("msg_name", "string"),
            element("msg_meta", "string"),
        ],
    }
}
