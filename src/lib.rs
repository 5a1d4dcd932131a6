#![forbid(unsafe_code)]
//! cbuf: a compact, C-memory-layout-oriented message schema language and
//! wire codec for a robotics message bus.
//!
//! The crate front-end (`lexer` -> `parser` -> `resolve` -> `size` ->
//! `hash` -> `descriptor`) turns schema text into a [`descriptor::SchemaMap`];
//! the codec (`codec::reader`, `codec::writer`) deserializes and
//! serializes binary records against that map. [`schema`] re-exports the
//! five public operations callers need; everything else is an internal
//! collaborator.
//!
//! ```
//! use cbuf::schema;
//!
//! let text = "namespace ns { struct point { f32 x; f32 y; } }\n";
//! let schema_map = schema::parse_cbuf_schema(text).unwrap();
//! let hash_index = schema::schema_map_to_hash_map(&schema_map).unwrap();
//! assert!(schema_map.get("ns::point").is_some());
//! let _ = hash_index;
//! ```

pub mod ast;
pub mod codec;
pub mod descriptor;
pub mod error;
pub mod eval;
pub mod hash;
pub mod lexer;
pub mod metadata;
pub mod parser;
pub mod resolve;
pub mod schema;
pub mod size;
pub mod value;

#[cfg(test)]
mod test;

pub use descriptor::{ElementDescriptor, SchemaMap, StructDescriptor};
pub use error::{CbufResult, CodecError};
pub use resolve::DefaultValue;
pub use schema::{
    deserialize_message, parse_cbuf_schema, schema_map_to_hash_map, serialize_message,
    serialized_message_size,
};
pub use value::{Message, NumericArray, NumericKind, NumericScalar, NumericView, OwnedNumeric, Record, Value};
