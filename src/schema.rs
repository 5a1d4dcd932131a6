//! The five public operations: the only surface external callers see.
//! Everything else (`lexer`, `ast`, `eval`, `parser`, `resolve`, `size`,
//! `hash`, `descriptor`, `metadata`, `codec`) is an internal collaborator
//! composed here.

use std::collections::HashMap;

use anyhow::Context;

use crate::codec;
use crate::descriptor::{self, SchemaMap, StructDescriptor};
use crate::error::CbufResult;
use crate::hash;
use crate::parser;
use crate::resolve;
use crate::size;
use crate::value::Record;

/// Runs the front end with `anyhow::Context` attached at each stage
/// boundary, the same chaining idb-rs leans on internally before a caller
/// ever sees the error.
fn parse_cbuf_schema_chained(text: &str) -> anyhow::Result<SchemaMap> {
    let ast = parser::parse(text)
        .map_err(anyhow::Error::from)
        .context("lexing/parsing cbuf schema text")?;
    let resolved = resolve::resolve_schema(&ast)
        .map_err(anyhow::Error::from)
        .context("resolving type references and constant expressions")?;
    let shapes = size::analyze(&resolved)
        .map_err(anyhow::Error::from)
        .context("computing struct sizes and shapes")?;
    let hashes = hash::compute_hashes(&resolved)
        .map_err(anyhow::Error::from)
        .context("computing struct content hashes")?;
    Ok(descriptor::build_schema_map(&resolved, &hashes, &shapes))
}

/// `parseCBufSchema(text) -> { error?, schema }`.
///
/// Every front-end stage's failure (lex, parse, resolve/eval, size/cycle)
/// collapses into a single diagnostic string, with the failing stage named
/// via `anyhow::Context` before being flattened for the public signature.
pub fn parse_cbuf_schema(text: &str) -> Result<SchemaMap, String> {
    parse_cbuf_schema_chained(text).map_err(|e| format!("{e:#}"))
}

/// `schemaMapToHashMap(schema)`.
pub fn schema_map_to_hash_map(schema: &SchemaMap) -> CbufResult<HashMap<u64, StructDescriptor>> {
    descriptor::schema_map_to_hash_map(schema)
}

/// `deserializeMessage(schema, hashIndex, buffer, offset=0)`.
pub fn deserialize_message<'a>(
    schema: &SchemaMap,
    hash_index: &HashMap<u64, StructDescriptor>,
    buffer: &'a [u8],
    offset: usize,
) -> CbufResult<Record<'a>> {
    codec::reader::deserialize(schema, hash_index, buffer, offset)
}

/// `serializeMessage(schema, hashIndex, record)`.
///
/// Only `record.hashValue`, `record.variant`, `record.timestamp`, and
/// `record.message` are consulted; `type_name`/`size` are decode-only
/// bookkeeping recomputed fresh on every call.
pub fn serialize_message(
    schema: &SchemaMap,
    hash_index: &HashMap<u64, StructDescriptor>,
    record: &Record,
) -> CbufResult<Vec<u8>> {
    codec::writer::serialize(
        schema,
        hash_index,
        record.hash_value,
        record.variant,
        record.timestamp,
        &record.message,
    )
}

/// `serializedMessageSize(schema, hashIndex, record)`.
pub fn serialized_message_size(
    schema: &SchemaMap,
    hash_index: &HashMap<u64, StructDescriptor>,
    record: &Record,
) -> CbufResult<usize> {
    codec::writer::serialized_message_size(schema, hash_index, record.hash_value, &record.message)
}
