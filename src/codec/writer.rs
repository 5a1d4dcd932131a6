//! Serializer + sizer: computes wire size and writes a
//! record matching the descriptor, mirroring `codec::reader`'s decode
//! rules field for field.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::codec::FrameHeader;
use crate::descriptor::{ElementDescriptor, SchemaMap, StructDescriptor};
use crate::error::{CbufResult, CodecError};
use crate::metadata;
use crate::value::{Message, Value};

fn resolve_descriptor(
    hash_map: &HashMap<u64, StructDescriptor>,
    hash: u64,
) -> CbufResult<Cow<'_, StructDescriptor>> {
    if let Some(d) = hash_map.get(&hash) {
        return Ok(Cow::Borrowed(d));
    }
    if hash == metadata::METADATA_HASH {
        return Ok(Cow::Owned(metadata::bootstrap_descriptor()));
    }
    Err(CodecError::UnknownHash { hash })
}

fn nested_descriptor<'s>(schema: &'s SchemaMap, el: &ElementDescriptor) -> &'s StructDescriptor {
    match schema.get(&el.type_name) {
        Some(d) => d,
        None => unreachable!("schema map has no descriptor for '{}'", el.type_name),
    }
}

fn missing_field(el: &ElementDescriptor) -> CodecError {
    CodecError::Encoding(format!("missing value for field '{}'", el.name))
}

fn shape_mismatch(el: &ElementDescriptor, expected: &str) -> CodecError {
    CodecError::Encoding(format!("field '{}' expected a {expected} value", el.name))
}

/// `serializedMessageSize(schema, hashIndex, message)`.
pub fn serialized_message_size(
    schema: &SchemaMap,
    hash_map: &HashMap<u64, StructDescriptor>,
    record_hash: u64,
    message: &Message,
) -> CbufResult<usize> {
    let descriptor = resolve_descriptor(hash_map, record_hash)?;
    Ok(FrameHeader::SIZE + naked_size(schema, &descriptor, message)?)
}

/// `serializeMessage(schema, hashIndex, message)`.
pub fn serialize(
    schema: &SchemaMap,
    hash_map: &HashMap<u64, StructDescriptor>,
    record_hash: u64,
    variant: Option<u8>,
    timestamp: f64,
    message: &Message,
) -> CbufResult<Vec<u8>> {
    let descriptor = resolve_descriptor(hash_map, record_hash)?;
    let total = FrameHeader::SIZE + naked_size(schema, &descriptor, message)?;
    let mut out = Vec::with_capacity(total);
    let header = FrameHeader { size: total as u32, variant, hash_value: record_hash, timestamp };
    header.write(&mut out);
    write_naked(schema, &descriptor, message, &mut out)?;
    Ok(out)
}

fn naked_size(schema: &SchemaMap, descriptor: &StructDescriptor, message: &Message) -> CbufResult<usize> {
    let mut total = 0usize;
    for el in &descriptor.elements {
        total += element_size(schema, el, message)?;
    }
    Ok(total)
}

fn element_size(schema: &SchemaMap, el: &ElementDescriptor, message: &Message) -> CbufResult<usize> {
    let value = message.get(&el.name).ok_or_else(|| missing_field(el))?;
    if el.is_array {
        array_size(schema, el, value)
    } else {
        scalar_size(schema, el, value)
    }
}

fn scalar_size(schema: &SchemaMap, el: &ElementDescriptor, value: &Value) -> CbufResult<usize> {
    if el.is_complex {
        let Value::Struct(inner) = value else { return Err(shape_mismatch(el, "struct")) };
        let nested = nested_descriptor(schema, el);
        let body = naked_size(schema, nested, inner)?;
        return Ok(if nested.naked { body } else { FrameHeader::SIZE + body });
    }
    Ok(match el.type_name.as_str() {
        "uint8" | "int8" | "bool" => 1,
        "uint16" | "int16" => 2,
        "uint32" | "int32" | "float32" => 4,
        "uint64" | "int64" | "float64" => 8,
        "string" => match el.upper_bound {
            Some(bound) => bound as usize,
            None => {
                let Value::Str(s) = value else { return Err(shape_mismatch(el, "string")) };
                4 + s.as_bytes().len()
            }
        },
        other => return Err(CodecError::Encoding(format!("unsupported type token '{other}'"))),
    })
}

fn array_size(schema: &SchemaMap, el: &ElementDescriptor, value: &Value) -> CbufResult<usize> {
    let prefix = if el.array_length.is_some() { 0 } else { 4 };

    if el.is_complex {
        let Value::StructArray(items) = value else { return Err(shape_mismatch(el, "struct array")) };
        check_bound(el, items.len())?;
        let nested = nested_descriptor(schema, el);
        let mut total = prefix;
        for item in items {
            let body = naked_size(schema, nested, item)?;
            total += if nested.naked { body } else { FrameHeader::SIZE + body };
        }
        return Ok(total);
    }

    if el.type_name == "string" {
        let Value::StringArray(items) = value else { return Err(shape_mismatch(el, "string array")) };
        check_bound(el, items.len())?;
        let mut total = prefix;
        for s in items {
            total += match el.upper_bound {
                Some(bound) => bound as usize,
                None => 4 + s.as_bytes().len(),
            };
        }
        return Ok(total);
    }

    let Value::Numeric(arr) = value else { return Err(shape_mismatch(el, "numeric array")) };
    check_bound(el, arr.len())?;
    Ok(prefix + arr.len() * arr.kind().elem_size())
}

fn check_bound(el: &ElementDescriptor, count: usize) -> CbufResult<()> {
    if let Some(n) = el.array_length {
        if count as u32 != n {
            return Err(CodecError::Encoding(format!(
                "field '{}' is a fixed array of length {n} but the value has {count} elements",
                el.name
            )));
        }
    }
    if let Some(bound) = el.array_upper_bound {
        if count as u32 > bound {
            return Err(CodecError::CompactOverflow { upper_bound: bound, found: count as u32 });
        }
    }
    Ok(())
}

fn write_naked(schema: &SchemaMap, descriptor: &StructDescriptor, message: &Message, out: &mut Vec<u8>) -> CbufResult<()> {
    for el in &descriptor.elements {
        write_element(schema, el, message, out)?;
    }
    Ok(())
}

fn write_element(schema: &SchemaMap, el: &ElementDescriptor, message: &Message, out: &mut Vec<u8>) -> CbufResult<()> {
    let value = message.get(&el.name).ok_or_else(|| missing_field(el))?;
    if el.is_array {
        write_array(schema, el, value, out)
    } else {
        write_scalar(schema, el, value, out)
    }
}

/// Writes a nested struct's framing header (if non-naked) then its naked
/// body. The nested `timestamp` is written as `0.0`: a `Message` has no
/// slot to carry one (only a top-level `Record` does).
fn write_nested_struct(schema: &SchemaMap, nested: &StructDescriptor, inner: &Message, out: &mut Vec<u8>) -> CbufResult<()> {
    if nested.naked {
        return write_naked(schema, nested, inner, out);
    }
    let body_size = naked_size(schema, nested, inner)?;
    let header = FrameHeader {
        size: (FrameHeader::SIZE + body_size) as u32,
        variant: None,
        hash_value: nested.hash_value,
        timestamp: 0.0,
    };
    header.write(out);
    write_naked(schema, nested, inner, out)
}

fn write_scalar(schema: &SchemaMap, el: &ElementDescriptor, value: &Value, out: &mut Vec<u8>) -> CbufResult<()> {
    if el.is_complex {
        let Value::Struct(inner) = value else { return Err(shape_mismatch(el, "struct")) };
        let nested = nested_descriptor(schema, el);
        return write_nested_struct(schema, nested, inner, out);
    }
    match el.type_name.as_str() {
        "uint8" => {
            let Value::UInt(v) = value else { return Err(shape_mismatch(el, "uint8")) };
            out.push(*v as u8);
        }
        "uint16" => {
            let Value::UInt(v) = value else { return Err(shape_mismatch(el, "uint16")) };
            out.extend_from_slice(&(*v as u16).to_le_bytes());
        }
        "uint32" => {
            let Value::UInt(v) = value else { return Err(shape_mismatch(el, "uint32")) };
            out.extend_from_slice(&(*v as u32).to_le_bytes());
        }
        "uint64" => {
            let Value::UInt(v) = value else { return Err(shape_mismatch(el, "uint64")) };
            out.extend_from_slice(&v.to_le_bytes());
        }
        "int8" => {
            let Value::Int(v) = value else { return Err(shape_mismatch(el, "int8")) };
            out.push(*v as i8 as u8);
        }
        "int16" => {
            let Value::Int(v) = value else { return Err(shape_mismatch(el, "int16")) };
            out.extend_from_slice(&(*v as i16).to_le_bytes());
        }
        "int32" => {
            let Value::Int(v) = value else { return Err(shape_mismatch(el, "int32")) };
            out.extend_from_slice(&(*v as i32).to_le_bytes());
        }
        "int64" => {
            let Value::Int(v) = value else { return Err(shape_mismatch(el, "int64")) };
            out.extend_from_slice(&v.to_le_bytes());
        }
        "float32" => {
            let Value::Float(v) = value else { return Err(shape_mismatch(el, "float32")) };
            out.extend_from_slice(&(*v as f32).to_le_bytes());
        }
        "float64" => {
            let Value::Float(v) = value else { return Err(shape_mismatch(el, "float64")) };
            out.extend_from_slice(&v.to_le_bytes());
        }
        "bool" => {
            let Value::Bool(v) = value else { return Err(shape_mismatch(el, "bool")) };
            out.push(u8::from(*v));
        }
        "string" => {
            let Value::Str(s) = value else { return Err(shape_mismatch(el, "string")) };
            write_string_bytes(el, s.as_bytes(), out)?;
        }
        other => return Err(CodecError::Encoding(format!("unsupported type token '{other}'"))),
    }
    Ok(())
}

fn write_string_bytes(el: &ElementDescriptor, bytes: &[u8], out: &mut Vec<u8>) -> CbufResult<()> {
    if let Some(bound) = el.upper_bound {
        let bound = bound as usize;
        if bytes.len() >= bound {
            return Err(CodecError::Encoding(format!(
                "field '{}' short_string value is {} bytes, exceeds the {bound}-byte bound",
                el.name,
                bytes.len()
            )));
        }
        out.extend_from_slice(bytes);
        out.extend(std::iter::repeat(0u8).take(bound - bytes.len()));
    } else {
        out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(bytes);
    }
    Ok(())
}

fn write_array(schema: &SchemaMap, el: &ElementDescriptor, value: &Value, out: &mut Vec<u8>) -> CbufResult<()> {
    let count = match value {
        Value::StringArray(items) => items.len(),
        Value::StructArray(items) => items.len(),
        Value::Numeric(arr) => arr.len(),
        _ => return Err(shape_mismatch(el, "array")),
    };
    check_bound(el, count)?;
    if el.array_length.is_none() {
        out.extend_from_slice(&(count as u32).to_le_bytes());
    }

    if el.is_complex {
        let Value::StructArray(items) = value else { return Err(shape_mismatch(el, "struct array")) };
        let nested = nested_descriptor(schema, el);
        for item in items {
            write_nested_struct(schema, nested, item, out)?;
        }
        return Ok(());
    }

    if el.type_name == "string" {
        let Value::StringArray(items) = value else { return Err(shape_mismatch(el, "string array")) };
        for s in items {
            write_string_bytes(el, s.as_bytes(), out)?;
        }
        return Ok(());
    }

    let Value::Numeric(arr) = value else { return Err(shape_mismatch(el, "numeric array")) };
    arr.write_le(out);
    Ok(())
}
