//! Deserializer: parses framed and naked records against a
//! schema map + hash index, producing a `Record`/`Message` tree of
//! decoded `Value`s.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::codec::FrameHeader;
use crate::descriptor::{ElementDescriptor, SchemaMap, StructDescriptor};
use crate::error::{CbufResult, CodecError};
use crate::metadata;
use crate::value::{Message, NumericArray, NumericKind, NumericView, Record, Value};

/// `deserializeMessage(schema, hashIndex, buffer, offset)`.
pub fn deserialize<'a>(
    schema: &SchemaMap,
    hash_map: &HashMap<u64, StructDescriptor>,
    buffer: &'a [u8],
    offset: usize,
) -> CbufResult<Record<'a>> {
    if offset >= buffer.len() {
        return Err(CodecError::InvalidOffset { offset, len: buffer.len() });
    }
    let (header, type_name, message) = decode_framed_at(schema, hash_map, &buffer[offset..])?;
    Ok(Record {
        type_name,
        size: header.size,
        variant: header.variant,
        hash_value: header.hash_value,
        timestamp: header.timestamp,
        message,
    })
}

/// Looks up a descriptor by hash: the supplied index first, then the
/// bootstrap metadata descriptor if the hash matches it and
/// no equivalent descriptor was supplied.
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

/// Reads a framing header off the front of `buf`, resolves its descriptor,
/// and naked-decodes the payload. Shared by the top-level entry point and
/// by nested non-naked complex fields/array elements.
fn decode_framed_at<'a>(
    schema: &SchemaMap,
    hash_map: &HashMap<u64, StructDescriptor>,
    buf: &'a [u8],
) -> CbufResult<(FrameHeader, String, Message<'a>)> {
    if buf.len() < FrameHeader::SIZE {
        return Err(CodecError::TruncatedRecord {
            declared: FrameHeader::SIZE as u32,
            available: buf.len(),
        });
    }
    let header = FrameHeader::read(buf)?;
    if header.size as usize > buf.len() {
        return Err(CodecError::TruncatedRecord { declared: header.size, available: buf.len() });
    }
    let descriptor = resolve_descriptor(hash_map, header.hash_value)?;
    let payload = &buf[FrameHeader::SIZE..header.size as usize];
    let mut cursor = 0usize;
    let message = decode_naked(schema, hash_map, &descriptor, payload, &mut cursor)?;
    let consumed = FrameHeader::SIZE + cursor;
    if consumed != header.size as usize {
        return Err(CodecError::SizeMismatch { declared: header.size, consumed });
    }
    Ok((header, descriptor.name.clone(), message))
}

fn need(buf: &[u8], cursor: usize, n: usize) -> CbufResult<()> {
    if cursor + n > buf.len() {
        return Err(CodecError::TruncatedRecord {
            declared: (cursor + n) as u32,
            available: buf.len(),
        });
    }
    Ok(())
}

macro_rules! read_int {
    ($name:ident, $ty:ty) => {
        fn $name(buf: &[u8], cursor: &mut usize) -> CbufResult<$ty> {
            const W: usize = std::mem::size_of::<$ty>();
            need(buf, *cursor, W)?;
            let v = <$ty>::from_le_bytes(buf[*cursor..*cursor + W].try_into().unwrap());
            *cursor += W;
            Ok(v)
        }
    };
}

read_int!(read_u8, u8);
read_int!(read_u16, u16);
read_int!(read_u32, u32);
read_int!(read_u64, u64);
read_int!(read_i8, i8);
read_int!(read_i16, i16);
read_int!(read_i32, i32);
read_int!(read_i64, i64);
read_int!(read_f32, f32);
read_int!(read_f64, f64);

/// Naked decode: walks `descriptor`'s elements in order, consuming
/// `buf` from `*cursor` onward. Used for the payload of a framed record
/// (cursor starts at 0 in that payload slice) and, recursively, for naked
/// nested structs (cursor continues from wherever the parent left off).
fn decode_naked<'a>(
    schema: &SchemaMap,
    hash_map: &HashMap<u64, StructDescriptor>,
    descriptor: &StructDescriptor,
    buf: &'a [u8],
    cursor: &mut usize,
) -> CbufResult<Message<'a>> {
    let mut message = Message::new();
    for el in &descriptor.elements {
        let value = decode_element(schema, hash_map, el, buf, cursor)?;
        message.insert(el.name.clone(), value);
    }
    Ok(message)
}

fn decode_element<'a>(
    schema: &SchemaMap,
    hash_map: &HashMap<u64, StructDescriptor>,
    el: &ElementDescriptor,
    buf: &'a [u8],
    cursor: &mut usize,
) -> CbufResult<Value<'a>> {
    if el.is_array {
        decode_array(schema, hash_map, el, buf, cursor)
    } else {
        decode_scalar(schema, hash_map, el, buf, cursor)
    }
}

fn numeric_kind_for(el: &ElementDescriptor) -> Option<NumericKind> {
    if el.is_complex {
        return None;
    }
    Some(match el.type_name.as_str() {
        "uint8" => NumericKind::U8,
        "uint16" => NumericKind::U16,
        "uint32" => NumericKind::U32,
        "uint64" => NumericKind::U64,
        "int8" => NumericKind::I8,
        "int16" => NumericKind::I16,
        "int32" => NumericKind::I32,
        "int64" => NumericKind::I64,
        "float32" => NumericKind::F32,
        "float64" => NumericKind::F64,
        "bool" => NumericKind::Bool,
        _ => return None,
    })
}

/// Looks up a nested struct's own descriptor by qualified name. `schema`
/// and the element descriptor that names it always come from the same
/// parsed schema, so a miss here means the caller paired mismatched
/// schema/hash-map values, not a malformed wire payload.
fn nested_descriptor<'s>(schema: &'s SchemaMap, el: &ElementDescriptor) -> &'s StructDescriptor {
    match schema.get(&el.type_name) {
        Some(d) => d,
        None => unreachable!("schema map has no descriptor for '{}'", el.type_name),
    }
}

fn decode_complex<'a>(
    schema: &SchemaMap,
    hash_map: &HashMap<u64, StructDescriptor>,
    el: &ElementDescriptor,
    buf: &'a [u8],
    cursor: &mut usize,
) -> CbufResult<Message<'a>> {
    let nested = nested_descriptor(schema, el);
    if nested.naked {
        decode_naked(schema, hash_map, nested, buf, cursor)
    } else {
        let (header, _, message) = decode_framed_at(schema, hash_map, &buf[*cursor..])?;
        *cursor += header.size as usize;
        Ok(message)
    }
}

fn decode_scalar<'a>(
    schema: &SchemaMap,
    hash_map: &HashMap<u64, StructDescriptor>,
    el: &ElementDescriptor,
    buf: &'a [u8],
    cursor: &mut usize,
) -> CbufResult<Value<'a>> {
    if el.is_complex {
        return Ok(Value::Struct(Box::new(decode_complex(schema, hash_map, el, buf, cursor)?)));
    }
    Ok(match el.type_name.as_str() {
        "uint8" => Value::UInt(read_u8(buf, cursor)? as u64),
        "uint16" => Value::UInt(read_u16(buf, cursor)? as u64),
        "uint32" => Value::UInt(read_u32(buf, cursor)? as u64),
        "uint64" => Value::UInt(read_u64(buf, cursor)?),
        "int8" => Value::Int(read_i8(buf, cursor)? as i64),
        "int16" => Value::Int(read_i16(buf, cursor)? as i64),
        "int32" => Value::Int(read_i32(buf, cursor)? as i64),
        "int64" => Value::Int(read_i64(buf, cursor)?),
        "float32" => Value::Float(read_f32(buf, cursor)? as f64),
        "float64" => Value::Float(read_f64(buf, cursor)?),
        "bool" => Value::Bool(read_u8(buf, cursor)? != 0),
        "string" => Value::Str(decode_string_scalar(el, buf, cursor)?),
        other => return Err(CodecError::Encoding(format!("unsupported type token '{other}'"))),
    })
}

fn decode_string_scalar(el: &ElementDescriptor, buf: &[u8], cursor: &mut usize) -> CbufResult<String> {
    if let Some(bound) = el.upper_bound {
        let bound = bound as usize;
        need(buf, *cursor, bound)?;
        let bytes = &buf[*cursor..*cursor + bound];
        *cursor += bound;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    } else {
        let len = read_u32(buf, cursor)? as usize;
        need(buf, *cursor, len)?;
        let bytes = &buf[*cursor..*cursor + len];
        *cursor += len;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

fn decode_array<'a>(
    schema: &SchemaMap,
    hash_map: &HashMap<u64, StructDescriptor>,
    el: &ElementDescriptor,
    buf: &'a [u8],
    cursor: &mut usize,
) -> CbufResult<Value<'a>> {
    let count = if let Some(n) = el.array_length {
        n
    } else if let Some(bound) = el.array_upper_bound {
        let c = read_u32(buf, cursor)?;
        if c > bound {
            return Err(CodecError::CompactOverflow { upper_bound: bound, found: c });
        }
        c
    } else {
        read_u32(buf, cursor)?
    } as usize;

    if let Some(kind) = numeric_kind_for(el) {
        let nbytes = count * kind.elem_size();
        need(buf, *cursor, nbytes)?;
        let view = NumericView::new(kind, &buf[*cursor..*cursor + nbytes], count);
        *cursor += nbytes;
        return Ok(Value::Numeric(NumericArray::Borrowed(view)));
    }

    if el.type_name == "string" {
        // `count` comes straight off the wire and is not yet validated
        // against the remaining buffer; grow incrementally rather than
        // pre-reserving so a bogus huge count fails via `TruncatedRecord`
        // on the first short read instead of aborting the allocator.
        let mut items = Vec::new();
        for _ in 0..count {
            items.push(decode_string_scalar(el, buf, cursor)?);
        }
        return Ok(Value::StringArray(items));
    }

    let mut items = Vec::new();
    for _ in 0..count {
        items.push(decode_complex(schema, hash_map, el, buf, cursor)?);
    }
    Ok(Value::StructArray(items))
}
