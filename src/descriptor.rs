//! Descriptor emitter and hash index: the
//! language-neutral `StructDescriptor`/`ElementDescriptor` shape that the
//! codec consumes, and the `SchemaMap`/hash-index containers around it.

use std::collections::HashMap;

use serde::Serialize;

use crate::ast::PrimType;
use crate::error::CodecError;
use crate::resolve::{DefaultValue, ResolvedArrayKind, ResolvedSchema, ResolvedType};
use crate::size::StructShape;

/// Byte length of the framing header: `magic(4) + size_and_variant(4) +
/// hash(8) + timestamp(8)` (see DESIGN.md for why this is 24, not 16).
pub const FRAME_HEADER_SIZE: u32 = 24;

/// The descriptor's `type` field uses a different canonical spelling than
/// the hasher's canonical form (`uint8` here, `uint8_t` there).
fn descriptor_type_name(p: PrimType) -> &'static str {
    use PrimType::*;
    match p {
        U8 => "uint8",
        U16 => "uint16",
        U32 => "uint32",
        U64 => "uint64",
        S8 => "int8",
        S16 => "int16",
        S32 => "int32",
        S64 => "int64",
        F32 => "float32",
        F64 => "float64",
        Bool => "bool",
        String | ShortString => "string",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub is_array: bool,
    pub array_length: Option<u32>,
    pub array_upper_bound: Option<u32>,
    pub upper_bound: Option<u32>,
    pub is_complex: bool,
    pub default_value: Option<DefaultValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructDescriptor {
    pub name: String,
    pub hash_value: u64,
    pub line: u32,
    pub column: u32,
    pub naked: bool,
    pub elements: Vec<ElementDescriptor>,
}

impl StructDescriptor {
    pub fn element(&self, name: &str) -> Option<&ElementDescriptor> {
        self.elements.iter().find(|e| e.name == name)
    }
}

/// Qualified-name-keyed descriptor table, preserving insertion order
/// (global-namespace structs first, then named namespaces in source
/// order) without pulling in an ordered-map crate.
#[derive(Debug, Clone, Default)]
pub struct SchemaMap {
    order: Vec<StructDescriptor>,
    index: HashMap<String, usize>,
}

impl SchemaMap {
    /// Builds a schema map directly from descriptors, preserving the
    /// given order, without going through `parse_cbuf_schema`. Useful for
    /// embedding a bootstrap/well-known descriptor set or for tests that
    /// exercise the codec against a hand-built schema.
    pub fn from_structs(structs: impl IntoIterator<Item = StructDescriptor>) -> Self {
        let mut map = SchemaMap::default();
        for descriptor in structs {
            map.push(descriptor);
        }
        map
    }

    pub fn get(&self, name: &str) -> Option<&StructDescriptor> {
        self.index.get(name).map(|&i| &self.order[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &StructDescriptor> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn push(&mut self, descriptor: StructDescriptor) {
        let idx = self.order.len();
        self.index.insert(descriptor.name.clone(), idx);
        self.order.push(descriptor);
    }
}

fn emit_element(
    el: &crate::resolve::ResolvedElement,
    hashes: &HashMap<String, u64>,
) -> ElementDescriptor {
    let (type_name, is_complex, short_string_bound) = match &el.ty {
        ResolvedType::Primitive(PrimType::ShortString) => ("string".to_string(), false, Some(16)),
        ResolvedType::Primitive(p) => (descriptor_type_name(*p).to_string(), false, None),
        ResolvedType::Enum(_) => ("int32".to_string(), false, None),
        ResolvedType::Struct(qname) => (qname.clone(), true, None),
    };
    let _ = hashes; // the hash value lives on the referenced struct's own descriptor

    let (is_array, array_length, array_upper_bound) = match &el.array {
        None => (false, None, None),
        Some(ResolvedArrayKind::Fixed(n)) => (true, Some(*n), None),
        Some(ResolvedArrayKind::Compact(n)) => (true, None, Some(*n)),
        Some(ResolvedArrayKind::Dynamic) => (true, None, None),
    };

    ElementDescriptor {
        name: el.name.clone(),
        type_name,
        is_array,
        array_length,
        array_upper_bound,
        upper_bound: short_string_bound,
        is_complex,
        default_value: el.default.clone(),
    }
}

/// Projects a fully resolved schema into a `SchemaMap`, in the qualified
/// insertion order `resolve::resolve_schema` already established.
pub fn build_schema_map(
    schema: &ResolvedSchema,
    hashes: &HashMap<String, u64>,
    _shapes: &HashMap<String, StructShape>,
) -> SchemaMap {
    let mut map = SchemaMap::default();
    for s in &schema.structs {
        let elements = s.elements.iter().map(|e| emit_element(e, hashes)).collect();
        map.push(StructDescriptor {
            name: s.qualified_name.clone(),
            hash_value: hashes.get(&s.qualified_name).copied().unwrap_or(0),
            line: s.pos.line,
            column: s.pos.column,
            naked: s.naked,
            elements,
        });
    }
    map
}

/// Derives the `hash -> descriptor` index from a schema map.
/// Two distinct descriptors sharing a hash is an `AmbiguousHash` failure.
pub fn schema_map_to_hash_map(
    schema: &SchemaMap,
) -> Result<HashMap<u64, StructDescriptor>, CodecError> {
    let mut index = HashMap::with_capacity(schema.len());
    for descriptor in schema.iter() {
        if let Some(existing) = index.get(&descriptor.hash_value) {
            if existing.name != descriptor.name {
                return Err(CodecError::AmbiguousHash {
                    hash: descriptor.hash_value,
                });
            }
        }
        index.insert(descriptor.hash_value, descriptor.clone());
    }
    Ok(index)
}
