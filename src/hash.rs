//! Hasher: canonical textual form and DJB2-style 64-bit
//! struct content hash.
//!
//! Struct hashes double as the cyclic-type-graph guard: computing a
//! struct's canonical form requires every struct it embeds to already have
//! a hash, so hashing walks the same dependency order as `size::analyze`
//! and a cycle surfaces as `size::SizeError` there too.

use std::collections::HashMap;

use crate::ast::PrimType;
use crate::resolve::{ResolvedArrayKind, ResolvedSchema, ResolvedType};
use crate::size::{self, SizeError};

fn prim_canonical(p: PrimType) -> &'static str {
    use PrimType::*;
    match p {
        U8 => "uint8_t",
        U16 => "uint16_t",
        U32 => "uint32_t",
        U64 => "uint64_t",
        S8 => "int8_t",
        S16 => "int16_t",
        S32 => "int32_t",
        S64 => "int64_t",
        F32 => "float",
        F64 => "double",
        Bool => "bool",
        String => "std::string",
        ShortString => "VString<15>",
    }
}

/// `h = 5381; for each byte b: h = ((h << 5) + h) + b`, 64-bit wrapping.
pub fn djb2_hash(bytes: &[u8]) -> u64 {
    let mut h: u64 = 5381;
    for &b in bytes {
        h = h.wrapping_shl(5).wrapping_add(h).wrapping_add(b as u64);
    }
    h
}

fn canonical_form(
    s: &crate::resolve::ResolvedStruct,
    hashes: &HashMap<String, u64>,
) -> String {
    let mut text = format!("struct {} \n", s.qualified_name);
    for el in &s.elements {
        if let Some(array) = &el.array {
            let bound = match array {
                ResolvedArrayKind::Fixed(n) | ResolvedArrayKind::Compact(n) => Some(*n),
                ResolvedArrayKind::Dynamic => None,
            };
            if let Some(n) = bound {
                text.push_str(&format!("[{n}] "));
            }
        }
        let type_tok = match &el.ty {
            ResolvedType::Primitive(p) => prim_canonical(*p).to_string(),
            ResolvedType::Struct(qname) => {
                let h = hashes.get(qname).copied().unwrap_or(0);
                format!("{h:X}")
            }
            ResolvedType::Enum(qname) => qname.clone(),
        };
        text.push_str(&type_tok);
        text.push(' ');
        text.push_str(&el.name);
        text.push_str("; \n");
    }
    text
}

/// Computes the content hash of every struct in `schema`, keyed by
/// qualified name.
pub fn compute_hashes(schema: &ResolvedSchema) -> Result<HashMap<String, u64>, SizeError> {
    let order = size::topological_order(schema)?;
    let mut hashes = HashMap::with_capacity(schema.structs.len());
    for &i in &order {
        let s = &schema.structs[i];
        let text = canonical_form(s, &hashes);
        hashes.insert(s.qualified_name.clone(), djb2_hash(text.as_bytes()));
    }
    Ok(hashes)
}
