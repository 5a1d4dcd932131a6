//! Size & shape analyzer: packed byte sizes, `simple`, and
//! `has_compact`, plus the struct dependency ordering that both this module
//! and `hash` need (a struct must be sized/hashed before anything that
//! embeds it — depth-first, with cycles diagnosed here).

use std::collections::HashMap;
use std::fmt;

use crate::ast::PrimType;
use crate::descriptor::FRAME_HEADER_SIZE;
use crate::resolve::{ResolvedArrayKind, ResolvedSchema, ResolvedType};

#[derive(Debug, Clone, PartialEq)]
pub struct SizeError {
    pub message: String,
}

impl fmt::Display for SizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SizeError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StructShape {
    /// Total wire size in bytes (header included for non-naked structs),
    /// when every field has a statically known width; `None` if any field
    /// is a dynamic string, a dynamic/compact array, or embeds a struct
    /// whose own shape isn't fixed.
    pub packed_size: Option<u32>,
    pub simple: bool,
    pub has_compact: bool,
}

fn index_by_name(schema: &ResolvedSchema) -> HashMap<&str, usize> {
    schema
        .structs
        .iter()
        .enumerate()
        .map(|(i, s)| (s.qualified_name.as_str(), i))
        .collect()
}

/// Depth-first struct dependency order: a struct appears after every
/// struct it embeds. Returns `SizeError` on a reference cycle.
pub fn topological_order(schema: &ResolvedSchema) -> Result<Vec<usize>, SizeError> {
    let index = index_by_name(schema);
    let n = schema.structs.len();
    let mut state = vec![0u8; n]; // 0 = unvisited, 1 = visiting, 2 = done
    let mut order = Vec::with_capacity(n);

    fn visit(
        i: usize,
        schema: &ResolvedSchema,
        index: &HashMap<&str, usize>,
        state: &mut [u8],
        order: &mut Vec<usize>,
    ) -> Result<(), SizeError> {
        match state[i] {
            2 => return Ok(()),
            1 => {
                return Err(SizeError {
                    message: format!(
                        "cycle detected in nested struct references involving '{}'",
                        schema.structs[i].qualified_name
                    ),
                })
            }
            _ => {}
        }
        state[i] = 1;
        for el in &schema.structs[i].elements {
            if let ResolvedType::Struct(qname) = &el.ty {
                if let Some(&j) = index.get(qname.as_str()) {
                    visit(j, schema, index, state, order)?;
                }
            }
        }
        state[i] = 2;
        order.push(i);
        Ok(())
    }

    for i in 0..n {
        visit(i, schema, &index, &mut state, &mut order)?;
    }
    Ok(order)
}

/// Computes `StructShape` for every struct, keyed by qualified name.
/// Structs are processed in dependency order so a nested struct's shape is
/// always available when its embedder is analyzed.
pub fn analyze(schema: &ResolvedSchema) -> Result<HashMap<String, StructShape>, SizeError> {
    let order = topological_order(schema)?;
    let mut shapes: HashMap<String, StructShape> = HashMap::with_capacity(schema.structs.len());

    for &i in &order {
        let s = &schema.structs[i];
        let mut size_acc: Option<u32> = Some(if s.naked { 0 } else { FRAME_HEADER_SIZE });
        let mut simple = true;
        let mut has_compact = false;

        for el in &s.elements {
            let elem_fixed_width: Option<u32> = match &el.ty {
                ResolvedType::Primitive(PrimType::String) => None,
                ResolvedType::Primitive(p) => p.fixed_width(),
                ResolvedType::Enum(_) => Some(4),
                ResolvedType::Struct(qname) => {
                    let nested = shapes.get(qname).ok_or_else(|| SizeError {
                        message: format!(
                            "struct '{qname}' referenced before its shape was computed"
                        ),
                    })?;
                    if !nested.simple {
                        simple = false;
                    }
                    if nested.has_compact {
                        has_compact = true;
                    }
                    nested.packed_size
                }
            };

            if matches!(&el.ty, ResolvedType::Primitive(PrimType::String)) {
                simple = false;
            }

            let field_size = match &el.array {
                None => elem_fixed_width,
                Some(ResolvedArrayKind::Fixed(n)) => elem_fixed_width.map(|w| w * n),
                Some(ResolvedArrayKind::Compact(_)) => {
                    has_compact = true;
                    simple = false;
                    None
                }
                Some(ResolvedArrayKind::Dynamic) => {
                    simple = false;
                    None
                }
            };

            size_acc = match (size_acc, field_size) {
                (Some(acc), Some(w)) => Some(acc + w),
                _ => None,
            };
        }

        shapes.insert(
            s.qualified_name.clone(),
            StructShape {
                packed_size: size_acc,
                simple,
                has_compact,
            },
        );
    }

    Ok(shapes)
}
