//! Symbol table and custom-type-reference resolution across namespaces
//!, folded together with constant-expression evaluation
//! into a single `ResolvedSchema` that the size analyzer and
//! hasher consume.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::ast::{ArrayKind, Expr, NamespaceBody, PrimType, Schema, TypeRef};
use crate::eval::{self, ConstScope, ConstValue, EvalError};
use crate::lexer::Position;
use crate::parser::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolveError {
    pub message: String,
    pub pos: Position,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.pos)
    }
}

impl std::error::Error for ResolveError {}

impl From<EvalError> for ResolveError {
    fn from(e: EvalError) -> Self {
        ResolveError {
            message: e.to_string(),
            pos: match &e {
                EvalError::NotConstant { pos, .. }
                | EvalError::DivisionByZero { pos }
                | EvalError::OutOfRange { pos, .. }
                | EvalError::UnsupportedDefault { pos }
                | EvalError::UnsupportedConstType { pos } => *pos,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymbolKind {
    Struct,
    Enum,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedType {
    Primitive(PrimType),
    Struct(String),
    Enum(String),
}

impl ResolvedType {
    pub fn is_complex_struct(&self) -> bool {
        matches!(self, ResolvedType::Struct(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResolvedArrayKind {
    Fixed(u32),
    Compact(u32),
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum DefaultValue {
    Int(i64),
    BigInt(u64),
    Float(f64),
    Bool(bool),
    Str(String),
    EmptyArray,
}

#[derive(Debug, Clone)]
pub struct ResolvedElement {
    pub name: String,
    pub ty: ResolvedType,
    pub array: Option<ResolvedArrayKind>,
    pub default: Option<DefaultValue>,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub struct ResolvedStruct {
    pub qualified_name: String,
    pub naked: bool,
    pub elements: Vec<ResolvedElement>,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub struct ResolvedEnum {
    pub qualified_name: String,
    pub variants: Vec<(String, i32)>,
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedSchema {
    /// Global-namespace structs first, then namespaced structs in source
    /// order; insertion order is the output table's iteration order.
    pub structs: Vec<ResolvedStruct>,
    pub enums: Vec<ResolvedEnum>,
}

struct SymbolTable {
    symbols: HashMap<String, SymbolKind>,
}

impl SymbolTable {
    fn build(schema: &Schema) -> Result<Self, ParseError> {
        let mut symbols = HashMap::new();
        let mut insert = |qname: String, kind: SymbolKind, pos: Position| -> Result<(), ParseError> {
            if symbols.insert(qname.clone(), kind).is_some() {
                return Err(ParseError {
                    message: format!("duplicate struct/enum name '{qname}'"),
                    pos,
                });
            }
            Ok(())
        };
        for s in &schema.global.structs {
            insert(s.name.clone(), SymbolKind::Struct, s.pos)?;
        }
        for e in &schema.global.enums {
            insert(e.name.clone(), SymbolKind::Enum, e.pos)?;
        }
        for (ns, body) in &schema.namespaces {
            for s in &body.structs {
                insert(format!("{ns}::{}", s.name), SymbolKind::Struct, s.pos)?;
            }
            for e in &body.enums {
                insert(format!("{ns}::{}", e.name), SymbolKind::Enum, e.pos)?;
            }
        }
        Ok(SymbolTable { symbols })
    }

    fn resolve(
        &self,
        type_ref: &TypeRef,
        enclosing_ns: Option<&str>,
    ) -> Result<ResolvedType, ResolveError> {
        let custom = match type_ref {
            TypeRef::Primitive(p) => return Ok(ResolvedType::Primitive(*p)),
            TypeRef::Custom(c) => c,
        };
        let candidates: Vec<String> = match &custom.namespace {
            Some(ns) => vec![format!("{ns}::{}", custom.name)],
            None => match enclosing_ns {
                Some(ns) => vec![format!("{ns}::{}", custom.name), custom.name.clone()],
                None => vec![custom.name.clone()],
            },
        };
        for qname in &candidates {
            match self.symbols.get(qname) {
                Some(SymbolKind::Struct) => return Ok(ResolvedType::Struct(qname.clone())),
                Some(SymbolKind::Enum) => return Ok(ResolvedType::Enum(qname.clone())),
                None => continue,
            }
        }
        Err(ResolveError {
            message: format!("unknown type reference '{}'", display_type_ref(custom)),
            pos: custom.pos,
        })
    }
}

fn display_type_ref(custom: &crate::ast::CustomTypeRef) -> String {
    match &custom.namespace {
        Some(ns) => format!("{ns}::{}", custom.name),
        None => custom.name.clone(),
    }
}

/// Evaluates every `const` in a namespace body, in declaration order, with
/// the given starting scope (global consts for a named namespace; empty
/// for the global namespace itself).
fn eval_consts(
    body: &NamespaceBody,
    global: &HashMap<String, ConstValue>,
) -> Result<HashMap<String, ConstValue>, ResolveError> {
    let mut local = HashMap::new();
    for c in &body.consts {
        if !c.ty.is_integer() && !c.ty.is_float() {
            return Err(EvalError::UnsupportedConstType { pos: c.pos }.into());
        }
        let scope = ConstScope {
            local: &local,
            global,
        };
        let value = eval::eval_expr(&c.value, &scope)?;
        let value = match (value, c.ty.is_integer()) {
            (ConstValue::Int(v), true) => {
                ConstValue::Int(eval::range_check(v, c.ty, c.pos)?)
            }
            (other, _) => other,
        };
        local.insert(c.name.clone(), value);
    }
    Ok(local)
}

fn fold_default(
    expr: &Expr,
    ty: &ResolvedType,
    pos: Position,
    scope: &ConstScope,
) -> Result<DefaultValue, ResolveError> {
    match expr {
        Expr::Bool(b) => Ok(DefaultValue::Bool(*b)),
        Expr::Str(s) => Ok(DefaultValue::Str(s.clone())),
        Expr::ArrayLit(_) => Ok(DefaultValue::EmptyArray),
        _ => match ty {
            ResolvedType::Struct(_) => Err(EvalError::UnsupportedDefault { pos }.into()),
            ResolvedType::Enum(_) => {
                let value = eval::eval_expr(expr, scope)?;
                let ConstValue::Int(v) = value else {
                    return Err(EvalError::UnsupportedConstType { pos }.into());
                };
                Ok(DefaultValue::Int(eval::range_check_enum(v, pos)? as i64))
            }
            ResolvedType::Primitive(prim) => {
                let value = eval::eval_expr(expr, scope)?;
                match (value, prim) {
                    (ConstValue::Int(v), PrimType::U64) => {
                        Ok(DefaultValue::BigInt(eval::range_check(v, *prim, pos)? as u64))
                    }
                    (ConstValue::Int(v), p) if p.is_integer() => {
                        Ok(DefaultValue::Int(eval::range_check(v, *prim, pos)?))
                    }
                    (ConstValue::Float(v), p) if p.is_float() => Ok(DefaultValue::Float(v)),
                    (ConstValue::Int(v), p) if p.is_float() => Ok(DefaultValue::Float(v as f64)),
                    _ => Err(EvalError::UnsupportedConstType { pos }.into()),
                }
            }
        },
    }
}

fn resolve_array(
    suffix: &crate::ast::ArraySuffix,
    pos: Position,
    scope: &ConstScope,
) -> Result<ResolvedArrayKind, ResolveError> {
    match &suffix.kind {
        ArrayKind::Dynamic => Ok(ResolvedArrayKind::Dynamic),
        ArrayKind::Fixed(expr) => {
            let value = eval::eval_expr(expr, scope)?;
            let ConstValue::Int(v) = value else {
                return Err(EvalError::UnsupportedConstType { pos }.into());
            };
            let n = eval::range_check_array_size(v, pos)?;
            if suffix.compact {
                Ok(ResolvedArrayKind::Compact(n))
            } else {
                Ok(ResolvedArrayKind::Fixed(n))
            }
        }
    }
}

/// Runs the full front-end resolution pass: builds the symbol table,
/// evaluates every constant, resolves every custom type reference, and
/// folds every default value and array size.
pub fn resolve_schema(schema: &Schema) -> Result<ResolvedSchema, ResolveError> {
    let table = SymbolTable::build(schema).map_err(|e| ResolveError {
        message: e.message,
        pos: e.pos,
    })?;

    let global_consts = eval_consts(&schema.global, &HashMap::new())?;

    let mut resolved = ResolvedSchema::default();

    resolve_namespace_body(&schema.global, None, &table, &global_consts, &mut resolved)?;
    for (ns, body) in &schema.namespaces {
        let local_consts = eval_consts(body, &global_consts)?;
        let scope_global = merge_consts(&global_consts, &local_consts);
        resolve_namespace_body(body, Some(ns.as_str()), &table, &scope_global, &mut resolved)?;
    }

    Ok(resolved)
}

fn merge_consts(
    global: &HashMap<String, ConstValue>,
    local: &HashMap<String, ConstValue>,
) -> HashMap<String, ConstValue> {
    let mut merged = global.clone();
    merged.extend(local.iter().map(|(k, v)| (k.clone(), *v)));
    merged
}

fn resolve_namespace_body(
    body: &NamespaceBody,
    ns: Option<&str>,
    table: &SymbolTable,
    consts: &HashMap<String, ConstValue>,
    out: &mut ResolvedSchema,
) -> Result<(), ResolveError> {
    let empty = HashMap::new();
    let scope = ConstScope {
        local: &empty,
        global: consts,
    };

    for s in &body.structs {
        let qualified_name = match ns {
            Some(ns) => format!("{ns}::{}", s.name),
            None => s.name.clone(),
        };
        let mut elements = Vec::with_capacity(s.elements.len());
        for el in &s.elements {
            let ty = table.resolve(&el.type_ref, ns)?;
            let array = el
                .array
                .as_ref()
                .map(|suffix| resolve_array(suffix, el.pos, &scope))
                .transpose()?;
            let default = el
                .default
                .as_ref()
                .map(|expr| {
                    if array.is_some() {
                        Ok(DefaultValue::EmptyArray)
                    } else {
                        fold_default(expr, &ty, el.pos, &scope)
                    }
                })
                .transpose()?;
            elements.push(ResolvedElement {
                name: el.name.clone(),
                ty,
                array,
                default,
                pos: el.pos,
            });
        }
        out.structs.push(ResolvedStruct {
            qualified_name,
            naked: s.naked,
            elements,
            pos: s.pos,
        });
    }

    for e in &body.enums {
        let qualified_name = match ns {
            Some(ns) => format!("{ns}::{}", e.name),
            None => e.name.clone(),
        };
        let mut next_value = 0i32;
        let mut variants = Vec::with_capacity(e.variants.len());
        for v in &e.variants {
            let value = match &v.value {
                Some(expr) => {
                    let folded = eval::eval_expr(expr, &scope)?;
                    let ConstValue::Int(iv) = folded else {
                        return Err(EvalError::UnsupportedConstType { pos: v.pos }.into());
                    };
                    eval::range_check_enum(iv, v.pos)?
                }
                None => next_value,
            };
            next_value = value.wrapping_add(1);
            variants.push((v.name.clone(), value));
        }
        out.enums.push(ResolvedEnum {
            qualified_name,
            variants,
        });
    }

    Ok(())
}
