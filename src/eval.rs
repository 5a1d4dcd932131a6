//! Constant-expression folding: integer/float default values
//! and integer array sizes, with range checks against a field's declared
//! type.

use std::collections::HashMap;
use std::fmt;

use crate::ast::{Expr, PrimType};
use crate::lexer::Position;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Float(f64),
}

impl ConstValue {
    pub fn as_f64(self) -> f64 {
        match self {
            ConstValue::Int(v) => v as f64,
            ConstValue::Float(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    NotConstant { name: String, pos: Position },
    DivisionByZero { pos: Position },
    OutOfRange { value: i128, min: i128, max: i128, pos: Position },
    UnsupportedDefault { pos: Position },
    UnsupportedConstType { pos: Position },
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::NotConstant { name, pos } => {
                write!(f, "'{name}' is not a previously declared constant at {pos}")
            }
            EvalError::DivisionByZero { pos } => write!(f, "division by zero at {pos}"),
            EvalError::OutOfRange { value, min, max, pos } => write!(
                f,
                "value {value} is out of range [{min}, {max}] at {pos}"
            ),
            EvalError::UnsupportedDefault { pos } => {
                write!(f, "defaults for custom (struct) types are unsupported at {pos}")
            }
            EvalError::UnsupportedConstType { pos } => {
                write!(f, "constants must have an integer or float type at {pos}")
            }
        }
    }
}

impl std::error::Error for EvalError {}

/// Constants visible while folding an expression: the enclosing
/// namespace's own constants, falling back to the global namespace.
#[derive(Debug, Default)]
pub struct ConstScope<'a> {
    pub local: &'a HashMap<String, ConstValue>,
    pub global: &'a HashMap<String, ConstValue>,
}

impl<'a> ConstScope<'a> {
    pub fn lookup(&self, name: &str) -> Option<ConstValue> {
        self.local.get(name).or_else(|| self.global.get(name)).copied()
    }
}

pub fn eval_expr(expr: &Expr, scope: &ConstScope) -> Result<ConstValue, EvalError> {
    match expr {
        Expr::Int(v) => Ok(ConstValue::Int(*v)),
        Expr::Float(v) => Ok(ConstValue::Float(*v)),
        Expr::Ident(name, pos) => scope.lookup(name).ok_or_else(|| EvalError::NotConstant {
            name: name.clone(),
            pos: *pos,
        }),
        Expr::Neg(inner) => match eval_expr(inner, scope)? {
            ConstValue::Int(v) => Ok(ConstValue::Int(-v)),
            ConstValue::Float(v) => Ok(ConstValue::Float(-v)),
        },
        Expr::Add(a, b) => binary(a, b, scope, |x, y| x + y, |x, y| x + y, expr_pos(expr)),
        Expr::Sub(a, b) => binary(a, b, scope, |x, y| x - y, |x, y| x - y, expr_pos(expr)),
        Expr::Mul(a, b) => binary(a, b, scope, |x, y| x * y, |x, y| x * y, expr_pos(expr)),
        Expr::Div(a, b) => {
            let lhs = eval_expr(a, scope)?;
            let rhs = eval_expr(b, scope)?;
            match (lhs, rhs) {
                (ConstValue::Int(_), ConstValue::Int(0)) => {
                    Err(EvalError::DivisionByZero { pos: expr_pos(expr) })
                }
                (ConstValue::Int(x), ConstValue::Int(y)) => Ok(ConstValue::Int(x / y)),
                _ => Ok(ConstValue::Float(lhs.as_f64() / rhs.as_f64())),
            }
        }
        Expr::Bool(_) | Expr::Str(_) | Expr::ArrayLit(_) => {
            Err(EvalError::UnsupportedDefault { pos: expr_pos(expr) })
        }
    }
}

fn binary(
    a: &Expr,
    b: &Expr,
    scope: &ConstScope,
    int_op: impl Fn(i64, i64) -> i64,
    float_op: impl Fn(f64, f64) -> f64,
    _pos: Position,
) -> Result<ConstValue, EvalError> {
    let lhs = eval_expr(a, scope)?;
    let rhs = eval_expr(b, scope)?;
    match (lhs, rhs) {
        (ConstValue::Int(x), ConstValue::Int(y)) => Ok(ConstValue::Int(int_op(x, y))),
        _ => Ok(ConstValue::Float(float_op(lhs.as_f64(), rhs.as_f64()))),
    }
}

/// Placeholder position used only when a binary node itself needs one
/// (e.g. division by zero); we attribute it to the left operand's span.
fn expr_pos(expr: &Expr) -> Position {
    match expr {
        Expr::Ident(_, pos) => *pos,
        Expr::Neg(inner) | Expr::Add(inner, _) | Expr::Sub(inner, _) | Expr::Mul(inner, _) | Expr::Div(inner, _) => {
            expr_pos(inner)
        }
        Expr::Int(_) | Expr::Float(_) | Expr::Bool(_) | Expr::Str(_) | Expr::ArrayLit(_) => {
            Position::default()
        }
    }
}

fn int_bounds(ty: PrimType) -> (i128, i128) {
    use num_traits::Bounded;
    use PrimType::*;
    match ty {
        U8 => (u8::min_value() as i128, u8::max_value() as i128),
        U16 => (u16::min_value() as i128, u16::max_value() as i128),
        U32 => (u32::min_value() as i128, u32::max_value() as i128),
        U64 => (u64::min_value() as i128, u64::max_value() as i128),
        S8 => (i8::min_value() as i128, i8::max_value() as i128),
        S16 => (i16::min_value() as i128, i16::max_value() as i128),
        S32 => (i32::min_value() as i128, i32::max_value() as i128),
        S64 => (i64::min_value() as i128, i64::max_value() as i128),
        F32 | F64 | Bool | String | ShortString => (i64::MIN as i128, i64::MAX as i128),
    }
}

/// Range-checks a folded integer constant against a field's declared
/// primitive type.
pub fn range_check(value: i64, ty: PrimType, pos: Position) -> Result<i64, EvalError> {
    let (min, max) = int_bounds(ty);
    let v = value as i128;
    if v < min || v > max {
        return Err(EvalError::OutOfRange { value: v, min, max, pos });
    }
    Ok(value)
}

/// Range-checks a folded array length/upper bound, which is always a
/// non-negative `u32` on the wire regardless of the expression's own type.
pub fn range_check_array_size(value: i64, pos: Position) -> Result<u32, EvalError> {
    let v = value as i128;
    let (min, max) = (0i128, u32::MAX as i128);
    if v < min || v > max {
        return Err(EvalError::OutOfRange { value: v, min, max, pos });
    }
    Ok(value as u32)
}

/// Range-checks an enum constant, which always folds as `i32` regardless
/// of how it's written in source.
pub fn range_check_enum(value: i64, pos: Position) -> Result<i32, EvalError> {
    let v = value as i128;
    let (min, max) = (i32::MIN as i128, i32::MAX as i128);
    if v < min || v > max {
        return Err(EvalError::OutOfRange { value: v, min, max, pos });
    }
    Ok(value as i32)
}
