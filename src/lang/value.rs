use serde::{Deserialize, Serialize};

/// Tolerance used when a real operand is tested against zero (conditional
/// jumps, division, modulo).
pub const ZERO_EPSILON: f64 = 1e-9;

/// Runtime value on the operand stack.
///
/// Values exist only while an expression is being evaluated; variables hold
/// their own storage inside the scope tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// 64-bit signed integer scalar.
    Int(i64),

    /// 64-bit floating-point scalar.
    Real(f64),

    /// Integer array, passed by value.
    IntArray(Vec<i64>),

    /// Real array, passed by value.
    RealArray(Vec<f64>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Real(_) => "real",
            Value::IntArray(_) => "int array",
            Value::RealArray(_) => "real array",
        }
    }

    /// True for the integer zero and for reals within [`ZERO_EPSILON`] of
    /// zero. Arrays are never zero.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Int(n) => *n == 0,
            Value::Real(x) => x.abs() < ZERO_EPSILON,
            Value::IntArray(_) | Value::RealArray(_) => false,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Real(_))
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Real(x) => write!(f, "{}", x),
            Value::IntArray(items) => {
                write!(f, "{{ ")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, " }}")
            }
            Value::RealArray(items) => {
                write!(f, "{{ ")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, " }}")
            }
        }
    }
}
