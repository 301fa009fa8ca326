use std::fmt::{self, Display};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The declared type of a [`Variable`](crate::Variable).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Int,
    Real,
}

impl Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueType::String => "string",
            ValueType::Int => "int",
            ValueType::Real => "real",
        })
    }
}

/// A runtime argument bound to one of a correction's inputs (C1).
///
/// Kept as an explicit three-variant tagged union rather than a
/// type-erased `Box<dyn Any>` — dispatch is always a `match`.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    String(String),
    Int(i64),
    Real(f64),
}

impl Argument {
    pub fn value_type(&self) -> ValueType {
        match self {
            Argument::String(_) => ValueType::String,
            Argument::Int(_) => ValueType::Int,
            Argument::Real(_) => ValueType::Real,
        }
    }

    /// Coerce to a double, accepting `Int` by widening. Fails for `String`.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Argument::Real(v) => Some(*v),
            Argument::Int(v) => Some(*v as f64),
            Argument::String(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Argument::Int(v) => Some(*v),
            Argument::Real(v) => Some(v.trunc() as i64),
            Argument::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Argument::String(s) => Some(s),
            _ => None,
        }
    }
}

impl Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::String(s) => write!(f, "{s}"),
            Argument::Int(i) => write!(f, "{i}"),
            Argument::Real(r) => write!(f, "{r}"),
        }
    }
}

impl From<String> for Argument {
    fn from(v: String) -> Self {
        Argument::String(v)
    }
}
impl From<&str> for Argument {
    fn from(v: &str) -> Self {
        Argument::String(v.to_string())
    }
}
impl From<i64> for Argument {
    fn from(v: i64) -> Self {
        Argument::Int(v)
    }
}
impl From<f64> for Argument {
    fn from(v: f64) -> Self {
        Argument::Real(v)
    }
}
