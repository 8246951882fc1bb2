//! Values that live on the stack and in the register.
use std::fmt;

use crate::machine::OperationError;

/// A single stack or register value.
///
/// Tokens which look like integers become [`Value::Int`] when they are pushed,
/// everything else stays a [`Value::Str`] until an operation asks for a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Int(i64),
    Str(String),
}

impl Value {
    /// Turn a program token into a value, coercing numeric tokens.
    pub fn from_token(token: &str) -> Self {
        match token.parse::<i64>() {
            Ok(n) => Value::Int(n),
            Err(_) => Value::Str(token.to_string()),
        }
    }

    /// Coerce to an integer, failing with [`OperationError::InvalidOperand`].
    pub fn as_int(&self) -> Result<i64, OperationError> {
        match self {
            Value::Int(n) => Ok(*n),
            Value::Str(s) => s
                .trim()
                .parse()
                .map_err(|_| OperationError::InvalidOperand { value: self.clone() }),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Int(_) => None,
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Value::Int(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}
