//! The case-insensitive register bank.
use std::collections::BTreeMap;
use std::fmt;

use crate::machine::OperationError;
use crate::value::Value;

/// Key/value storage where every key is normalized to uppercase.
///
/// `a` and `A` written through any method refer to the same slot.
/// Iteration is sorted by key, which keeps debug traces stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Register {
    values: BTreeMap<String, Value>,
}

pub(crate) fn normalize(key: &str) -> String {
    key.to_uppercase()
}

impl Register {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(normalize(key), value.into());
    }

    pub fn get(&self, key: &str) -> Result<&Value, OperationError> {
        let key = normalize(key);
        self.values.get(&key).ok_or(OperationError::KeyNotFound { key })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(&normalize(key))
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(&normalize(key))
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        write!(f, "}}")
    }
}
