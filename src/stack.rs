//! The data stack.
use std::fmt;

use crate::machine::OperationError;
use crate::value::Value;

/// A LIFO stack of [`Value`]s with an optional capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stack {
    items: Vec<Value>,
    max_size: usize,
}

impl Default for Stack {
    fn default() -> Self {
        Self { items: Vec::new(), max_size: usize::MAX }
    }
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self { items: Vec::new(), max_size }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
    }

    pub fn push(&mut self, value: impl Into<Value>) -> Result<(), OperationError> {
        if self.items.len() >= self.max_size {
            return Err(OperationError::StackOverflow { max_size: self.max_size });
        }
        self.items.push(value.into());
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Value, OperationError> {
        self.items.pop().ok_or(OperationError::StackUnderflow { required: 1, available: 0 })
    }

    /// Fail unless at least `n` values are present. Lets operations check
    /// their operands before they start popping.
    pub fn require(&self, n: usize) -> Result<(), OperationError> {
        if self.items.len() < n {
            return Err(OperationError::StackUnderflow { required: n, available: self.items.len() });
        }
        Ok(())
    }

    pub fn peek(&self) -> Result<&Value, OperationError> {
        self.peek_n(0)
    }

    /// Look at the value `n` positions below the top (0 is the top).
    pub fn peek_n(&self, n: usize) -> Result<&Value, OperationError> {
        self.require(n + 1)?;
        Ok(&self.items[self.items.len() - 1 - n])
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, value) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, "]")
    }
}
