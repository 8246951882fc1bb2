//! The rule table: which keywords trigger which stack operations.
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;
use tracing::warn;

use crate::lexer::{LABEL_SUFFIX, STORE_SUFFIX};
use crate::machine::{Machine, OperationError};
use crate::register::normalize;
use crate::stack::Stack;
use crate::value::Value;

pub type UnaryFn = dyn Fn(i64) -> Result<i64, OperationError>;
pub type BinaryFn = dyn Fn(i64, i64) -> Result<i64, OperationError>;
pub type CustomFn = dyn Fn(&mut Machine) -> Result<(), OperationError>;

/// What a rule does once one of its keywords is executed.
#[derive(Clone)]
pub enum Handler {
    /// Pops one integer, pushes one integer.
    Unary(Rc<UnaryFn>),
    /// Pops two integers (`left right`), pushes one integer.
    Binary(Rc<BinaryFn>),
    /// Full access to the machine, including jumps and termination.
    Custom(Rc<CustomFn>),
}

impl Handler {
    pub fn unary(f: impl Fn(i64) -> Result<i64, OperationError> + 'static) -> Self {
        Handler::Unary(Rc::new(f))
    }

    pub fn binary(f: impl Fn(i64, i64) -> Result<i64, OperationError> + 'static) -> Self {
        Handler::Binary(Rc::new(f))
    }

    pub fn custom(f: impl Fn(&mut Machine) -> Result<(), OperationError> + 'static) -> Self {
        Handler::Custom(Rc::new(f))
    }

    pub fn apply(&self, machine: &mut Machine) -> Result<(), OperationError> {
        match self {
            Handler::Unary(f) => apply_unary(machine.stack_mut(), f.as_ref()),
            Handler::Binary(f) => apply_binary(machine.stack_mut(), f.as_ref()),
            Handler::Custom(f) => {
                let f: &CustomFn = f.as_ref();
                f(machine)
            }
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Unary(_) => f.write_str("Unary"),
            Handler::Binary(_) => f.write_str("Binary"),
            Handler::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Pop one operand, apply `f` and push the result.
///
/// The operand is coerced before it is popped, so a failing operation leaves
/// the stack as it was.
pub fn apply_unary(stack: &mut Stack, f: &UnaryFn) -> Result<(), OperationError> {
    let a = stack.peek()?.as_int()?;
    let result = f(a)?;
    stack.pop()?;
    stack.push(Value::Int(result))
}

/// Pop two operands, apply `f` and push the result.
///
/// The value pushed earlier is the left operand: `7 2 -` computes `7 - 2`.
pub fn apply_binary(stack: &mut Stack, f: &BinaryFn) -> Result<(), OperationError> {
    stack.require(2)?;
    let right = stack.peek_n(0)?.as_int()?;
    let left = stack.peek_n(1)?.as_int()?;
    let result = f(left, right)?;
    stack.pop()?;
    stack.pop()?;
    stack.push(Value::Int(result))
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("A rule needs at least one keyword.")]
    NoKeywords,
    #[error("Keywords must not be empty.")]
    EmptyKeyword,
    #[error("Keyword `{keyword}` contains whitespace.")]
    KeywordContainsSpace { keyword: String },
    #[error("Keyword `{keyword}` ends with a store or label suffix.")]
    KeywordHasSuffix { keyword: String },
}

#[derive(Clone, Debug)]
pub struct Rule {
    keywords: Vec<String>,
    handler: Handler,
}

impl Rule {
    /// The keywords of this rule, uppercase, in registration order.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    fn matches(&self, keyword: &str) -> bool {
        self.keywords.iter().any(|k| k == keyword)
    }
}

/// Ordered list of rules. Lookups are case-insensitive and the first
/// registered rule owning a keyword wins.
#[derive(Clone, Debug, Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
    reserved: BTreeSet<String>,
}

fn validate_keyword(keyword: &str) -> Result<String, RuleError> {
    if keyword.is_empty() {
        return Err(RuleError::EmptyKeyword);
    }
    if keyword.chars().any(char::is_whitespace) {
        return Err(RuleError::KeywordContainsSpace { keyword: keyword.to_string() });
    }
    if keyword.ends_with(STORE_SUFFIX) || keyword.ends_with(LABEL_SUFFIX) {
        return Err(RuleError::KeywordHasSuffix { keyword: keyword.to_string() });
    }
    Ok(normalize(keyword))
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule<I, S>(&mut self, keywords: I, handler: Handler) -> Result<(), RuleError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for keyword in keywords {
            let keyword = validate_keyword(keyword.as_ref())?;
            if !normalized.contains(&keyword) {
                normalized.push(keyword);
            }
        }
        if normalized.is_empty() {
            return Err(RuleError::NoKeywords);
        }

        for keyword in &normalized {
            if self.reserved.contains(keyword) {
                warn!(keyword = %keyword, "keyword is already reserved, the earlier rule keeps precedence");
            }
        }

        self.rules.push(Rule { keywords: normalized, handler });
        self.refresh_reserved();
        Ok(())
    }

    /// Register a rule whose keywords are known to be valid.
    pub(crate) fn add_builtin(&mut self, keywords: &[&str], handler: Handler) {
        let keywords = keywords.iter().map(|k| normalize(k)).collect();
        self.rules.push(Rule { keywords, handler });
        self.refresh_reserved();
    }

    fn refresh_reserved(&mut self) {
        self.reserved = self.rules.iter().flat_map(|r| r.keywords.iter().cloned()).collect();
    }

    pub fn find_rule(&self, token: &str) -> Option<&Rule> {
        let keyword = normalize(token);
        if !self.reserved.contains(&keyword) {
            return None;
        }
        self.rules.iter().find(|rule| rule.matches(&keyword))
    }

    pub fn is_reserved(&self, token: &str) -> bool {
        self.reserved.contains(&normalize(token))
    }

    /// All keywords of all rules.
    pub fn reserved_words(&self) -> &BTreeSet<String> {
        &self.reserved
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
