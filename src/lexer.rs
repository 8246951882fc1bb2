//! Turning program text into a [`Program`].
//!
//! The lexer only splits words and looks at their last character. Whether a
//! word is a keyword, a register reference or a literal depends on the rules
//! and registers of the machine at the time it runs, so that is decided by
//! the machine.
use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::register::normalize;

pub const STORE_SUFFIX: char = '\'';
pub const LABEL_SUFFIX: char = ':';

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("The program is empty.")]
    EmptyProgram,
    #[error("Label `{label}` is defined twice (instructions {first} and {second}).")]
    DuplicateLabel { label: String, first: usize, second: usize },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Suffix {
    None,
    /// `name'` stores the top of the stack into register `name`.
    Store,
    /// `name:` marks a jump target.
    Label,
}

/// One whitespace-separated word of a program.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Token {
    text: String,
    suffix: Suffix,
}

impl Token {
    pub fn new(text: &str) -> Self {
        let suffix = match text.chars().last() {
            Some(STORE_SUFFIX) => Suffix::Store,
            Some(LABEL_SUFFIX) => Suffix::Label,
            _ => Suffix::None,
        };
        Token { text: text.to_string(), suffix }
    }

    /// The token exactly as written.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn suffix(&self) -> Suffix {
        self.suffix
    }

    /// The token without its suffix character.
    pub fn name(&self) -> &str {
        match self.suffix {
            Suffix::None => &self.text,
            Suffix::Store | Suffix::Label => &self.text[..self.text.len() - 1],
        }
    }

    pub fn is_store(&self) -> bool {
        self.suffix == Suffix::Store
    }

    pub fn is_label(&self) -> bool {
        self.suffix == Suffix::Label
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.text)
    }
}

/// An immutable, tokenized program together with the positions of its labels.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Program {
    tokens: Vec<Token>,
    labels: HashMap<String, usize>,
}

impl Program {
    pub fn compile(text: &str) -> Result<Program, ParseError> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(ParseError::EmptyProgram);
        }

        let mut labels = HashMap::new();
        for (index, token) in tokens.iter().enumerate() {
            if !token.is_label() || token.name().is_empty() {
                continue;
            }
            let label = normalize(token.name());
            if let Some(&first) = labels.get(&label) {
                return Err(ParseError::DuplicateLabel { label, first, second: index });
            }
            labels.insert(label, index);
        }

        Ok(Program { tokens, labels })
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn get(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Position of the `name:` token, case-insensitive.
    pub fn label_index(&self, name: &str) -> Option<usize> {
        self.labels.get(&normalize(name)).copied()
    }

    pub fn labels(&self) -> impl Iterator<Item = (&str, usize)> {
        self.labels.iter().map(|(name, &index)| (name.as_str(), index))
    }
}

/// Split program text into tokens. Newlines are ordinary separators.
pub fn tokenize(text: &str) -> Vec<Token> {
    text.split_whitespace().map(Token::new).collect()
}
