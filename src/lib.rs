//! # brutus
//! A simple abstract stack machine.
//!
//! A program is plain text: words separated by whitespace. The machine runs
//! them one by one against a stack and a register of named values:
//!
//! - a word that is a keyword of a rule runs the rule (`PLUS`, `DUP`, `END`, ...),
//! - `name'` pops the top of the stack into the register slot `name`,
//! - a word naming an existing register slot pushes its value,
//! - `name:` is a label, it does nothing but can be jumped to,
//! - anything else is pushed as a literal (integers as numbers, the rest as strings).
//!
//! Register names, labels and keywords are all case-insensitive.
//!
//! ```
//! use brutus::machine::Machine;
//! use brutus::value::Value;
//!
//! let mut machine = Machine::with_base_rules("calc", 1);
//! machine.compile("a 2 * b' end").unwrap();
//! machine.run(&[("a", Value::Int(21))]).unwrap();
//! assert_eq!(machine.register().get("B"), Ok(&Value::Int(42)));
//! ```
//!
//! New instructions are added as rules:
//!
//! ```
//! use brutus::machine::Machine;
//! use brutus::value::Value;
//!
//! let mut machine = Machine::new("squares", "0.1");
//! machine.add_unary_rule(["sq"], |a| Ok(a * a)).unwrap();
//! machine.compile("7 sq").unwrap();
//! machine.run(&[]).unwrap();
//! assert_eq!(machine.stack().items(), &[Value::Int(49)]);
//! ```
pub mod config;
pub mod lexer;
pub mod machine;
pub mod ops;
pub mod register;
pub mod rules;
pub mod stack;
pub mod value;
