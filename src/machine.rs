//! The machine: stack, register, rules and the dispatch loop.
use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::config::{get_config, MachineConfig};
use crate::lexer::{ParseError, Program, Suffix, Token};
use crate::ops;
use crate::register::Register;
use crate::rules::{Handler, RuleError, RuleTable};
use crate::stack::Stack;
use crate::value::Value;

#[cfg(test)]
mod tests;

/// An error that can occur while executing a single instruction.
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationError {
    #[error("Not enough elements on the stack: {available} elements, {required} required")]
    StackUnderflow { required: usize, available: usize },
    #[error("Adding to a full stack (maximum size {max_size})")]
    StackOverflow { max_size: usize },
    #[error("Value {value} is not an integer")]
    InvalidOperand { value: Value },
    #[error("Register `{key}` does not exist")]
    KeyNotFound { key: String },
    #[error("`{token}` is not a valid instruction")]
    UnknownInstruction { token: String },
    #[error("Label `{label}` does not exist")]
    MissingLabel { label: String },
    #[error("Invalid instruction index: {index}")]
    InvalidJumpTarget { index: i64 },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Integer overflow")]
    IntegerOverflow,
}

/// An error that stopped a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("No program has been compiled.")]
    NoProgram,
    /// A specific instruction failed.
    #[error("Instruction {index} (`{instruction}`) failed (cycle {cycle}): {error}")]
    InstructionFailed {
        /// The token which failed.
        instruction: String,
        /// The 0-based position of the token in the program.
        index: usize,
        /// Value of the cycle counter when the instruction started.
        cycle: u64,
        error: OperationError,
    },
    /// The run executed more instructions than the configured cycle limit.
    #[error("The program ran for too long ({cycles} instructions had been run, stopped at instruction {pc}).")]
    CycleLimitExceeded { cycles: u64, pc: usize },
    #[error("Failed to write the debug trace after instruction {index} (cycle {cycle}): {message}")]
    TraceFailed { index: usize, cycle: u64, message: String },
}

/// Why a run stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// The instruction pointer moved past the last instruction.
    EndOfProgram,
    /// An instruction called [`Machine::terminate`].
    Terminated,
    /// A jump moved the instruction pointer beyond the end of the program.
    JumpOutOfRange { target: usize },
}

/// The outcome of a successful [`Machine::run`] or [`Machine::resume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Instructions executed during this run.
    pub cycles: u64,
    /// The instruction pointer at the end of the run.
    pub pc: usize,
    pub halt: HaltReason,
}

/// How the machine will treat a token. See [`Machine::classify`].
#[derive(Debug, Clone)]
pub enum Instruction<'t> {
    /// The token is a keyword of a rule.
    Keyword(Handler),
    /// `name'`: pop into the register.
    Store(&'t str),
    /// A register name: push its value.
    Recall(&'t str),
    /// `name:`: does nothing.
    Label(&'t str),
    /// Anything else is pushed as is.
    Literal(&'t str),
}

pub struct Machine {
    name: String,
    version: String,
    stack: Stack,
    register: Register,
    rules: RuleTable,
    program: Rc<Program>,
    pc: usize,
    running: bool,
    jumped: bool,
    cycles: u64,
    config: MachineConfig,
    trace_output: Box<dyn Write>,
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("stack", &self.stack)
            .field("register", &self.register)
            .field("rules", &self.rules.reserved_words())
            .field("program_len", &self.program.len())
            .field("pc", &self.pc)
            .field("running", &self.running)
            .field("cycles", &self.cycles)
            .field("config", &self.config)
            .finish()
    }
}

impl Machine {
    /// A machine that only knows `END`. Every other word is a literal,
    /// a register reference, a store or a label.
    pub fn new(name: impl Into<String>, version: impl ToString) -> Self {
        let config = get_config().clone();
        let mut machine = Machine {
            name: name.into(),
            version: version.to_string(),
            stack: Stack::with_max_size(config.max_stack_size),
            register: Register::new(),
            rules: RuleTable::new(),
            program: Rc::new(Program::default()),
            pc: 0,
            running: false,
            jumped: false,
            cycles: 0,
            config,
            trace_output: Box::new(io::stdout()),
        };
        ops::install_core_rules(&mut machine.rules);
        machine
    }

    /// A machine with arithmetic, stack and control flow rules.
    /// See [`ops`](crate::ops) for the full list.
    pub fn with_base_rules(name: impl Into<String>, version: impl ToString) -> Self {
        let mut machine = Self::new(name, version);
        ops::install_base_rules(&mut machine.rules);
        machine
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut Stack {
        &mut self.stack
    }

    pub fn register(&self) -> &Register {
        &self.register
    }

    pub fn register_mut(&mut self) -> &mut Register {
        &mut self.register
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Index of the instruction being executed, or the next one between steps.
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Total number of executed steps over the lifetime of the machine.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.config.debug = debug;
    }

    /// Redirect the debug trace, which goes to stdout by default.
    pub fn set_trace_output(&mut self, output: impl Write + 'static) {
        self.trace_output = Box::new(output);
    }

    pub fn set_cycle_limit(&mut self, limit: Option<u64>) {
        self.config.cycle_limit = limit;
    }

    pub fn set_max_stack_size(&mut self, max_size: usize) {
        self.config.max_stack_size = max_size;
        self.stack.set_max_size(max_size);
    }

    pub fn add_rule<I, S>(&mut self, keywords: I, handler: Handler) -> Result<(), RuleError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.rules.add_rule(keywords, handler)
    }

    pub fn add_unary_rule<I, S>(
        &mut self,
        keywords: I,
        operation: impl Fn(i64) -> Result<i64, OperationError> + 'static,
    ) -> Result<(), RuleError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.rules.add_rule(keywords, Handler::unary(operation))
    }

    pub fn add_binary_rule<I, S>(
        &mut self,
        keywords: I,
        operation: impl Fn(i64, i64) -> Result<i64, OperationError> + 'static,
    ) -> Result<(), RuleError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.rules.add_rule(keywords, Handler::binary(operation))
    }

    pub fn add_custom_rule<I, S>(
        &mut self,
        keywords: I,
        operation: impl Fn(&mut Machine) -> Result<(), OperationError> + 'static,
    ) -> Result<(), RuleError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.rules.add_rule(keywords, Handler::custom(operation))
    }

    /// Tokenize `text` and make it the current program, replacing any
    /// previous one.
    pub fn compile(&mut self, text: &str) -> Result<(), ParseError> {
        let program = Program::compile(text)?;
        self.load(program);
        Ok(())
    }

    pub fn load(&mut self, program: Program) {
        debug!(machine = %self.name, tokens = program.len(), labels = program.labels().count(), "program loaded");
        self.program = Rc::new(program);
        self.pc = 0;
        self.running = false;
    }

    /// Run the program from the start.
    ///
    /// `configuration` is written into the register first. The stack is
    /// cleared; the register keeps whatever previous runs stored.
    pub fn run(&mut self, configuration: &[(&str, Value)]) -> Result<RunSummary, RunError> {
        if self.program.is_empty() {
            return Err(RunError::NoProgram);
        }
        for (key, value) in configuration {
            self.register.set(key, value.clone());
        }
        self.stack.clear();
        self.pc = 0;
        self.running = true;
        debug!(machine = %self.name, version = %self.version, "run started");
        self.run_loop()
    }

    /// Continue from the current instruction pointer, keeping the stack.
    /// Useful after `END` or after stepping manually.
    pub fn resume(&mut self) -> Result<RunSummary, RunError> {
        if self.program.is_empty() {
            return Err(RunError::NoProgram);
        }
        self.running = true;
        debug!(machine = %self.name, pc = self.pc, "run resumed");
        self.run_loop()
    }

    fn run_loop(&mut self) -> Result<RunSummary, RunError> {
        let start_cycles = self.cycles;
        let halt = loop {
            if !self.running {
                break HaltReason::Terminated;
            }
            if self.pc == self.program.len() {
                break HaltReason::EndOfProgram;
            }
            if self.pc > self.program.len() {
                warn!(machine = %self.name, target = self.pc, len = self.program.len(), "jump beyond the end of the program, halting");
                break HaltReason::JumpOutOfRange { target: self.pc };
            }
            if let Some(limit) = self.config.cycle_limit {
                if self.cycles - start_cycles >= limit {
                    self.running = false;
                    return Err(RunError::CycleLimitExceeded { cycles: self.cycles - start_cycles, pc: self.pc });
                }
            }
            if let Err(err) = self.step() {
                self.running = false;
                debug!(machine = %self.name, error = %err, "run failed");
                return Err(err);
            }
        };
        self.running = false;

        let summary = RunSummary { cycles: self.cycles - start_cycles, pc: self.pc, halt };
        debug!(machine = %self.name, cycles = summary.cycles, halt = ?summary.halt, "run finished");
        Ok(summary)
    }

    /// Decide what `token` means right now. The order matters: keywords win
    /// over stores, stores over register reads, register reads over labels,
    /// and everything left is a literal.
    pub fn classify<'t>(&self, token: &'t Token) -> Result<Instruction<'t>, OperationError> {
        if let Some(rule) = self.rules.find_rule(token.text()) {
            return Ok(Instruction::Keyword(rule.handler().clone()));
        }
        if token.name().is_empty() {
            return Err(OperationError::UnknownInstruction { token: token.text().to_string() });
        }
        Ok(match token.suffix() {
            Suffix::Store => Instruction::Store(token.name()),
            Suffix::None if self.register.contains(token.name()) => Instruction::Recall(token.name()),
            Suffix::Label => Instruction::Label(token.name()),
            Suffix::None => Instruction::Literal(token.text()),
        })
    }

    fn execute(&mut self, instruction: Instruction) -> Result<(), OperationError> {
        match instruction {
            Instruction::Keyword(handler) => handler.apply(self),
            Instruction::Store(name) => {
                let value = self.stack.pop()?;
                self.register.set(name, value);
                Ok(())
            }
            Instruction::Recall(name) => {
                let value = self.register.get(name)?.clone();
                self.stack.push(value)
            }
            Instruction::Label(_) => Ok(()),
            Instruction::Literal(text) => self.stack.push(Value::from_token(text)),
        }
    }

    /// Execute the instruction at the instruction pointer.
    ///
    /// Every call counts as one cycle. Stepping past the end of the program
    /// stops the machine and is not an error. If the instruction fails, the
    /// instruction pointer stays on it.
    pub fn step(&mut self) -> Result<(), RunError> {
        let index = self.pc;
        let cycle = self.cycles;
        self.cycles += 1;

        let program = Rc::clone(&self.program);
        let Some(token) = program.get(index) else {
            self.running = false;
            return Ok(());
        };
        self.jumped = false;

        let result = self.classify(token).and_then(|instruction| self.execute(instruction));
        if let Err(error) = result {
            return Err(RunError::InstructionFailed {
                instruction: token.text().to_string(),
                index,
                cycle,
                error,
            });
        }
        if !self.jumped {
            self.pc += 1;
        }
        trace!(pc = index, token = %token, "step");

        if self.config.debug {
            writeln!(self.trace_output, "{:>5} {:<16} {} {}", index, token, self.stack, self.register)
                .map_err(|e| RunError::TraceFailed { index, cycle, message: e.to_string() })?;
        }
        Ok(())
    }

    /// Stop the current run after the instruction being executed.
    pub fn terminate(&mut self) {
        self.running = false;
    }

    /// Continue at `index` instead of the next instruction. Targets past the
    /// end of the program halt the run.
    pub fn go_to_instruction(&mut self, index: usize) {
        self.pc = index;
        self.jumped = true;
    }

    pub fn jump_to_label(&mut self, label: &str) -> Result<(), OperationError> {
        let index = self.label_index(label)?;
        self.go_to_instruction(index);
        Ok(())
    }

    pub fn label_index(&self, label: &str) -> Result<usize, OperationError> {
        self.program
            .label_index(label)
            .ok_or_else(|| OperationError::MissingLabel { label: label.to_string() })
    }

    /// Resolve a stack value used as a jump target: integers are instruction
    /// indices, strings are label names.
    pub fn jump_target(&self, value: &Value) -> Result<usize, OperationError> {
        match value {
            Value::Int(index) => usize::try_from(*index)
                .map_err(|_| OperationError::InvalidJumpTarget { index: *index }),
            Value::Str(label) => self.label_index(label),
        }
    }

    /// Clear the stack and the register and rewind to the first instruction.
    /// The cycle counter is kept.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.register.clear();
        self.pc = 0;
        self.running = false;
    }
}
