use std::cell::RefCell;
use std::rc::Rc;

use crate::machine::RunError::InstructionFailed;
use super::*;

fn base() -> Machine {
    Machine::with_base_rules("test", 0)
}

fn run(program: &str) -> Vec<Value> {
    let mut m = base();
    m.compile(program).unwrap();
    m.run(&[]).unwrap();
    m.stack().items().to_vec()
}

fn run_err(program: &str) -> OperationError {
    let mut m = base();
    m.compile(program).unwrap();
    match m.run(&[]) {
        Err(InstructionFailed { error, .. }) => error,
        other => panic!("expected an instruction failure, got {other:?}"),
    }
}

fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().map(|&v| Value::Int(v)).collect()
}

#[derive(Clone, Default)]
struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_literals_only() {
    assert_eq!(run("1 2 3"), ints(&[1, 2, 3]));
    assert_eq!(run("-5\n  10\t0"), ints(&[-5, 10, 0]));
}

#[test]
fn test_literals_keep_register() {
    let mut m = base();
    m.compile("4 5 6").unwrap();
    m.run(&[("x", Value::Int(9))]).unwrap();
    assert_eq!(m.stack().items(), ints(&[4, 5, 6]).as_slice());
    assert_eq!(m.register().len(), 1);
    assert_eq!(m.register().get("x"), Ok(&Value::Int(9)));
}

#[test]
fn test_bare_machine() {
    let mut m = Machine::new("Simpleton", 0);
    m.compile("1 2 plus end").unwrap();
    let summary = m.run(&[]).unwrap();
    assert_eq!(m.stack().items(), &[Value::Int(1), Value::Int(2), Value::from("plus")]);
    assert_eq!(summary.halt, HaltReason::Terminated);
    assert_eq!(m.name(), "Simpleton");
    assert_eq!(m.version(), "0");
}

#[test]
fn test_store() {
    let mut m = Machine::new("Simpleton", 0);
    m.compile("1 a' end").unwrap();
    m.run(&[]).unwrap();
    assert_eq!(m.register().get("A"), Ok(&Value::Int(1)));
    assert!(m.stack().is_empty());

    let mut upper = Machine::new("Simpleton", 0);
    upper.compile("1 A' end").unwrap();
    upper.run(&[]).unwrap();
    assert_eq!(upper.register(), m.register());
}

#[test]
fn test_store_underflow() {
    assert_eq!(run_err("x'"), OperationError::StackUnderflow { required: 1, available: 0 });
}

#[test]
fn test_recall() {
    let mut m = Machine::new("Simpleton", 0);
    m.compile("a end").unwrap();
    m.run(&[("a", Value::Int(1))]).unwrap();
    assert_eq!(m.register().get("A"), Ok(&Value::Int(1)));
    assert_eq!(m.stack().items(), &[Value::Int(1)]);

    m.compile("Y y").unwrap();
    m.run(&[("Y", Value::Int(5))]).unwrap();
    assert_eq!(m.stack().items(), ints(&[5, 5]).as_slice());
}

#[test]
fn test_recall_after_store() {
    assert_eq!(run("3 x' x x *"), ints(&[9]));
}

#[test]
fn test_unknown_register_is_literal() {
    assert_eq!(run("hello"), vec![Value::from("hello")]);
}

#[test]
fn test_addition() {
    assert_eq!(run("1 2 plus end"), ints(&[3]));
    assert_eq!(run("3 4 +"), ints(&[7]));
}

#[test]
fn test_subtraction() {
    assert_eq!(run("3 2 minus end"), ints(&[1]));
    assert_eq!(run("2 3 -"), ints(&[-1]));
}

#[test]
fn test_division() {
    assert_eq!(run("7 2 /"), ints(&[3]));
    assert_eq!(run("-7 2 div"), ints(&[-4]));
    assert_eq!(run("7 3 %"), ints(&[1]));
    assert_eq!(run_err("1 0 /"), OperationError::DivisionByZero);
}

#[test]
fn test_comparisons() {
    assert_eq!(run("1 2 <"), ints(&[1]));
    assert_eq!(run("1 2 >"), ints(&[0]));
    assert_eq!(run("2 2 ="), ints(&[1]));
    assert_eq!(run("3 9 min 3 9 max"), ints(&[3, 9]));
}

#[test]
fn test_unary() {
    assert_eq!(run("5 NEG"), ints(&[-5]));
    assert_eq!(run("-5 abs"), ints(&[5]));
    assert_eq!(run("5 inc 5 dec"), ints(&[6, 4]));
    assert_eq!(run("0 not 7 not"), ints(&[1, 0]));
    assert_eq!(run_err(&format!("{} neg", i64::MIN)), OperationError::IntegerOverflow);
}

#[test]
fn test_dup() {
    assert_eq!(run("3 dup end"), ints(&[3, 3]));
    assert_eq!(run_err("dup"), OperationError::StackUnderflow { required: 1, available: 0 });
}

#[test]
fn test_drop() {
    assert_eq!(run("1 2 drop end"), ints(&[1]));
}

#[test]
fn test_stack_shuffling() {
    assert_eq!(run("1 2 swap"), ints(&[2, 1]));
    assert_eq!(run("1 2 over"), ints(&[1, 2, 1]));
    assert_eq!(run("1 2 3 rot"), ints(&[2, 3, 1]));
    assert_eq!(run("1 2 3 clear"), ints(&[]));
    assert_eq!(run("7 7 depth"), ints(&[7, 7, 2]));
    assert_eq!(run_err("1 2 rot"), OperationError::StackUnderflow { required: 3, available: 2 });
}

#[test]
fn test_label_is_noop() {
    assert_eq!(run("LOOP: 1 2 +"), run("1 2 +"));
}

#[test]
fn test_label_does_not_read_register() {
    let mut m = base();
    m.compile("x: 1").unwrap();
    m.run(&[("x", Value::Int(5))]).unwrap();
    assert_eq!(m.stack().items(), &[Value::Int(1)]);
}

#[test]
fn test_underflow_leaves_register() {
    let mut m = base();
    m.compile("+").unwrap();
    let err = m.run(&[("a", Value::Int(1))]).unwrap_err();
    assert_eq!(
        err,
        InstructionFailed {
            instruction: "+".into(),
            index: 0,
            cycle: 0,
            error: OperationError::StackUnderflow { required: 2, available: 0 },
        }
    );
    assert!(!m.is_running());
    assert_eq!(m.register().len(), 1);
    assert_eq!(m.pc(), 0);
}

#[test]
fn test_invalid_operand() {
    assert_eq!(run_err("1 x +"), OperationError::InvalidOperand { value: Value::from("x") });
}

#[test]
fn test_error_context() {
    let mut m = base();
    m.compile("1 2 + 0 /").unwrap();
    match m.run(&[]) {
        Err(InstructionFailed { instruction, index, cycle, error }) => {
            assert_eq!(instruction, "/");
            assert_eq!(index, 4);
            assert_eq!(cycle, 4);
            assert_eq!(error, OperationError::DivisionByZero);
        }
        other => panic!("unexpected result {other:?}"),
    }
    assert_eq!(m.pc(), 4);
}

#[test]
fn test_unknown_instruction() {
    assert_eq!(run_err("1 '"), OperationError::UnknownInstruction { token: "'".into() });
    assert_eq!(run_err(":"), OperationError::UnknownInstruction { token: ":".into() });
}

#[test]
fn test_rerun_is_deterministic() {
    // Holds because the configuration rewrites every register the program reads.
    let mut m = base();
    m.compile("a 1 + a' a a").unwrap();
    m.run(&[("a", Value::Int(1))]).unwrap();
    let first = (m.stack().clone(), m.register().clone());
    m.run(&[("a", Value::Int(1))]).unwrap();
    assert_eq!((m.stack().clone(), m.register().clone()), first);
    assert_eq!(m.register().get("a"), Ok(&Value::Int(2)));
}

#[test]
fn test_rerun_sees_stored_registers() {
    // `x` is a literal on the first run and a register read on the second.
    let mut m = base();
    m.compile("x 5 x'").unwrap();
    m.run(&[]).unwrap();
    assert_eq!(m.stack().items(), &[Value::from("x")]);
    assert_eq!(m.register().get("x"), Ok(&Value::Int(5)));

    m.run(&[]).unwrap();
    assert_eq!(m.stack().items(), &[Value::Int(5)]);
    assert_eq!(m.register().get("x"), Ok(&Value::Int(5)));

    // After a reset the first run is reproduced.
    m.reset();
    m.run(&[]).unwrap();
    assert_eq!(m.stack().items(), &[Value::from("x")]);
}

#[test]
fn test_register_persists_between_runs() {
    let mut m = base();
    m.compile("5 x'").unwrap();
    m.run(&[]).unwrap();
    m.compile("x 1 +").unwrap();
    m.run(&[]).unwrap();
    assert_eq!(m.stack().items(), &[Value::Int(6)]);

    m.reset();
    assert!(m.register().is_empty());
    assert!(m.stack().is_empty());
}

#[test]
fn test_compile_replaces_program() {
    let mut m = base();
    m.compile("1 2 3").unwrap();
    m.compile("4").unwrap();
    assert_eq!(m.program().len(), 1);
    m.run(&[]).unwrap();
    assert_eq!(m.stack().items(), &[Value::Int(4)]);
}

#[test]
fn test_no_program() {
    let mut m = base();
    assert_eq!(m.run(&[]), Err(RunError::NoProgram));
    assert_eq!(m.resume(), Err(RunError::NoProgram));
}

#[test]
fn test_end_and_resume() {
    let mut m = base();
    m.compile("1 end 2 end 3").unwrap();
    let summary = m.run(&[]).unwrap();
    assert_eq!(summary, RunSummary { cycles: 2, pc: 2, halt: HaltReason::Terminated });
    assert_eq!(m.stack().items(), &[Value::Int(1)]);

    m.resume().unwrap();
    assert_eq!(m.stack().items(), ints(&[1, 2]).as_slice());

    let summary = m.resume().unwrap();
    assert_eq!(summary.halt, HaltReason::EndOfProgram);
    assert_eq!(m.stack().items(), ints(&[1, 2, 3]).as_slice());

    // Nothing left to run.
    let summary = m.resume().unwrap();
    assert_eq!(summary.cycles, 0);
    assert_eq!(m.cycles(), 5);
}

#[test]
fn test_step() {
    let mut m = base();
    m.compile("1 2 +").unwrap();
    m.step().unwrap();
    m.step().unwrap();
    assert_eq!(m.stack().items(), ints(&[1, 2]).as_slice());
    assert_eq!(m.pc(), 2);
    m.step().unwrap();
    assert_eq!(m.stack().items(), &[Value::Int(3)]);
    assert_eq!(m.cycles(), 3);
    // Past the end: nothing is executed, but the step still counts.
    m.step().unwrap();
    assert_eq!(m.cycles(), 4);
    assert_eq!(m.stack().items(), &[Value::Int(3)]);
    assert!(!m.is_running());
}

#[test]
fn test_step_counts_every_call() {
    let mut m = base();
    m.compile("1").unwrap();
    for _ in 0..3 {
        m.step().unwrap();
    }
    assert_eq!(m.cycles(), 3);
    assert_eq!(m.pc(), 1);
    assert_eq!(m.stack().items(), &[Value::Int(1)]);
}

#[test]
fn test_classify() {
    let mut m = base();
    m.register_mut().set("r", 1);
    let classify = |m: &Machine, text: &str| match m.classify(&Token::new(text)) {
        Ok(Instruction::Keyword(_)) => "keyword",
        Ok(Instruction::Store(_)) => "store",
        Ok(Instruction::Recall(_)) => "recall",
        Ok(Instruction::Label(_)) => "label",
        Ok(Instruction::Literal(_)) => "literal",
        Err(_) => "error",
    };
    assert_eq!(classify(&m, "plus"), "keyword");
    assert_eq!(classify(&m, "r'"), "store");
    assert_eq!(classify(&m, "R"), "recall");
    assert_eq!(classify(&m, "r:"), "label");
    assert_eq!(classify(&m, "other"), "literal");
    assert_eq!(classify(&m, "12"), "literal");
    assert_eq!(classify(&m, "'"), "error");

    // Keywords win over registers.
    m.register_mut().set("dup", 1);
    assert_eq!(classify(&m, "dup"), "keyword");
}

#[test]
fn test_jump_loop() {
    // Count down from 5, summing into `total`.
    let program = "
        0 total'
        5 n'
        loop:
            total n + total'
            n 1 - n'
            n loop jnz
        end
    ";
    let mut m = base();
    m.compile(program).unwrap();
    m.run(&[]).unwrap();
    assert_eq!(m.register().get("total"), Ok(&Value::Int(15)));
    assert_eq!(m.register().get("n"), Ok(&Value::Int(0)));
    assert!(m.stack().is_empty());
}

#[test]
fn test_jz() {
    assert_eq!(run("0 skip jz 1 skip: 2"), ints(&[2]));
    assert_eq!(run("1 skip ifzero 1 skip: 2"), ints(&[1, 2]));
}

#[test]
fn test_jump_by_index() {
    assert_eq!(run("3 jump 1 2"), ints(&[2]));
}

#[test]
fn test_missing_label() {
    assert_eq!(run_err("nowhere jump"), OperationError::MissingLabel { label: "nowhere".into() });
    assert_eq!(run_err("-1 jump"), OperationError::InvalidJumpTarget { index: -1 });
}

#[test]
fn test_jump_out_of_range_halts() {
    let mut m = base();
    m.compile("1 100 goto 2").unwrap();
    let summary = m.run(&[]).unwrap();
    assert_eq!(summary.halt, HaltReason::JumpOutOfRange { target: 100 });
    assert_eq!(m.stack().items(), &[Value::Int(1)]);
}

#[test]
fn test_call_return() {
    let program = "
        3 double call r'
        end
        double:
            swap 2 * swap return
    ";
    let mut m = base();
    m.compile(program).unwrap();
    m.run(&[]).unwrap();
    assert_eq!(m.register().get("r"), Ok(&Value::Int(6)));
    assert!(m.stack().is_empty());
}

#[test]
fn test_custom_rule() {
    let mut m = Machine::new("custom", 1);
    m.add_custom_rule(["twice"], |m| {
        let top = m.stack().peek()?.clone();
        m.stack_mut().push(top.clone())?;
        m.stack_mut().push(top)
    })
    .unwrap();
    m.add_binary_rule(["pow"], |a, b| {
        let exp = u32::try_from(b).map_err(|_| OperationError::InvalidOperand { value: Value::Int(b) })?;
        a.checked_pow(exp).ok_or(OperationError::IntegerOverflow)
    })
    .unwrap();
    m.compile("2 10 pow x twice").unwrap();
    m.run(&[]).unwrap();
    assert_eq!(
        m.stack().items(),
        &[Value::Int(1024), Value::from("x"), Value::from("x"), Value::from("x")]
    );
}

#[test]
fn test_rule_added_after_compile() {
    let mut m = Machine::new("late", 1);
    m.compile("3 sq").unwrap();
    m.run(&[]).unwrap();
    assert_eq!(m.stack().items(), &[Value::Int(3), Value::from("sq")]);

    m.add_unary_rule(["sq"], |a| Ok(a * a)).unwrap();
    m.run(&[]).unwrap();
    assert_eq!(m.stack().items(), &[Value::Int(9)]);
    assert!(m.rules().reserved_words().contains("SQ"));
}

#[test]
fn test_builtin_keeps_precedence() {
    let mut m = base();
    m.add_binary_rule(["+"], |a, b| Ok(a * b)).unwrap();
    m.compile("3 4 +").unwrap();
    m.run(&[]).unwrap();
    assert_eq!(m.stack().items(), &[Value::Int(7)]);
}

#[test]
fn test_cycle_limit() {
    let mut m = base();
    m.set_cycle_limit(Some(100));
    m.compile("loop: loop jump").unwrap();
    assert_eq!(m.run(&[]), Err(RunError::CycleLimitExceeded { cycles: 100, pc: 1 }));
    assert!(!m.is_running());
    assert_eq!(m.cycles(), 100);

    m.set_cycle_limit(Some(3));
    m.compile("1 2 3").unwrap();
    assert!(m.run(&[]).is_ok());
}

#[test]
fn test_stack_overflow() {
    let mut m = base();
    m.set_max_stack_size(2);
    m.compile("1 2 3").unwrap();
    match m.run(&[]) {
        Err(InstructionFailed { error, index, .. }) => {
            assert_eq!(error, OperationError::StackOverflow { max_size: 2 });
            assert_eq!(index, 2);
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn test_debug_trace() {
    let buffer = SharedBuffer::default();
    let mut m = base();
    m.set_trace_output(buffer.clone());
    m.set_debug(true);
    m.compile("1 x' x").unwrap();
    m.run(&[]).unwrap();

    let output = String::from_utf8(buffer.0.borrow().clone()).unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("[1]"));
    assert!(lines[1].contains("x'"));
    assert!(lines[1].contains("{X: 1}"));
    assert!(lines[2].contains("[1] {X: 1}"));
}

#[test]
fn test_debug_is_per_machine() {
    let buffer = SharedBuffer::default();
    let mut quiet = base();
    quiet.set_trace_output(buffer.clone());
    quiet.set_debug(false);
    let mut loud = base();
    loud.set_debug(true);
    assert!(!quiet.config().debug);
    assert!(loud.config().debug);

    quiet.compile("1 2 +").unwrap();
    quiet.run(&[]).unwrap();
    assert!(buffer.0.borrow().is_empty());
}

#[test]
fn test_demo_programs() {
    let mut m = base();
    m.compile(include_str!("../../demos/sum.bru")).unwrap();
    m.run(&[("n", Value::Int(100))]).unwrap();
    assert_eq!(m.register().get("total"), Ok(&Value::Int(5050)));

    let mut m = base();
    m.compile(include_str!("../../demos/factorial.bru")).unwrap();
    for (n, expected) in [(1, 1), (5, 120), (20, 2_432_902_008_176_640_000)] {
        m.run(&[("n", Value::Int(n))]).unwrap();
        assert_eq!(m.register().get("result"), Ok(&Value::Int(expected)));
        assert!(m.stack().is_empty());
    }
}
