//! Built-in rules.
//!
//! Every machine understands `END` (alias `HALT`). Machines created with
//! [`Machine::with_base_rules`](crate::machine::Machine::with_base_rules)
//! also get the following, all case-insensitive:
//!
//! | keywords | effect |
//! |---|---|
//! | `PLUS` `+` `ADD` | `a b` → `a + b` |
//! | `MINUS` `-` `SUB` | `a b` → `a - b` |
//! | `MUL` `*` `TIMES` | `a b` → `a * b` |
//! | `DIV` `/` | `a b` → `a / b`, rounded towards negative infinity |
//! | `MOD` `%` | `a b` → remainder of the floor division, sign of `b` |
//! | `MIN`, `MAX` | smaller / larger of `a` and `b` |
//! | `EQ` `=`, `LT` `<`, `GT` `>` | comparison, pushes `1` or `0` |
//! | `NEG`, `ABS`, `INC`, `DEC` | unary arithmetic |
//! | `NOT` | `0` → `1`, anything else → `0` |
//! | `DUP`, `DROP`, `SWAP`, `OVER`, `ROT` | stack shuffling (`a b c ROT` → `b c a`) |
//! | `CLEAR`, `DEPTH` | empty the stack / push its size |
//! | `JUMP` `GOTO` | `target` → continue at `target` |
//! | `JZ` `IFZERO`, `JNZ` | `cond target` → jump if `cond` is (not) zero |
//! | `CALL` | `target` → push the return position and jump |
//! | `RETURN` `RET` | `position` → jump back |
//!
//! A jump target is either a label name (`LOOP` for the label `LOOP:`) or an
//! instruction index.
use num_integer::Integer;

use crate::machine::{Machine, OperationError};
use crate::rules::{Handler, RuleTable};
use crate::value::Value;

pub(crate) fn install_core_rules(rules: &mut RuleTable) {
    rules.add_builtin(&["END", "HALT"], Handler::custom(|m| {
        m.terminate();
        Ok(())
    }));
}

pub(crate) fn install_base_rules(rules: &mut RuleTable) {
    let binary: [(&[&str], fn(i64, i64) -> Result<i64, OperationError>); 10] = [
        (&["PLUS", "+", "ADD"], add),
        (&["MINUS", "-", "SUB"], subtract),
        (&["MUL", "*", "TIMES"], multiply),
        (&["DIV", "/"], divide),
        (&["MOD", "%"], modulo),
        (&["MIN"], |a: i64, b: i64| Ok(a.min(b))),
        (&["MAX"], |a: i64, b: i64| Ok(a.max(b))),
        (&["EQ", "="], |a: i64, b: i64| Ok((a == b) as i64)),
        (&["LT", "<"], |a: i64, b: i64| Ok((a < b) as i64)),
        (&["GT", ">"], |a: i64, b: i64| Ok((a > b) as i64)),
    ];
    for (keywords, f) in binary {
        rules.add_builtin(keywords, Handler::binary(f));
    }

    let unary: [(&[&str], fn(i64) -> Result<i64, OperationError>); 5] = [
        (&["NEG"], |a: i64| a.checked_neg().ok_or(OperationError::IntegerOverflow)),
        (&["ABS"], |a: i64| a.checked_abs().ok_or(OperationError::IntegerOverflow)),
        (&["INC"], |a: i64| a.checked_add(1).ok_or(OperationError::IntegerOverflow)),
        (&["DEC"], |a: i64| a.checked_sub(1).ok_or(OperationError::IntegerOverflow)),
        (&["NOT"], |a: i64| Ok((a == 0) as i64)),
    ];
    for (keywords, f) in unary {
        rules.add_builtin(keywords, Handler::unary(f));
    }

    let custom: [(&[&str], fn(&mut Machine) -> Result<(), OperationError>); 12] = [
        (&["DUP"], dup),
        (&["DROP"], drop_top),
        (&["SWAP"], swap),
        (&["OVER"], over),
        (&["ROT"], rot),
        (&["CLEAR"], |m: &mut Machine| {
            m.stack_mut().clear();
            Ok(())
        }),
        (&["DEPTH"], |m: &mut Machine| {
            let depth = m.stack().len() as i64;
            m.stack_mut().push(depth)
        }),
        (&["JUMP", "GOTO"], jump),
        (&["JZ", "IFZERO"], |m: &mut Machine| jump_if(m, |cond| cond == 0)),
        (&["JNZ"], |m: &mut Machine| jump_if(m, |cond| cond != 0)),
        (&["CALL"], call),
        (&["RETURN", "RET"], ret),
    ];
    for (keywords, f) in custom {
        rules.add_builtin(keywords, Handler::custom(f));
    }
}

fn add(a: i64, b: i64) -> Result<i64, OperationError> {
    a.checked_add(b).ok_or(OperationError::IntegerOverflow)
}

fn subtract(a: i64, b: i64) -> Result<i64, OperationError> {
    a.checked_sub(b).ok_or(OperationError::IntegerOverflow)
}

fn multiply(a: i64, b: i64) -> Result<i64, OperationError> {
    a.checked_mul(b).ok_or(OperationError::IntegerOverflow)
}

fn divide(a: i64, b: i64) -> Result<i64, OperationError> {
    if b == 0 {
        return Err(OperationError::DivisionByZero);
    }
    if a == i64::MIN && b == -1 {
        return Err(OperationError::IntegerOverflow);
    }
    Ok(Integer::div_floor(&a, &b))
}

fn modulo(a: i64, b: i64) -> Result<i64, OperationError> {
    if b == 0 {
        return Err(OperationError::DivisionByZero);
    }
    // i64::MIN % -1 overflows, but every number is divisible by -1
    if b == -1 {
        return Ok(0);
    }
    Ok(Integer::mod_floor(&a, &b))
}

fn dup(m: &mut Machine) -> Result<(), OperationError> {
    let top = m.stack().peek()?.clone();
    m.stack_mut().push(top)
}

fn drop_top(m: &mut Machine) -> Result<(), OperationError> {
    m.stack_mut().pop()?;
    Ok(())
}

fn swap(m: &mut Machine) -> Result<(), OperationError> {
    let stack = m.stack_mut();
    stack.require(2)?;
    let b = stack.pop()?;
    let a = stack.pop()?;
    stack.push(b)?;
    stack.push(a)
}

fn over(m: &mut Machine) -> Result<(), OperationError> {
    let second = m.stack().peek_n(1)?.clone();
    m.stack_mut().push(second)
}

fn rot(m: &mut Machine) -> Result<(), OperationError> {
    let stack = m.stack_mut();
    stack.require(3)?;
    let c = stack.pop()?;
    let b = stack.pop()?;
    let a = stack.pop()?;
    stack.push(b)?;
    stack.push(c)?;
    stack.push(a)
}

fn jump(m: &mut Machine) -> Result<(), OperationError> {
    let target = m.jump_target(m.stack().peek()?)?;
    m.stack_mut().pop()?;
    m.go_to_instruction(target);
    Ok(())
}

fn jump_if(m: &mut Machine, condition: fn(i64) -> bool) -> Result<(), OperationError> {
    m.stack().require(2)?;
    let target = m.jump_target(m.stack().peek_n(0)?)?;
    let cond = m.stack().peek_n(1)?.as_int()?;
    m.stack_mut().pop()?;
    m.stack_mut().pop()?;
    if condition(cond) {
        m.go_to_instruction(target);
    }
    Ok(())
}

fn call(m: &mut Machine) -> Result<(), OperationError> {
    let target = m.jump_target(m.stack().peek()?)?;
    let return_position = m.pc() as i64 + 1;
    m.stack_mut().pop()?;
    m.stack_mut().push(Value::Int(return_position))?;
    m.go_to_instruction(target);
    Ok(())
}

fn ret(m: &mut Machine) -> Result<(), OperationError> {
    let position = m.stack().peek()?.as_int()?;
    let target = m.jump_target(&Value::Int(position))?;
    m.stack_mut().pop()?;
    m.go_to_instruction(target);
    Ok(())
}
