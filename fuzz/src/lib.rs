use arbitrary::Arbitrary;
use brutus::machine::{Machine, RunError, RunSummary};
use brutus::value::Value;

pub const ALLOWED_WORDS: &[&str] = &[
    "+", "-", "*", "/", "%",
    "min", "max", "eq", "lt", "gt",
    "neg", "abs", "inc", "dec", "not",
    "dup", "drop", "swap", "over", "rot", "clear", "depth",
    "jump", "jz", "jnz", "call", "return", "end",
    "a", "a'", "b", "b'",
    "l0", "l1", "l0:", "l1:",
    "'", ":",
];

const SPECIAL_NUMBERS: &[i64] = &[0, 1, -1, 2, i64::MIN, i64::MAX, 1000];

/// A single program word: either one of [`ALLOWED_WORDS`] or a number literal.
#[derive(Clone, PartialEq, Eq)]
pub struct ArbitraryWord(pub String);

impl<'a> Arbitrary<'a> for ArbitraryWord {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let word = match u.int_in_range(0..=3)? {
            0 => SPECIAL_NUMBERS[u.choose_index(SPECIAL_NUMBERS.len())?].to_string(),
            1 => u.int_in_range(-20i64..=20)?.to_string(),
            _ => ALLOWED_WORDS[u.choose_index(ALLOWED_WORDS.len())?].to_string(),
        };
        Ok(ArbitraryWord(word))
    }
}

impl std::fmt::Debug for ArbitraryWord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn program_text(words: &[ArbitraryWord]) -> String {
    words.iter().map(|w| w.0.as_str()).collect::<Vec<_>>().join(" ")
}

fn bounded_machine() -> Machine {
    let mut machine = Machine::with_base_rules("fuzz", 0);
    machine.set_cycle_limit(Some(10_000));
    machine.set_max_stack_size(1_000);
    machine
}

/// Run `text` on a fresh base machine with small limits.
/// Returns `None` if the text does not compile (e.g. a duplicate label).
pub fn run_bounded(text: &str, a: i64) -> Option<Result<RunSummary, RunError>> {
    let mut machine = bounded_machine();
    machine.compile(text).ok()?;
    Some(machine.run(&[("a", Value::Int(a))]))
}

/// Running the same program twice on one machine, with the register reset
/// in between, must give the same result and the same final state.
pub fn verify_deterministic(text: &str, a: i64) {
    let mut machine = bounded_machine();
    if machine.compile(text).is_err() {
        return;
    }
    let configuration = [("a", Value::Int(a))];

    let first = machine.run(&configuration);
    let first_state = (machine.stack().clone(), machine.register().clone());
    machine.reset();
    let second = machine.run(&configuration);
    let second_state = (machine.stack().clone(), machine.register().clone());

    assert_eq!(first, second, "program `{text}` is not deterministic");
    assert_eq!(first_state, second_state, "program `{text}` left a different state");
}
