#![no_main]

use libfuzzer_sys::fuzz_target;
use arbitrary::Arbitrary;
use brutus_fuzz::{program_text, verify_deterministic, ArbitraryWord};

#[derive(Arbitrary)]
struct FuzzInput {
    program: Vec<ArbitraryWord>,
    a: i64,
}

impl std::fmt::Debug for FuzzInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = program_text(&self.program);
        writeln!(f, "FuzzInput {{")?;
        writeln!(f, "    program: {:?},", text)?;
        writeln!(f, "    a: {:?},", self.a)?;
        write!(f, "}}")?;
        writeln!(f, "Reproduce with:")?;
        writeln!(f, "#[test]")?;
        writeln!(f, "fn fuzz_repro() {{")?;
        writeln!(f, "    verify_deterministic({:?}, {});", text, self.a)?;
        writeln!(f, "}}")?;
        Ok(())
    }
}

fuzz_target!(|data: FuzzInput| {
    if data.program.is_empty() { return } // uninteresting edge case

    verify_deterministic(&program_text(&data.program), data.a);
});
