use anyhow::Context;
use brutus::machine::Machine;
use brutus::value::Value;
use clap::Parser;
use std::io::Read;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

/// Run a brutus stack machine program and print its registers.
#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// File containing the program, `-` for stdin.
    #[arg()]
    file: String,
    /// Initial register value, e.g. `--set a=5`. May be repeated.
    #[arg(long = "set", short = 'D', value_parser = parse_assignment)]
    registers: Vec<(String, Value)>,
    /// Only print these registers (default: all of them).
    #[arg(long, short = 'p')]
    print: Vec<String>,
    /// Also print the final stack, bottom first.
    #[arg(long)]
    stack: bool,
    /// Only `END` is a keyword; leave out arithmetic, stack and jump rules.
    #[arg(long)]
    bare: bool,
    /// Print the stack and register after every instruction.
    #[arg(long, short = 'd')]
    debug: bool,
    /// Maximum stack size.
    #[arg(long, short = 'm')]
    max_stack_size: Option<usize>,
    /// A limit for the number of executed instructions.
    /// If the limit is reached, the program will be stopped with an error.
    #[arg(long, short = 'l')]
    cycle_limit: Option<u64>,
    /// Print statistics after running the program.
    #[arg(long, short = 's')]
    stats: bool,
}

fn parse_assignment(s: &str) -> Result<(String, Value), String> {
    let (key, value) = s.split_once('=').ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))?;
    if key.is_empty() {
        return Err(format!("missing register name in `{s}`"));
    }
    Ok((key.to_string(), Value::from_token(value)))
}

fn read_program(file: &str) -> anyhow::Result<String> {
    if file == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    std::fs::read_to_string(file).with_context(|| format!("cannot read `{file}`"))
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    let text = read_program(&args.file)?;
    let mut machine = if args.bare {
        Machine::new(&args.file, env!("CARGO_PKG_VERSION"))
    } else {
        Machine::with_base_rules(&args.file, env!("CARGO_PKG_VERSION"))
    };
    if args.debug {
        machine.set_debug(true);
    }
    if let Some(max_stack_size) = args.max_stack_size {
        machine.set_max_stack_size(max_stack_size);
    }
    if args.cycle_limit.is_some() {
        machine.set_cycle_limit(args.cycle_limit);
    }
    machine.compile(&text)?;

    let configuration: Vec<(&str, Value)> =
        args.registers.iter().map(|(key, value)| (key.as_str(), value.clone())).collect();

    let start_time = std::time::Instant::now();
    let summary = machine.run(&configuration)?;
    let elapsed = start_time.elapsed();

    if args.stats {
        print_stats(summary.cycles, elapsed);
    }

    if args.print.is_empty() {
        for (key, value) in machine.register().iter() {
            println!("{key} = {value}");
        }
    } else {
        for key in &args.print {
            println!("{} = {}", key.to_uppercase(), machine.register().get(key)?);
        }
    }

    if args.stack {
        for value in machine.stack().items() {
            println!("{value}");
        }
    }

    Ok(())
}

fn print_stats(cycles: u64, elapsed: Duration) {
    let instructions_per_second = cycles as f64 / elapsed.as_secs_f64();
    eprintln!("Execution time: {:?}", elapsed);
    eprintln!(
        "Instructions executed: {} ({}/s)",
        cycles,
        match instructions_per_second {
            n if n >= 1_000_000.0 => format!("{:.1}M", n / 1_000_000.0),
            n if n >= 1_000.0 => format!("{:.1}k", n / 1_000.0),
            n => format!("{:.1}", n),
        }
    );
}
