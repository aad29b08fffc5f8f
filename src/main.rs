use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use slisp::{Config, LispError, Machine};

/// Substitution-based Lisp interpreter.
#[derive(Parser, Debug)]
#[command(name = "slisp", version, about)]
struct Cli {
    /// Program to run
    #[arg(default_value = "lisp")]
    source: PathBuf,

    /// File whose bytes are bound to `input` before the program runs
    #[arg(long, env = "SLISP_INPUT")]
    input: Option<PathBuf>,

    /// Print every live slot and symbol after initialization
    #[arg(long)]
    dump: bool,

    /// Log collector activity and evaluation steps
    #[arg(short, long)]
    verbose: bool,

    /// Number of value slots in the arena
    #[arg(long, env = "SLISP_ARENA", default_value_t = Config::default().arena_capacity)]
    arena: usize,

    /// Maximum number of interned symbols
    #[arg(long, env = "SLISP_SYMBOLS", default_value_t = Config::default().max_symbols)]
    symbols: usize,

    /// Arena usage (percent) after which collection reports out-of-memory
    #[arg(long, env = "SLISP_MAX_USAGE", default_value_t = Config::default().max_usage_percent)]
    max_usage: u8,

    /// Deepest permitted evaluation nesting
    #[arg(long, env = "SLISP_MAX_DEPTH", default_value_t = Config::default().max_eval_depth)]
    max_depth: usize,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            arena_capacity: self.arena,
            max_symbols: self.symbols,
            max_usage_percent: self.max_usage,
            max_eval_depth: self.max_depth,
            trace: self.verbose,
            ..Config::default()
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn,slisp::eval=debug" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<LispError>() {
                Some(lisp) if lisp.is_internal() => {
                    error!("internal runtime error: {:#}", err);
                    ExitCode::from(2)
                }
                _ => {
                    error!("{:#}", err);
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    // The program is read in full before the runtime starts.
    let source = std::fs::read_to_string(&cli.source)
        .with_context(|| format!("reading {}", cli.source.display()))?;

    let mut machine = Machine::new(cli.config())?;
    if let Some(path) = &cli.input {
        machine.bind_input_file(path)?;
    }
    if cli.dump {
        print!("{}", machine.dump());
    }

    machine.run(&source, |m, value| println!("{}", m.print(value)))?;
    Ok(())
}
