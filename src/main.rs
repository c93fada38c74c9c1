mod repl;

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser as ClapParser;
use tracing::{Level, debug};

use repl::{format_results, report_error, run_repl};

#[derive(ClapParser, Debug)]
#[command(version, about = "A minimal LISP interpreter", long_about = None)]
struct Cli {
    /// Run the program in this file.
    #[arg(short, long, conflicts_with = "eval")]
    file: Option<PathBuf>,

    /// Run a single source string.
    #[arg(short, long)]
    eval: Option<String>,

    /// Log tokens, parsed forms and results to stderr.
    #[arg(short, long)]
    debug: bool,

    /// History file for the interactive prompt.
    #[arg(long, env = "LISPY_HISTORY", default_value = ".lispy_history")]
    history: PathBuf,

    /// Use vi key bindings in the interactive prompt.
    #[arg(long)]
    vi: bool,
}

fn init_tracing(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Runs `source` once and prints its results. `name` labels error reports.
fn execute(name: &str, source: &str) -> ExitCode {
    match lispy::run(source) {
        Ok(values) => {
            if let Some(output) = format_results(values) {
                println!("{}", output);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            report_error(&err, name, source);
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    debug!(?cli, "starting");

    if let Some(path) = &cli.file {
        return match fs::read_to_string(path) {
            Ok(source) => execute(&path.display().to_string(), &source),
            Err(err) => {
                eprintln!("Error: cannot read '{}': {}", path.display(), err);
                ExitCode::FAILURE
            }
        };
    }

    if let Some(source) = &cli.eval {
        return execute("<eval>", source);
    }

    match run_repl(&cli.history, cli.vi) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}
