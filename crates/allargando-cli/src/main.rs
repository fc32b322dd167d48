//! allargando command-line tool.

use std::process::ExitCode;

use allargando_cli::{parse_args, run, CliArgs, Command, USAGE};
use tracing::Level;

fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(Command::Run(args)) => args,
        Ok(Command::Help) => {
            eprint!("{USAGE}");
            return ExitCode::from(2);
        }
        Err(e) => {
            eprintln!("ERROR: {e}\n");
            eprint!("{USAGE}");
            return ExitCode::from(e.exit_code());
        }
    };

    init_tracing(&args);

    if !args.quiet {
        eprintln!(
            "Using crispness level: {} ({})",
            args.crispness.level(),
            args.crispness.description()
        );
    }

    match run(&args) {
        Ok(summary) => {
            if !args.quiet {
                eprintln!("{summary}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("ERROR: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(args: &CliArgs) {
    let level = match (args.quiet, args.debug) {
        (true, _) => Level::WARN,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();
}
