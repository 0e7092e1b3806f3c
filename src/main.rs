//! term-logger: run a program inside a pty and log every keystroke sent to it.
//!
//! Usage:
//!   term-logger                  # Use ~/.config/term-logger/config.json
//!   term-logger --config <path>  # Use another config file

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::info;

use term_logger::codes::ByteCodeTable;
use term_logger::config::Config;
use term_logger::logging;
use term_logger::pty::PtySession;
use term_logger::session::{open_log, LogSink};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("term-logger: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let config_path = match parse_args(std::env::args().skip(1))? {
        Some(path) => path,
        None => return Ok(()),
    };

    let config = Config::load(&config_path)?;
    logging::init(config.flags.diagnostics.as_deref())?;
    info!("loaded config from {}", config_path.display());

    let table = ByteCodeTable::from_escapes(&config.escapes)
        .context("Invalid escapes in config")?;

    let sink = match config.log_path() {
        Some(path) => Some(Box::new(open_log(path)?) as Box<dyn LogSink>),
        None => None,
    };

    let session = PtySession::new(&config, table, sink)?;
    session.run()?;

    Ok(())
}

/// Returns the config path to use, or `None` when only help was requested.
fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Option<PathBuf>> {
    let mut config_path = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().context("--config needs a path")?;
                config_path = Some(PathBuf::from(path));
            }
            "--help" | "-h" => {
                println!("term-logger: run a program in a pty and log its keystrokes");
                println!();
                println!("Usage:");
                println!("  term-logger                  Use ~/.config/term-logger/config.json");
                println!("  term-logger --config <path>  Use another config file");
                println!();
                println!("Diagnostics level is read from ${}.", logging::FILTER_ENV);
                return Ok(None);
            }
            other => anyhow::bail!("Unknown argument: {}", other),
        }
    }

    match config_path {
        Some(path) => Ok(Some(path)),
        None => Config::default_path().map(Some),
    }
}
