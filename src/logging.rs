//! Diagnostics setup.
//!
//! Diagnostics are separate from the keystroke log: they describe what
//! term-logger itself is doing (resize failures, flush errors, lifecycle).

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the diagnostics filter.
pub const FILTER_ENV: &str = "TERM_LOGGER_LOG";

/// Install the global subscriber.
///
/// Writes to `diagnostics` when given (appending, without colours),
/// otherwise to stderr. The level comes from `TERM_LOGGER_LOG` and defaults
/// to `warn`.
pub fn init(diagnostics: Option<&Path>) -> Result<()> {
    let subscriber = build_subscriber(diagnostics)?;
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install diagnostics subscriber")
}

/// Build the subscriber without installing it.
pub fn build_subscriber(
    diagnostics: Option<&Path>,
) -> Result<impl tracing::Subscriber + Send + Sync> {
    let filter = EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    let (writer, ansi) = match diagnostics {
        Some(path) => (BoxMakeWriter::new(Arc::new(open_diagnostics(path)?)), false),
        None => (BoxMakeWriter::new(io::stderr), true),
    };

    Ok(fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .finish())
}

fn open_diagnostics(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open diagnostics file: {}", path.display()))
}
