//! Configuration for term-logger.
//!
//! Loaded once at startup from `~/.config/term-logger/config.json` (or the
//! path given with `--config`) and validated before anything is spawned.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation failures for an otherwise well-formed config document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("`program` must name an executable")]
    EmptyProgram,

    #[error("`sync` must be a positive number of seconds, got {0}")]
    InvalidSync(i64),
}

/// Main configuration struct
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Executable followed by its arguments
    pub program: Vec<String>,

    /// Path of the keystroke log; empty disables logging
    #[serde(default)]
    pub log: String,

    /// Overrides applied on top of the default byte codes
    #[serde(default)]
    pub escapes: Vec<EscapeEntry>,

    /// Flush interval in seconds
    pub sync: i64,

    #[serde(default)]
    pub flags: Flags,
}

/// Behaviour toggles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flags {
    /// Put the controlling terminal into raw mode for the session
    #[serde(default)]
    pub make_raw: bool,

    /// File receiving diagnostics instead of stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<PathBuf>,
}

/// One element of the `escapes` list.
///
/// Either an ordered block of up to 16 codes, placed at `position * 16`, or
/// a sparse map from decimal byte index to code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EscapeEntry {
    Block(Vec<String>),
    Sparse(BTreeMap<String, String>),
}

impl Config {
    /// Read, parse and validate the config at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_json(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse and validate a config document.
    pub fn from_json(contents: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the session cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.program.is_empty() || self.program[0].is_empty() {
            return Err(ConfigError::EmptyProgram);
        }
        if self.sync <= 0 {
            return Err(ConfigError::InvalidSync(self.sync));
        }
        Ok(())
    }

    /// Interval between log flushes
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync.max(1) as u64)
    }

    /// Log file path, if logging is enabled
    pub fn log_path(&self) -> Option<&Path> {
        if self.log.is_empty() {
            None
        } else {
            Some(Path::new(&self.log))
        }
    }

    /// Get the default path of the config file
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not find home directory")?;

        Ok(home.join(".config").join("term-logger").join("config.json"))
    }
}
