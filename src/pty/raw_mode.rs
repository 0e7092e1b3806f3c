//! Scoped raw mode for the controlling terminal.

use anyhow::{Context, Result};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tracing::{debug, warn};

/// Keeps the controlling terminal in raw mode until dropped.
///
/// Restoration is best effort: a failure is logged and never replaces
/// whatever error ended the session.
#[derive(Debug)]
pub struct RawModeGuard {
    active: bool,
}

impl RawModeGuard {
    /// Enter raw mode when `enabled`, otherwise return an inert guard.
    pub fn acquire(enabled: bool) -> Result<Self> {
        if !enabled {
            return Ok(Self { active: false });
        }

        enable_raw_mode().context("Failed to enable raw mode - are you in a terminal?")?;
        debug!("raw mode enabled");
        Ok(Self { active: true })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Err(e) = disable_raw_mode() {
            warn!("Failed to restore terminal mode: {}", e);
        }
    }
}
