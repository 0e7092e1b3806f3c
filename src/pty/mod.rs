//! Pseudo-terminal proxy.
//!
//! Spawns the configured program inside a pty and relays bytes between it
//! and the controlling terminal.

pub mod raw_mode;
pub mod resize;
pub mod session;

pub use raw_mode::RawModeGuard;
pub use resize::{ControllingTerminal, ResizeHandle, ResizePropagator, ResizeTarget, SizeSource};
pub use session::{PtySession, PtySessionError, SessionEnd};
