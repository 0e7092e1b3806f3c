//! Keystroke pipeline for a logging session.
//!
//! This module provides:
//! - `SessionBuffer` - translated keystrokes waiting to be written
//! - `CaptureReader` - input reader feeding the buffer
//! - `FlushScheduler` - timer thread draining the buffer into the log

pub mod buffer;
pub mod capture;
pub mod flush;

pub use buffer::SessionBuffer;
pub use capture::CaptureReader;
pub use flush::{open_log, FlushOutcome, FlushScheduler, LogSink};
