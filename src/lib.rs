//! term-logger library crate.
//!
//! This library provides the core functionality for term-logger, including:
//! - Byte-to-text translation of keystrokes
//! - The capture buffer and its periodic flush to the keystroke log
//! - PTY session management and terminal proxying
//! - Configuration loading and diagnostics setup

pub mod codes;
pub mod config;
pub mod logging;
pub mod pty;
pub mod session;
