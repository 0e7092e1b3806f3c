//! Window-size propagation from the controlling terminal to the pty.

use std::io;
use std::thread;

use anyhow::{Context, Result};
use portable_pty::PtySize;
use signal_hook::consts::SIGWINCH;
use signal_hook::iterator::{Handle, Signals};
use tracing::{debug, warn};

/// Something that knows the current terminal dimensions.
pub trait SizeSource: Send + 'static {
    fn size(&self) -> io::Result<PtySize>;
}

/// Something whose dimensions can be set, normally the pty master.
pub trait ResizeTarget: Send + 'static {
    fn resize(&self, size: PtySize) -> Result<()>;
}

/// The terminal this process is attached to.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControllingTerminal;

impl SizeSource for ControllingTerminal {
    fn size(&self) -> io::Result<PtySize> {
        let (cols, rows) = crossterm::terminal::size()?;
        Ok(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        })
    }
}

/// Copies the size of a [`SizeSource`] onto a [`ResizeTarget`] on every
/// SIGWINCH.
pub struct ResizePropagator<S, T> {
    source: S,
    target: T,
}

impl<S: SizeSource, T: ResizeTarget> ResizePropagator<S, T> {
    pub fn new(source: S, target: T) -> Self {
        Self { source, target }
    }

    /// Apply the current size once. Failures are logged, never fatal.
    pub fn propagate(&self) -> bool {
        let size = match self.source.size() {
            Ok(size) => size,
            Err(e) => {
                warn!("Failed to read terminal size: {}", e);
                return false;
            }
        };

        let (cols, rows) = (size.cols, size.rows);
        match self.target.resize(size) {
            Ok(()) => {
                debug!("pty resized to {}x{}", cols, rows);
                true
            }
            Err(e) => {
                warn!("Error resizing pty: {:#}", e);
                false
            }
        }
    }

    /// Subscribe to SIGWINCH and start the propagation thread.
    ///
    /// The thread applies the size once straight away, then again after
    /// every resize notification. Notifications arriving while one is
    /// being handled are coalesced into a single pending one.
    pub fn spawn(self) -> Result<ResizeHandle> {
        let mut signals =
            Signals::new([SIGWINCH]).context("Failed to subscribe to SIGWINCH")?;
        let handle = signals.handle();

        let thread = thread::Builder::new()
            .name("resize".to_string())
            .spawn(move || {
                self.propagate();
                for _ in signals.forever() {
                    self.propagate();
                }
                debug!("resize listener stopped");
            })
            .context("Failed to spawn resize thread")?;

        Ok(ResizeHandle {
            signals: handle,
            thread: Some(thread),
        })
    }
}

/// Owner of a running resize propagation thread.
///
/// Dropping it unsubscribes from SIGWINCH, which ends the thread.
pub struct ResizeHandle {
    signals: Handle,
    thread: Option<thread::JoinHandle<()>>,
}

impl ResizeHandle {
    /// Unsubscribe and wait for the thread to finish.
    pub fn close(mut self) {
        self.signals.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ResizeHandle {
    fn drop(&mut self) {
        self.signals.close();
    }
}
