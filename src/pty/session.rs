//! PTY session: spawn the configured program and proxy the terminal to it.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use portable_pty::{native_pty_system, CommandBuilder, MasterPty, PtyPair, PtySize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::codes::ByteCodeTable;
use crate::config::Config;
use crate::session::{CaptureReader, FlushScheduler, LogSink, SessionBuffer};

use super::raw_mode::RawModeGuard;
use super::resize::{ControllingTerminal, ResizePropagator, ResizeTarget, SizeSource};

/// Size used when the controlling terminal cannot be queried.
const FALLBACK_SIZE: PtySize = PtySize {
    rows: 24,
    cols: 80,
    pixel_width: 0,
    pixel_height: 0,
};

const RELAY_BUF_SIZE: usize = 4096;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PtySessionError {
    #[error("missing program")]
    EmptyProgram,
}

/// Why the session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The input stream reached end of file.
    InputClosed,
    /// Reading the input stream failed.
    InputError(String),
    /// Forwarding into the pty failed.
    PtyClosed(String),
    /// The child closed its end of the pty.
    ChildExited,
}

/// The pty master, shared with the resize thread.
#[derive(Clone)]
struct SharedMaster(Arc<Mutex<Box<dyn MasterPty + Send>>>);

impl ResizeTarget for SharedMaster {
    fn resize(&self, size: PtySize) -> Result<()> {
        let master = self
            .0
            .lock()
            .map_err(|_| anyhow!("pty master lock poisoned"))?;
        master.resize(size).context("Failed to resize PTY")?;
        Ok(())
    }
}

/// A program running inside a pty, with every keystroke sent to it logged.
pub struct PtySession {
    program: Vec<String>,
    make_raw: bool,
    sync_interval: Duration,
    table: Arc<ByteCodeTable>,
    buffer: Arc<SessionBuffer>,
    sink: Option<Box<dyn LogSink>>,
}

impl PtySession {
    /// Prepare a session for `config`. Nothing is spawned until [`run`].
    ///
    /// [`run`]: PtySession::run
    pub fn new(
        config: &Config,
        table: ByteCodeTable,
        sink: Option<Box<dyn LogSink>>,
    ) -> Result<Self, PtySessionError> {
        if config.program.is_empty() {
            return Err(PtySessionError::EmptyProgram);
        }

        Ok(Self {
            program: config.program.clone(),
            make_raw: config.flags.make_raw,
            sync_interval: config.sync_interval(),
            table: Arc::new(table),
            buffer: Arc::new(SessionBuffer::new()),
            sink,
        })
    }

    /// Proxy the real terminal until its input closes or the child exits.
    pub fn run(self) -> Result<SessionEnd> {
        self.run_with(io::stdin(), io::stdout(), ControllingTerminal)
    }

    /// Proxy `input` and `output` to the child until `input` closes or fails,
    /// or the child closes its end of the pty.
    ///
    /// Setup failures (raw mode, pty allocation, spawn) are returned as
    /// errors. Once the child runs, I/O failures only end the session and are
    /// reported through [`SessionEnd`]. When the child exits first, the input
    /// relay is left blocked on its read and stops at the next byte.
    pub fn run_with<R, W, S>(self, input: R, output: W, size_source: S) -> Result<SessionEnd>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
        S: SizeSource,
    {
        let _raw_mode = RawModeGuard::acquire(self.make_raw)?;

        let initial_size = size_source.size().unwrap_or(FALLBACK_SIZE);
        let pair = native_pty_system()
            .openpty(initial_size)
            .context("Failed to open PTY")?;
        let PtyPair { master, slave } = pair;

        let mut cmd = CommandBuilder::new(&self.program[0]);
        cmd.args(&self.program[1..]);
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let mut child = slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn {}", self.program[0]))?;
        // Only the child keeps the slave open, so the master sees EOF when it exits.
        drop(slave);
        info!("started {:?}", self.program);

        let writer = master.take_writer().context("Failed to open PTY writer")?;
        let reader = master
            .try_clone_reader()
            .context("Failed to open PTY reader")?;
        let master = SharedMaster(Arc::new(Mutex::new(master)));

        // Flag for whether the child still holds its end of the pty
        let alive = Arc::new(AtomicBool::new(true));
        let (end_tx, end_rx) = mpsc::channel();

        let resize = ResizePropagator::new(size_source, master.clone()).spawn()?;
        FlushScheduler::new(Arc::clone(&self.buffer), self.sink, self.sync_interval).spawn()?;
        spawn_output_relay(reader, output, Arc::clone(&alive), end_tx.clone())?;

        let capture = CaptureReader::new(input, Arc::clone(&self.table), Arc::clone(&self.buffer));
        spawn_input_relay(capture, writer, alive, end_tx)?;

        // Both relays hold a sender and the input relay always reports.
        let end = end_rx.recv().unwrap_or(SessionEnd::InputClosed);
        info!("session ended: {:?}", end);

        drop(resize);
        drop(master);

        match child.try_wait() {
            Ok(Some(status)) => debug!("child exited with {:?}", status),
            Ok(None) => debug!("child still running at session end"),
            Err(e) => warn!("Failed to poll child status: {}", e),
        }

        Ok(end)
    }
}

/// Copy keystrokes from `capture` into the pty until either side gives out.
///
/// `alive` is checked after every read, since writes to a pty whose child
/// has gone still succeed.
fn relay_input<R: Read>(
    capture: &mut CaptureReader<R>,
    writer: &mut dyn Write,
    alive: &AtomicBool,
) -> SessionEnd {
    let mut buf = [0u8; RELAY_BUF_SIZE];
    loop {
        let n = match capture.capture(&mut buf) {
            Ok(0) => return SessionEnd::InputClosed,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return SessionEnd::InputError(e.to_string()),
        };

        if !alive.load(Ordering::SeqCst) {
            return SessionEnd::ChildExited;
        }

        if let Err(e) = writer.write_all(&buf[..n]).and_then(|()| writer.flush()) {
            return SessionEnd::PtyClosed(e.to_string());
        }
    }
}

/// Spawn the input relay. The pty writer is released when it finishes.
fn spawn_input_relay<R>(
    mut capture: CaptureReader<R>,
    mut writer: Box<dyn Write + Send>,
    alive: Arc<AtomicBool>,
    ended: Sender<SessionEnd>,
) -> Result<thread::JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name("input-relay".to_string())
        .spawn(move || {
            let end = relay_input(&mut capture, writer.as_mut(), &alive);
            let _ = ended.send(end);
        })
        .context("Failed to spawn input relay thread")
}

/// Spawn a thread copying pty output to `output`, chunk by chunk, unbuffered.
///
/// EOF or a read error on the pty means the child is gone: `alive` is
/// cleared and [`SessionEnd::ChildExited`] is reported on `ended`.
fn spawn_output_relay<W>(
    mut reader: Box<dyn Read + Send>,
    mut output: W,
    alive: Arc<AtomicBool>,
    ended: Sender<SessionEnd>,
) -> Result<thread::JoinHandle<()>>
where
    W: Write + Send + 'static,
{
    thread::Builder::new()
        .name("output-relay".to_string())
        .spawn(move || {
            let mut buf = [0u8; RELAY_BUF_SIZE];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break, // EOF
                    Ok(n) => {
                        if let Err(e) = output.write_all(&buf[..n]).and_then(|()| output.flush())
                        {
                            warn!("Failed to write child output: {}", e);
                            return;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(_) => break, // EIO once the child has closed the pty
                }
            }
            alive.store(false, Ordering::SeqCst);
            debug!("output relay finished");
            let _ = ended.send(SessionEnd::ChildExited);
        })
        .context("Failed to spawn output relay thread")
}
