//! Periodic persistence of the session buffer.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::buffer::SessionBuffer;

/// Destination of flushed keystrokes.
pub trait LogSink: Write + Send {
    /// Force written data to durable storage.
    fn sync(&mut self) -> io::Result<()>;
}

impl LogSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Open the keystroke log for appending, creating it if needed.
pub fn open_log(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))
}

/// Result of a single flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The capture path held the lock; nothing was touched.
    Skipped,
    /// This many entries were written and synced.
    Flushed(usize),
    /// No log file is configured; this many entries were dropped.
    Discarded(usize),
    /// Writing or syncing failed; this many entries were dropped.
    Failed(usize),
}

/// Timer-driven drain of the [`SessionBuffer`] into the log.
pub struct FlushScheduler {
    buffer: Arc<SessionBuffer>,
    sink: Option<Box<dyn LogSink>>,
    interval: Duration,
}

impl FlushScheduler {
    pub fn new(
        buffer: Arc<SessionBuffer>,
        sink: Option<Box<dyn LogSink>>,
        interval: Duration,
    ) -> Self {
        Self {
            buffer,
            sink,
            interval,
        }
    }

    /// Run one flush cycle without ever waiting on the buffer lock.
    pub fn tick(&mut self) -> FlushOutcome {
        let Some(mut entries) = self.buffer.try_lock() else {
            debug!("buffer busy, skipping flush");
            return FlushOutcome::Skipped;
        };

        let count = entries.len();
        let Some(sink) = self.sink.as_mut() else {
            entries.clear();
            return FlushOutcome::Discarded(count);
        };

        if count == 0 {
            return FlushOutcome::Flushed(0);
        }

        let result = write_entries(sink.as_mut(), &entries);
        entries.clear();

        match result {
            Ok(()) => FlushOutcome::Flushed(count),
            Err(e) => {
                warn!("Failed to flush {} entries to log: {}", count, e);
                FlushOutcome::Failed(count)
            }
        }
    }

    /// Start the flush thread. It ticks every `interval` until the process exits.
    pub fn spawn(mut self) -> Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("flush".to_string())
            .spawn(move || loop {
                thread::sleep(self.interval);
                self.tick();
            })
            .context("Failed to spawn flush thread")
    }
}

fn write_entries(sink: &mut dyn LogSink, entries: &[String]) -> io::Result<()> {
    sink.write_all(entries.concat().as_bytes())?;
    sink.flush()?;
    sink.sync()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;

    /// Sink that always fails to write.
    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogSink for BrokenSink {
        fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Sink recording writes and syncs in memory.
    #[derive(Clone, Default)]
    struct MemorySink {
        data: Arc<Mutex<Vec<u8>>>,
        syncs: Arc<Mutex<usize>>,
    }

    impl Write for MemorySink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.data.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogSink for MemorySink {
        fn sync(&mut self) -> io::Result<()> {
            *self.syncs.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn fill(buffer: &SessionBuffer, entries: &[&str]) {
        for entry in entries {
            buffer.append(entry);
        }
    }

    #[test]
    fn tick_writes_everything_in_order_and_empties_buffer() {
        let buffer = Arc::new(SessionBuffer::new());
        let sink = MemorySink::default();
        let mut scheduler = FlushScheduler::new(
            Arc::clone(&buffer),
            Some(Box::new(sink.clone())),
            Duration::from_secs(1),
        );

        fill(&buffer, &["A", "\\xa"]);
        assert_eq!(scheduler.tick(), FlushOutcome::Flushed(2));
        assert!(buffer.is_empty());
        assert_eq!(*sink.data.lock().unwrap(), b"A\\xa");
        assert_eq!(*sink.syncs.lock().unwrap(), 1);
    }

    #[test]
    fn busy_buffer_is_skipped_then_flushed_next_tick() {
        let buffer = Arc::new(SessionBuffer::new());
        let sink = MemorySink::default();
        let mut scheduler = FlushScheduler::new(
            Arc::clone(&buffer),
            Some(Box::new(sink.clone())),
            Duration::from_secs(1),
        );

        fill(&buffer, &["a", "b"]);
        {
            let mut held = buffer.lock();
            assert_eq!(scheduler.tick(), FlushOutcome::Skipped);
            // The capture that held the lock finishes its append.
            held.push("c".to_string());
        }
        assert!(sink.data.lock().unwrap().is_empty());

        assert_eq!(scheduler.tick(), FlushOutcome::Flushed(3));
        assert_eq!(*sink.data.lock().unwrap(), b"abc");

        assert_eq!(scheduler.tick(), FlushOutcome::Flushed(0));
        assert_eq!(*sink.data.lock().unwrap(), b"abc");
    }

    #[test]
    fn no_log_file_discards_entries() {
        let buffer = Arc::new(SessionBuffer::new());
        let mut scheduler =
            FlushScheduler::new(Arc::clone(&buffer), None, Duration::from_secs(1));

        fill(&buffer, &["x", "y"]);
        assert_eq!(scheduler.tick(), FlushOutcome::Discarded(2));
        assert!(buffer.is_empty());
    }

    #[test]
    fn write_failure_is_not_fatal() {
        let buffer = Arc::new(SessionBuffer::new());
        let mut scheduler = FlushScheduler::new(
            Arc::clone(&buffer),
            Some(Box::new(BrokenSink)),
            Duration::from_secs(1),
        );

        fill(&buffer, &["x"]);
        assert_eq!(scheduler.tick(), FlushOutcome::Failed(1));

        fill(&buffer, &["y"]);
        assert_eq!(scheduler.tick(), FlushOutcome::Failed(1));
        assert!(buffer.is_empty());
    }

    #[test]
    fn open_log_appends_to_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.log");
        std::fs::write(&path, "old:").unwrap();

        let buffer = Arc::new(SessionBuffer::new());
        let mut scheduler = FlushScheduler::new(
            Arc::clone(&buffer),
            Some(Box::new(open_log(&path).unwrap())),
            Duration::from_secs(1),
        );
        fill(&buffer, &["n", "e", "w"]);
        scheduler.tick();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old:new");
    }

    #[test]
    fn open_log_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("keys.log");
        assert!(open_log(&path).is_err());
    }

    #[test]
    fn spawned_scheduler_flushes_on_its_timer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.log");

        let buffer = Arc::new(SessionBuffer::new());
        fill(&buffer, &["A", "\\xa"]);

        FlushScheduler::new(
            Arc::clone(&buffer),
            Some(Box::new(open_log(&path).unwrap())),
            Duration::from_millis(50),
        )
        .spawn()
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let contents = std::fs::read_to_string(&path).unwrap();
            if contents == "A\\xa" {
                break;
            }
            assert!(Instant::now() < deadline, "log never flushed: {:?}", contents);
            thread::sleep(Duration::from_millis(20));
        }
        assert!(buffer.is_empty());
    }
}
