//! Shared buffer of translated keystrokes.

use std::sync::{Mutex, MutexGuard, TryLockError};

/// Ordered, lock-guarded sequence of translated bytes.
///
/// The capture path appends one entry at a time under the lock; the flush
/// path drains the whole sequence under the lock. Neither ever sees a
/// half-written entry.
#[derive(Debug, Default)]
pub struct SessionBuffer {
    entries: Mutex<Vec<String>>,
}

impl SessionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one translated byte, blocking until the lock is free.
    pub fn append(&self, entry: &str) {
        self.lock().push(entry.to_owned());
    }

    /// Acquire the buffer, blocking.
    pub fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        // Entries are plain strings, so a panic elsewhere cannot leave them torn.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Acquire the buffer only if nobody else holds it.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, Vec<String>>> {
        match self.entries.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Take everything buffered so far if the lock is free.
    pub fn try_drain(&self) -> Option<Vec<String>> {
        self.try_lock().map(|mut entries| std::mem::take(&mut *entries))
    }

    /// Take everything buffered so far, waiting for the lock.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn append_keeps_arrival_order() {
        let buffer = SessionBuffer::new();
        for entry in ["a", "\\xa", "", "<TAB>"] {
            buffer.append(entry);
        }
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.drain(), vec!["a", "\\xa", "", "<TAB>"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn try_drain_skips_while_locked() {
        let buffer = SessionBuffer::new();
        buffer.append("x");

        let guard = buffer.lock();
        assert!(buffer.try_drain().is_none());
        drop(guard);

        assert_eq!(buffer.try_drain(), Some(vec!["x".to_string()]));
        assert_eq!(buffer.try_drain(), Some(Vec::new()));
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let buffer = Arc::new(SessionBuffer::new());
        buffer.append("kept");

        let poisoner = Arc::clone(&buffer);
        let _ = thread::spawn(move || {
            let _guard = poisoner.lock();
            panic!("poison the buffer");
        })
        .join();

        assert_eq!(buffer.try_drain(), Some(vec!["kept".to_string()]));
    }

    #[test]
    fn concurrent_drains_never_duplicate_entries() {
        let buffer = Arc::new(SessionBuffer::new());
        let writer = Arc::clone(&buffer);

        let producer = thread::spawn(move || {
            for i in 0..5000 {
                writer.append(&i.to_string());
            }
        });

        let mut seen = Vec::new();
        while !producer.is_finished() {
            if let Some(batch) = buffer.try_drain() {
                seen.extend(batch);
            }
        }
        producer.join().unwrap();
        seen.extend(buffer.drain());

        let expected: Vec<String> = (0..5000).map(|i| i.to_string()).collect();
        assert_eq!(seen, expected);
    }
}
