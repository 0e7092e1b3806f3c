//! Keystroke capture on the input relay.

use std::io::{self, Read};
use std::sync::Arc;

use crate::codes::ByteCodeTable;

use super::buffer::SessionBuffer;

/// Reader that records the translation of every byte it passes through.
///
/// Wraps the controlling terminal's input. The bytes handed back from
/// [`Read::read`] are exactly the ones read from the inner stream, so the
/// caller can forward them to the pty unchanged.
pub struct CaptureReader<R> {
    inner: R,
    table: Arc<ByteCodeTable>,
    buffer: Arc<SessionBuffer>,
}

impl<R: Read> CaptureReader<R> {
    pub fn new(inner: R, table: Arc<ByteCodeTable>, buffer: Arc<SessionBuffer>) -> Self {
        Self {
            inner,
            table,
            buffer,
        }
    }

    /// Read one chunk from the inner stream and record it.
    ///
    /// Returns the number of bytes placed in `buf`. Errors from the inner
    /// stream are returned untouched and nothing is recorded for them.
    pub fn capture(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        for &byte in &buf[..n] {
            self.buffer.append(self.table.lookup(byte));
        }
        Ok(n)
    }
}

impl<R: Read> Read for CaptureReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.capture(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EscapeEntry;
    use std::collections::BTreeMap;
    use std::io::Cursor;

    /// Reader that hands out its input in fixed-size chunks, then fails.
    struct ChunkedThenError {
        data: Vec<u8>,
        chunk: usize,
    }

    impl Read for ChunkedThenError {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.data.is_empty() {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin closed"));
            }
            let n = self.chunk.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data.drain(..n);
            Ok(n)
        }
    }

    fn tab_table() -> Arc<ByteCodeTable> {
        let mut map = BTreeMap::new();
        map.insert("9".to_string(), "<TAB>".to_string());
        Arc::new(ByteCodeTable::from_escapes(&[EscapeEntry::Sparse(map)]).unwrap())
    }

    #[test]
    fn forwarded_bytes_match_input_and_are_recorded() {
        let buffer = Arc::new(SessionBuffer::new());
        let mut reader = CaptureReader::new(
            Cursor::new(b"ls\t-l\n".to_vec()),
            tab_table(),
            Arc::clone(&buffer),
        );

        let mut forwarded = Vec::new();
        io::copy(&mut reader, &mut forwarded).unwrap();

        assert_eq!(forwarded, b"ls\t-l\n");
        assert_eq!(buffer.drain().concat(), "ls<TAB>-l\\xa");
    }

    #[test]
    fn every_byte_value_round_trips_through_the_table() {
        let table = Arc::new(ByteCodeTable::defaults());
        let buffer = Arc::new(SessionBuffer::new());
        let input: Vec<u8> = (0..=255u8).rev().collect();
        let mut reader =
            CaptureReader::new(Cursor::new(input.clone()), Arc::clone(&table), Arc::clone(&buffer));

        let mut sink = Vec::new();
        io::copy(&mut reader, &mut sink).unwrap();

        let expected: Vec<String> = input.iter().map(|&b| table.lookup(b).to_string()).collect();
        assert_eq!(buffer.drain(), expected);
    }

    #[test]
    fn read_error_ends_capture_and_keeps_earlier_bytes() {
        let buffer = Arc::new(SessionBuffer::new());
        let mut reader = CaptureReader::new(
            ChunkedThenError {
                data: b"abc".to_vec(),
                chunk: 2,
            },
            Arc::new(ByteCodeTable::defaults()),
            Arc::clone(&buffer),
        );

        let mut sink = Vec::new();
        let err = io::copy(&mut reader, &mut sink).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(sink, b"abc");
        assert_eq!(buffer.drain(), vec!["a", "b", "c"]);
    }

    #[test]
    fn end_of_input_records_nothing() {
        let buffer = Arc::new(SessionBuffer::new());
        let mut reader = CaptureReader::new(
            Cursor::new(Vec::new()),
            Arc::new(ByteCodeTable::defaults()),
            Arc::clone(&buffer),
        );
        let mut buf = [0u8; 16];
        assert_eq!(reader.capture(&mut buf).unwrap(), 0);
        assert!(buffer.is_empty());
    }
}
