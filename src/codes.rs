//! Byte-to-text translation table.
//!
//! Every input byte maps to exactly one string. Printable ASCII renders as
//! itself, everything else as a `\xNN` escape, and the `escapes` section of
//! the config can override any entry.

use thiserror::Error;
use tracing::debug;

use crate::config::EscapeEntry;

/// Number of entries in an ordered escape block.
pub const BLOCK_LEN: usize = 16;

/// Errors raised while applying escape overrides.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodeTableError {
    #[error("escape key {key:?} is not a decimal byte index")]
    InvalidKey { key: String },

    #[error("escape key {key:?} is outside the byte range 0-255")]
    KeyOutOfRange { key: String },

    #[error("escape block {block} has {len} entries, which would overrun byte 255")]
    BlockOutOfRange { block: usize, len: usize },
}

/// Fixed mapping from every byte value to its logged representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteCodeTable {
    codes: Box<[String; 256]>,
}

impl ByteCodeTable {
    /// Build a table holding only the default representations.
    pub fn defaults() -> Self {
        Self {
            codes: Box::new(std::array::from_fn(|i| default_code(i as u8))),
        }
    }

    /// Build a table from the defaults plus the configured overrides.
    ///
    /// Entries are applied in list order, so a later entry wins over an
    /// earlier one touching the same byte. An ordered block at list position
    /// `i` covers bytes `i*16 .. i*16+15`.
    pub fn from_escapes(escapes: &[EscapeEntry]) -> Result<Self, CodeTableError> {
        let mut table = Self::defaults();

        for (block, entry) in escapes.iter().enumerate() {
            match entry {
                EscapeEntry::Block(values) => table.apply_block(block, values)?,
                EscapeEntry::Sparse(map) => {
                    for (key, value) in map {
                        let index = parse_index(key)?;
                        table.set(index, value);
                    }
                }
            }
        }

        Ok(table)
    }

    fn apply_block(&mut self, block: usize, values: &[String]) -> Result<(), CodeTableError> {
        let start = block * BLOCK_LEN;
        if values.len() > BLOCK_LEN || start + values.len() > 256 {
            return Err(CodeTableError::BlockOutOfRange {
                block,
                len: values.len(),
            });
        }

        for (offset, value) in values.iter().enumerate() {
            self.set((start + offset) as u8, value);
        }
        Ok(())
    }

    fn set(&mut self, byte: u8, value: &str) {
        debug!("map \\x{:x} -> {}", byte, value);
        self.codes[byte as usize] = value.to_owned();
    }

    /// Representation of a single byte.
    pub fn lookup(&self, byte: u8) -> &str {
        &self.codes[byte as usize]
    }

    /// Representations of a run of bytes, in order.
    pub fn translate<'a>(&'a self, bytes: &'a [u8]) -> impl Iterator<Item = &'a str> + 'a {
        bytes.iter().map(move |&b| self.lookup(b))
    }
}

impl Default for ByteCodeTable {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Default rendering: printable ASCII as itself, anything else as `\x` + hex.
pub fn default_code(byte: u8) -> String {
    if (32..=126).contains(&byte) {
        char::from(byte).to_string()
    } else {
        format!("\\x{:x}", byte)
    }
}

fn parse_index(key: &str) -> Result<u8, CodeTableError> {
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CodeTableError::InvalidKey {
            key: key.to_string(),
        });
    }
    key.parse::<u8>().map_err(|_| CodeTableError::KeyOutOfRange {
        key: key.to_string(),
    })
}
