//! Accumulation buffer for inbound shell output

mod codec;

pub use codec::{concat, decode_text, encode_text, find_byte};

use bytes::{Bytes, BytesMut};

/// Initial capacity reserved for the accumulation buffer.
const INITIAL_CAPACITY: usize = 4096;

/// Bytes received from the shell that no expectation has consumed yet.
///
/// The buffer only grows by [`append`](Self::append) and only shrinks from
/// the front, through [`consume`](Self::consume) or [`take_all`](Self::take_all).
#[derive(Debug)]
pub struct AccumBuffer {
    buffer: BytesMut,
}

impl Default for AccumBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl AccumBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Append inbound bytes
    pub fn append(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// First buffered byte, if any
    pub fn first(&self) -> Option<u8> {
        self.buffer.first().copied()
    }

    /// Byte at `index`
    pub fn get(&self, index: usize) -> Option<u8> {
        self.buffer.get(index).copied()
    }

    /// Position of the first `byte` in the buffer
    pub fn position(&self, byte: u8) -> Option<usize> {
        find_byte(&self.buffer, byte)
    }

    /// Remove and return the first `n` bytes (clamped to the buffer length)
    pub fn consume(&mut self, n: usize) -> Bytes {
        let n = n.min(self.buffer.len());
        self.buffer.split_to(n).freeze()
    }

    /// Remove and return everything
    pub fn take_all(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    /// Get the buffer as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Get the current buffer length
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
