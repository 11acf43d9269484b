//! Fixed-capacity byte ring buffer
//!
//! One slot is always left unused so that `read == write` means empty and
//! `write + 1 == read` means full. A `RingFifo<N>` therefore holds at most
//! `N - 1` bytes.
//!
//! The FIFO itself is not synchronized. Buffers shared with the serial
//! interrupt live inside [`SerialChannel`](crate::serial::SerialChannel),
//! which only hands them out inside a critical section.

use crate::error::{BridgeError, Result};

/// Byte ring buffer with `N - 1` usable slots
pub struct RingFifo<const N: usize> {
    buffer: [u8; N],
    read: usize,
    write: usize,
}

impl<const N: usize> RingFifo<N> {
    /// Create an empty FIFO
    pub const fn new() -> Self {
        assert!(N > 1, "RingFifo needs at least two slots");
        Self {
            buffer: [0; N],
            read: 0,
            write: 0,
        }
    }

    /// Number of bytes the FIFO can hold
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    /// Check if no bytes are buffered
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    /// Check if another push would fail
    #[inline]
    pub fn is_full(&self) -> bool {
        (self.write + 1) % N == self.read
    }

    /// Number of buffered bytes (distance from read to write cursor)
    #[inline]
    pub fn len(&self) -> usize {
        (self.write + N - self.read) % N
    }

    /// Number of bytes that can still be pushed
    #[inline]
    pub fn free_space(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Append a byte
    ///
    /// A full FIFO rejects the byte with [`BridgeError::FifoOverflow`] and
    /// keeps its contents.
    pub fn push(&mut self, byte: u8) -> Result<()> {
        if self.is_full() {
            return Err(BridgeError::FifoOverflow);
        }
        self.buffer[self.write] = byte;
        self.write = (self.write + 1) % N;
        Ok(())
    }

    /// Remove and return the oldest byte
    pub fn pop(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.buffer[self.read];
        self.read = (self.read + 1) % N;
        Some(byte)
    }

    /// Look at the byte `offset` positions after the read cursor
    pub fn peek(&self, offset: usize) -> Option<u8> {
        if offset >= self.len() {
            return None;
        }
        Some(self.buffer[(self.read + offset) % N])
    }

    /// Check whether the buffered bytes start with `prefix`
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        prefix.len() <= self.len()
            && prefix
                .iter()
                .enumerate()
                .all(|(i, &b)| self.peek(i) == Some(b))
    }

    /// Advance the read cursor by up to `count` bytes without copying
    pub fn discard(&mut self, count: usize) {
        let count = count.min(self.len());
        self.read = (self.read + count) % N;
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
    }
}

impl<const N: usize> Default for RingFifo<N> {
    fn default() -> Self {
        Self::new()
    }
}
