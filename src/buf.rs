//! Growable FIFO byte buffer, one direction of a memory transport.
//!
//! `MemBuf` is the canonical buffer type for the engine's inbound and
//! outbound sides. Bytes are appended at the tail and consumed from the
//! head; nothing is ever reordered or dropped. Backed by [`BytesMut`] so
//! draining the head is O(1).

use bytes::{Buf as _, Bytes, BytesMut};

/// Unbounded first-in first-out byte buffer with an end-of-stream marker.
#[derive(Debug, Default, Clone)]
pub struct MemBuf {
    data: BytesMut,
    eof: bool,
}

impl MemBuf {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` at the tail.
    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        log::trace!("membuf: appended {} bytes, {} pending", bytes.len(), self.data.len());
    }

    /// Copy up to `out.len()` bytes from the head into `out`, consuming them.
    ///
    /// Returns the number of bytes copied (0 when empty).
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = self.data.len().min(out.len());
        out[..n].copy_from_slice(&self.data[..n]);
        self.data.advance(n);
        n
    }

    /// Remove and return everything pending.
    pub fn take_all(&mut self) -> Bytes {
        self.data.split().freeze()
    }

    /// Pending bytes, head first, without consuming them.
    pub fn peek(&self) -> &[u8] {
        &self.data
    }

    /// Drop `n` bytes from the head.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds [`pending`](Self::pending).
    pub fn consume(&mut self, n: usize) {
        self.data.advance(n);
    }

    /// Number of bytes waiting to be read.
    pub fn pending(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Mark that no more bytes will ever be appended.
    ///
    /// Once the buffer is drained, readers observe end-of-stream instead of
    /// "try again later".
    pub fn mark_eof(&mut self) {
        self.eof = true;
    }

    /// Whether [`mark_eof`](Self::mark_eof) has been called.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Whether the stream has ended and every byte has been consumed.
    pub fn is_drained(&self) -> bool {
        self.eof && self.data.is_empty()
    }

    /// Discard pending bytes. The end-of-stream marker is kept.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}
