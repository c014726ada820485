//! Memory transport pair for one TLS connection.
//!
//! `TransportPair` owns the two buffers a connection needs: inbound
//! (network → engine) and outbound (engine → network). It is also the
//! stream the TLS library reads from and writes to, via `Read`/`Write`:
//!
//! * reads only ever see whole records; a trailing partial record stays in
//!   inbound and the read reports `WouldBlock`;
//! * writes append to outbound and only report `WouldBlock` when an
//!   optional outbound limit has been reached.
//!
//! Inbound is only ever appended to from outside; the library is its sole
//! consumer, so the record gate's bookkeeping cannot go stale.

use std::io::{self, Read, Write};

use crate::buf::MemBuf;
use crate::record;

/// Owning inbound/outbound buffers for one connection.
#[derive(Debug, Default)]
pub struct TransportPair {
    /// Encrypted bytes received from the peer, not yet consumed by the library.
    inbound: MemBuf,
    /// Encrypted bytes produced by the library, not yet sent to the peer.
    outbound: MemBuf,
    outbound_limit: Option<usize>,
    /// Bytes at the front of `inbound` already known to belong to whole
    /// records. The library may read a record in pieces (header, then body).
    released: usize,
}

impl TransportPair {
    /// Create empty, unbounded buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create empty buffers whose outbound side pushes back once it holds
    /// `limit` bytes.
    pub fn with_outbound_limit(limit: usize) -> Self {
        Self {
            outbound_limit: Some(limit),
            ..Self::default()
        }
    }

    /// Append bytes received from the peer.
    pub fn push_inbound(&mut self, data: &[u8]) {
        self.inbound.append(data);
    }

    /// The peer will send nothing more.
    pub fn mark_inbound_eof(&mut self) {
        self.inbound.mark_eof();
    }

    /// Received bytes the library has not consumed yet.
    pub fn inbound(&self) -> &MemBuf {
        &self.inbound
    }

    /// Bytes the library produced for the peer.
    pub fn outbound(&self) -> &MemBuf {
        &self.outbound
    }

    /// Drain side of the outbound buffer.
    pub fn outbound_mut(&mut self) -> &mut MemBuf {
        &mut self.outbound
    }

    pub fn outbound_limit(&self) -> Option<usize> {
        self.outbound_limit
    }

    /// Bytes waiting to be sent to the peer.
    pub fn pending_output(&self) -> usize {
        self.outbound.pending()
    }

    /// Bytes received but not yet consumed by the library.
    pub fn pending_input(&self) -> usize {
        self.inbound.pending()
    }

    /// Whether the outbound side has reached its limit.
    pub fn outbound_full(&self) -> bool {
        self.outbound_limit
            .is_some_and(|limit| self.outbound.pending() >= limit)
    }

    /// How many inbound bytes the library may read right now.
    fn readable(&self) -> usize {
        if self.released > 0 {
            return self.released.min(self.inbound.pending());
        }
        let data = self.inbound.peek();
        let whole = record::complete_prefix_len(data);
        if whole == 0 && self.inbound.is_eof() {
            // No more bytes are coming: let the library see the truncated
            // tail so it can report it.
            data.len()
        } else {
            whole
        }
    }
}

impl Read for TransportPair {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let avail = self.readable();
        if avail == 0 {
            if self.inbound.is_drained() {
                return Ok(0);
            }
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = avail.min(buf.len());
        buf[..n].copy_from_slice(&self.inbound.peek()[..n]);
        self.inbound.consume(n);
        self.released = avail - n;
        log::trace!("transport: library read {} bytes, {} left", n, self.inbound.pending());
        Ok(n)
    }
}

impl Write for TransportPair {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.outbound_full() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        self.outbound.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
