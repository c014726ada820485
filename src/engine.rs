//! Per-connection TLS engine over in-memory buffers.
//!
//! Follows the `feed_data()` → `advance_handshake()` / `decrypt()` →
//! `poll_output()` → `poll_event()` pattern. The engine never touches a
//! socket: the caller moves ciphertext between the [`TransportPair`] and
//! the network, and every operation reports whether it is waiting on input
//! or on output instead of blocking.

use std::fmt;
use std::mem;

use bytes::Bytes;
use openssl::ssl::SslStream;

use crate::context::{Role, SessionContext};
use crate::error::Error;
use crate::io::TransportPair;
use crate::translate::{setup_error, translate, Progress};

/// Lifecycle of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created; no handshake step taken yet.
    Uninitialized,
    /// Handshake in progress.
    Handshaking,
    /// Handshake complete, application data flowing.
    Established,
    /// `close()` was called.
    Closed,
    /// An unrecoverable error occurred; only `close()` remains useful.
    Faulted,
}

/// Result of one `advance_handshake()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    /// Feed more bytes from the peer, then call again.
    NeedMoreInput,
    /// Send the outbound bytes to the peer, then call again.
    NeedOutputFlushed,
    /// The handshake is done.
    ///
    /// The outbound buffer may still hold this side's final flight (its
    /// Finished, and on a server possibly session tickets). The peer cannot
    /// finish until those bytes reach it, so flush after `Complete` too.
    Complete,
}

/// Result of one `encrypt()` or `decrypt()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// Plaintext bytes accepted (encrypt) or produced (decrypt).
    Done(usize),
    /// Feed more bytes from the peer, then call again.
    NeedMoreInput,
    /// Send the outbound bytes to the peer, then retry with the same data.
    NeedOutputFlushed,
    /// The peer sent close_notify.
    PeerClosed,
}

/// Events produced by a [`HandshakeEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Handshake is complete; application data can now flow.
    HandshakeComplete,
    /// Peer sent a close_notify alert.
    PeerClosed,
}

/// The library stream while it is alive; just the buffers once it has
/// been released.
enum Slot {
    Live(SslStream<TransportPair>),
    Released(TransportPair),
}

/// One TLS connection driven through memory buffers.
pub struct HandshakeEngine {
    role: Role,
    phase: Phase,
    slot: Slot,

    negotiated: Option<Vec<u8>>,
    version: Option<&'static str>,
    cipher: Option<&'static str>,
    peer_closed: bool,

    events: heapless::Deque<EngineEvent, 8>,
}

impl HandshakeEngine {
    /// Create an engine with fresh buffers.
    pub fn new(ctx: &SessionContext) -> Result<Self, Error> {
        let transport = match ctx.outbound_limit() {
            Some(limit) => TransportPair::with_outbound_limit(limit),
            None => TransportPair::new(),
        };
        Self::with_transport(ctx, transport)
    }

    /// Create an engine around existing buffers.
    pub fn with_transport(ctx: &SessionContext, transport: TransportPair) -> Result<Self, Error> {
        Self::build(ctx, transport, None)
    }

    /// Client: create an engine for `server_name`, overriding the
    /// context's default name.
    pub fn with_server_name(ctx: &SessionContext, server_name: &str) -> Result<Self, Error> {
        let transport = match ctx.outbound_limit() {
            Some(limit) => TransportPair::with_outbound_limit(limit),
            None => TransportPair::new(),
        };
        Self::build(ctx, transport, Some(server_name))
    }

    fn build(
        ctx: &SessionContext,
        transport: TransportPair,
        server_name: Option<&str>,
    ) -> Result<Self, Error> {
        let ssl = ctx.new_ssl(server_name)?;
        let stream = SslStream::new(ssl, transport).map_err(setup_error)?;
        log::debug!("engine: new {:?} engine", ctx.role());
        Ok(Self {
            role: ctx.role(),
            phase: Phase::Uninitialized,
            slot: Slot::Live(stream),
            negotiated: None,
            version: None,
            cipher: None,
            peer_closed: false,
            events: heapless::Deque::new(),
        })
    }

    /// Drive the handshake as far as the buffered bytes allow.
    ///
    /// Re-entrant: call again after feeding input or flushing output.
    /// Once established, further calls return `Complete` and do nothing.
    ///
    /// Whatever the status, send any pending output to the peer;
    /// `Complete` does not mean the outbound buffer is empty.
    pub fn advance_handshake(&mut self) -> Result<HandshakeStatus, Error> {
        match self.phase {
            Phase::Established => return Ok(HandshakeStatus::Complete),
            Phase::Closed => return Err(Error::Closed),
            Phase::Faulted => return Err(Error::InvalidState(Phase::Faulted)),
            Phase::Uninitialized => self.set_phase(Phase::Handshaking),
            Phase::Handshaking => {}
        }

        let result = translate(self.stream_mut()?.do_handshake());
        match result {
            Ok(Progress::Ready(())) => {
                self.on_established();
                Ok(HandshakeStatus::Complete)
            }
            Ok(Progress::WantRead) => Ok(if self.output_pending() {
                HandshakeStatus::NeedOutputFlushed
            } else {
                HandshakeStatus::NeedMoreInput
            }),
            Ok(Progress::WantWrite) => Ok(HandshakeStatus::NeedOutputFlushed),
            Ok(Progress::PeerClosed) => Err(self.fault(Error::Protocol {
                code: openssl::ssl::ErrorCode::ZERO_RETURN.as_raw(),
                detail: "peer closed during handshake".to_string(),
            })),
            Err(e) => Err(self.fault(e)),
        }
    }

    /// Encrypt `data` into the outbound buffer.
    ///
    /// `Done(n)` reports how many plaintext bytes were accepted. After
    /// `NeedOutputFlushed`, retry with the same bytes.
    pub fn encrypt(&mut self, data: &[u8]) -> Result<RecordStatus, Error> {
        self.require_established()?;
        if data.is_empty() {
            return Ok(RecordStatus::Done(0));
        }
        let result = translate(self.stream_mut()?.ssl_write(data));
        match result {
            Ok(Progress::Ready(n)) => {
                log::trace!("engine: encrypted {n} bytes");
                Ok(RecordStatus::Done(n))
            }
            Ok(Progress::WantWrite) => Ok(RecordStatus::NeedOutputFlushed),
            Ok(Progress::WantRead) => Ok(self.record_wait()),
            Ok(Progress::PeerClosed) => Ok(self.on_peer_closed()),
            Err(e) => Err(self.fault(e)),
        }
    }

    /// Decrypt complete records from the inbound buffer into `out`.
    pub fn decrypt(&mut self, out: &mut [u8]) -> Result<RecordStatus, Error> {
        self.require_established()?;
        if out.is_empty() {
            return Ok(RecordStatus::Done(0));
        }
        let result = translate(self.stream_mut()?.ssl_read(out));
        match result {
            Ok(Progress::Ready(n)) => {
                log::trace!("engine: decrypted {n} bytes");
                Ok(RecordStatus::Done(n))
            }
            Ok(Progress::WantRead) => Ok(self.record_wait()),
            Ok(Progress::WantWrite) => Ok(RecordStatus::NeedOutputFlushed),
            Ok(Progress::PeerClosed) => Ok(self.on_peer_closed()),
            Err(e) => Err(self.fault(e)),
        }
    }

    /// Close the connection.
    ///
    /// Queues close_notify when established (best effort), then releases
    /// the library's per-connection object. The buffers stay, so the
    /// alert can still be flushed. Calling again does nothing.
    pub fn close(&mut self) {
        if self.phase == Phase::Closed {
            return;
        }
        if self.phase == Phase::Established {
            if let Slot::Live(stream) = &mut self.slot {
                match stream.shutdown() {
                    Ok(state) => log::debug!("engine: close_notify queued ({state:?})"),
                    Err(e) => log::debug!("engine: close_notify not sent: {e}"),
                }
            }
        }
        self.release();
        self.set_phase(Phase::Closed);
    }

    /// Append bytes received from the peer. Ignored after `close()`.
    pub fn feed_data(&mut self, data: &[u8]) {
        if self.phase == Phase::Closed {
            log::trace!("engine: dropping {} bytes fed after close", data.len());
            return;
        }
        self.transport_mut().push_inbound(data);
    }

    /// The peer will send nothing more; a truncated record becomes a fault.
    pub fn feed_eof(&mut self) {
        self.transport_mut().mark_inbound_eof();
    }

    /// Pull the next chunk of outgoing bytes.
    pub fn poll_output<'a>(&mut self, buf: &'a mut [u8]) -> Option<&'a [u8]> {
        let n = self.transport_mut().outbound_mut().read(buf);
        if n == 0 {
            return None;
        }
        Some(&buf[..n])
    }

    /// Take every outgoing byte at once.
    pub fn take_output(&mut self) -> Bytes {
        self.transport_mut().outbound_mut().take_all()
    }

    /// Poll for the next event.
    pub fn poll_event(&mut self) -> Option<EngineEvent> {
        self.events.pop_front()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Protocol agreed via ALPN, if any.
    pub fn negotiated_protocol(&self) -> Option<&[u8]> {
        self.negotiated.as_deref()
    }

    /// Negotiated protocol version, e.g. `TLSv1.3`.
    pub fn protocol_version(&self) -> Option<&'static str> {
        self.version
    }

    /// Negotiated cipher suite name.
    pub fn cipher_name(&self) -> Option<&'static str> {
        self.cipher
    }

    pub fn is_established(&self) -> bool {
        self.phase == Phase::Established
    }

    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Closed
    }

    pub fn transport(&self) -> &TransportPair {
        match &self.slot {
            Slot::Live(stream) => stream.get_ref(),
            Slot::Released(transport) => transport,
        }
    }

    pub fn transport_mut(&mut self) -> &mut TransportPair {
        match &mut self.slot {
            Slot::Live(stream) => stream.get_mut(),
            Slot::Released(transport) => transport,
        }
    }

    // ------------------------------------------------------------------
    // Internal
    // ------------------------------------------------------------------

    fn stream_mut(&mut self) -> Result<&mut SslStream<TransportPair>, Error> {
        match &mut self.slot {
            Slot::Live(stream) => Ok(stream),
            Slot::Released(_) => Err(Error::InvalidState(self.phase)),
        }
    }

    fn require_established(&self) -> Result<(), Error> {
        match self.phase {
            Phase::Established => Ok(()),
            Phase::Closed => Err(Error::Closed),
            phase => Err(Error::InvalidState(phase)),
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            log::debug!("engine: {:?} {:?} -> {:?}", self.role, self.phase, phase);
            self.phase = phase;
        }
    }

    fn output_pending(&self) -> bool {
        self.transport().pending_output() > 0
    }

    fn record_wait(&self) -> RecordStatus {
        if self.output_pending() {
            RecordStatus::NeedOutputFlushed
        } else {
            RecordStatus::NeedMoreInput
        }
    }

    fn on_established(&mut self) {
        if let Slot::Live(stream) = &self.slot {
            let ssl = stream.ssl();
            self.negotiated = ssl.selected_alpn_protocol().map(<[u8]>::to_vec);
            self.version = Some(ssl.version_str());
            self.cipher = ssl.current_cipher().map(|c| c.name());
        }
        self.set_phase(Phase::Established);
        log::debug!(
            "engine: {:?} established, {} {}, alpn {:?}",
            self.role,
            self.version.unwrap_or("?"),
            self.cipher.unwrap_or("?"),
            self.negotiated.as_deref().map(String::from_utf8_lossy),
        );
        let _ = self.events.push_back(EngineEvent::HandshakeComplete);
    }

    fn on_peer_closed(&mut self) -> RecordStatus {
        if !self.peer_closed {
            self.peer_closed = true;
            log::debug!("engine: {:?} peer sent close_notify", self.role);
            let _ = self.events.push_back(EngineEvent::PeerClosed);
        }
        RecordStatus::PeerClosed
    }

    /// Record an unrecoverable error: release the library object, keep
    /// the buffers so a queued alert can still go out.
    fn fault(&mut self, err: Error) -> Error {
        log::warn!("engine: {:?} fault in {:?}: {err}", self.role, self.phase);
        self.release();
        self.set_phase(Phase::Faulted);
        err
    }

    fn release(&mut self) {
        if let Slot::Live(stream) = &mut self.slot {
            let transport = mem::take(stream.get_mut());
            self.slot = Slot::Released(transport);
        }
    }
}

impl fmt::Debug for HandshakeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeEngine")
            .field("role", &self.role)
            .field("phase", &self.phase)
            .field("negotiated", &self.negotiated.as_deref().map(String::from_utf8_lossy))
            .field("transport", self.transport())
            .finish_non_exhaustive()
    }
}
