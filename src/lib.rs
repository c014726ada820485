#![forbid(unsafe_code)]

//! Non-blocking TLS sessions driven entirely through memory buffers.
//!
//! A [`SessionContext`] holds the shared configuration (credential, ALPN
//! policy, protocol versions). Each connection gets a [`HandshakeEngine`]
//! whose [`TransportPair`] the caller fills with bytes from the network and
//! drains towards it; the engine reports waits as values instead of
//! blocking.

pub mod alpn;
pub mod buf;
pub mod config;
pub mod context;
pub mod credential;
pub mod engine;
pub mod error;
pub mod io;
pub mod library;
pub mod record;

mod translate;

#[cfg(test)]
#[path = "../tests/common/mod.rs"]
mod test_support;

pub use alpn::{AlpnPolicy, Negotiation, SelectionOrder};
pub use buf::MemBuf;
pub use config::{ClientTlsConfig, CredentialSource, ServerTlsConfig};
pub use context::{CurvePolicy, Method, PeerVerification, Role, SessionContext, SessionContextBuilder};
pub use credential::Credential;
pub use engine::{EngineEvent, HandshakeEngine, HandshakeStatus, Phase, RecordStatus};
pub use error::{Error, InstallStep};
pub use io::TransportPair;
pub use library::Capabilities;
