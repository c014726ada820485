use std::fmt;

use openssl::error::ErrorStack;

use crate::engine::Phase;

/// Which of the three credential installation steps failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStep {
    /// Installing the leaf certificate.
    Certificate,
    /// Binding the private key (including the key/certificate match check).
    PrivateKey,
    /// Ordering and attaching the intermediate chain.
    Chain,
}

impl fmt::Display for InstallStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallStep::Certificate => f.write_str("certificate"),
            InstallStep::PrivateKey => f.write_str("private key"),
            InstallStep::Chain => f.write_str("certificate chain"),
        }
    }
}

/// Top-level crate error.
///
/// Would-block conditions are never represented here; they surface as
/// [`HandshakeStatus`](crate::HandshakeStatus) and
/// [`RecordStatus`](crate::RecordStatus) values instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Credential container could not be decoded, or held no key/certificate.
    #[error("malformed credential container: {0}")]
    CredentialFormat(String),
    /// Credential container rejected the password.
    #[error("credential container rejected the password")]
    CredentialPassword(#[source] ErrorStack),
    /// One of the credential installation steps failed.
    #[error("failed to install {step}: {reason}")]
    CredentialInstall { step: InstallStep, reason: String },
    /// The handshake or record layer rejected the peer's data.
    ///
    /// `code` is the library's per-operation error code.
    #[error("tls protocol fault (code {code}): {detail}")]
    Protocol { code: i32, detail: String },
    /// The library could not allocate memory for this connection.
    #[error("tls library resource exhaustion: {0}")]
    ResourceExhaustion(String),
    /// Operation not valid in the engine's current phase.
    #[error("operation not valid while {0:?}")]
    InvalidState(Phase),
    /// The engine has been closed.
    #[error("engine closed")]
    Closed,
    /// The runtime library lacks a capability the configuration requires.
    #[error("unsupported by the tls library: {0}")]
    Unsupported(&'static str),
    /// Library failure while building a context or connection object.
    #[error("tls library error: {0}")]
    Library(#[from] ErrorStack),
    /// Reading credential material from disk failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Setup-time failure; the context being built must not be used.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Error::CredentialFormat(_)
                | Error::CredentialPassword(_)
                | Error::CredentialInstall { .. }
                | Error::Unsupported(_)
                | Error::Io(_)
        )
    }

    /// The connection this error came from must be closed; never retried.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Error::Protocol { .. } | Error::ResourceExhaustion(_) | Error::Closed
        )
    }
}
