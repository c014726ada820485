//! Runtime capabilities of the linked TLS library.
//!
//! Older library generations needed explicit global initialisation and a
//! per-context switch for automatic ECDH curve selection; newer ones do
//! both on their own. Rather than probing at every call site, the
//! differences are resolved once, when a context builder is created.

use std::fmt;

/// First release with automatic ECDH curve selection always on (1.1.0).
const AUTO_ECDH_SINCE: i64 = 0x1010_0000;
/// First release with TLS 1.3 (1.1.1).
const TLS13_SINCE: i64 = 0x1010_1000;

/// What the linked library can do.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// `OPENSSL_VERSION_NUMBER` of the runtime library.
    pub version_number: i64,
    /// Automatic ECDH curve selection needs no per-context switch.
    pub builtin_ecdh_auto: bool,
    /// TLS 1.3 is available.
    pub tls13: bool,
}

impl Capabilities {
    /// Initialise the library (idempotent) and read its version.
    pub fn detect() -> Self {
        openssl::init();
        Self::from_version_number(openssl::version::number())
    }

    pub fn from_version_number(version_number: i64) -> Self {
        Self {
            version_number,
            builtin_ecdh_auto: version_number >= AUTO_ECDH_SINCE,
            tls13: version_number >= TLS13_SINCE,
        }
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("version", &format_args!("{:#010x}", self.version_number))
            .field("builtin_ecdh_auto", &self.builtin_ecdh_auto)
            .field("tls13", &self.tls13)
            .finish()
    }
}

/// Human-readable version of the runtime library, e.g. `OpenSSL 3.0.13 30 Jan 2024`.
pub fn version_text() -> &'static str {
    openssl::version::version()
}
