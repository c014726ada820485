//! Session context: the long-lived, shared configuration every engine is
//! created from.
//!
//! A [`SessionContextBuilder`] collects settings and credentials; `build()`
//! turns it into an immutable [`SessionContext`]. Because the builder is
//! consumed, nothing can change a context once engines exist.

use std::fmt;
use std::sync::Arc;

use openssl::ec::EcKey;
use openssl::nid::Nid;
use openssl::ssl::{
    AlpnError, Ssl, SslContext, SslContextBuilder, SslMethod, SslMode, SslVerifyMode, SslVersion,
};
use openssl::x509::X509;

use crate::alpn::{self, AlpnPolicy, Negotiation, SelectionOrder};
use crate::credential::{Credential, InstallTarget};
use crate::error::Error;
use crate::library::Capabilities;
use crate::translate::setup_error;

/// Which side of the handshake engines of this context play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// Negotiation method: which protocol versions a context accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// TLS 1.2 only.
    Tls12,
    /// TLS 1.2 or 1.3, highest common version wins.
    #[default]
    Tls,
}

impl Method {
    fn ssl_method(self, role: Role) -> SslMethod {
        match role {
            Role::Server => SslMethod::tls_server(),
            Role::Client => SslMethod::tls_client(),
        }
    }

    fn version_range(self) -> (SslVersion, Option<SslVersion>) {
        match self {
            Method::Tls12 => (SslVersion::TLS1_2, Some(SslVersion::TLS1_2)),
            Method::Tls => (SslVersion::TLS1_2, None),
        }
    }
}

/// Curve selection for ECDHE key exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CurvePolicy {
    /// Let the library pick the best curve both sides support.
    #[default]
    Auto,
    /// Only offer/accept this curve.
    Fixed(Nid),
}

/// How a client context checks the server's certificate.
#[derive(Clone, Default)]
pub enum PeerVerification {
    /// Accept any certificate.
    #[default]
    Disabled,
    /// Require a chain to one of these roots and a matching host name.
    Trusted(Vec<X509>),
}

impl fmt::Debug for PeerVerification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerVerification::Disabled => f.write_str("Disabled"),
            PeerVerification::Trusted(roots) => write!(f, "Trusted({} roots)", roots.len()),
        }
    }
}

/// Collects settings for a [`SessionContext`].
pub struct SessionContextBuilder {
    role: Role,
    method: Method,
    capabilities: Capabilities,
    credential: Option<Credential>,
    alpn: AlpnPolicy,
    curves: CurvePolicy,
    verification: PeerVerification,
    server_name: Option<String>,
    outbound_limit: Option<usize>,
}

impl SessionContextBuilder {
    pub fn new(role: Role, method: Method) -> Self {
        let capabilities = Capabilities::detect();
        log::debug!("context: {role:?} builder, {method:?}, {capabilities:?}");
        Self {
            role,
            method,
            capabilities,
            credential: None,
            alpn: AlpnPolicy::default(),
            curves: CurvePolicy::default(),
            verification: PeerVerification::default(),
            server_name: None,
            outbound_limit: None,
        }
    }

    /// Install a credential.
    ///
    /// The certificate, private key and chain are installed as three
    /// separate steps against a scratch library context. Only when all
    /// three succeed is the credential committed; on failure the builder
    /// keeps whatever it had before (nothing, on a first attempt).
    pub fn install_credential(&mut self, credential: Credential) -> Result<(), Error> {
        let mut scratch = SslContextBuilder::new(self.method.ssl_method(self.role))
            .map_err(setup_error)?;
        self.stage_credential(credential, &mut scratch)
    }

    fn stage_credential<T: InstallTarget>(
        &mut self,
        credential: Credential,
        scratch: &mut T,
    ) -> Result<(), Error> {
        match credential.apply_to(scratch) {
            Ok(()) => {
                log::debug!("context: installed credential for {}", credential.subject());
                self.credential = Some(credential);
                Ok(())
            }
            Err(e) => {
                log::warn!(
                    "context: credential for {} not installed: {e}",
                    credential.subject()
                );
                Err(e)
            }
        }
    }

    /// Whether a credential has been committed.
    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    /// Server: protocols supported, in preference order.
    /// Client: protocols offered, in preference order.
    pub fn alpn_protocols<P: AsRef<[u8]>>(&mut self, protocols: &[P]) -> &mut Self {
        self.alpn = AlpnPolicy::new(protocols, self.alpn.order);
        self
    }

    /// Tie-break order for server-side selection.
    pub fn selection_order(&mut self, order: SelectionOrder) -> &mut Self {
        self.alpn.order = order;
        self
    }

    pub fn curves(&mut self, policy: CurvePolicy) -> &mut Self {
        self.curves = policy;
        self
    }

    /// Client: how to check the server's certificate.
    pub fn verification(&mut self, verification: PeerVerification) -> &mut Self {
        self.verification = verification;
        self
    }

    /// Client: SNI host name, also used for certificate host checks.
    pub fn server_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.server_name = Some(name.into());
        self
    }

    /// Cap on buffered outbound bytes before writes push back.
    pub fn outbound_limit(&mut self, limit: usize) -> &mut Self {
        self.outbound_limit = Some(limit);
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Create the shared context.
    pub fn build(self) -> Result<SessionContext, Error> {
        let mut ctx = SslContextBuilder::new(self.method.ssl_method(self.role))
            .map_err(setup_error)?;
        let (min, max) = self.method.version_range();
        ctx.set_min_proto_version(Some(min))?;
        ctx.set_max_proto_version(max)?;
        ctx.set_mode(SslMode::ENABLE_PARTIAL_WRITE | SslMode::ACCEPT_MOVING_WRITE_BUFFER);
        self.apply_curves(&mut ctx)?;

        if let Some(credential) = &self.credential {
            credential.apply_to(&mut ctx)?;
        }

        let mut verify_peer = false;
        match self.role {
            Role::Server => {
                if self.credential.is_none() {
                    log::warn!("context: server built without a credential; handshakes will fail");
                }
                ctx.set_verify(SslVerifyMode::NONE);
                if !self.alpn.supported.is_empty() {
                    let policy = self.alpn.clone();
                    ctx.set_alpn_select_callback(move |_ssl, client| {
                        match policy.select(client) {
                            Ok(Negotiation::Selected(proto)) => {
                                log::debug!("alpn: selected {}", String::from_utf8_lossy(proto));
                                Ok(proto)
                            }
                            Ok(Negotiation::NoAcknowledgement) => {
                                log::debug!("alpn: no common protocol");
                                Err(AlpnError::NOACK)
                            }
                            Err(_) => Err(AlpnError::ALERT_FATAL),
                        }
                    });
                }
            }
            Role::Client => {
                if !self.alpn.supported.is_empty() {
                    ctx.set_alpn_protos(&alpn::encode(&self.alpn.supported))?;
                }
                match &self.verification {
                    PeerVerification::Disabled => ctx.set_verify(SslVerifyMode::NONE),
                    PeerVerification::Trusted(roots) => {
                        for root in roots {
                            ctx.cert_store_mut().add_cert(root.clone())?;
                        }
                        ctx.set_verify(SslVerifyMode::PEER);
                        verify_peer = true;
                    }
                }
            }
        }

        Ok(SessionContext {
            inner: Arc::new(ContextInner {
                ssl: ctx.build(),
                role: self.role,
                method: self.method,
                capabilities: self.capabilities,
                alpn: self.alpn,
                credential_subject: self.credential.as_ref().map(Credential::subject),
                server_name: self.server_name,
                verify_peer,
                outbound_limit: self.outbound_limit,
            }),
        })
    }

    fn apply_curves(&self, ctx: &mut SslContextBuilder) -> Result<(), Error> {
        match self.curves {
            CurvePolicy::Auto if self.capabilities.builtin_ecdh_auto => Ok(()),
            #[cfg(legacy_ecdh_auto)]
            CurvePolicy::Auto => {
                log::debug!("context: enabling per-context automatic ECDH curve selection");
                ctx.set_ecdh_auto(true)?;
                Ok(())
            }
            #[cfg(not(legacy_ecdh_auto))]
            CurvePolicy::Auto => Err(Error::Unsupported("automatic ECDH curve selection")),
            CurvePolicy::Fixed(nid) => {
                let key = EcKey::from_curve_name(nid)?;
                ctx.set_tmp_ecdh(&key)?;
                Ok(())
            }
        }
    }
}

struct ContextInner {
    ssl: SslContext,
    role: Role,
    method: Method,
    capabilities: Capabilities,
    alpn: AlpnPolicy,
    credential_subject: Option<String>,
    server_name: Option<String>,
    verify_peer: bool,
    outbound_limit: Option<usize>,
}

/// Immutable, shareable configuration for handshake engines.
///
/// Cloning is cheap; all clones refer to the same library context.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<ContextInner>,
}

impl SessionContext {
    pub fn builder(role: Role, method: Method) -> SessionContextBuilder {
        SessionContextBuilder::new(role, method)
    }

    pub fn role(&self) -> Role {
        self.inner.role
    }

    pub fn method(&self) -> Method {
        self.inner.method
    }

    pub fn capabilities(&self) -> Capabilities {
        self.inner.capabilities
    }

    /// Server: supported protocols and tie-break order. Client: offered protocols.
    pub fn alpn(&self) -> &AlpnPolicy {
        &self.inner.alpn
    }

    pub fn has_credential(&self) -> bool {
        self.inner.credential_subject.is_some()
    }

    pub fn server_name(&self) -> Option<&str> {
        self.inner.server_name.as_deref()
    }

    pub(crate) fn outbound_limit(&self) -> Option<usize> {
        self.inner.outbound_limit
    }

    /// Create a per-connection library object in the right handshake mode.
    pub(crate) fn new_ssl(&self, server_name: Option<&str>) -> Result<Ssl, Error> {
        let mut ssl = Ssl::new(&self.inner.ssl).map_err(setup_error)?;
        match self.inner.role {
            Role::Server => ssl.set_accept_state(),
            Role::Client => {
                ssl.set_connect_state();
                if let Some(name) = server_name.or(self.inner.server_name.as_deref()) {
                    ssl.set_hostname(name)?;
                    if self.inner.verify_peer {
                        ssl.param_mut().set_host(name)?;
                    }
                }
            }
        }
        Ok(ssl)
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("role", &self.inner.role)
            .field("method", &self.inner.method)
            .field("credential", &self.inner.credential_subject)
            .field("alpn", &self.inner.alpn)
            .finish_non_exhaustive()
    }
}
