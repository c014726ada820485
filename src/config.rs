//! Declarative configuration for server and client contexts.

use std::path::PathBuf;

use crate::alpn::SelectionOrder;
use crate::context::{
    CurvePolicy, Method, PeerVerification, Role, SessionContext, SessionContextBuilder,
};
use crate::credential::Credential;
use crate::error::Error;

/// Where a server's credential comes from.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// PKCS#12 container on disk.
    Pkcs12File { path: PathBuf, password: String },
    /// PKCS#12 container already in memory.
    Pkcs12Bytes { der: Vec<u8>, password: String },
    /// PEM certificate (leaf first, then chain) and PEM private key.
    PemFiles { cert_path: PathBuf, key_path: PathBuf },
    /// Already decoded.
    Loaded(Credential),
}

impl CredentialSource {
    pub fn load(&self) -> Result<Credential, Error> {
        match self {
            CredentialSource::Pkcs12File { path, password } => {
                Credential::from_pkcs12_file(path, password)
            }
            CredentialSource::Pkcs12Bytes { der, password } => Credential::from_pkcs12(der, password),
            CredentialSource::PemFiles {
                cert_path,
                key_path,
            } => Credential::from_pem_files(cert_path, key_path),
            CredentialSource::Loaded(credential) => Ok(credential.clone()),
        }
    }
}

/// Server context configuration.
#[derive(Debug, Clone)]
pub struct ServerTlsConfig {
    pub method: Method,
    pub credential: CredentialSource,
    /// Supported protocol ids, most preferred first.
    pub alpn_protocols: Vec<Vec<u8>>,
    pub selection: SelectionOrder,
    pub curves: CurvePolicy,
    pub outbound_limit: Option<usize>,
}

impl ServerTlsConfig {
    pub fn new(credential: CredentialSource) -> Self {
        Self {
            method: Method::default(),
            credential,
            alpn_protocols: Vec::new(),
            selection: SelectionOrder::default(),
            curves: CurvePolicy::default(),
            outbound_limit: None,
        }
    }
}

/// Client context configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientTlsConfig {
    pub method: Method,
    pub server_name: Option<String>,
    /// Offered protocol ids, most preferred first.
    pub alpn_protocols: Vec<Vec<u8>>,
    pub verification: PeerVerification,
    pub outbound_limit: Option<usize>,
}

impl SessionContext {
    /// Load the credential and build a server context.
    pub fn server(config: &ServerTlsConfig) -> Result<Self, Error> {
        let mut builder = SessionContextBuilder::new(Role::Server, config.method);
        builder.install_credential(config.credential.load()?)?;
        builder
            .alpn_protocols(&config.alpn_protocols)
            .selection_order(config.selection)
            .curves(config.curves);
        if let Some(limit) = config.outbound_limit {
            builder.outbound_limit(limit);
        }
        builder.build()
    }

    /// Build a client context.
    pub fn client(config: &ClientTlsConfig) -> Result<Self, Error> {
        let mut builder = SessionContextBuilder::new(Role::Client, config.method);
        builder
            .alpn_protocols(&config.alpn_protocols)
            .verification(config.verification.clone());
        if let Some(name) = &config.server_name {
            builder.server_name(name.clone());
        }
        if let Some(limit) = config.outbound_limit {
            builder.outbound_limit(limit);
        }
        builder.build()
    }
}
