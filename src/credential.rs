//! Server credentials: private key, leaf certificate and intermediate chain.
//!
//! Handles are owned library objects and are released when the
//! `Credential` (or any value built from it) is dropped, whatever path the
//! code takes out of a loader.

use std::fmt;
use std::fs;
use std::path::Path;

use openssl::error::ErrorStack;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::ssl::SslContextBuilder;
use openssl::x509::{X509Ref, X509VerifyResult, X509};

use crate::error::{Error, InstallStep};

/// Private key, leaf certificate and ordered chain of intermediates.
#[derive(Clone)]
pub struct Credential {
    key: PKey<Private>,
    cert: X509,
    chain: Vec<X509>,
}

impl Credential {
    /// Assemble a credential from already decoded parts.
    pub fn from_parts(key: PKey<Private>, cert: X509, chain: Vec<X509>) -> Self {
        Self { key, cert, chain }
    }

    /// Decode a password-protected PKCS#12 container.
    ///
    /// `password` may be empty but is always passed to the integrity check.
    pub fn from_pkcs12(der: &[u8], password: &str) -> Result<Self, Error> {
        let container = Pkcs12::from_der(der)
            .map_err(|e| Error::CredentialFormat(e.to_string()))?;
        let parsed = container
            .parse2(password)
            .map_err(Error::CredentialPassword)?;

        let key = parsed
            .pkey
            .ok_or_else(|| Error::CredentialFormat("container holds no private key".into()))?;
        let cert = parsed
            .cert
            .ok_or_else(|| Error::CredentialFormat("container holds no certificate".into()))?;
        let chain: Vec<X509> = parsed.ca.map(|ca| ca.into_iter().collect()).unwrap_or_default();

        log::debug!(
            "credential: loaded {} with {} chain certificate(s)",
            common_name(&cert),
            chain.len()
        );
        Ok(Self { key, cert, chain })
    }

    /// Read and decode a PKCS#12 container from disk.
    pub fn from_pkcs12_file(path: impl AsRef<Path>, password: &str) -> Result<Self, Error> {
        let der = fs::read(path.as_ref())?;
        Self::from_pkcs12(&der, password)
    }

    /// Decode PEM material: the first certificate is the leaf, any further
    /// certificates form the chain.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, Error> {
        let mut certs = X509::stack_from_pem(cert_pem)
            .map_err(|e| Error::CredentialFormat(e.to_string()))?
            .into_iter();
        let cert = certs
            .next()
            .ok_or_else(|| Error::CredentialFormat("no certificate in PEM input".into()))?;
        let key = PKey::private_key_from_pem(key_pem)
            .map_err(|e| Error::CredentialFormat(e.to_string()))?;
        Ok(Self {
            key,
            cert,
            chain: certs.collect(),
        })
    }

    /// Read PEM certificate and key files from disk.
    pub fn from_pem_files(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> Result<Self, Error> {
        let cert_pem = fs::read(cert_path.as_ref())?;
        let key_pem = fs::read(key_path.as_ref())?;
        Self::from_pem(&cert_pem, &key_pem)
    }

    pub fn key(&self) -> &PKey<Private> {
        &self.key
    }

    pub fn certificate(&self) -> &X509 {
        &self.cert
    }

    pub fn chain(&self) -> &[X509] {
        &self.chain
    }

    /// Common name of the leaf certificate, if it has one.
    pub fn subject(&self) -> String {
        common_name(&self.cert)
    }

    /// Put the chain in issuance order, starting at the certificate that
    /// issued the leaf.
    ///
    /// Certificates off that path (extra or cross-signed roots) follow in
    /// their original order; copies of the leaf are dropped.
    pub(crate) fn ordered_chain(&self) -> Vec<X509> {
        let mut remaining: Vec<X509> = self
            .chain
            .iter()
            .filter(|c| {
                let is_leaf = **c == self.cert;
                if is_leaf {
                    log::debug!("credential: skipping copy of the leaf in the chain");
                }
                !is_leaf
            })
            .cloned()
            .collect();
        let mut ordered = Vec::with_capacity(remaining.len());
        let mut current: X509 = self.cert.clone();

        while let Some(i) = remaining
            .iter()
            .position(|c| c.issued(&current) == X509VerifyResult::OK)
        {
            let issuer = remaining.remove(i);
            ordered.push(issuer.clone());
            current = issuer;
        }

        for extra in &remaining {
            log::debug!(
                "credential: {} is not on the issuance path of {}; presenting it last",
                common_name(extra),
                common_name(&self.cert)
            );
        }
        ordered.extend(remaining);
        ordered
    }

    /// Install into a library context: certificate, then key, then chain.
    ///
    /// Each step fails independently; the first failure aborts.
    pub(crate) fn apply_to<T: InstallTarget>(&self, target: &mut T) -> Result<(), Error> {
        target
            .install_certificate(&self.cert)
            .map_err(|e| install_failed(InstallStep::Certificate, e))?;
        target
            .install_private_key(&self.key)
            .map_err(|e| install_failed(InstallStep::PrivateKey, e))?;
        for cert in self.ordered_chain() {
            target
                .install_chain_certificate(cert)
                .map_err(|e| install_failed(InstallStep::Chain, e))?;
        }
        Ok(())
    }
}

/// Something a credential can be installed into, one step at a time.
pub(crate) trait InstallTarget {
    fn install_certificate(&mut self, cert: &X509Ref) -> Result<(), ErrorStack>;
    /// Bind the key; fails if it does not match the installed certificate.
    fn install_private_key(&mut self, key: &PKeyRef<Private>) -> Result<(), ErrorStack>;
    fn install_chain_certificate(&mut self, cert: X509) -> Result<(), ErrorStack>;
}

impl InstallTarget for SslContextBuilder {
    fn install_certificate(&mut self, cert: &X509Ref) -> Result<(), ErrorStack> {
        self.set_certificate(cert)
    }

    fn install_private_key(&mut self, key: &PKeyRef<Private>) -> Result<(), ErrorStack> {
        self.set_private_key(key)?;
        self.check_private_key()
    }

    fn install_chain_certificate(&mut self, cert: X509) -> Result<(), ErrorStack> {
        self.add_extra_chain_cert(cert)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("subject", &self.subject())
            .field("chain_len", &self.chain.len())
            .finish_non_exhaustive()
    }
}

fn install_failed(step: InstallStep, err: ErrorStack) -> Error {
    Error::CredentialInstall {
        step,
        reason: err.to_string(),
    }
}

fn common_name(cert: &X509Ref) -> String {
    cert.subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|e| e.data().as_utf8().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "<unnamed certificate>".to_string())
}
