//! Certificate fixtures generated at test time.
//!
//! EC P-256 keys keep generation fast. Also compiled into the library's
//! unit tests as `crate::test_support`.

#![allow(dead_code)]

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::stack::Stack;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage,
    SubjectAlternativeName, SubjectKeyIdentifier,
};
use openssl::x509::{X509Builder, X509NameBuilder, X509Ref, X509};

pub fn new_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn base_builder(cn: &str, issuer: Option<&X509Ref>, key: &PKey<Private>) -> X509Builder {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    let name = name.build();

    let mut b = X509Builder::new().unwrap();
    b.set_version(2).unwrap();
    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();
    b.set_serial_number(&serial.to_asn1_integer().unwrap()).unwrap();
    b.set_subject_name(&name).unwrap();
    match issuer {
        Some(issuer) => b.set_issuer_name(issuer.subject_name()).unwrap(),
        None => b.set_issuer_name(&name).unwrap(),
    }
    b.set_pubkey(key).unwrap();
    b.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    b.set_not_after(&Asn1Time::days_from_now(30).unwrap()).unwrap();
    b
}

fn ca_extensions(b: &mut X509Builder, issuer: Option<&X509Ref>) {
    b.append_extension(BasicConstraints::new().critical().ca().build().unwrap())
        .unwrap();
    b.append_extension(
        KeyUsage::new()
            .critical()
            .key_cert_sign()
            .crl_sign()
            .build()
            .unwrap(),
    )
    .unwrap();
    let ski = SubjectKeyIdentifier::new()
        .build(&b.x509v3_context(issuer, None))
        .unwrap();
    b.append_extension(ski).unwrap();
}

/// Self-signed root CA.
pub fn issue_ca(cn: &str) -> (PKey<Private>, X509) {
    let key = new_key();
    let mut b = base_builder(cn, None, &key);
    ca_extensions(&mut b, None);
    b.sign(&key, MessageDigest::sha256()).unwrap();
    (key, b.build())
}

/// Intermediate CA signed by `issuer`.
pub fn issue_intermediate(
    cn: &str,
    issuer_key: &PKey<Private>,
    issuer: &X509,
) -> (PKey<Private>, X509) {
    let key = new_key();
    let mut b = base_builder(cn, Some(issuer), &key);
    ca_extensions(&mut b, Some(issuer));
    let aki = AuthorityKeyIdentifier::new()
        .keyid(false)
        .build(&b.x509v3_context(Some(issuer), None))
        .unwrap();
    b.append_extension(aki).unwrap();
    b.sign(issuer_key, MessageDigest::sha256()).unwrap();
    (key, b.build())
}

/// Server leaf certificate for DNS name `cn`, signed by `issuer`.
pub fn issue_leaf(cn: &str, issuer_key: &PKey<Private>, issuer: &X509) -> (PKey<Private>, X509) {
    let key = new_key();
    let mut b = base_builder(cn, Some(issuer), &key);
    b.append_extension(BasicConstraints::new().build().unwrap())
        .unwrap();
    b.append_extension(
        KeyUsage::new()
            .critical()
            .digital_signature()
            .key_encipherment()
            .build()
            .unwrap(),
    )
    .unwrap();
    b.append_extension(ExtendedKeyUsage::new().server_auth().build().unwrap())
        .unwrap();
    let san = SubjectAlternativeName::new()
        .dns(cn)
        .build(&b.x509v3_context(Some(issuer), None))
        .unwrap();
    b.append_extension(san).unwrap();
    let aki = AuthorityKeyIdentifier::new()
        .keyid(false)
        .build(&b.x509v3_context(Some(issuer), None))
        .unwrap();
    b.append_extension(aki).unwrap();
    b.sign(issuer_key, MessageDigest::sha256()).unwrap();
    (key, b.build())
}

/// Bundle key, leaf and chain into a PKCS#12 container.
pub fn pkcs12_der(key: &PKey<Private>, leaf: &X509, chain: &[&X509], password: &str) -> Vec<u8> {
    let mut b = Pkcs12::builder();
    b.name("milli-tls test");
    b.pkey(key);
    b.cert(leaf);
    if !chain.is_empty() {
        let mut stack = Stack::new().unwrap();
        for c in chain {
            stack.push((*c).clone()).unwrap();
        }
        b.ca(stack);
    }
    b.build2(password).unwrap().to_der().unwrap()
}

/// Root CA plus a leaf for `cn`, packed as PKCS#12 with `password`.
pub struct ServerFixture {
    pub ca: X509,
    pub pfx: Vec<u8>,
}

pub fn server_fixture(cn: &str, password: &str) -> ServerFixture {
    let (ca_key, ca) = issue_ca("milli-tls test root");
    let (key, leaf) = issue_leaf(cn, &ca_key, &ca);
    let pfx = pkcs12_der(&key, &leaf, &[&ca], password);
    ServerFixture { ca, pfx }
}
