//! X.509 encoding: signing requests, the self-signed root and CA-signed
//! leaf certificates.
//!
//! Every artifact crosses this module's boundary as PEM text. All
//! signatures are SHA-256 over RSA keys loaded through [`crate::keys`].

use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::stack::Stack;
use openssl::x509::extension::{BasicConstraints, SubjectAlternativeName};
use openssl::x509::{X509, X509Builder, X509Name, X509Ref, X509Req, X509ReqBuilder, X509ReqRef};

use crate::error::{PkiError, PkiResult};
use crate::keys::{RsaPrivateKey, load_private_key};

const X509_VERSION_3: i32 = 2;
const X509_REQ_VERSION_1: i32 = 0;

/// Serials are positive and fit in 20 octets; the top bit is forced so the
/// value is never zero.
const SERIAL_BITS: i32 = 159;

const SAN: &str = "subjectAltName";

/// Distinguished-name fields of a certificate subject.
///
/// Encoded in a fixed order: country, province, locality, organisation,
/// common name, email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectFields {
    pub country: String,
    pub province: String,
    pub locality: String,
    pub organisation: String,
    pub common_name: String,
    pub email: String,
}

impl SubjectFields {
    fn to_x509_name(&self) -> PkiResult<X509Name> {
        let mut name = X509Name::builder()?;
        for (nid, value, label) in [
            (Nid::COUNTRYNAME, &self.country, "country"),
            (Nid::STATEORPROVINCENAME, &self.province, "province"),
            (Nid::LOCALITYNAME, &self.locality, "locality"),
            (Nid::ORGANIZATIONNAME, &self.organisation, "organisation"),
            (Nid::COMMONNAME, &self.common_name, "common name"),
            (Nid::PKCS9_EMAILADDRESS, &self.email, "email"),
        ] {
            name.append_entry_by_nid(nid, value)
                .map_err(crypto(&format!("Failed to set {label}")))?;
        }
        Ok(name.build())
    }
}

/// Build a CSR for `subject` carrying `alternative_names` as DNS entries.
///
/// The SubjectAlternativeName extension is attached even when the list is
/// empty, so the signature always covers it.
pub fn generate_csr(
    subject: &SubjectFields,
    alternative_names: &[String],
    private_key_pem: &str,
) -> PkiResult<String> {
    let key = signing_key(private_key_pem)?;
    let name = subject.to_x509_name()?;

    let mut builder = X509ReqBuilder::new()?;
    builder.set_version(X509_REQ_VERSION_1)?;
    builder
        .set_subject_name(&name)
        .map_err(crypto("Failed to set subject"))?;
    builder
        .set_pubkey(key.as_pkey())
        .map_err(crypto("Failed to set public key"))?;

    let san = {
        let ctx = builder.x509v3_context(None);
        subject_alt_name(alternative_names)
            .build(&ctx)
            .map_err(crypto("Failed to build SubjectAlternativeName"))?
    };
    let mut extensions = Stack::new()?;
    extensions.push(san)?;
    builder
        .add_extensions(&extensions)
        .map_err(crypto("Failed to add extensions"))?;

    builder
        .sign(key.as_pkey(), MessageDigest::sha256())
        .map_err(crypto("Failed to sign certificate request"))?;

    pem_string(builder.build().to_pem()?)
}

/// Build the self-signed root certificate.
///
/// Issuer equals subject, `BasicConstraints` is critical with `CA:TRUE` and
/// no path length, and the validity window is `now .. now + validity_days`.
pub fn generate_self_signed_certificate(
    subject: &SubjectFields,
    private_key_pem: &str,
    validity_days: u32,
) -> PkiResult<String> {
    let key = signing_key(private_key_pem)?;
    let name = subject.to_x509_name()?;

    let mut builder = X509::builder()?;
    builder.set_version(X509_VERSION_3)?;
    let serial = random_serial()?;
    builder.set_serial_number(&serial)?;
    builder
        .set_subject_name(&name)
        .map_err(crypto("Failed to set subject"))?;
    builder
        .set_issuer_name(&name)
        .map_err(crypto("Failed to set issuer"))?;
    builder
        .set_pubkey(key.as_pkey())
        .map_err(crypto("Failed to set public key"))?;
    set_validity(&mut builder, validity_days)?;

    let mut bc = BasicConstraints::new();
    bc.critical().ca();
    let extension = bc
        .build()
        .map_err(crypto("Failed to build BasicConstraints"))?;
    builder.append_extension(extension)?;

    builder
        .sign(key.as_pkey(), MessageDigest::sha256())
        .map_err(crypto("Failed to sign certificate"))?;

    pem_string(builder.build().to_pem()?)
}

/// Sign a CSR with the CA certificate and its private key.
///
/// The leaf keeps the CSR's subject and public key and carries over only
/// its DNS SubjectAlternativeName entries. A CSR without that extension is
/// rejected with [`PkiError::ExtensionMissing`] rather than issued with an
/// empty name list.
pub fn sign_csr(
    csr_pem: &str,
    ca_cert_pem: &str,
    ca_private_key_pem: &str,
    validity_days: u32,
) -> PkiResult<String> {
    let ca_key = signing_key(ca_private_key_pem)?;
    let csr = parse_csr(csr_pem)?;
    let ca_cert = parse_certificate(ca_cert_pem)?;

    if !ca_cert.public_key()?.public_eq(ca_key.as_pkey()) {
        return Err(PkiError::KeyMismatch(
            "private key does not belong to the CA certificate".into(),
        ));
    }

    let requester_key = csr.public_key()?;
    if !csr.verify(&requester_key)? {
        return Err(PkiError::MalformedCertificate(
            "certificate request signature does not verify".into(),
        ));
    }

    let names = requested_dns_names(&csr)?;

    let mut builder = X509::builder()?;
    builder.set_version(X509_VERSION_3)?;
    let serial = random_serial()?;
    builder.set_serial_number(&serial)?;
    builder
        .set_subject_name(csr.subject_name())
        .map_err(crypto("Failed to set subject"))?;
    builder
        .set_issuer_name(ca_cert.subject_name())
        .map_err(crypto("Failed to set issuer"))?;
    builder
        .set_pubkey(&requester_key)
        .map_err(crypto("Failed to set public key"))?;
    set_validity(&mut builder, validity_days)?;

    let san = {
        let ctx = builder.x509v3_context(Some(&ca_cert), None);
        subject_alt_name(&names)
            .build(&ctx)
            .map_err(crypto("Failed to build SubjectAlternativeName"))?
    };
    builder.append_extension(san)?;

    builder
        .sign(ca_key.as_pkey(), MessageDigest::sha256())
        .map_err(crypto("Failed to sign certificate"))?;

    pem_string(builder.build().to_pem()?)
}

pub fn parse_certificate(pem: &str) -> PkiResult<X509> {
    X509::from_pem(pem.as_bytes()).map_err(|e| PkiError::MalformedCertificate(e.to_string()))
}

pub fn parse_csr(pem: &str) -> PkiResult<X509Req> {
    X509Req::from_pem(pem.as_bytes()).map_err(|e| PkiError::MalformedCertificate(e.to_string()))
}

/// DNS entries of a certificate's SubjectAlternativeName, in encoded order.
pub fn dns_names(cert: &X509Ref) -> Vec<String> {
    cert.subject_alt_names()
        .map(|names| {
            names
                .iter()
                .filter_map(|name| name.dnsname().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

/// DNS entries requested by a CSR.
///
/// The request's extensions are replayed onto a scratch certificate so the
/// SubjectAlternativeName can be decoded with the certificate accessors.
pub fn requested_dns_names(csr: &X509ReqRef) -> PkiResult<Vec<String>> {
    let extensions = csr
        .extensions()
        .map_err(extension_request_error)?;

    let mut scratch = X509::builder()?;
    for extension in extensions {
        scratch.append_extension(extension)?;
    }
    let scratch = scratch.build();

    let names = scratch
        .subject_alt_names()
        .ok_or(PkiError::ExtensionMissing(SAN))?;
    Ok(names
        .iter()
        .filter_map(|name| name.dnsname().map(str::to_owned))
        .collect())
}

/// OpenSSL reports a request without an extension attribute as a failure
/// with an empty error queue; anything on the queue means the attribute
/// did not decode.
fn extension_request_error(err: ErrorStack) -> PkiError {
    if err.errors().is_empty() {
        PkiError::ExtensionMissing(SAN)
    } else {
        PkiError::MalformedCertificate(format!("undecodable request extensions: {err}"))
    }
}

/// Load a signing key; any failure to obtain a usable RSA key is reported
/// as a key mismatch.
fn signing_key(pem: &str) -> PkiResult<RsaPrivateKey> {
    load_private_key(pem).map_err(|e| PkiError::KeyMismatch(e.to_string()))
}

fn subject_alt_name(names: &[String]) -> SubjectAlternativeName {
    let mut san = SubjectAlternativeName::new();
    for name in names {
        san.dns(name);
    }
    san
}

fn random_serial() -> PkiResult<Asn1Integer> {
    let mut serial = BigNum::new()?;
    serial.rand(SERIAL_BITS, MsbOption::ONE, false)?;
    Ok(serial.to_asn1_integer()?)
}

fn set_validity(builder: &mut X509Builder, validity_days: u32) -> PkiResult<()> {
    let not_before = Asn1Time::days_from_now(0).map_err(crypto("Failed to create not_before"))?;
    let not_after =
        Asn1Time::days_from_now(validity_days).map_err(crypto("Failed to create not_after"))?;
    builder
        .set_not_before(&not_before)
        .map_err(crypto("Failed to set not_before"))?;
    builder
        .set_not_after(&not_after)
        .map_err(crypto("Failed to set not_after"))?;
    Ok(())
}

fn pem_string(pem: Vec<u8>) -> PkiResult<String> {
    String::from_utf8(pem).map_err(|e| PkiError::Crypto(format!("PEM output is not UTF-8: {e}")))
}

fn crypto(context: &str) -> impl FnOnce(ErrorStack) -> PkiError + '_ {
    move |e| PkiError::Crypto(format!("{context}: {e}"))
}
