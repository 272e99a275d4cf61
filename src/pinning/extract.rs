//! Public-key extraction from DER certificates.

use sha2::{Digest, Sha256};

use super::pins::format_pin;

/// Pin string (`sha256//<hex>`) of the certificate's SubjectPublicKeyInfo.
///
/// Returns `None` if the DER does not parse as an X.509 certificate.
pub(crate) fn spki_pin(cert_der: &[u8]) -> Option<String> {
    let (_, cert) = x509_parser::parse_x509_certificate(cert_der).ok()?;
    let spki = cert.tbs_certificate.subject_pki.raw;
    Some(format_pin(&Sha256::digest(spki)))
}

/// Subject distinguished name, for log messages.
pub(crate) fn subject(cert_der: &[u8]) -> Option<String> {
    let (_, cert) = x509_parser::parse_x509_certificate(cert_der).ok()?;
    Some(cert.tbs_certificate.subject.to_string())
}
