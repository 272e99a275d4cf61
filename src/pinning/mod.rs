//! TLS public-key pinning.
//!
//! A server is trusted only when its certificate chain passes standard WebPKI
//! validation *and* the SHA-256 hash of the leaf's SubjectPublicKeyInfo is in
//! the allow-list for the host being contacted. Hosts without an allow-list
//! entry are refused.
//!
//! Pins are written `sha256//<lowercase hex>`; one can be computed from a PEM
//! certificate with:
//!
//! ```text
//! openssl x509 -in cert.pem -pubkey -noout \
//!   | openssl pkey -pubin -outform der | sha256sum
//! ```

mod extract;
mod pins;
mod verifier;

pub use pins::{format_pin, parse_entry, PinParseError, PinnedCertificateSet, PIN_PREFIX};
pub use verifier::{CertificatePinner, PinningRejection, PinningVerifier};
