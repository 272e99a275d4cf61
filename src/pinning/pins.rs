//! The per-domain allow-list of public-key pins.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

/// Prefix of every pin string.
pub const PIN_PREFIX: &str = "sha256//";

/// Hex characters in a SHA-256 digest.
const SHA256_HEX_LEN: usize = 64;

/// A pin entry that could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PinParseError {
    #[error("missing '=' between domain and pin in '{0}'")]
    MissingSeparator(String),
    #[error("empty domain in '{0}'")]
    EmptyDomain(String),
    #[error("pin '{0}' must be 'sha256//' followed by 64 hex characters")]
    MalformedPin(String),
}

/// Formats a SHA-256 digest as a pin string.
pub fn format_pin(digest: &[u8]) -> String {
    format!("{PIN_PREFIX}{}", hex::encode(digest))
}

/// Mapping from domain to the public-key hashes accepted for it.
///
/// Domains are compared case-insensitively and without a trailing dot. A
/// domain without an entry is not trusted at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinnedCertificateSet {
    pins: HashMap<String, HashSet<String>>,
}

impl PinnedCertificateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins compiled into the binary.
    ///
    /// Empty: leaf keys of the imagery CDN rotate with its certificates, so
    /// pins are supplied by the operator through configuration. Until they
    /// are, every HTTPS texture request fails closed.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Builds a set from `domain=sha256//<hex>` entries.
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Result<Self, PinParseError> {
        let mut set = Self::new();
        set.extend_from_entries(entries)?;
        Ok(set)
    }

    /// Adds `domain=sha256//<hex>` entries to the set.
    pub fn extend_from_entries<S: AsRef<str>>(&mut self, entries: &[S]) -> Result<(), PinParseError> {
        for entry in entries {
            let (domain, pin) = parse_entry(entry.as_ref())?;
            self.insert(&domain, &pin)?;
        }
        Ok(())
    }

    /// Accepts `pin` for `domain`.
    pub fn insert(&mut self, domain: &str, pin: &str) -> Result<(), PinParseError> {
        let domain = normalize_domain(domain);
        if domain.is_empty() {
            return Err(PinParseError::EmptyDomain(domain));
        }
        let pin = normalize_pin(pin)?;
        self.pins.entry(domain).or_default().insert(pin);
        Ok(())
    }

    /// Builder-style `insert`.
    pub fn with_pin(mut self, domain: &str, pin: &str) -> Result<Self, PinParseError> {
        self.insert(domain, pin)?;
        Ok(self)
    }

    /// Pins accepted for `domain`, or `None` if the domain has none.
    pub fn pins_for(&self, domain: &str) -> Option<&HashSet<String>> {
        self.pins
            .get(&normalize_domain(domain))
            .filter(|pins| !pins.is_empty())
    }

    pub fn contains_domain(&self, domain: &str) -> bool {
        self.pins_for(domain).is_some()
    }

    /// Whether `pin` is accepted for `domain`.
    pub fn is_pinned(&self, domain: &str, pin: &str) -> bool {
        self.pins_for(domain)
            .is_some_and(|pins| pins.contains(&pin.to_ascii_lowercase()))
    }

    /// Pinned domains, sorted.
    pub fn domains(&self) -> Vec<&str> {
        let mut domains: Vec<&str> = self
            .pins
            .iter()
            .filter(|(_, pins)| !pins.is_empty())
            .map(|(domain, _)| domain.as_str())
            .collect();
        domains.sort_unstable();
        domains
    }

    pub fn is_empty(&self) -> bool {
        self.domains().is_empty()
    }
}

/// Splits `domain=sha256//<hex>` into its parts.
pub fn parse_entry(entry: &str) -> Result<(String, String), PinParseError> {
    let (domain, pin) = entry
        .split_once('=')
        .ok_or_else(|| PinParseError::MissingSeparator(entry.to_string()))?;
    let domain = normalize_domain(domain);
    if domain.is_empty() {
        return Err(PinParseError::EmptyDomain(entry.to_string()));
    }
    Ok((domain, normalize_pin(pin)?))
}

fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

fn normalize_pin(pin: &str) -> Result<String, PinParseError> {
    let pin = pin.trim();
    let digest = pin
        .strip_prefix(PIN_PREFIX)
        .ok_or_else(|| PinParseError::MalformedPin(pin.to_string()))?;
    if digest.len() != SHA256_HEX_LEN || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(PinParseError::MalformedPin(pin.to_string()));
    }
    Ok(format!("{PIN_PREFIX}{}", digest.to_ascii_lowercase()))
}
