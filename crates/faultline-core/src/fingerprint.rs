//! Failure fingerprinting.
//!
//! A fingerprint is the SHA-256 of the failure's type, sanitized message,
//! source file and line, NUL-delimited. Captures that agree on those four
//! fields are the same error no matter which actor triggered them, because
//! the reporter identity is substituted out of the message before hashing.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable identity of a distinct failure; lowercase hex SHA-256.
///
/// Deserialization goes through [`FingerprintId::parse`], so an id read
/// from disk is always safe to use as a file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FingerprintId(String);

impl TryFrom<String> for FingerprintId {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw).ok_or_else(|| format!("invalid fingerprint '{raw}'"))
    }
}

impl From<FingerprintId> for String {
    fn from(id: FingerprintId) -> Self {
        id.0
    }
}

impl FingerprintId {
    /// Wrap an already computed hex digest (e.g. a unit file stem).
    ///
    /// Returns `None` unless `raw` is 64 lowercase hex characters.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = raw.len() == 64
            && raw
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(raw.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for compact listings.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for FingerprintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replace every occurrence of `reporter` in `text` with `placeholder`.
///
/// An empty reporter identity leaves the text untouched.
#[must_use]
pub fn sanitize(text: &str, reporter: &str, placeholder: &str) -> String {
    if reporter.is_empty() {
        return text.to_string();
    }
    text.replace(reporter, placeholder)
}

/// Hash an already sanitized `(type, message, file, line)` tuple.
#[must_use]
pub fn fingerprint_sanitized(kind: &str, message: &str, file: &str, line: u32) -> FingerprintId {
    const DELIMITER: &[u8] = b"\x00";

    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update(DELIMITER);
    hasher.update(message.as_bytes());
    hasher.update(DELIMITER);
    hasher.update(file.as_bytes());
    hasher.update(DELIMITER);
    hasher.update(line.to_string().as_bytes());

    FingerprintId(format!("{:x}", hasher.finalize()))
}

/// Sanitize `message` for `reporter`, then fingerprint the tuple.
#[must_use]
pub fn fingerprint(
    reporter: &str,
    placeholder: &str,
    kind: &str,
    message: &str,
    file: &str,
    line: u32,
) -> FingerprintId {
    let message = sanitize(message, reporter, placeholder);
    fingerprint_sanitized(kind, &message, file, line)
}
