//! Content fingerprints for assembled archives.
//!
//! The fingerprint is the SHA-256 of the final zip bytes, after every
//! transform has run. It is stored in the creation request's tag so a later
//! build with byte-identical content can reuse the existing request.

use std::fmt;

use sha2::{Digest, Sha256};

/// Prefix marking a request tag as a content fingerprint.
pub const TAG_PREFIX: &str = "hash:";

/// Lowercase hex SHA-256 digest of archive bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint raw archive bytes.
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Fingerprint(format!("{:x}", hasher.finalize()))
    }

    /// Request tag carrying this fingerprint (`hash:<hex>`).
    pub fn tag(&self) -> String {
        format!("{}{}", TAG_PREFIX, self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
