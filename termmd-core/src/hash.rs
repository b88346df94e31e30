use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

/// SHA-256 fingerprint of buffer or file content, as lowercase hex.
///
/// The empty fingerprint is the "never saved" sentinel and never equals the
/// fingerprint of any content, including the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn none() -> Self {
        Fingerprint(String::new())
    }

    pub fn is_none(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint `text` by hashing its UTF-8 bytes.
pub fn fingerprint(text: &str) -> Fingerprint {
    let digest = Sha256::digest(text.as_bytes());
    Fingerprint(format!("{:x}", digest))
}
