use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 digest addressing one store entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    /// Digest of `name:signature`. No salt, so keys agree across processes and machines.
    pub fn derive(name: &str, signature: &str) -> Self {
        Self::digest([name, ":", signature])
    }

    /// Digest of `name:signature:` followed by the hex digest of `doc`.
    pub fn derive_documented(name: &str, signature: &str, doc: &str) -> Self {
        let doc_digest = hex_digest([doc]);
        Self::digest([name, ":", signature, ":", &doc_digest])
    }

    fn digest<'a>(parts: impl IntoIterator<Item = &'a str>) -> Self {
        Self(Arc::from(hex_digest(parts)))
    }

    /// Wraps an already computed digest, e.g. a key read back from the store.
    pub fn from_hex(hex: impl Into<String>) -> Option<Self> {
        let hex = hex.into();
        let well_formed =
            hex.len() == 64 && hex.bytes().all(|byte| matches!(byte, b'0'..=b'9' | b'a'..=b'f'));
        well_formed.then(|| Self(Arc::from(hex)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn hex_digest<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
