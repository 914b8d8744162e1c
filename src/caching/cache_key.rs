//! Content fingerprints and composite cache keys.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::types::StageId;

/// Stable hash of whitespace-normalized input text.
///
/// Two textually identical inputs fingerprint identically regardless of
/// request metadata, and runs of whitespace collapse so that formatting
/// noise does not defeat the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a text.
    pub fn compute(text: &str) -> Self {
        let normalized = normalize_whitespace(text);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// The hex digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A short prefix for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collapse runs of whitespace to single spaces and trim the ends.
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Composite lookup key: one content fingerprint crossed with one stage.
///
/// Immutable; used only for lookup. Different stages over the same input
/// occupy distinct cache slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Fingerprint of the analyzed content
    pub fingerprint: Fingerprint,
    /// The stage whose output is cached under this key
    pub stage: StageId,
}

impl CacheKey {
    /// Build a key from a fingerprint and a stage id.
    pub fn new(fingerprint: Fingerprint, stage: StageId) -> Self {
        Self { fingerprint, stage }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.stage, self.fingerprint.short())
    }
}
