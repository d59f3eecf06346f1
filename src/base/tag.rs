//! Component tags.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A human-readable component tag (`P-101`, `TIC-205`).
///
/// Tags are free text but unique within a model; the uniqueness invariant is
/// enforced by the owning model, not here.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(SmolStr);

impl Tag {
    pub fn new(tag: impl AsRef<str>) -> Self {
        Self(SmolStr::new(tag.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Tag {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for Tag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
