//! Engine-level and model-level identifiers.
//!
//! Model and transaction ids are UUID-backed and globally unique. Component
//! ids are opaque strings assigned by the owning model's per-prefix counter
//! (`PMP-1`, `TNK-3`, ...) and are stable across transactions: a rollback
//! never reuses or renumbers an id that was handed out.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use uuid::Uuid;

/// Identifier of a model held by the model store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(SmolStr);

impl ModelId {
    /// Generate a fresh UUID-backed model id.
    pub fn generate() -> Self {
        Self(SmolStr::new(Uuid::new_v4().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelId {
    fn from(s: &str) -> Self {
        Self(SmolStr::new(s))
    }
}

/// Identifier of a transaction managed by the transaction manager.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(SmolStr);

impl TransactionId {
    /// Generate a fresh UUID-backed transaction id.
    pub fn generate() -> Self {
        Self(SmolStr::new(Uuid::new_v4().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(s: &str) -> Self {
        Self(SmolStr::new(s))
    }
}

/// Stable, opaque identifier of a component within a model.
///
/// External consumers treat this as an opaque string; internally it is
/// `<prefix>-<n>` where `<prefix>` is the kind's id prefix and `<n>` a
/// per-prefix counter owned by the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(SmolStr);

impl ComponentId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(SmolStr::new(id.as_ref()))
    }

    /// Compose from a prefix and counter value.
    pub fn from_counter(prefix: &str, n: u32) -> Self {
        Self(SmolStr::new(format!("{prefix}-{n}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ComponentId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_id_from_counter() {
        let id = ComponentId::from_counter("PMP", 7);
        assert_eq!(id.as_str(), "PMP-7");
    }

    #[test]
    fn model_ids_are_unique() {
        assert_ne!(ModelId::generate(), ModelId::generate());
    }
}
