//! Snapshot strategies.
//!
//! Small models are deep-copied: the transaction works on the clone and the
//! stored original is untouched until commit. Large models are serialized:
//! the transaction works on the live model and rollback reinstates from
//! bytes. The thresholds are tunables on [`TxConfig`](super::TxConfig).

use serde::Serialize;

use crate::model::Model;

/// How a transaction protects the original model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SnapshotStrategy {
    #[serde(rename = "DEEPCOPY")]
    DeepCopy,
    #[serde(rename = "SERIALIZE")]
    Serialize,
}

impl std::fmt::Display for SnapshotStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::DeepCopy => "DEEPCOPY",
            Self::Serialize => "SERIALIZE",
        })
    }
}

/// The snapshot held by an active transaction.
#[derive(Debug)]
pub enum Snapshot {
    /// Deep-copy strategy: the working copy lives on the transaction; the
    /// stored original is the de-facto snapshot.
    WorkingCopy(Box<Model>),
    /// Serialize strategy: the original's serialized form; the live model is
    /// edited in place.
    Serialized(Vec<u8>),
    /// Terminal states release snapshot resources eagerly.
    Released,
}

/// Classify a model and build the matching snapshot.
///
/// Returns the strategy plus the snapshot payload. The serialized form is
/// produced anyway for byte-size estimation of borderline models, so the
/// bytes are reused when the serialize strategy wins.
pub fn take_snapshot(
    model: &Model,
    component_limit: usize,
    byte_limit: usize,
) -> Result<(SnapshotStrategy, Snapshot), String> {
    if model.component_count() >= component_limit {
        let bytes = serde_json::to_vec(model).map_err(|e| e.to_string())?;
        return Ok((SnapshotStrategy::Serialize, Snapshot::Serialized(bytes)));
    }
    let bytes = serde_json::to_vec(model).map_err(|e| e.to_string())?;
    if bytes.len() >= byte_limit {
        Ok((SnapshotStrategy::Serialize, Snapshot::Serialized(bytes)))
    } else {
        Ok((SnapshotStrategy::DeepCopy, Snapshot::WorkingCopy(Box::new(model.clone()))))
    }
}

/// Deserialize a serialized snapshot back into a model.
pub fn restore(bytes: &[u8]) -> Result<Model, String> {
    let mut model: Model = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
    model.rebuild_indexes();
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelMetadata, ModelType};

    #[test]
    fn small_model_selects_deep_copy() {
        let model = Model::empty(ModelType::Graph, ModelMetadata::default());
        let (strategy, snapshot) = take_snapshot(&model, 500, 1 << 20).unwrap();
        assert_eq!(strategy, SnapshotStrategy::DeepCopy);
        assert!(matches!(snapshot, Snapshot::WorkingCopy(_)));
    }

    #[test]
    fn component_limit_selects_serialize() {
        let model = Model::empty(ModelType::Graph, ModelMetadata::default());
        let (strategy, snapshot) = take_snapshot(&model, 0, 1 << 20).unwrap();
        assert_eq!(strategy, SnapshotStrategy::Serialize);
        let Snapshot::Serialized(bytes) = snapshot else {
            panic!("expected serialized snapshot");
        };
        let restored = restore(&bytes).unwrap();
        assert_eq!(restored.model_type(), ModelType::Graph);
    }

    #[test]
    fn byte_limit_selects_serialize() {
        let model = Model::empty(ModelType::Linear, ModelMetadata::default());
        let (strategy, _) = take_snapshot(&model, 500, 1).unwrap();
        assert_eq!(strategy, SnapshotStrategy::Serialize);
    }
}
