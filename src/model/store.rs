//! The model store: models by id, with per-model transaction locks.
//!
//! The store owns every model; transactions borrow a working copy and hand
//! ownership back on commit. One transaction per model at a time — the lock
//! is the `active_tx` marker acquired by `lock` and released by `unlock`.

use indexmap::IndexMap;

use super::{Model, ModelError};
use crate::base::{ModelId, TransactionId};

/// A stored model plus its lock state.
#[derive(Debug)]
pub struct StoredModel {
    pub model: Model,
    pub active_tx: Option<TransactionId>,
}

/// In-memory model store keyed by model id.
#[derive(Debug, Default)]
pub struct ModelStore {
    models: IndexMap<ModelId, StoredModel>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a model under a fresh id.
    pub fn insert(&mut self, model: Model) -> ModelId {
        let id = ModelId::generate();
        self.models.insert(id.clone(), StoredModel { model, active_tx: None });
        tracing::debug!(model_id = %id, "model stored");
        id
    }

    pub fn contains(&self, id: &ModelId) -> bool {
        self.models.contains_key(id)
    }

    pub fn get(&self, id: &ModelId) -> Result<&Model, ModelError> {
        self.models
            .get(id)
            .map(|s| &s.model)
            .ok_or_else(|| ModelError::ModelNotFound(id.clone()))
    }

    pub fn get_mut(&mut self, id: &ModelId) -> Result<&mut Model, ModelError> {
        self.models
            .get_mut(id)
            .map(|s| &mut s.model)
            .ok_or_else(|| ModelError::ModelNotFound(id.clone()))
    }

    /// Replace a stored model wholesale (commit installs the working copy).
    pub fn replace(&mut self, id: &ModelId, model: Model) -> Result<Model, ModelError> {
        let stored = self
            .models
            .get_mut(id)
            .ok_or_else(|| ModelError::ModelNotFound(id.clone()))?;
        Ok(std::mem::replace(&mut stored.model, model))
    }

    /// Remove a model. Fails while a transaction holds the lock.
    pub fn remove(&mut self, id: &ModelId) -> Result<Model, ModelError> {
        match self.models.get(id) {
            None => return Err(ModelError::ModelNotFound(id.clone())),
            Some(StoredModel { active_tx: Some(tx), .. }) => {
                return Err(ModelError::TransactionAlreadyActive {
                    model_id: id.clone(),
                    transaction_id: tx.clone(),
                });
            }
            Some(_) => {}
        }
        Ok(self.models.shift_remove(id).expect("checked above").model)
    }

    // ── Locking ─────────────────────────────────────────────────────

    /// Acquire the per-model lock for a transaction.
    pub fn lock(&mut self, id: &ModelId, tx: TransactionId) -> Result<(), ModelError> {
        let stored = self
            .models
            .get_mut(id)
            .ok_or_else(|| ModelError::ModelNotFound(id.clone()))?;
        if let Some(active) = &stored.active_tx {
            return Err(ModelError::TransactionAlreadyActive {
                model_id: id.clone(),
                transaction_id: active.clone(),
            });
        }
        stored.active_tx = Some(tx);
        Ok(())
    }

    /// Release the per-model lock. Only the holding transaction may release.
    pub fn unlock(&mut self, id: &ModelId, tx: &TransactionId) {
        if let Some(stored) = self.models.get_mut(id) {
            if stored.active_tx.as_ref() == Some(tx) {
                stored.active_tx = None;
            }
        }
    }

    pub fn is_locked(&self, id: &ModelId) -> bool {
        self.models.get(id).is_some_and(|s| s.active_tx.is_some())
    }

    pub fn model_ids(&self) -> impl Iterator<Item = &ModelId> {
        self.models.keys()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelMetadata, ModelType};

    #[test]
    fn lock_is_exclusive_per_model() {
        let mut store = ModelStore::new();
        let id = store.insert(Model::empty(ModelType::Graph, ModelMetadata::default()));
        let tx1 = TransactionId::generate();
        store.lock(&id, tx1.clone()).unwrap();

        let err = store.lock(&id, TransactionId::generate()).unwrap_err();
        assert!(matches!(err, ModelError::TransactionAlreadyActive { .. }));

        store.unlock(&id, &tx1);
        store.lock(&id, TransactionId::generate()).unwrap();
    }

    #[test]
    fn foreign_unlock_is_ignored() {
        let mut store = ModelStore::new();
        let id = store.insert(Model::empty(ModelType::Graph, ModelMetadata::default()));
        let holder = TransactionId::generate();
        store.lock(&id, holder).unwrap();
        store.unlock(&id, &TransactionId::generate());
        assert!(store.is_locked(&id));
    }

    #[test]
    fn locked_model_cannot_be_removed() {
        let mut store = ModelStore::new();
        let id = store.insert(Model::empty(ModelType::Linear, ModelMetadata::default()));
        store.lock(&id, TransactionId::generate()).unwrap();
        assert!(store.remove(&id).is_err());
    }
}
