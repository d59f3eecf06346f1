//! Transaction Manager: ACID-like semantics over model edits.
//!
//! State machine: `ACTIVE` → (`COMMITTED` | `ROLLED_BACK`). One transaction
//! per model (the store's per-model lock makes this serializable by
//! construction). Handler failures never auto-rollback: the failed op is
//! recorded and surfaced, and the caller decides.

mod diff;
mod snapshot;

pub use diff::{DiffEntry, ModelDiff};
pub use snapshot::{Snapshot, SnapshotStrategy};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use smol_str::SmolStr;
use thiserror::Error;

use crate::base::{ErrorCode, ModelId, TransactionId};
use crate::model::{Model, ModelError, ModelStore};
use crate::ops::{OpRequest, OperationRegistry};

/// Transaction manager failures.
#[derive(Debug, Error)]
pub enum TxError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    #[error("transaction {transaction_id} is {state}, not ACTIVE")]
    InvalidState { transaction_id: TransactionId, state: TxState },

    #[error("snapshot failed for model {model_id}: {reason}")]
    SnapshotFailed { model_id: ModelId, reason: String },

    #[error("snapshot restoration failed for transaction {transaction_id}: {reason}")]
    SnapshotRestoreFailed { transaction_id: TransactionId, reason: String },

    #[error("commit validation failed: {reason}")]
    CommitValidationFailed { reason: String, rolled_back: bool },
}

impl TxError {
    /// The wire code this failure maps to.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Model(e) => e.code(),
            Self::TransactionNotFound(_) => ErrorCode::TransactionNotFound,
            Self::InvalidState { .. } => ErrorCode::TransactionFailed,
            Self::SnapshotFailed { .. } => ErrorCode::TransactionFailed,
            Self::SnapshotRestoreFailed { .. } => ErrorCode::TransactionFailed,
            Self::CommitValidationFailed { .. } => ErrorCode::ValidationFailed,
        }
    }
}

/// Transaction lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxState {
    Active,
    Committed,
    RolledBack,
}

impl std::fmt::Display for TxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Active => "ACTIVE",
            Self::Committed => "COMMITTED",
            Self::RolledBack => "ROLLED_BACK",
        })
    }
}

/// Tunables for snapshot selection and commit behavior.
#[derive(Clone, Copy, Debug)]
pub struct TxConfig {
    /// Component count at or above which the serialize strategy is used.
    pub serialize_component_threshold: usize,
    /// Serialized byte size at or above which the serialize strategy is used.
    pub serialize_byte_threshold: usize,
    /// Force rollback when commit-time validation fails (default: leave the
    /// transaction ACTIVE and let the caller decide).
    pub rollback_on_validation_failure: bool,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            serialize_component_threshold: 500,
            serialize_byte_threshold: 1 << 20,
            rollback_on_validation_failure: false,
        }
    }
}

/// Outcome of one operation inside a transaction.
#[derive(Clone, Debug, Serialize)]
pub struct OperationRecord {
    pub operation: SmolStr,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub result: serde_json::Value,
}

/// What `begin` returns.
#[derive(Clone, Debug, Serialize)]
pub struct TxBegin {
    pub transaction_id: TransactionId,
    pub snapshot_strategy: SnapshotStrategy,
    pub started_at: DateTime<Utc>,
}

/// What a successful commit returns.
#[derive(Clone, Debug, Serialize)]
pub struct CommitResult {
    pub diff: ModelDiff,
    pub operations_applied: usize,
    /// Present when commit-time validation ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<bool>,
}

/// One scoped, reversible batch of operations on a single model.
#[derive(Debug)]
pub struct Transaction {
    pub id: TransactionId,
    pub model_id: ModelId,
    pub state: TxState,
    pub strategy: SnapshotStrategy,
    pub started_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
    snapshot: Snapshot,
    diff: ModelDiff,
    operations: Vec<OperationRecord>,
}

impl Transaction {
    pub fn diff(&self) -> &ModelDiff {
        &self.diff
    }

    pub fn operations(&self) -> &[OperationRecord] {
        &self.operations
    }

    fn applied_count(&self) -> usize {
        self.operations.iter().filter(|r| r.ok).count()
    }
}

/// Manages every transaction's snapshot, diff, and state machine.
///
/// Terminal transactions stay registered (with their snapshots released) so
/// repeated commit or rollback is a typed state error rather than not-found.
#[derive(Debug, Default)]
pub struct TransactionManager {
    config: TxConfig,
    transactions: IndexMap<TransactionId, Transaction>,
}

impl TransactionManager {
    pub fn new(config: TxConfig) -> Self {
        Self { config, transactions: IndexMap::new() }
    }

    pub fn get(&self, id: &TransactionId) -> Result<&Transaction, TxError> {
        self.transactions
            .get(id)
            .ok_or_else(|| TxError::TransactionNotFound(id.clone()))
    }

    fn get_active(&mut self, id: &TransactionId) -> Result<&mut Transaction, TxError> {
        let tx = self
            .transactions
            .get_mut(id)
            .ok_or_else(|| TxError::TransactionNotFound(id.clone()))?;
        if tx.state != TxState::Active {
            return Err(TxError::InvalidState { transaction_id: id.clone(), state: tx.state });
        }
        Ok(tx)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Lock the model, take a snapshot, and open a transaction.
    pub fn begin(
        &mut self,
        store: &mut ModelStore,
        model_id: &ModelId,
        metadata: Option<serde_json::Value>,
    ) -> Result<TxBegin, TxError> {
        let model = store.get(model_id)?;
        let (strategy, snapshot) = snapshot::take_snapshot(
            model,
            self.config.serialize_component_threshold,
            self.config.serialize_byte_threshold,
        )
        .map_err(|reason| TxError::SnapshotFailed { model_id: model_id.clone(), reason })?;

        let id = TransactionId::generate();
        store.lock(model_id, id.clone())?;

        let started_at = Utc::now();
        tracing::info!(
            transaction_id = %id,
            model_id = %model_id,
            strategy = %strategy,
            "transaction begun"
        );
        self.transactions.insert(
            id.clone(),
            Transaction {
                id: id.clone(),
                model_id: model_id.clone(),
                state: TxState::Active,
                strategy,
                started_at,
                metadata,
                snapshot,
                diff: ModelDiff::new(),
                operations: Vec::new(),
            },
        );
        Ok(TxBegin { transaction_id: id, snapshot_strategy: strategy, started_at })
    }

    /// Apply operations in submission order against the working copy.
    ///
    /// Processing stops at the first failed operation; the failure is
    /// recorded and returned, and the transaction stays ACTIVE.
    pub fn apply(
        &mut self,
        store: &mut ModelStore,
        ops: &OperationRegistry,
        id: &TransactionId,
        requests: &[OpRequest],
    ) -> Result<Vec<OperationRecord>, TxError> {
        let tx = self.get_active(id)?;
        let mut records = Vec::with_capacity(requests.len());

        for request in requests {
            let model: &mut Model = match &mut tx.snapshot {
                Snapshot::WorkingCopy(working) => working,
                Snapshot::Serialized(_) => store.get_mut(&tx.model_id)?,
                Snapshot::Released => unreachable!("active transaction holds a snapshot"),
            };
            match ops.execute(model, &request.operation, &request.params) {
                Ok(outcome) => {
                    tx.diff.merge(&outcome, &request.operation);
                    records.push(OperationRecord {
                        operation: request.operation.clone(),
                        ok: true,
                        error_code: None,
                        error: None,
                        result: outcome.result,
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        transaction_id = %id,
                        operation = %request.operation,
                        %error,
                        "operation failed; transaction stays active"
                    );
                    records.push(OperationRecord {
                        operation: request.operation.clone(),
                        ok: false,
                        error_code: Some(error.code()),
                        error: Some(error.to_string()),
                        result: serde_json::Value::Null,
                    });
                    break;
                }
            }
        }

        tx.operations.extend(records.iter().cloned());
        Ok(records)
    }

    /// The current structural diff, without committing.
    pub fn diff(&self, id: &TransactionId) -> Result<&ModelDiff, TxError> {
        Ok(self.get(id)?.diff())
    }

    /// Validate (optionally), install the working copy, finalize the diff,
    /// and release the lock.
    ///
    /// Validation failure aborts the commit; unless
    /// [`TxConfig::rollback_on_validation_failure`] is set the transaction
    /// stays ACTIVE for the caller to roll back or keep editing.
    pub fn commit(
        &mut self,
        store: &mut ModelStore,
        id: &TransactionId,
        validate: bool,
    ) -> Result<CommitResult, TxError> {
        let rollback_on_failure = self.config.rollback_on_validation_failure;
        let tx = self.get_active(id)?;

        if validate {
            let model: &Model = match &tx.snapshot {
                Snapshot::WorkingCopy(working) => working,
                Snapshot::Serialized(_) => store.get(&tx.model_id)?,
                Snapshot::Released => unreachable!("active transaction holds a snapshot"),
            };
            if let Err(error) = model.validate() {
                let reason = error.to_string();
                tracing::warn!(transaction_id = %id, %reason, "commit validation failed");
                if rollback_on_failure {
                    self.rollback(store, id)?;
                }
                return Err(TxError::CommitValidationFailed {
                    reason,
                    rolled_back: rollback_on_failure,
                });
            }
        }

        let tx = self.get_active(id)?;
        match std::mem::replace(&mut tx.snapshot, Snapshot::Released) {
            Snapshot::WorkingCopy(working) => {
                store.replace(&tx.model_id, *working)?;
            }
            // Serialize strategy edits the live model; nothing to install.
            Snapshot::Serialized(_) => {}
            Snapshot::Released => unreachable!("active transaction holds a snapshot"),
        }
        tx.state = TxState::Committed;
        store.unlock(&tx.model_id, id);
        tracing::info!(transaction_id = %id, "transaction committed");

        Ok(CommitResult {
            diff: tx.diff.clone(),
            operations_applied: tx.applied_count(),
            validation: validate.then_some(true),
        })
    }

    /// Discard the working copy and release the lock.
    pub fn rollback(&mut self, store: &mut ModelStore, id: &TransactionId) -> Result<(), TxError> {
        let tx = self.get_active(id)?;
        match std::mem::replace(&mut tx.snapshot, Snapshot::Released) {
            // Working copy simply drops; the stored original was never touched.
            Snapshot::WorkingCopy(_) => {}
            Snapshot::Serialized(bytes) => match snapshot::restore(&bytes) {
                Ok(model) => {
                    store.replace(&tx.model_id, model)?;
                }
                Err(reason) => {
                    // Fatal for this transaction: forced terminal state.
                    tx.state = TxState::RolledBack;
                    let model_id = tx.model_id.clone();
                    store.unlock(&model_id, id);
                    return Err(TxError::SnapshotRestoreFailed {
                        transaction_id: id.clone(),
                        reason,
                    });
                }
            },
            Snapshot::Released => unreachable!("active transaction holds a snapshot"),
        }
        tx.state = TxState::RolledBack;
        store.unlock(&tx.model_id, id);
        tracing::info!(transaction_id = %id, "transaction rolled back");
        Ok(())
    }
}
