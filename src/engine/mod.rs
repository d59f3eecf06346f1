//! The engine facade: one uniform entry point per model action.
//!
//! Owns the component registry, template library, operation registry, model
//! store, and transaction manager. All mutation happens on the calling
//! thread; the store and transaction state sit behind a single
//! `parking_lot::RwLock`, while per-model isolation is the store's own
//! transaction lock.

mod envelope;
mod format;

pub use envelope::{ErrorBody, ErrorEnvelope};
pub use format::FileFormat;

use parking_lot::RwLock;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::base::{ErrorCode, ModelId, TransactionId};
use crate::convert::{ConversionEngine, ConvertError, TemplateLibrary, register_conversion_ops};
use crate::model::{Model, ModelError, ModelMetadata, ModelStore, ModelType};
use crate::ops::{OpError, OpRequest, OperationRegistry};
use crate::proteus::{self, ExportError, ExportOptions};
use crate::registry::{Registry, RegistryError};
use crate::sfiles::{self, ParseError};
use crate::tx::{CommitResult, ModelDiff, OperationRecord, TransactionManager, TxBegin, TxConfig, TxError};

/// Engine-level failures: the union of every subsystem's error, plus the
/// facade's own.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Tx(#[from] TxError),

    #[error(transparent)]
    Op(#[from] OpError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported format: {format}")]
    UnsupportedFormat { format: String },
}

impl EngineError {
    /// The wire code this failure maps to.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Model(e) => e.code(),
            Self::Tx(e) => e.code(),
            Self::Op(e) => e.code(),
            Self::Registry(e) => e.code(),
            Self::Convert(e) => e.code(),
            Self::Export(e) => e.code(),
            Self::Parse(_) => ErrorCode::ParseError,
            Self::Io(_) => ErrorCode::InvalidPayload,
            Self::Json(_) => ErrorCode::ParseError,
            Self::UnsupportedFormat { .. } => ErrorCode::InvalidPayload,
        }
    }

    /// Wrap into the wire envelope.
    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::new(self)
    }
}

/// Content or path input for `model_load`.
#[derive(Clone, Debug)]
pub enum LoadSource {
    Content(String),
    Path(std::path::PathBuf),
}

impl LoadSource {
    fn read(&self) -> Result<String, EngineError> {
        match self {
            Self::Content(content) => Ok(content.clone()),
            Self::Path(path) => Ok(std::fs::read_to_string(path)?),
        }
    }
}

/// Commit-or-rollback selector for `model_tx_commit`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxAction {
    Commit,
    Rollback,
}

impl TxAction {
    pub fn parse(token: &str) -> Result<Self, EngineError> {
        match token {
            "commit" => Ok(Self::Commit),
            "rollback" => Ok(Self::Rollback),
            other => Err(EngineError::UnsupportedFormat { format: format!("action `{other}`") }),
        }
    }
}

/// Result of `model_tx_commit`.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TxOutcome {
    Committed(CommitResult),
    RolledBack { transaction_id: TransactionId },
}

struct EngineState {
    store: ModelStore,
    transactions: TransactionManager,
}

/// The diagram-intelligence engine.
pub struct Engine {
    registry: Arc<Registry>,
    conversion: Arc<ConversionEngine>,
    ops: OperationRegistry,
    export_options: ExportOptions,
    state: RwLock<EngineState>,
}

impl Engine {
    /// Build with default configuration. Registry or template load failures
    /// are fatal by contract.
    pub fn new() -> Result<Self, EngineError> {
        Self::with_config(TxConfig::default(), ExportOptions::default())
    }

    pub fn with_config(
        tx_config: TxConfig,
        export_options: ExportOptions,
    ) -> Result<Self, EngineError> {
        let registry = Arc::new(Registry::load()?);
        let templates = Arc::new(TemplateLibrary::builtin()?);
        let conversion = Arc::new(ConversionEngine::new(registry.clone(), templates));

        let mut ops = OperationRegistry::with_builtins(registry.clone());
        register_conversion_ops(&mut ops, conversion.clone());

        tracing::info!(operations = ops.len(), "engine ready");
        Ok(Self {
            registry,
            conversion,
            ops,
            export_options,
            state: RwLock::new(EngineState {
                store: ModelStore::new(),
                transactions: TransactionManager::new(tx_config),
            }),
        })
    }

    // ── Introspection ───────────────────────────────────────────────

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn conversion(&self) -> &Arc<ConversionEngine> {
        &self.conversion
    }

    /// The machine-readable operation schema — the sole discovery channel
    /// for external tool surfaces.
    pub fn operation_schema(&self) -> serde_json::Value {
        self.ops.schema()
    }

    // ── Model lifecycle ─────────────────────────────────────────────

    /// Create an empty model of the given dialect.
    pub fn model_create(&self, model_type: ModelType, metadata: ModelMetadata) -> ModelId {
        let mut state = self.state.write();
        state.store.insert(Model::empty(model_type, metadata))
    }

    /// Load a model from content or a file path.
    pub fn model_load(
        &self,
        model_type: ModelType,
        file_format: FileFormat,
        source: LoadSource,
    ) -> Result<ModelId, EngineError> {
        let content = source.read()?;
        let model = match (model_type, file_format) {
            (ModelType::Linear, FileFormat::Sfiles) => Model::Linear(sfiles::parse(&content)?),
            (ModelType::Graph, FileFormat::Sfiles) => {
                Model::Graph(self.conversion.sfiles_to_graph(&content)?)
            }
            (_, FileFormat::GraphJson) => {
                let mut model: Model = serde_json::from_str(&content)?;
                if model.model_type() != model_type {
                    return Err(EngineError::UnsupportedFormat {
                        format: format!(
                            "content is {} but {} was requested",
                            model.model_type(),
                            model_type
                        ),
                    });
                }
                model.rebuild_indexes();
                model.validate()?;
                model
            }
            (ModelType::Graph, FileFormat::ProteusXml) => {
                Model::Graph(proteus::import_model(content.as_bytes(), &self.registry)?)
            }
            (ModelType::Linear, FileFormat::ProteusXml) => {
                return Err(EngineError::UnsupportedFormat {
                    format: "proteus_xml only loads the graph dialect".into(),
                });
            }
        };
        let mut state = self.state.write();
        Ok(state.store.insert(model))
    }

    /// Serialize a model to the requested format.
    pub fn model_save(
        &self,
        model_id: &ModelId,
        file_format: FileFormat,
    ) -> Result<Vec<u8>, EngineError> {
        let state = self.state.read();
        let model = state.store.get(model_id)?;
        match (model, file_format) {
            (Model::Linear(linear), FileFormat::Sfiles) => {
                Ok(sfiles::canonical(linear).into_bytes())
            }
            (Model::Graph(graph), FileFormat::Sfiles) => {
                Ok(self.conversion.graph_to_sfiles(graph)?.into_bytes())
            }
            (model, FileFormat::GraphJson) => {
                let mut bytes = serde_json::to_vec_pretty(model)?;
                bytes.push(b'\n');
                Ok(bytes)
            }
            (Model::Graph(graph), FileFormat::ProteusXml) => {
                Ok(proteus::export_model(graph, &self.registry, &self.export_options)?)
            }
            (Model::Linear(_), FileFormat::ProteusXml) => Err(EngineError::UnsupportedFormat {
                format: "proteus_xml only saves the graph dialect".into(),
            }),
        }
    }

    /// Save to a path, detecting nothing: the caller names the format.
    pub fn model_save_to(
        &self,
        model_id: &ModelId,
        file_format: FileFormat,
        path: &Path,
    ) -> Result<(), EngineError> {
        let bytes = self.model_save(model_id, file_format)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Remove a model. Fails while a transaction holds its lock.
    pub fn model_delete(&self, model_id: &ModelId) -> Result<(), EngineError> {
        let mut state = self.state.write();
        state.store.remove(model_id)?;
        Ok(())
    }

    /// A by-value snapshot of a model.
    pub fn model_snapshot(&self, model_id: &ModelId) -> Result<Model, EngineError> {
        let state = self.state.read();
        Ok(state.store.get(model_id)?.clone())
    }

    // ── Transactions ────────────────────────────────────────────────

    pub fn model_tx_begin(
        &self,
        model_id: &ModelId,
        metadata: Option<serde_json::Value>,
    ) -> Result<TxBegin, EngineError> {
        let mut state = self.state.write();
        let EngineState { store, transactions } = &mut *state;
        Ok(transactions.begin(store, model_id, metadata)?)
    }

    pub fn model_tx_apply(
        &self,
        transaction_id: &TransactionId,
        requests: &[OpRequest],
    ) -> Result<Vec<OperationRecord>, EngineError> {
        let mut state = self.state.write();
        let EngineState { store, transactions } = &mut *state;
        Ok(transactions.apply(store, &self.ops, transaction_id, requests)?)
    }

    pub fn model_tx_diff(&self, transaction_id: &TransactionId) -> Result<ModelDiff, EngineError> {
        let state = self.state.read();
        Ok(state.transactions.diff(transaction_id)?.clone())
    }

    pub fn model_tx_commit(
        &self,
        transaction_id: &TransactionId,
        action: TxAction,
        validate: bool,
    ) -> Result<TxOutcome, EngineError> {
        let mut state = self.state.write();
        let EngineState { store, transactions } = &mut *state;
        match action {
            TxAction::Commit => {
                let result = transactions.commit(store, transaction_id, validate)?;
                Ok(TxOutcome::Committed(result))
            }
            TxAction::Rollback => {
                transactions.rollback(store, transaction_id)?;
                Ok(TxOutcome::RolledBack { transaction_id: transaction_id.clone() })
            }
        }
    }

    /// Whether a model currently has an active transaction.
    pub fn model_locked(&self, model_id: &ModelId) -> bool {
        self.state.read().store.is_locked(model_id)
    }
}
