//! Data model: the two dialects and the model store.
//!
//! A *Model* is either a [`GraphModel`] (the typed node-and-port dialect,
//! DEXPI-class) or a [`LinearModel`] (the string dialect, SFILES-class).
//! Models are created empty, mutated only through operations inside a
//! transaction, and removed by explicit deletion.

mod graph;
mod linear;
mod store;

pub use graph::{
    Association, AssociationType, AttrValue, Component, Connection, Endpoint, GraphModel,
    InstrumentationFunction, Network, Port, PortKind, Segment, Sensor, SignalLine,
};
pub use linear::{Control, LinearModel, Stream, Unit};
pub use store::{ModelStore, StoredModel};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

use crate::base::{ModelId, Tag, TransactionId};

/// Structural failures raised by model mutation and lookup.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model not found: {0}")]
    ModelNotFound(ModelId),

    #[error("tag already in use: {0}")]
    TagConflict(Tag),

    #[error("target not found: {0}")]
    TargetNotFound(String),

    #[error("target `{selector}` is ambiguous: {candidates:?}")]
    TargetAmbiguous { selector: String, candidates: Vec<String> },

    #[error("invalid connection: {0}")]
    ConnectionInvalid(String),

    #[error("position {position} out of range {low}..{high} (exclusive)")]
    PositionOutOfRange { position: f64, low: f64, high: f64 },

    #[error("segments are not adjacent: {0} and {1}")]
    SegmentsNotAdjacent(SmolStr, SmolStr),

    #[error("model {model_id} already has an active transaction {transaction_id}")]
    TransactionAlreadyActive { model_id: ModelId, transaction_id: TransactionId },

    #[error("dialect mismatch: expected {expected}, model is {actual}")]
    DialectMismatch { expected: ModelType, actual: ModelType },

    #[error("model invariant violated: {0}")]
    InvariantViolation(String),
}

impl ModelError {
    /// The wire code this failure maps to.
    pub fn code(&self) -> crate::base::ErrorCode {
        use crate::base::ErrorCode as Code;
        match self {
            Self::ModelNotFound(_) => Code::ModelNotFound,
            Self::TagConflict(_) => Code::TagConflict,
            Self::TargetNotFound(_) => Code::TargetNotFound,
            Self::TargetAmbiguous { .. } => Code::TargetAmbiguous,
            Self::ConnectionInvalid(_) => Code::ConnectionInvalid,
            Self::PositionOutOfRange { .. } => Code::PositionOutOfRange,
            Self::SegmentsNotAdjacent(_, _) => Code::SegmentsNotAdjacent,
            Self::TransactionAlreadyActive { .. } => Code::TransactionAlreadyActive,
            Self::DialectMismatch { .. } => Code::InvalidPayload,
            Self::InvariantViolation(_) => Code::ValidationFailed,
        }
    }
}

/// The two model dialects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Typed node-and-port graph (DEXPI-class).
    Graph,
    /// Ordered unit/stream notation (SFILES-class).
    Linear,
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Graph => "graph",
            Self::Linear => "linear",
        })
    }
}

/// Caller-supplied model metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub custom: IndexMap<SmolStr, serde_json::Value>,
}

/// A model in either dialect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dialect", rename_all = "snake_case")]
pub enum Model {
    Graph(GraphModel),
    Linear(LinearModel),
}

impl Model {
    /// Create an empty model of the given dialect.
    pub fn empty(model_type: ModelType, metadata: ModelMetadata) -> Self {
        match model_type {
            ModelType::Graph => Self::Graph(GraphModel::new(metadata)),
            ModelType::Linear => Self::Linear(LinearModel::new(metadata)),
        }
    }

    pub fn model_type(&self) -> ModelType {
        match self {
            Self::Graph(_) => ModelType::Graph,
            Self::Linear(_) => ModelType::Linear,
        }
    }

    pub fn metadata(&self) -> &ModelMetadata {
        match self {
            Self::Graph(m) => &m.metadata,
            Self::Linear(m) => &m.metadata,
        }
    }

    /// Borrow the graph dialect or fail with a dialect mismatch.
    pub fn as_graph(&self) -> Result<&GraphModel, ModelError> {
        match self {
            Self::Graph(m) => Ok(m),
            Self::Linear(_) => Err(ModelError::DialectMismatch {
                expected: ModelType::Graph,
                actual: ModelType::Linear,
            }),
        }
    }

    pub fn as_graph_mut(&mut self) -> Result<&mut GraphModel, ModelError> {
        match self {
            Self::Graph(m) => Ok(m),
            Self::Linear(_) => Err(ModelError::DialectMismatch {
                expected: ModelType::Graph,
                actual: ModelType::Linear,
            }),
        }
    }

    pub fn as_linear(&self) -> Result<&LinearModel, ModelError> {
        match self {
            Self::Linear(m) => Ok(m),
            Self::Graph(_) => Err(ModelError::DialectMismatch {
                expected: ModelType::Linear,
                actual: ModelType::Graph,
            }),
        }
    }

    pub fn as_linear_mut(&mut self) -> Result<&mut LinearModel, ModelError> {
        match self {
            Self::Linear(m) => Ok(m),
            Self::Graph(_) => Err(ModelError::DialectMismatch {
                expected: ModelType::Linear,
                actual: ModelType::Graph,
            }),
        }
    }

    /// Number of components (units in the linear dialect).
    pub fn component_count(&self) -> usize {
        match self {
            Self::Graph(m) => m.component_count(),
            Self::Linear(m) => m.units.len(),
        }
    }

    /// Run the dialect-specific whole-model validator.
    pub fn validate(&self) -> Result<(), ModelError> {
        match self {
            Self::Graph(m) => m.validate(),
            Self::Linear(m) => m.validate(),
        }
    }

    /// Rebuild derived lookup tables after deserialization.
    pub fn rebuild_indexes(&mut self) {
        if let Self::Graph(m) = self {
            m.rebuild_tag_index();
        }
    }
}
