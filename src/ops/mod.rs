//! Operation Registry: a typed catalog of every state-changing operation.
//!
//! Dispatch is descriptor-keyed, not string-keyed: each operation carries a
//! stable name, a semver version, a structural input schema, a handler, and
//! diff metadata. The machine-readable schema emitted by
//! [`OperationRegistry::schema`] is the sole discovery channel for external
//! tool surfaces.

mod descriptor;
mod handlers;
mod params;
mod schema;

pub use descriptor::{
    Deprecation, DiffMeta, Handler, Hook, OpCategory, OperationDescriptor, ParamSpec, ParamType,
};
pub use handlers::builtin_descriptors;
pub use params::Params;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::sync::Arc;
use thiserror::Error;

use crate::base::ComponentId;
use crate::model::{Model, ModelError};
use crate::registry::{Registry, RegistryError};

/// Operation dispatch failures.
#[derive(Debug, Error)]
pub enum OpError {
    #[error("operation not found: {name}")]
    OperationNotFound { name: String },

    #[error("invalid payload for `{operation}`: {reason}")]
    InvalidPayload { operation: SmolStr, reason: String },

    #[error("validation failed for `{operation}`: {reason}")]
    ValidationFailed { operation: SmolStr, reason: String },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("operation `{operation}` failed: {source}")]
    Execution {
        operation: SmolStr,
        /// Wire code of the wrapped cause.
        code: crate::base::ErrorCode,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl OpError {
    /// The wire code this failure maps to.
    pub fn code(&self) -> crate::base::ErrorCode {
        use crate::base::ErrorCode as Code;
        match self {
            Self::OperationNotFound { .. } => Code::OperationNotFound,
            Self::InvalidPayload { .. } => Code::InvalidPayload,
            Self::ValidationFailed { .. } => Code::ValidationFailed,
            Self::Model(e) => e.code(),
            Self::Registry(e) => e.code(),
            Self::Execution { code, .. } => *code,
        }
    }
}

/// A single operation request: name plus JSON parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpRequest {
    pub operation: SmolStr,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// What an operation did to the model, for diff accumulation.
#[derive(Clone, Debug, Default)]
pub struct OperationOutcome {
    pub added: Vec<ComponentId>,
    pub removed: Vec<ComponentId>,
    pub modified: Vec<ComponentId>,
    /// Operation-specific payload surfaced to the caller.
    pub result: serde_json::Value,
}

impl OperationOutcome {
    pub fn added(id: ComponentId, result: serde_json::Value) -> Self {
        Self { added: vec![id], result, ..Self::default() }
    }

    pub fn removed(id: ComponentId, result: serde_json::Value) -> Self {
        Self { removed: vec![id], result, ..Self::default() }
    }

    pub fn modified(id: ComponentId, result: serde_json::Value) -> Self {
        Self { modified: vec![id], result, ..Self::default() }
    }
}

/// The descriptor-keyed operation catalog.
///
/// Append-only during startup, read-only thereafter.
pub struct OperationRegistry {
    ops: IndexMap<SmolStr, OperationDescriptor>,
}

impl OperationRegistry {
    /// An empty registry; callers register descriptor sets explicitly.
    pub fn new() -> Self {
        Self { ops: IndexMap::new() }
    }

    /// A registry carrying the built-in model operations.
    pub fn with_builtins(registry: Arc<Registry>) -> Self {
        let mut ops = Self::new();
        for descriptor in builtin_descriptors(registry) {
            ops.register(descriptor);
        }
        ops
    }

    /// Register a descriptor. Registering the same name twice is a
    /// programming error and panics at startup.
    pub fn register(&mut self, descriptor: OperationDescriptor) {
        let name = descriptor.name.clone();
        if self.ops.insert(name.clone(), descriptor).is_some() {
            panic!("operation `{name}` registered twice");
        }
    }

    pub fn get(&self, name: &str) -> Result<&OperationDescriptor, OpError> {
        self.ops
            .get(name)
            .ok_or_else(|| OpError::OperationNotFound { name: name.to_string() })
    }

    pub fn names(&self) -> impl Iterator<Item = &SmolStr> {
        self.ops.keys()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Validate the payload and execute the operation against the model,
    /// running pre/post hooks around the handler.
    pub fn execute(
        &self,
        model: &mut Model,
        name: &str,
        params: &serde_json::Value,
    ) -> Result<OperationOutcome, OpError> {
        let descriptor = self.get(name)?;
        descriptor.validate_payload(params)?;
        let params = Params::new(&descriptor.name, params);

        let hook_failure = |e: OpError| match e {
            failed @ OpError::ValidationFailed { .. } => failed,
            other => OpError::ValidationFailed {
                operation: descriptor.name.clone(),
                reason: other.to_string(),
            },
        };

        if let Some(pre) = &descriptor.pre {
            pre(model, &params).map_err(hook_failure)?;
        }

        tracing::debug!(operation = %descriptor.name, "executing operation");
        let outcome = (descriptor.handler)(model, &params)?;

        if let Some(post) = &descriptor.post {
            post(model, &params).map_err(hook_failure)?;
        }

        Ok(outcome)
    }

    /// The machine-readable operation schema (sole discovery channel).
    pub fn schema(&self) -> serde_json::Value {
        schema::emit(self.ops.values())
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
