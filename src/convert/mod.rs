//! Conversion Engine: bidirectional, canonicalizing translation between the
//! linear and graph dialects, including 1:many family expansion.
//!
//! Linear → graph resolves every bracketed kind through the registry,
//! expands block-listed kinds through the template library, and lowers
//! streams and controls into connections and instrumentation. Graph →
//! linear traverses topologically with a total tie-break and emits family
//! aliases, so round-trips are identity on topology up to family
//! generalisation.

mod condition;
mod contract;
mod expand;
mod ops;
mod template;

pub use condition::{ConditionError, evaluate as evaluate_condition};
pub use ops::register_conversion_ops;
pub use template::{
    BlockTemplate, InstanceComponent, TemplateBoundary, TemplateComponent, TemplateInstance,
    TemplateLibrary, TemplateParam, TemplateStream,
};

use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use std::sync::Arc;
use thiserror::Error;

use crate::base::ErrorCode;
use crate::model::{GraphModel, LinearModel, ModelError};
use crate::registry::{Registry, RegistryError};
use crate::sfiles::{self, ParseError};

/// Conversion failures. All fail-loud; there is no silent fallback.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("template not found: {name}")]
    TemplateNotFound { name: String },

    #[error(transparent)]
    Condition(#[from] ConditionError),

    #[error("template `{template}` invalid: {reason}")]
    Template { template: SmolStr, reason: String },

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl ConvertError {
    /// The wire code this failure maps to.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Registry(e) => e.code(),
            Self::Parse(_) => ErrorCode::ParseError,
            Self::TemplateNotFound { .. } => ErrorCode::TemplateNotFound,
            Self::Condition(_) => ErrorCode::ValidationFailed,
            Self::Template { .. } => ErrorCode::ValidationFailed,
            Self::Model(e) => e.code(),
        }
    }
}

/// The conversion engine: registry, templates, and the block list.
pub struct ConversionEngine {
    registry: Arc<Registry>,
    templates: Arc<TemplateLibrary>,
    /// Kind tokens that expand through the template library.
    block_kinds: FxHashSet<SmolStr>,
}

impl ConversionEngine {
    /// Engine with the default block list: every template name.
    pub fn new(registry: Arc<Registry>, templates: Arc<TemplateLibrary>) -> Self {
        let block_kinds = templates.names().cloned().collect();
        Self { registry, templates, block_kinds }
    }

    /// Replace the block list.
    pub fn with_block_kinds(mut self, kinds: impl IntoIterator<Item = SmolStr>) -> Self {
        self.block_kinds = kinds.into_iter().collect();
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn templates(&self) -> &Arc<TemplateLibrary> {
        &self.templates
    }

    /// Linear → graph: registry resolution, block expansion, stream and
    /// control lowering.
    pub fn linear_to_graph(&self, linear: &LinearModel) -> Result<GraphModel, ConvertError> {
        expand::linear_to_graph(linear, &self.registry, &self.templates, &self.block_kinds)
    }

    /// Graph → linear: topological traversal, family-alias emission.
    pub fn graph_to_linear(&self, graph: &GraphModel) -> Result<LinearModel, ConvertError> {
        contract::graph_to_linear(graph, &self.registry)
    }

    /// Parse an SFILES string and expand it to a graph model.
    pub fn sfiles_to_graph(&self, input: &str) -> Result<GraphModel, ConvertError> {
        let linear = sfiles::parse(input)?;
        self.linear_to_graph(&linear)
    }

    /// Contract a graph model and emit its canonical SFILES string.
    pub fn graph_to_sfiles(&self, graph: &GraphModel) -> Result<String, ConvertError> {
        let linear = self.graph_to_linear(graph)?;
        Ok(sfiles::canonical(&linear))
    }
}
