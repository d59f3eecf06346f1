//! Proteus 4.2 XML: exporter, reimporter, ID registry, and structural
//! schema validation.
//!
//! The exporter emits a graph model as a `PlantModel` document in the
//! strict order the schema's referential integrity demands: equipment
//! (registering item and nozzle ids), then piping (systems, segments,
//! contained items, their connection points, then `Connection` elements),
//! then instrumentation (sensors first, information flows next,
//! associations last). Every cross-reference is validated against the ID
//! registry at emission time; the finished document is validated again by a
//! reader pass. The exporter never silently drops data.

mod attrs;
mod ids;
mod import;
mod nodes;
mod validate;
mod writer;

pub use ids::IdRegistry;
pub use import::import_model;
pub use nodes::{format_flow_indices, validate_flow_attribute};
pub use validate::validate_document;
pub use writer::export_model;

use chrono::{DateTime, FixedOffset};
use thiserror::Error;

use crate::base::ErrorCode;
use crate::registry::{RegistryError, SymbolError};

/// Export and import failures. Referential integrity violations,
/// schema-invalid output, and zero-node connection points are all fatal.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("reference to unregistered id `{id}` ({context})")]
    ReferenceUndefined { id: String, context: String },

    #[error("id `{id}` already registered")]
    DuplicateId { id: String },

    #[error("schema validation failed at {xpath}: {reason}")]
    XsdInvalid {
        element: String,
        attribute: Option<String>,
        xpath: String,
        reason: String,
    },

    #[error("cannot format flow indices for a component with zero nodes: xsd:positiveInteger (>= 1)")]
    ZeroNodeFlow,

    #[error("flow index value `{value}` invalid for {node_count} node(s)")]
    FlowIndexOutOfRange { value: String, node_count: usize },

    #[error("component `{tag}` has zero nodes; ConnectionPoints must not be emitted")]
    ZeroNodeConnectionPoints { tag: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Symbol(#[from] SymbolError),

    #[error("XML error: {0}")]
    Xml(String),
}

impl ExportError {
    pub fn xml(message: impl Into<String>) -> Self {
        Self::Xml(message.into())
    }

    /// The wire code this failure maps to.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ReferenceUndefined { .. } => ErrorCode::ReferenceUndefined,
            Self::DuplicateId { .. } => ErrorCode::ReferenceUndefined,
            Self::XsdInvalid { .. } => ErrorCode::XsdInvalid,
            Self::ZeroNodeFlow
            | Self::FlowIndexOutOfRange { .. }
            | Self::ZeroNodeConnectionPoints { .. } => ErrorCode::ValidationFailed,
            Self::Registry(e) => e.code(),
            Self::Symbol(_) => ErrorCode::ValidationFailed,
            Self::Xml(_) => ErrorCode::XsdInvalid,
        }
    }
}

/// Export parameters.
///
/// A pinned timestamp makes the output bit-stable; `symbol_confidence`
/// defaults to 1.0, refusing approximate symbol matches unless the caller
/// opts in.
#[derive(Clone, Debug)]
pub struct ExportOptions {
    pub originating_system: String,
    pub drawing_name: String,
    pub is_3d: bool,
    pub units: String,
    pub discipline: String,
    /// Document timestamp; `None` stamps the current time.
    pub timestamp: Option<DateTime<FixedOffset>>,
    /// Minimum symbol-resolution confidence; below it the export refuses.
    pub symbol_confidence: f64,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            originating_system: "plantgraph".into(),
            drawing_name: "PID-001".into(),
            is_3d: false,
            units: "mm".into(),
            discipline: "PID".into(),
            timestamp: None,
            symbol_confidence: 1.0,
        }
    }
}

/// The schema version the exporter targets.
pub const SCHEMA_VERSION: &str = "4.2";

/// The schema location attribute value.
pub const SCHEMA_LOCATION: &str = "Proteus_4.2.xsd";
