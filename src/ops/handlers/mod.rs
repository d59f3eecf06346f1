//! Built-in operation handlers.
//!
//! Handlers close over the component registry; they translate validated
//! payloads into model-layer primitives and report structural outcomes for
//! diff accumulation.

mod components;
mod instrumentation;
mod segments;
mod streams;

use std::sync::Arc;

use super::{OpError, OperationDescriptor};
use crate::model::AttrValue;
use crate::registry::Registry;

/// All built-in descriptors, registration order stable.
pub fn builtin_descriptors(registry: Arc<Registry>) -> Vec<OperationDescriptor> {
    let mut descriptors = Vec::new();
    components::register(&mut descriptors, &registry);
    segments::register(&mut descriptors, &registry);
    instrumentation::register(&mut descriptors, &registry);
    streams::register(&mut descriptors);
    descriptors
}

/// Decode a payload attribute value, naming the operation and attribute in
/// the failure.
pub(super) fn attr_from_json(
    operation: &smol_str::SmolStr,
    name: &str,
    value: &serde_json::Value,
) -> Result<AttrValue, OpError> {
    AttrValue::from_json(value).map_err(|reason| OpError::InvalidPayload {
        operation: operation.clone(),
        reason: format!("attribute `{name}`: {reason}"),
    })
}
