//! Machine-readable operation schema emission.
//!
//! External tool surfaces discover operations, their parameters, and their
//! deprecation state exclusively through this document.

use serde_json::{Value, json};

use super::descriptor::OperationDescriptor;

/// Emit the schema document for a set of descriptors.
pub(super) fn emit<'a>(descriptors: impl Iterator<Item = &'a OperationDescriptor>) -> Value {
    let operations: Vec<Value> = descriptors
        .map(|descriptor| {
            let params: Vec<Value> = descriptor
                .params
                .iter()
                .map(|p| {
                    json!({
                        "name": p.name,
                        "type": p.ty,
                        "required": p.required,
                        "description": p.description,
                    })
                })
                .collect();

            let mut op = json!({
                "name": descriptor.name,
                "version": descriptor.version.to_string(),
                "category": descriptor.category,
                "description": descriptor.description,
                "params": params,
                "diff": descriptor.diff,
                "introduced": descriptor.deprecation.introduced.to_string(),
            });
            if let Some(deprecated_in) = &descriptor.deprecation.deprecated_in {
                op["deprecated_in"] = json!(deprecated_in.to_string());
            }
            if let Some(removal) = &descriptor.deprecation.removal_planned {
                op["removal_planned"] = json!(removal.to_string());
            }
            if !descriptor.deprecation.replaces.is_empty() {
                op["replaces"] = json!(descriptor.deprecation.replaces);
            }
            op
        })
        .collect();

    json!({
        "schema_version": "1.0.0",
        "operations": operations,
    })
}
