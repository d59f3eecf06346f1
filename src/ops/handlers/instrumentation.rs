//! Instrumentation operations: toggling functions, control loops.

use std::sync::Arc;

use semver::Version;
use serde_json::json;
use smol_str::SmolStr;

use crate::base::{ComponentId, Tag};
use crate::model::{Association, AssociationType, Model, Sensor};
use crate::ops::{
    Deprecation, DiffMeta, OpCategory, OpError, OperationDescriptor, OperationOutcome, ParamSpec,
    ParamType, Params,
};
use crate::registry::Registry;

pub(super) fn register(out: &mut Vec<OperationDescriptor>, registry: &Arc<Registry>) {
    out.push(toggle_instrumentation());
    out.push(add_control_loop(registry.clone()));
    out.push(remove_control_loop());
}

fn toggle_instrumentation() -> OperationDescriptor {
    OperationDescriptor {
        name: SmolStr::new("toggle_instrumentation"),
        version: Version::new(1, 0, 0),
        category: OpCategory::GraphDialect,
        description: SmolStr::new("Enable or disable an instrumentation function"),
        params: vec![
            ParamSpec::required("tag", ParamType::String, "Instrumentation function tag"),
            ParamSpec::optional("enabled", ParamType::Boolean, "Target state; omitted toggles"),
        ],
        diff: DiffMeta { modifies: true, ..DiffMeta::default() },
        deprecation: Deprecation::introduced("1.0.0"),
        handler: Box::new(|model: &mut Model, params: &Params<'_>| {
            let graph = model.as_graph_mut()?;
            let tag = Tag::new(params.str("tag")?);
            let explicit = match params.raw().get("enabled") {
                Some(serde_json::Value::Bool(b)) => Some(*b),
                Some(serde_json::Value::Null) | None => None,
                Some(_) => {
                    return Err(OpError::InvalidPayload {
                        operation: params.operation().clone(),
                        reason: "parameter `enabled` must be a boolean".into(),
                    });
                }
            };
            let function = graph
                .instrumentation_by_tag(&tag)
                .ok_or_else(|| crate::model::ModelError::TargetNotFound(tag.to_string()))?;
            function.enabled = explicit.unwrap_or(!function.enabled);
            let id = ComponentId::new(&function.id);
            let result = json!({ "tag": tag.as_str(), "enabled": function.enabled });
            Ok(OperationOutcome::modified(id, result))
        }),
        pre: None,
        post: None,
    }
}

fn add_control_loop(registry: Arc<Registry>) -> OperationDescriptor {
    OperationDescriptor {
        name: SmolStr::new("add_control_loop"),
        version: Version::new(1, 1, 0),
        category: OpCategory::GraphDialect,
        description: SmolStr::new("Attach a control loop: sensor on a host item, measuring into a function"),
        params: vec![
            ParamSpec::required("tag", ParamType::String, "Function tag (e.g. TIC-101)"),
            ParamSpec::required("host", ParamType::String, "Component the sensor is mounted on"),
            ParamSpec::required("sensor_tag", ParamType::String, "Sensor tag (e.g. TT-101)"),
            ParamSpec::optional("sensor_kind", ParamType::String, "Sensor kind alias (default temperature_element)"),
        ],
        diff: DiffMeta { adds: true, ..DiffMeta::default() },
        deprecation: Deprecation::introduced("1.0.0"),
        handler: Box::new(move |model: &mut Model, params: &Params<'_>| {
            let sensor_kind =
                registry.resolve(params.opt_str("sensor_kind")?.unwrap_or("temperature_element"))?;
            let graph = model.as_graph_mut()?;
            let host = graph.resolve_target(params.str("host")?)?;
            let tag = Tag::new(params.str("tag")?);
            let sensor = Sensor {
                tag: Tag::new(params.str("sensor_tag")?),
                kind: sensor_kind,
                located_in: Some(host.clone()),
            };
            let function_id = graph.add_instrumentation(
                tag.clone(),
                vec![sensor],
                vec![Association { assoc_type: AssociationType::IsLocatedIn, item: host }],
            )?;
            let id = ComponentId::new(&function_id);
            let result = json!({ "id": function_id, "tag": tag.as_str() });
            Ok(OperationOutcome::added(id, result))
        }),
        pre: None,
        post: None,
    }
}

fn remove_control_loop() -> OperationDescriptor {
    OperationDescriptor {
        name: SmolStr::new("remove_control_loop"),
        version: Version::new(1, 0, 0),
        category: OpCategory::GraphDialect,
        description: SmolStr::new("Remove an instrumentation function and its sensors"),
        params: vec![ParamSpec::required("tag", ParamType::String, "Function tag")],
        diff: DiffMeta { removes: true, ..DiffMeta::default() },
        deprecation: Deprecation::introduced("1.0.0"),
        handler: Box::new(|model: &mut Model, params: &Params<'_>| {
            let graph = model.as_graph_mut()?;
            let tag = Tag::new(params.str("tag")?);
            let removed = graph.remove_instrumentation(&tag)?;
            let id = ComponentId::new(&removed.id);
            let result = json!({ "id": removed.id, "tag": tag.as_str() });
            Ok(OperationOutcome::removed(id, result))
        }),
        pre: None,
        post: None,
    }
}
