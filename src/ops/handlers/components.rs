//! Component lifecycle operations: create, remove, update, retag, connect.

use std::sync::Arc;

use semver::Version;
use serde_json::json;
use smol_str::SmolStr;

use super::attr_from_json;
use crate::base::Tag;
use crate::model::{Endpoint, Model};
use crate::ops::{
    Deprecation, DiffMeta, OpCategory, OpError, OperationDescriptor, OperationOutcome, ParamSpec,
    ParamType, Params,
};
use crate::registry::{Discipline, Registry};

pub(super) fn register(out: &mut Vec<OperationDescriptor>, registry: &Arc<Registry>) {
    out.push(create_component(registry.clone()));
    out.push(add_equipment(registry.clone()));
    out.push(remove_component());
    out.push(update_component());
    out.push(retag_component());
    out.push(connect_components(registry.clone()));
    out.push(insert_valve(registry.clone()));
}

/// External port numbers are 1-based; convert to the internal 0-based index.
pub(super) fn internal_port(params: &Params<'_>, name: &str, default: usize) -> Result<usize, OpError> {
    let external = params.opt_usize(name)?.unwrap_or(default);
    if external == 0 {
        return Err(OpError::InvalidPayload {
            operation: params.operation().clone(),
            reason: format!("parameter `{name}` is 1-based; 0 is not a valid port"),
        });
    }
    Ok(external - 1)
}

fn apply_attributes(
    params: &Params<'_>,
    model: &mut crate::model::GraphModel,
    id: &crate::base::ComponentId,
) -> Result<bool, OpError> {
    let mut touched = false;
    for (param, custom) in [("attributes", false), ("custom_attributes", true)] {
        if let Some(map) = params.opt_object(param)? {
            let component = model.get_mut(id).expect("component just resolved");
            for (name, value) in map {
                let attr = attr_from_json(params.operation(), name, value)?;
                let slot = if custom {
                    &mut component.custom_attributes
                } else {
                    &mut component.attributes
                };
                slot.insert(SmolStr::new(name), attr);
                touched = true;
            }
        }
    }
    Ok(touched)
}

fn create_component(registry: Arc<Registry>) -> OperationDescriptor {
    OperationDescriptor {
        name: SmolStr::new("create_component"),
        version: Version::new(1, 2, 0),
        category: OpCategory::GraphDialect,
        description: SmolStr::new("Create a component of a catalogue kind with default ports"),
        params: vec![
            ParamSpec::required("kind", ParamType::String, "Registry alias or class name"),
            ParamSpec::required("tag", ParamType::String, "Unique component tag"),
            ParamSpec::optional("attributes", ParamType::Object, "Kind-specific attributes"),
            ParamSpec::optional("custom_attributes", ParamType::Object, "Non-catalogue attributes"),
        ],
        diff: DiffMeta { adds: true, ..DiffMeta::default() },
        deprecation: Deprecation::introduced("1.0.0"),
        handler: Box::new(move |model: &mut Model, params: &Params<'_>| {
            let kind = registry.resolve(params.str("kind")?)?;
            let def = registry.def(&kind)?.clone();
            let prefix = registry.id_prefix(&kind)?;
            let graph = model.as_graph_mut()?;
            let tag = Tag::new(params.str("tag")?);
            let id = graph.create_component_from_def(&def, &prefix, tag.clone())?;
            apply_attributes(params, graph, &id)?;
            let result = json!({
                "id": id.as_str(),
                "tag": tag.as_str(),
                "class_name": def.class_name,
            });
            Ok(OperationOutcome::added(id, result))
        }),
        pre: None,
        post: None,
    }
}

fn add_equipment(registry: Arc<Registry>) -> OperationDescriptor {
    let pre_registry = registry.clone();
    OperationDescriptor {
        name: SmolStr::new("add_equipment"),
        version: Version::new(1, 1, 0),
        category: OpCategory::Tactical,
        description: SmolStr::new("Create an equipment component (convenience over create_component)"),
        params: vec![
            ParamSpec::required("kind", ParamType::String, "Equipment alias or class name"),
            ParamSpec::required("tag", ParamType::String, "Unique component tag"),
            ParamSpec::optional("attributes", ParamType::Object, "Kind-specific attributes"),
        ],
        diff: DiffMeta { adds: true, ..DiffMeta::default() },
        deprecation: Deprecation::introduced("1.0.0"),
        handler: Box::new(move |model: &mut Model, params: &Params<'_>| {
            let kind = registry.resolve(params.str("kind")?)?;
            let def = registry.def(&kind)?.clone();
            let prefix = registry.id_prefix(&kind)?;
            let graph = model.as_graph_mut()?;
            let tag = Tag::new(params.str("tag")?);
            let id = graph.create_component_from_def(&def, &prefix, tag.clone())?;
            apply_attributes(params, graph, &id)?;
            let result = json!({
                "id": id.as_str(),
                "tag": tag.as_str(),
                "class_name": def.class_name,
            });
            Ok(OperationOutcome::added(id, result))
        }),
        pre: Some(Box::new(move |_model: &Model, params: &Params<'_>| {
            let kind = pre_registry.resolve(params.str("kind")?)?;
            let def = pre_registry.def(&kind)?;
            if def.discipline() != Discipline::Equipment {
                return Err(OpError::ValidationFailed {
                    operation: params.operation().clone(),
                    reason: format!("{} is not an equipment kind", def.class_name),
                });
            }
            Ok(())
        })),
        post: None,
    }
}

fn remove_component() -> OperationDescriptor {
    OperationDescriptor {
        name: SmolStr::new("remove_component"),
        version: Version::new(1, 0, 1),
        category: OpCategory::GraphDialect,
        description: SmolStr::new("Remove a component, optionally cascading to incident connections"),
        params: vec![
            ParamSpec::required("target", ParamType::String, "Component tag or id"),
            ParamSpec::optional("cascade", ParamType::Boolean, "Remove incident connections too"),
        ],
        diff: DiffMeta { removes: true, ..DiffMeta::default() },
        deprecation: Deprecation::introduced("1.0.0"),
        handler: Box::new(|model: &mut Model, params: &Params<'_>| {
            let graph = model.as_graph_mut()?;
            let id = graph.resolve_target(params.str("target")?)?;
            let cascade = params.bool_or("cascade", false)?;
            let removed = graph.remove_component(&id, cascade)?;
            let result = json!({ "id": id.as_str(), "tag": removed.tag.as_str() });
            Ok(OperationOutcome::removed(id, result))
        }),
        pre: None,
        post: None,
    }
}

fn update_component() -> OperationDescriptor {
    OperationDescriptor {
        name: SmolStr::new("update_component"),
        version: Version::new(1, 1, 0),
        category: OpCategory::GraphDialect,
        description: SmolStr::new("Merge attribute values into a component"),
        params: vec![
            ParamSpec::required("target", ParamType::String, "Component tag or id"),
            ParamSpec::optional("attributes", ParamType::Object, "Kind-specific attributes"),
            ParamSpec::optional("custom_attributes", ParamType::Object, "Non-catalogue attributes"),
        ],
        diff: DiffMeta { modifies: true, ..DiffMeta::default() },
        deprecation: Deprecation::introduced("1.0.0"),
        handler: Box::new(|model: &mut Model, params: &Params<'_>| {
            let graph = model.as_graph_mut()?;
            let id = graph.resolve_target(params.str("target")?)?;
            apply_attributes(params, graph, &id)?;
            let result = json!({ "id": id.as_str() });
            Ok(OperationOutcome::modified(id, result))
        }),
        pre: None,
        post: None,
    }
}

fn retag_component() -> OperationDescriptor {
    OperationDescriptor {
        name: SmolStr::new("retag_component"),
        version: Version::new(1, 0, 0),
        category: OpCategory::GraphDialect,
        description: SmolStr::new("Change a component tag, preserving uniqueness"),
        params: vec![
            ParamSpec::required("target", ParamType::String, "Component tag or id"),
            ParamSpec::required("new_tag", ParamType::String, "Replacement tag"),
        ],
        diff: DiffMeta { modifies: true, ..DiffMeta::default() },
        deprecation: Deprecation::introduced("1.0.0"),
        handler: Box::new(|model: &mut Model, params: &Params<'_>| {
            let graph = model.as_graph_mut()?;
            let id = graph.resolve_target(params.str("target")?)?;
            let old = graph.retag(&id, Tag::new(params.str("new_tag")?))?;
            let result = json!({ "id": id.as_str(), "old_tag": old.as_str() });
            Ok(OperationOutcome::modified(id, result))
        }),
        pre: None,
        post: None,
    }
}

/// Deprecated spelling of `connect_components` with `via_valve=true`. Stays
/// registered until the next major bump.
fn insert_valve(registry: Arc<Registry>) -> OperationDescriptor {
    OperationDescriptor {
        name: SmolStr::new("insert_valve"),
        version: Version::new(1, 0, 2),
        category: OpCategory::Tactical,
        description: SmolStr::new("Connect two components through a newly-inserted valve"),
        params: vec![
            ParamSpec::required("from", ParamType::String, "Source component tag or id"),
            ParamSpec::required("to", ParamType::String, "Target component tag or id"),
            ParamSpec::optional("valve_kind", ParamType::String, "Valve kind alias (default `valve`)"),
            ParamSpec::optional("valve_tag", ParamType::String, "Tag for the inserted valve"),
            ParamSpec::optional("line_number", ParamType::String, "Line number for the segments"),
        ],
        diff: DiffMeta { adds: true, modifies: true, ..DiffMeta::default() },
        deprecation: Deprecation {
            introduced: Version::new(1, 0, 0),
            deprecated_in: Some(Version::new(1, 3, 0)),
            removal_planned: Some(Version::new(2, 0, 0)),
            replaces: Vec::new(),
        },
        handler: Box::new(move |model: &mut Model, params: &Params<'_>| {
            let kind = registry.resolve(params.opt_str("valve_kind")?.unwrap_or("valve"))?;
            let def = registry.def(&kind)?.clone();
            let prefix = registry.id_prefix(&kind)?;

            let graph = model.as_graph_mut()?;
            let from = graph.resolve_target(params.str("from")?)?;
            let to = graph.resolve_target(params.str("to")?)?;
            let line_number = params.opt_str("line_number")?.map(SmolStr::new);

            let (valve, upstream, downstream) = connect_through_valve(
                graph,
                &def,
                &prefix,
                params.opt_str("valve_tag")?,
                (from.clone(), 0),
                (to.clone(), 0),
                line_number,
            )?;
            let result = json!({
                "valve": valve.as_str(),
                "segments": [upstream, downstream],
            });
            Ok(OperationOutcome {
                added: vec![valve],
                modified: vec![from, to],
                result,
                ..OperationOutcome::default()
            })
        }),
        pre: None,
        post: None,
    }
}

/// Create a valve and wire `from → valve → to`. Shared by
/// `connect_components(via_valve)` and the deprecated `insert_valve`.
fn connect_through_valve(
    graph: &mut crate::model::GraphModel,
    def: &crate::registry::KindDef,
    prefix: &str,
    tag: Option<&str>,
    from: (crate::base::ComponentId, usize),
    to: (crate::base::ComponentId, usize),
    line_number: Option<SmolStr>,
) -> Result<(crate::base::ComponentId, SmolStr, SmolStr), OpError> {
    let tag = match tag {
        Some(tag) => Tag::new(tag),
        None => {
            // Generate the first free V-n tag.
            let mut n = 1;
            loop {
                let candidate = Tag::new(format!("V-{n}"));
                if graph.by_tag(&candidate).is_none() {
                    break candidate;
                }
                n += 1;
            }
        }
    };
    let valve = graph.create_component_from_def(def, prefix, tag)?;
    let exit = def.port_count.saturating_sub(1);
    let upstream = graph.connect(
        Endpoint::new(from.0, from.1),
        Endpoint::new(valve.clone(), 0),
        line_number.clone(),
    )?;
    let downstream = graph.connect(
        Endpoint::new(valve.clone(), exit),
        Endpoint::new(to.0, to.1),
        line_number,
    )?;
    Ok((valve, upstream, downstream))
}

fn connect_components(registry: Arc<Registry>) -> OperationDescriptor {
    OperationDescriptor {
        name: SmolStr::new("connect_components"),
        version: Version::new(1, 3, 0),
        category: OpCategory::GraphDialect,
        description: SmolStr::new("Connect two components, optionally through a newly-inserted valve"),
        params: vec![
            ParamSpec::required("from", ParamType::String, "Source component tag or id"),
            ParamSpec::required("to", ParamType::String, "Target component tag or id"),
            ParamSpec::optional("from_port", ParamType::Integer, "1-based source port (default 1)"),
            ParamSpec::optional("to_port", ParamType::Integer, "1-based target port (default 1)"),
            ParamSpec::optional("line_number", ParamType::String, "Line number for the segment"),
            ParamSpec::optional("via_valve", ParamType::Boolean, "Insert a valve on the new line"),
            ParamSpec::optional("valve_kind", ParamType::String, "Valve kind alias (default `valve`)"),
            ParamSpec::optional("valve_tag", ParamType::String, "Tag for the inserted valve"),
        ],
        diff: DiffMeta { adds: true, modifies: true, ..DiffMeta::default() },
        deprecation: Deprecation {
            replaces: vec![SmolStr::new("insert_valve")],
            ..Deprecation::introduced("1.0.0")
        },
        handler: Box::new(move |model: &mut Model, params: &Params<'_>| {
            let via_valve = params.bool_or("via_valve", false)?;
            let valve_def = if via_valve {
                let kind = registry.resolve(params.opt_str("valve_kind")?.unwrap_or("valve"))?;
                Some((registry.def(&kind)?.clone(), registry.id_prefix(&kind)?))
            } else {
                None
            };

            let graph = model.as_graph_mut()?;
            let from = graph.resolve_target(params.str("from")?)?;
            let to = graph.resolve_target(params.str("to")?)?;
            let from_port = internal_port(params, "from_port", 1)?;
            let to_port = internal_port(params, "to_port", 1)?;
            let line_number = params.opt_str("line_number")?.map(SmolStr::new);

            match valve_def {
                None => {
                    let segment = graph.connect(
                        Endpoint::new(from.clone(), from_port),
                        Endpoint::new(to.clone(), to_port),
                        line_number,
                    )?;
                    let result = json!({
                        "segment": segment,
                        "from": from.as_str(),
                        "to": to.as_str(),
                    });
                    Ok(OperationOutcome {
                        modified: vec![from, to],
                        result,
                        ..OperationOutcome::default()
                    })
                }
                Some((def, prefix)) => {
                    let (valve, upstream, downstream) = connect_through_valve(
                        graph,
                        &def,
                        &prefix,
                        params.opt_str("valve_tag")?,
                        (from.clone(), from_port),
                        (to.clone(), to_port),
                        line_number,
                    )?;
                    let result = json!({
                        "valve": valve.as_str(),
                        "segments": [upstream, downstream],
                    });
                    Ok(OperationOutcome {
                        added: vec![valve],
                        modified: vec![from, to],
                        result,
                        ..OperationOutcome::default()
                    })
                }
            }
        }),
        pre: None,
        post: None,
    }
}
