//! Segment topology operations: inline insertion, split, merge, rewire.

use std::sync::Arc;

use semver::Version;
use serde_json::json;
use smol_str::SmolStr;

use super::components::internal_port;
use crate::base::Tag;
use crate::model::{Endpoint, Model};
use crate::ops::{
    Deprecation, DiffMeta, OpCategory, OperationDescriptor, OperationOutcome, ParamSpec, ParamType,
    Params,
};
use crate::registry::Registry;

pub(super) fn register(out: &mut Vec<OperationDescriptor>, registry: &Arc<Registry>) {
    out.push(insert_component(registry.clone()));
    out.push(split_segment());
    out.push(merge_segments());
    out.push(rewire_connection());
}

fn insert_component(registry: Arc<Registry>) -> OperationDescriptor {
    OperationDescriptor {
        name: SmolStr::new("insert_component"),
        version: Version::new(1, 1, 0),
        category: OpCategory::GraphDialect,
        description: SmolStr::new("Insert a component inline into a segment at a fractional position"),
        params: vec![
            ParamSpec::required("segment", ParamType::String, "Segment id"),
            ParamSpec::required("position", ParamType::Float, "Fractional position in (0, 1)"),
            ParamSpec::required("kind", ParamType::String, "Registry alias or class name"),
            ParamSpec::required("tag", ParamType::String, "Unique component tag"),
        ],
        diff: DiffMeta { adds: true, modifies: true, ..DiffMeta::default() },
        deprecation: Deprecation::introduced("1.0.0"),
        handler: Box::new(move |model: &mut Model, params: &Params<'_>| {
            let kind = registry.resolve(params.str("kind")?)?;
            let def = registry.def(&kind)?.clone();
            let prefix = registry.id_prefix(&kind)?;

            let graph = model.as_graph_mut()?;
            let segment = params.str("segment")?;
            let position = params.f64("position")?;

            // Built by hand so insertion into the segment stays atomic with
            // component creation.
            let port_kind = match def.discipline() {
                crate::registry::Discipline::Equipment => crate::model::PortKind::Nozzle,
                crate::registry::Discipline::Piping => crate::model::PortKind::Node,
                crate::registry::Discipline::Instrumentation => crate::model::PortKind::Signal,
            };
            let ports = (0..def.port_count)
                .map(|i| crate::model::Port::new(format!("N{}", i + 1), port_kind))
                .collect();
            let component = crate::model::Component {
                id: graph.next_id(&prefix),
                kind: def.kind(),
                tag: Tag::new(params.str("tag")?),
                ports,
                attributes: Default::default(),
                custom_attributes: Default::default(),
            };

            let id = graph.insert_inline(segment, position, component)?;
            let result = json!({ "id": id.as_str(), "segment": segment });
            Ok(OperationOutcome::added(id, result))
        }),
        pre: None,
        post: None,
    }
}

fn split_segment() -> OperationDescriptor {
    OperationDescriptor {
        name: SmolStr::new("split_segment"),
        version: Version::new(1, 0, 0),
        category: OpCategory::GraphDialect,
        description: SmolStr::new("Split a segment at a fractional position into two adjacent segments"),
        params: vec![
            ParamSpec::required("segment", ParamType::String, "Segment id"),
            ParamSpec::required("position", ParamType::Float, "Fractional position in (0, 1)"),
        ],
        diff: DiffMeta { modifies: true, ..DiffMeta::default() },
        deprecation: Deprecation::introduced("1.0.0"),
        handler: Box::new(|model: &mut Model, params: &Params<'_>| {
            let graph = model.as_graph_mut()?;
            let (head, tail) =
                graph.split_segment(params.str("segment")?, params.f64("position")?)?;
            let result = json!({ "segments": [head, tail] });
            Ok(OperationOutcome { result, ..OperationOutcome::default() })
        }),
        pre: None,
        post: None,
    }
}

fn merge_segments() -> OperationDescriptor {
    OperationDescriptor {
        name: SmolStr::new("merge_segments"),
        version: Version::new(1, 0, 0),
        category: OpCategory::GraphDialect,
        description: SmolStr::new("Merge two adjacent segments into one"),
        params: vec![
            ParamSpec::required("first", ParamType::String, "Segment ending at the shared component"),
            ParamSpec::required("second", ParamType::String, "Segment starting at the shared component"),
        ],
        diff: DiffMeta { modifies: true, ..DiffMeta::default() },
        deprecation: Deprecation::introduced("1.0.0"),
        handler: Box::new(|model: &mut Model, params: &Params<'_>| {
            let graph = model.as_graph_mut()?;
            let merged = graph.merge_segments(params.str("first")?, params.str("second")?)?;
            let result = json!({ "segment": merged });
            Ok(OperationOutcome { result, ..OperationOutcome::default() })
        }),
        pre: None,
        post: None,
    }
}

fn rewire_connection() -> OperationDescriptor {
    OperationDescriptor {
        name: SmolStr::new("rewire_connection"),
        version: Version::new(1, 3, 0),
        category: OpCategory::GraphDialect,
        description: SmolStr::new(
            "Repoint the target of a connection within a segment, optionally rerouting the old target's downstream connections",
        ),
        params: vec![
            ParamSpec::required("segment", ParamType::String, "Segment id"),
            ParamSpec::required("connection", ParamType::Integer, "0-based connection index"),
            ParamSpec::required("to", ParamType::String, "New target component tag or id"),
            ParamSpec::optional("to_port", ParamType::Integer, "1-based target port (default 1)"),
            ParamSpec::optional(
                "reroute_connections",
                ParamType::Boolean,
                "Later connections leaving the old target follow onto the new one",
            ),
        ],
        diff: DiffMeta { modifies: true, ..DiffMeta::default() },
        deprecation: Deprecation::introduced("1.0.0"),
        handler: Box::new(|model: &mut Model, params: &Params<'_>| {
            let graph = model.as_graph_mut()?;
            let target = graph.resolve_target(params.str("to")?)?;
            let port = internal_port(params, "to_port", 1)?;
            let rerouted = graph.rewire_connection(
                params.str("segment")?,
                params.usize("connection")?,
                Endpoint::new(target.clone(), port),
                params.bool_or("reroute_connections", false)?,
            )?;
            let result = json!({ "to": target.as_str(), "rerouted": rerouted });
            Ok(OperationOutcome::modified(target, result))
        }),
        pre: None,
        post: None,
    }
}
