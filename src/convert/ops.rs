//! Conversion operations, registered on top of the built-in catalog.

use indexmap::IndexMap;
use semver::Version;
use serde_json::json;
use smol_str::SmolStr;
use std::sync::Arc;

use super::{ConversionEngine, ConvertError};
use crate::base::{ComponentId, Tag};
use crate::model::{AttrValue, Model, ModelType};
use crate::ops::{
    Deprecation, DiffMeta, OpCategory, OpError, OperationDescriptor, OperationOutcome,
    OperationRegistry, ParamSpec, ParamType, Params,
};

/// Register the cross-dialect operations. Call once at startup, after the
/// built-ins.
pub fn register_conversion_ops(ops: &mut OperationRegistry, engine: Arc<ConversionEngine>) {
    ops.register(convert_model(engine.clone()));
    ops.register(instantiate_template(engine.clone()));
    ops.register(generalise_kinds(engine));
}

fn wrap(operation: &SmolStr, error: ConvertError) -> OpError {
    OpError::Execution {
        operation: operation.clone(),
        code: error.code(),
        source: Box::new(error),
    }
}

fn convert_model(engine: Arc<ConversionEngine>) -> OperationDescriptor {
    OperationDescriptor {
        name: SmolStr::new("convert_model"),
        version: Version::new(2, 0, 0),
        category: OpCategory::Strategic,
        description: SmolStr::new("Convert the model to the other dialect in place"),
        params: vec![ParamSpec::required(
            "to",
            ParamType::String,
            "Target dialect: `graph` or `linear`",
        )],
        diff: DiffMeta { adds: true, removes: true, modifies: true, ..DiffMeta::default() },
        deprecation: Deprecation::introduced("1.0.0"),
        handler: Box::new(move |model: &mut Model, params: &Params<'_>| {
            let target = match params.str("to")? {
                "graph" => ModelType::Graph,
                "linear" => ModelType::Linear,
                other => {
                    return Err(OpError::InvalidPayload {
                        operation: params.operation().clone(),
                        reason: format!("unknown dialect `{other}`"),
                    });
                }
            };
            if model.model_type() == target {
                return Err(OpError::InvalidPayload {
                    operation: params.operation().clone(),
                    reason: format!("model is already in the {target} dialect"),
                });
            }

            let (converted, added, removed) = match (&*model, target) {
                (Model::Linear(linear), ModelType::Graph) => {
                    let graph = engine
                        .linear_to_graph(linear)
                        .map_err(|e| wrap(params.operation(), e))?;
                    let added = graph.component_ids().cloned().collect();
                    let removed =
                        linear.units.keys().map(|u| ComponentId::new(u.as_str())).collect();
                    (Model::Graph(graph), added, removed)
                }
                (Model::Graph(graph), ModelType::Linear) => {
                    let linear = engine
                        .graph_to_linear(graph)
                        .map_err(|e| wrap(params.operation(), e))?;
                    let added =
                        linear.units.keys().map(|u| ComponentId::new(u.as_str())).collect();
                    let removed = graph.component_ids().cloned().collect();
                    (Model::Linear(linear), added, removed)
                }
                _ => unreachable!("dialect equality checked above"),
            };

            let count = converted.component_count();
            *model = converted;
            Ok(OperationOutcome {
                added,
                removed,
                modified: Vec::new(),
                result: json!({ "dialect": target, "components": count }),
            })
        }),
        pre: None,
        post: None,
    }
}

fn instantiate_template(engine: Arc<ConversionEngine>) -> OperationDescriptor {
    OperationDescriptor {
        name: SmolStr::new("instantiate_template"),
        version: Version::new(1, 1, 0),
        category: OpCategory::Strategic,
        description: SmolStr::new("Splice a block template's components and streams into the model"),
        params: vec![
            ParamSpec::required("template", ParamType::String, "Template name"),
            ParamSpec::optional("params", ParamType::Object, "Template parameter values"),
        ],
        diff: DiffMeta { adds: true, ..DiffMeta::default() },
        deprecation: Deprecation::introduced("1.0.0"),
        handler: Box::new(move |model: &mut Model, params: &Params<'_>| {
            let template = params.str("template")?;
            let mut args: IndexMap<SmolStr, String> = IndexMap::new();
            if let Some(map) = params.opt_object("params")? {
                for (key, value) in map {
                    let value = value.as_str().ok_or_else(|| OpError::InvalidPayload {
                        operation: params.operation().clone(),
                        reason: format!("template parameter `{key}` must be a string"),
                    })?;
                    args.insert(SmolStr::new(key), value.to_string());
                }
            }
            let instance = engine
                .templates()
                .instantiate(template, &args)
                .map_err(|e| wrap(params.operation(), e))?;

            let registry = engine.registry();
            let graph = model.as_graph_mut()?;
            let mut slots: IndexMap<SmolStr, ComponentId> = IndexMap::new();
            let mut added = Vec::new();
            for component in &instance.components {
                let kind = registry.resolve(&component.kind)?;
                let def = registry.def(&kind)?.clone();
                let prefix = registry.id_prefix(&kind)?;
                let id = graph.create_component_from_def(&def, &prefix, Tag::new(&component.tag))?;
                for (name, value) in &component.attributes {
                    let attr =
                        AttrValue::from_json(value).map_err(|reason| OpError::InvalidPayload {
                            operation: params.operation().clone(),
                            reason: format!("attribute `{name}`: {reason}"),
                        })?;
                    graph
                        .get_mut(&id)
                        .expect("component just created")
                        .attributes
                        .insert(name.clone(), attr);
                }
                slots.insert(component.slot.clone(), id.clone());
                added.push(id);
            }
            for (from, to) in &instance.streams {
                graph.connect(
                    crate::model::Endpoint::new(slots[from].clone(), 0),
                    crate::model::Endpoint::new(slots[to].clone(), 0),
                    None,
                )?;
            }

            let result = json!({
                "template": template,
                "components": added.iter().map(|id| id.as_str()).collect::<Vec<_>>(),
            });
            Ok(OperationOutcome { added, result, ..OperationOutcome::default() })
        }),
        pre: None,
        post: None,
    }
}

fn generalise_kinds(engine: Arc<ConversionEngine>) -> OperationDescriptor {
    OperationDescriptor {
        name: SmolStr::new("generalise_kinds"),
        version: Version::new(1, 0, 0),
        category: OpCategory::GraphDialect,
        description: SmolStr::new("Replace every variant kind with its family primary, for templating"),
        params: vec![],
        diff: DiffMeta { modifies: true, ..DiffMeta::default() },
        deprecation: Deprecation::introduced("1.0.0"),
        handler: Box::new(move |model: &mut Model, _params: &Params<'_>| {
            let registry = engine.registry();
            let graph = model.as_graph_mut()?;

            let mut replacements: Vec<(ComponentId, crate::registry::ComponentKind)> = Vec::new();
            for component in graph.components() {
                let family = registry
                    .family(component.kind.class_name())
                    .map_err(OpError::Registry)?;
                let primary = family.into_iter().next().expect("family is never empty");
                if primary != component.kind {
                    replacements.push((component.id.clone(), primary));
                }
            }
            let mut modified = Vec::new();
            for (id, primary) in replacements {
                graph.get_mut(&id).expect("component listed above").kind = primary;
                modified.push(id);
            }

            let result = json!({ "generalised": modified.len() });
            Ok(OperationOutcome { modified, result, ..OperationOutcome::default() })
        }),
        pre: None,
        post: None,
    }
}
