//! Linear → graph expansion.
//!
//! Units resolve through the registry; block-listed kinds expand through the
//! template library, splicing their boundary ports in place of the unit.
//! Streams lower to connections (exit port 0 → entry port 0), controls to
//! instrumentation functions with sensing associations.

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{ConvertError, TemplateLibrary};
use crate::base::{ComponentId, Tag};
use crate::model::{
    Association, AssociationType, AttrValue, Endpoint, GraphModel, LinearModel, Sensor,
};
use crate::registry::Registry;

/// Splice points of one expanded unit.
struct Spliced {
    entry: Endpoint,
    exit: Endpoint,
    /// Component instrumentation attaches to (the entry item).
    host: ComponentId,
}

pub(super) fn linear_to_graph(
    linear: &LinearModel,
    registry: &Arc<Registry>,
    templates: &Arc<TemplateLibrary>,
    block_kinds: &FxHashSet<SmolStr>,
) -> Result<GraphModel, ConvertError> {
    let mut graph = GraphModel::new(linear.metadata.clone());
    let mut spliced: FxHashMap<SmolStr, Spliced> = FxHashMap::default();

    for unit in linear.units.values() {
        let splice = if block_kinds.contains(&unit.kind) {
            expand_block(&mut graph, registry, templates, &unit.kind, &unit.name)?
        } else {
            let kind = registry.resolve(&unit.kind)?;
            let def = registry.def(&kind)?.clone();
            let prefix = registry.id_prefix(&kind)?;
            let id = graph.create_component_from_def(&def, &prefix, Tag::new(&unit.name))?;
            Spliced {
                entry: Endpoint::new(id.clone(), 0),
                exit: Endpoint::new(id.clone(), 0),
                host: id,
            }
        };
        spliced.insert(unit.name.clone(), splice);
    }

    for stream in &linear.streams {
        let from = &spliced[&stream.from];
        let to = &spliced[&stream.to];
        let line_number = stream.tags.first().map(|t| SmolStr::new(t.as_str()));
        graph.connect(from.exit.clone(), to.entry.clone(), line_number)?;
    }

    // Controls: one instrumentation function per control, sequenced per
    // mnemonic (TC-1, TC-2, ...), sensor located on the unit's entry item.
    let mut sequence: BTreeMap<SmolStr, u32> = BTreeMap::new();
    for control in &linear.controls {
        let host = spliced[&control.unit].host.clone();
        let n = sequence.entry(control.kind.clone()).or_insert(0);
        *n += 1;
        let sensor_kind = registry.resolve(sensor_alias(&control.kind))?;
        let initial = control.kind.chars().next().unwrap_or('T');
        graph.add_instrumentation(
            Tag::new(format!("{}-{n}", control.kind)),
            vec![Sensor {
                tag: Tag::new(format!("{initial}T-{n}")),
                kind: sensor_kind,
                located_in: Some(host.clone()),
            }],
            vec![Association { assoc_type: AssociationType::IsLocatedIn, item: host }],
        )?;
    }

    tracing::debug!(
        units = linear.units.len(),
        components = graph.component_count(),
        "linear model expanded"
    );
    Ok(graph)
}

/// Sensor kind for a control mnemonic, keyed by the measured variable.
fn sensor_alias(mnemonic: &str) -> &'static str {
    match mnemonic.chars().next() {
        Some('F') => "flow_sensor",
        Some('L') => "level_element",
        Some('P') => "pressure_element",
        Some('A') => "analyzer_element",
        _ => "temperature_element",
    }
}

fn expand_block(
    graph: &mut GraphModel,
    registry: &Arc<Registry>,
    templates: &Arc<TemplateLibrary>,
    kind_token: &SmolStr,
    unit_name: &SmolStr,
) -> Result<Spliced, ConvertError> {
    // The unit name parameterizes tag prefixes: `boilers[power_block]`
    // yields BOILERS-BLR and friends.
    let mut args = IndexMap::new();
    args.insert(SmolStr::new("prefix"), unit_name.to_uppercase());
    let instance = templates.instantiate(kind_token, &args)?;

    let mut slots: FxHashMap<SmolStr, ComponentId> = FxHashMap::default();
    for component in &instance.components {
        let kind = registry.resolve(&component.kind)?;
        let def = registry.def(&kind)?.clone();
        let prefix = registry.id_prefix(&kind)?;
        let id = graph.create_component_from_def(&def, &prefix, Tag::new(&component.tag))?;
        for (name, value) in &component.attributes {
            let attr = AttrValue::from_json(value).map_err(|reason| ConvertError::Template {
                template: kind_token.clone(),
                reason: format!("attribute `{name}`: {reason}"),
            })?;
            graph
                .get_mut(&id)
                .expect("component just created")
                .attributes
                .insert(name.clone(), attr);
        }
        slots.insert(component.slot.clone(), id);
    }

    for (from, to) in &instance.streams {
        graph.connect(
            Endpoint::new(slots[from].clone(), 0),
            Endpoint::new(slots[to].clone(), 0),
            None,
        )?;
    }

    let boundary = |bounds: &[(SmolStr, usize)]| -> Result<Endpoint, ConvertError> {
        let (slot, port) = bounds.first().ok_or_else(|| ConvertError::Template {
            template: kind_token.clone(),
            reason: "template has no boundary port".into(),
        })?;
        Ok(Endpoint::new(slots[slot].clone(), *port))
    };
    let entry = boundary(&instance.inlets)?;
    let exit = boundary(&instance.outlets)?;
    let host = entry.item.clone();
    Ok(Spliced { entry, exit, host })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PortKind;
    use crate::sfiles::parse;

    fn engine_parts() -> (Arc<Registry>, Arc<TemplateLibrary>, FxHashSet<SmolStr>) {
        let registry = Arc::new(Registry::load().unwrap());
        let templates = Arc::new(TemplateLibrary::builtin().unwrap());
        let block_kinds = templates.names().cloned().collect();
        (registry, templates, block_kinds)
    }

    #[test]
    fn units_become_components_with_default_ports() {
        let (registry, templates, blocks) = engine_parts();
        let linear = parse("tank[tank]->pump[pump_reciprocating]->heater[heater]").unwrap();
        let graph = linear_to_graph(&linear, &registry, &templates, &blocks).unwrap();

        assert_eq!(graph.component_count(), 3);
        let pump = graph.by_tag(&Tag::new("pump")).unwrap();
        assert_eq!(pump.kind.class_name(), "ReciprocatingPump");
        assert_eq!(pump.ports.len(), 2);
        assert_eq!(pump.ports[0].kind, PortKind::Nozzle);
        assert_eq!(graph.connections().count(), 2);
        graph.validate().unwrap();
    }

    #[test]
    fn streams_connect_port_zero_to_port_zero() {
        let (registry, templates, blocks) = engine_parts();
        let linear = parse("a[tank]->b[pump]").unwrap();
        let graph = linear_to_graph(&linear, &registry, &templates, &blocks).unwrap();
        let connection = graph.connections().next().unwrap();
        assert_eq!(connection.from.port, 0);
        assert_eq!(connection.to.port, 0);
        assert_eq!(connection.from.external_port(), 1);
    }

    #[test]
    fn unknown_kind_fails_loud() {
        let (registry, templates, blocks) = engine_parts();
        let linear = parse("x[antigravity]").unwrap();
        let err = linear_to_graph(&linear, &registry, &templates, &blocks).unwrap_err();
        assert!(matches!(err, ConvertError::Registry(_)));
    }

    #[test]
    fn block_kind_expands_template() {
        let (registry, templates, blocks) = engine_parts();
        let linear = parse("feed[tank]->steam[power_block]->users[tank]").unwrap();
        let graph = linear_to_graph(&linear, &registry, &templates, &blocks).unwrap();

        // tank + 4 block components + tank
        assert_eq!(graph.component_count(), 6);
        assert!(graph.by_tag(&Tag::new("STEAM-BLR")).is_some());
        assert!(graph.by_tag(&Tag::new("STEAM-TRB")).is_some());
        // Inbound stream splices onto the boiler, outbound off the condenser.
        let boiler = graph.by_tag(&Tag::new("STEAM-BLR")).unwrap().id.clone();
        let condenser = graph.by_tag(&Tag::new("STEAM-CND")).unwrap().id.clone();
        let users = graph.by_tag(&Tag::new("users")).unwrap().id.clone();
        assert!(graph.connections().any(|c| c.to.item == boiler));
        assert!(
            graph
                .connections()
                .any(|c| c.from.item == condenser && c.to.item == users && c.from.port == 1)
        );
        graph.validate().unwrap();
    }

    #[test]
    fn missing_template_for_block_kind_is_typed() {
        let (registry, templates, mut blocks) = engine_parts();
        blocks.insert(SmolStr::new("heat_island"));
        let linear = parse("x[heat_island]").unwrap();
        let err = linear_to_graph(&linear, &registry, &templates, &blocks).unwrap_err();
        assert!(matches!(err, ConvertError::TemplateNotFound { .. }));
    }

    #[test]
    fn controls_become_instrumentation() {
        let (registry, templates, blocks) = engine_parts();
        let linear = parse("r[reactor]{TC}{LC}").unwrap();
        let graph = linear_to_graph(&linear, &registry, &templates, &blocks).unwrap();

        assert_eq!(graph.instrumentation.len(), 2);
        let tc = &graph.instrumentation[0];
        assert_eq!(tc.tag.as_str(), "TC-1");
        assert_eq!(tc.sensors[0].tag.as_str(), "TT-1");
        let host = graph.by_tag(&Tag::new("r")).unwrap().id.clone();
        assert_eq!(tc.associations[0].item, host);
        graph.validate().unwrap();
    }

    #[test]
    fn expansion_is_deterministic_up_to_ids() {
        let (registry, templates, blocks) = engine_parts();
        let linear = parse("f[tank]->s[separator](->h[heater])(->c[cooler])").unwrap();
        let first = linear_to_graph(&linear, &registry, &templates, &blocks).unwrap();
        let second = linear_to_graph(&linear, &registry, &templates, &blocks).unwrap();
        // Same counters, same catalogue: structurally identical.
        assert_eq!(first, second);
    }
}
