//! Proteus document compliance: shape, ordering, referential integrity,
//! and reimport isomorphism.

use chrono::{FixedOffset, TimeZone};
use plantgraph::base::Tag;
use plantgraph::convert::{ConversionEngine, TemplateLibrary};
use plantgraph::model::{AttrValue, GraphModel};
use plantgraph::proteus::{ExportOptions, export_model, import_model, validate_document};
use plantgraph::registry::Registry;
use smol_str::SmolStr;
use std::sync::Arc;

fn registry() -> Arc<Registry> {
    Arc::new(Registry::load().unwrap())
}

fn options() -> ExportOptions {
    ExportOptions {
        timestamp: Some(
            FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2026, 8, 1, 12, 0, 0)
                .unwrap(),
        ),
        ..ExportOptions::default()
    }
}

fn sample_graph(source: &str) -> (Arc<Registry>, GraphModel) {
    let registry = registry();
    let conversion = ConversionEngine::new(
        registry.clone(),
        Arc::new(TemplateLibrary::builtin().unwrap()),
    );
    let graph = conversion.sfiles_to_graph(source).unwrap();
    (registry, graph)
}

fn export(source: &str) -> String {
    let (registry, graph) = sample_graph(source);
    String::from_utf8(export_model(&graph, &registry, &options()).unwrap()).unwrap()
}

#[test]
fn document_outline_is_fixed() {
    let xml = export("tank[tank]->pump[pump]");

    // Root with schema location and no default namespace.
    assert!(xml.contains(r#"<PlantModel xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:noNamespaceSchemaLocation="Proteus_4.2.xsd">"#));
    assert!(!xml.contains("xmlns=\""));

    // PlantInformation attributes, with UnitsOfMeasure as its child.
    assert!(xml.contains(r#"SchemaVersion="4.2""#));
    assert!(xml.contains(r#"Date="2026-08-01""#));
    assert!(xml.contains(r#"Time="12:00:00+00:00""#));
    let info = xml.find("<PlantInformation").unwrap();
    let units = xml.find("<UnitsOfMeasure").unwrap();
    let info_end = xml.find("</PlantInformation>").unwrap();
    assert!(info < units && units < info_end);

    // Drawing leads with Presentation.
    let drawing = xml.find("<Drawing").unwrap();
    let presentation = xml.find("<Presentation").unwrap();
    assert!(drawing < presentation);

    // A pinned timestamp makes output bit-stable.
    let again = export("tank[tank]->pump[pump]");
    assert_eq!(xml, again);
}

#[test]
fn export_order_equipment_piping_instrumentation() {
    let xml = export("tank[tank]->valve[valve]->pump[pump]{LC}");

    let equipment = xml.find("<Equipment").unwrap();
    let piping = xml.find("<PipingNetworkSystem").unwrap();
    let valve = xml.find(r#"<PipingComponent ID="VLV0001""#).unwrap();
    let connection = xml.find("<Connection").unwrap();
    let instrumentation = xml.find("<ProcessInstrumentationFunction").unwrap();

    assert!(equipment < piping);
    assert!(valve < connection, "piping items register before connections reference them");
    assert!(piping < instrumentation);
}

#[test]
fn piping_items_carry_connection_points() {
    let xml = export("tank[tank]->valve[valve]->pump[pump]");
    assert!(xml.contains(r#"<ConnectionPoints NumPoints="2" FlowIn="1" FlowOut="2"/>"#));
}

#[test]
fn generic_attributes_emit_under_dexpi_set() {
    let (registry, mut graph) = sample_graph("tank[tank]");
    let id = graph.by_tag(&Tag::new("tank")).unwrap().id.clone();
    let component = graph.get_mut(&id).unwrap();
    component.attributes.insert(
        SmolStr::new("design_pressure"),
        AttrValue::Quantity { value: 2.5, units: SmolStr::new("bar") },
    );
    component.attributes.insert(
        SmolStr::new("insulated"),
        AttrValue::Boolean(true),
    );
    component
        .custom_attributes
        .insert(SmolStr::new("asset_code"), AttrValue::String(SmolStr::new("AX-9")));

    let xml = String::from_utf8(export_model(&graph, &registry, &options()).unwrap()).unwrap();
    assert!(xml.contains(r#"<GenericAttributes Set="DexpiAttributes" Number="2">"#));
    assert!(xml.contains(
        r#"<GenericAttribute Name="DesignPressureAssignmentClass" Format="double" Value="2.5" Units="bar"/>"#
    ));
    assert!(xml.contains(r#"<GenericAttribute Name="InsulatedAssignmentClass" Format="boolean" Value="true"/>"#));
    assert!(xml.contains(r#"<GenericAttributes Set="CustomAttributes" Number="1">"#));
}

#[test]
fn disabled_instrumentation_is_not_exported() {
    let (registry, mut graph) = sample_graph("r[reactor]{TC}");
    graph.instrumentation[0].enabled = false;
    let xml = String::from_utf8(export_model(&graph, &registry, &options()).unwrap()).unwrap();
    assert!(!xml.contains("ProcessInstrumentationFunction"));
}

/// Graph → XML → graph: isomorphic on tags, kinds, ports, connections, and
/// instrumentation associations.
#[test]
fn reimport_is_isomorphic() {
    let (registry, graph) = sample_graph("tank[tank]->valve[valve]->pump[pump]{TC}->col[column]");
    let bytes = export_model(&graph, &registry, &options()).unwrap();
    validate_document(&bytes).unwrap();
    let reimported = import_model(&bytes, &registry).unwrap();

    assert_eq!(reimported.component_count(), graph.component_count());
    for component in graph.components() {
        let twin = reimported.by_tag(&component.tag).expect("tag survives");
        assert_eq!(twin.kind, component.kind, "kind of {}", component.tag);
        assert_eq!(twin.ports.len(), component.ports.len(), "ports of {}", component.tag);
    }

    // Connections: compare as (from tag, from port, to tag, to port).
    let edge_set = |g: &GraphModel| {
        let mut edges: Vec<(String, usize, String, usize)> = g
            .connections()
            .map(|c| {
                (
                    g.get(&c.from.item).unwrap().tag.to_string(),
                    c.from.port,
                    g.get(&c.to.item).unwrap().tag.to_string(),
                    c.to.port,
                )
            })
            .collect();
        edges.sort();
        edges
    };
    assert_eq!(edge_set(&graph), edge_set(&reimported));

    // Instrumentation: function tags, sensors, and association targets.
    assert_eq!(reimported.instrumentation.len(), graph.instrumentation.len());
    let function = &graph.instrumentation[0];
    let twin = &reimported.instrumentation[0];
    assert_eq!(twin.tag, function.tag);
    assert_eq!(twin.sensors[0].tag, function.sensors[0].tag);
    assert_eq!(twin.signal_lines.len(), function.signal_lines.len());
    let original_target = graph.get(&function.associations[0].item).unwrap().tag.clone();
    let twin_target = reimported.get(&twin.associations[0].item).unwrap().tag.clone();
    assert_eq!(twin_target, original_target);
}

/// Exporting a reimported document reserves nothing implicitly: ids in the
/// reimported model are the exported ids.
#[test]
fn reimport_keeps_exported_ids() {
    let (registry, graph) = sample_graph("tank[tank]->pump[pump]");
    let bytes = export_model(&graph, &registry, &options()).unwrap();
    let reimported = import_model(&bytes, &registry).unwrap();
    assert!(reimported.get(&plantgraph::base::ComponentId::new("TNK0001")).is_some());
    assert!(reimported.get(&plantgraph::base::ComponentId::new("PMP0001")).is_some());
}

/// A below-threshold symbol match refuses the export by default.
#[test]
fn unknown_kind_refuses_export_at_full_confidence() {
    let (registry, graph) = sample_graph("tank[tank]");
    // Corrupt the kind behind the registry's back, as a stale JSON would.
    let json = serde_json::to_string(&graph).unwrap();
    let json = json.replace("\"Tank\"", "\"Tankk\"");
    let mut stale: GraphModel = serde_json::from_str(&json).unwrap();
    stale.rebuild_tag_index();

    let err = export_model(&stale, &registry, &options()).unwrap_err();
    assert!(matches!(err, plantgraph::proteus::ExportError::Symbol(_)));
}
