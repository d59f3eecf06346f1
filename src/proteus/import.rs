//! Minimal Proteus reader.
//!
//! Reads the exporter's own output back into a [`GraphModel`]: equipment
//! with nozzles, piping items with connection points, segments and
//! connections, and instrumentation with sensors, information flows, and
//! associations. Exported ids become the component ids, so a later export
//! can `reserve` them for a stable round-trip.

use indexmap::IndexMap;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use smol_str::SmolStr;

use super::ExportError;
use crate::base::{ComponentId, Tag};
use crate::model::{
    Association, AssociationType, AttrValue, Component, Connection, Endpoint, GraphModel,
    InstrumentationFunction, ModelMetadata, Network, Port, PortKind, Segment, Sensor, SignalLine,
};
use crate::registry::{Discipline, Registry};

/// Import a Proteus document produced by [`super::export_model`].
pub fn import_model(bytes: &[u8], registry: &Registry) -> Result<GraphModel, ExportError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut importer = Importer {
        registry,
        graph: GraphModel::new(ModelMetadata::default()),
        component: None,
        attribute_set: None,
        function: None,
        flow: None,
    };

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => importer.enter(&e)?,
            Ok(Event::Empty(e)) => {
                importer.enter(&e)?;
                importer.leave(name_of(&e))?;
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                importer.leave(name)?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(ExportError::xml(e.to_string())),
        }
        buf.clear();
    }

    let mut graph = importer.graph;
    graph.rebuild_tag_index();
    graph
        .validate()
        .map_err(|e| ExportError::xml(format!("imported model invalid: {e}")))?;
    Ok(graph)
}

fn name_of(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn attr(e: &BytesStart<'_>, key: &str) -> Result<Option<String>, ExportError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ExportError::xml(e.to_string()))?;
        if attr.key.as_ref() == key.as_bytes() {
            return Ok(Some(
                attr.unescape_value()
                    .map_err(|e| ExportError::xml(e.to_string()))?
                    .into_owned(),
            ));
        }
    }
    Ok(None)
}

fn required(e: &BytesStart<'_>, key: &str, element: &str) -> Result<String, ExportError> {
    attr(e, key)?.ok_or_else(|| ExportError::xml(format!("{element} is missing @{key}")))
}

/// A component being assembled from element children.
struct PendingComponent {
    component: Component,
    port_kind: PortKind,
}

struct PendingFunction {
    function: InstrumentationFunction,
}

struct Importer<'a> {
    registry: &'a Registry,
    graph: GraphModel,
    component: Option<PendingComponent>,
    /// Open GenericAttributes set name.
    attribute_set: Option<SmolStr>,
    function: Option<PendingFunction>,
    /// Open InformationFlow: (id, logical-start sensor tag).
    flow: Option<(SmolStr, Option<Tag>)>,
}

impl<'a> Importer<'a> {
    fn enter(&mut self, e: &BytesStart<'_>) -> Result<(), ExportError> {
        let name = name_of(e);
        match name.as_str() {
            "Equipment" => self.open_component(e, "Equipment", PortKind::Nozzle)?,
            "PipingComponent" => self.open_component(e, "PipingComponent", PortKind::Node)?,
            "Nozzle" => {
                let port_name = required(e, "ComponentName", "Nozzle")?;
                if let Some(pending) = &mut self.component {
                    pending.component.ports.push(Port::new(port_name, pending.port_kind));
                }
            }
            "ConnectionPoints" => {
                let count: usize = required(e, "NumPoints", "ConnectionPoints")?
                    .parse()
                    .map_err(|_| ExportError::xml("NumPoints must be an integer"))?;
                if let Some(pending) = &mut self.component {
                    for i in 0..count {
                        pending
                            .component
                            .ports
                            .push(Port::new(format!("N{}", i + 1), pending.port_kind));
                    }
                }
            }
            "GenericAttributes" => {
                self.attribute_set = attr(e, "Set")?.map(SmolStr::new);
            }
            "GenericAttribute" => self.read_attribute(e)?,
            "PipingNetworkSystem" => {
                let id = required(e, "ID", "PipingNetworkSystem")?;
                self.graph.networks.push(Network { id: SmolStr::new(id), segments: Vec::new() });
            }
            "PipingNetworkSegment" => {
                let id = required(e, "ID", "PipingNetworkSegment")?;
                let line_number = attr(e, "LineNumber")?.map(SmolStr::new);
                let network = self
                    .graph
                    .networks
                    .last_mut()
                    .ok_or_else(|| ExportError::xml("segment outside a network"))?;
                network.segments.push(Segment {
                    id: SmolStr::new(id),
                    line_number,
                    connections: Vec::new(),
                });
            }
            "Connection" => {
                let from = required(e, "FromID", "Connection")?;
                let from_node: usize = required(e, "FromNode", "Connection")?
                    .parse()
                    .map_err(|_| ExportError::xml("FromNode must be an integer"))?;
                let to = required(e, "ToID", "Connection")?;
                let to_node: usize = required(e, "ToNode", "Connection")?
                    .parse()
                    .map_err(|_| ExportError::xml("ToNode must be an integer"))?;
                if from_node == 0 || to_node == 0 {
                    return Err(ExportError::xml("node attributes are 1-based"));
                }
                let segment = self
                    .graph
                    .networks
                    .last_mut()
                    .and_then(|n| n.segments.last_mut())
                    .ok_or_else(|| ExportError::xml("connection outside a segment"))?;
                segment.connections.push(Connection {
                    from: Endpoint::new(ComponentId::new(from), from_node - 1),
                    to: Endpoint::new(ComponentId::new(to), to_node - 1),
                });
            }
            "ProcessInstrumentationFunction" => {
                let id = required(e, "ID", "ProcessInstrumentationFunction")?;
                let tag = required(e, "ComponentName", "ProcessInstrumentationFunction")?;
                self.function = Some(PendingFunction {
                    function: InstrumentationFunction {
                        id: SmolStr::new(id),
                        tag: Tag::new(tag),
                        enabled: true,
                        sensors: Vec::new(),
                        signal_lines: Vec::new(),
                        associations: Vec::new(),
                    },
                });
            }
            "ProcessSignalGeneratingFunction" => {
                let tag = required(e, "ID", "ProcessSignalGeneratingFunction")?;
                let class = required(e, "ComponentClass", "ProcessSignalGeneratingFunction")?;
                let kind = self.registry.resolve(&class)?;
                if let Some(pending) = &mut self.function {
                    pending.function.sensors.push(Sensor {
                        tag: Tag::new(tag),
                        kind,
                        located_in: None,
                    });
                }
            }
            "InformationFlow" => {
                let id = required(e, "ID", "InformationFlow")?;
                self.flow = Some((SmolStr::new(id), None));
            }
            "Association" => {
                let assoc_type = required(e, "Type", "Association")?;
                let item = required(e, "ItemID", "Association")?;
                if let Some((_, start)) = &mut self.flow {
                    if assoc_type == "has logical start" {
                        *start = Some(Tag::new(&item));
                    }
                    // "has logical end" is implied by the enclosing function.
                } else if let Some(pending) = &mut self.function {
                    let assoc_type = match assoc_type.as_str() {
                        "is located in" => AssociationType::IsLocatedIn,
                        "has logical start" => AssociationType::HasLogicalStart,
                        "has logical end" => AssociationType::HasLogicalEnd,
                        other => {
                            return Err(ExportError::xml(format!(
                                "unknown association type `{other}`"
                            )));
                        }
                    };
                    pending
                        .function
                        .associations
                        .push(Association { assoc_type, item: ComponentId::new(item) });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn leave(&mut self, name: String) -> Result<(), ExportError> {
        match name.as_str() {
            "Equipment" | "PipingComponent" => {
                if let Some(pending) = self.component.take() {
                    self.graph
                        .insert_component(pending.component)
                        .map_err(|e| ExportError::xml(e.to_string()))?;
                }
            }
            "GenericAttributes" => self.attribute_set = None,
            "InformationFlow" => {
                if let Some((id, start)) = self.flow.take() {
                    let from_sensor = start
                        .ok_or_else(|| ExportError::xml("InformationFlow without logical start"))?;
                    if let Some(pending) = &mut self.function {
                        pending.function.signal_lines.push(SignalLine { id, from_sensor });
                    }
                }
            }
            "ProcessInstrumentationFunction" => {
                if let Some(pending) = self.function.take() {
                    self.graph.instrumentation.push(pending.function);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn open_component(
        &mut self,
        e: &BytesStart<'_>,
        element: &str,
        port_kind: PortKind,
    ) -> Result<(), ExportError> {
        let id = required(e, "ID", element)?;
        let class = required(e, "ComponentClass", element)?;
        let tag = required(e, "ComponentName", element)?;
        let kind = self.registry.resolve(&class)?;
        let expected = match port_kind {
            PortKind::Nozzle => Discipline::Equipment,
            PortKind::Node => Discipline::Piping,
            PortKind::Signal => Discipline::Instrumentation,
        };
        if self.registry.def(&kind)?.discipline() != expected {
            return Err(ExportError::xml(format!(
                "{element} carries non-{expected} class {class}"
            )));
        }
        self.component = Some(PendingComponent {
            component: Component {
                id: ComponentId::new(id),
                kind,
                tag: Tag::new(tag),
                ports: Vec::new(),
                attributes: IndexMap::new(),
                custom_attributes: IndexMap::new(),
            },
            port_kind,
        });
        Ok(())
    }

    fn read_attribute(&mut self, e: &BytesStart<'_>) -> Result<(), ExportError> {
        let Some(set) = self.attribute_set.clone() else {
            return Ok(());
        };
        let Some(pending) = &mut self.component else {
            return Ok(());
        };
        let name = required(e, "Name", "GenericAttribute")?;
        let name = SmolStr::new(strip_assignment(&name));
        let format = required(e, "Format", "GenericAttribute")?;
        let value = required(e, "Value", "GenericAttribute")?;
        let units = attr(e, "Units")?;
        let language = attr(e, "Language")?;

        let slot = if set == "CustomAttributes" {
            &mut pending.component.custom_attributes
        } else {
            &mut pending.component.attributes
        };

        if let Some(language) = language {
            let entry = slot
                .entry(name)
                .or_insert_with(|| AttrValue::MultiLanguage(IndexMap::new()));
            if let AttrValue::MultiLanguage(languages) = entry {
                languages.insert(SmolStr::new(language), SmolStr::new(value));
            }
            return Ok(());
        }

        let parsed = match (format.as_str(), units) {
            ("double", Some(units)) => AttrValue::Quantity {
                value: value.parse().map_err(|_| ExportError::xml("invalid double"))?,
                units: SmolStr::new(units),
            },
            ("double", None) => AttrValue::Double(
                value.parse().map_err(|_| ExportError::xml("invalid double"))?,
            ),
            ("integer", _) => AttrValue::Integer(
                value.parse().map_err(|_| ExportError::xml("invalid integer"))?,
            ),
            ("boolean", _) => AttrValue::Boolean(
                value.parse().map_err(|_| ExportError::xml("invalid boolean"))?,
            ),
            ("enum", _) => AttrValue::Enum(SmolStr::new(value)),
            _ => AttrValue::String(SmolStr::new(value)),
        };
        slot.insert(name, parsed);
        Ok(())
    }
}

/// `DesignPressureAssignmentClass` → `design_pressure`.
fn strip_assignment(name: &str) -> String {
    let base = name.strip_suffix("AssignmentClass").unwrap_or(name);
    let mut out = String::with_capacity(base.len() + 4);
    for (i, c) in base.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_names_strip_back() {
        assert_eq!(strip_assignment("DesignPressureAssignmentClass"), "design_pressure");
        assert_eq!(strip_assignment("VolumeAssignmentClass"), "volume");
    }
}
