//! Proteus document construction.
//!
//! Emission order is fixed by referential integrity: equipment registers
//! item and nozzle ids; piping registers systems, segments, and contained
//! items before any `Connection` references them; instrumentation emits
//! sensors before the information flows that reference them, and
//! associations last within their parent.

use chrono::{SecondsFormat, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use std::io::Cursor;

use super::attrs::write_generic_attributes;
use super::ids::IdRegistry;
use super::nodes::format_flow_indices;
use super::{ExportError, ExportOptions, SCHEMA_LOCATION, SCHEMA_VERSION, validate};
use crate::base::ComponentId;
use crate::model::{Component, GraphModel, Segment};
use crate::registry::{Discipline, Registry, SymbolResolver};

/// Export a graph model to Proteus XML and validate the result.
pub fn export_model(
    graph: &GraphModel,
    registry: &Registry,
    options: &ExportOptions,
) -> Result<Vec<u8>, ExportError> {
    let mut exporter = Exporter {
        graph,
        registry,
        options,
        ids: IdRegistry::new(),
        emitted_piping: FxHashSet::default(),
    };
    let bytes = exporter.write()?;
    validate::validate_document(&bytes)?;
    tracing::debug!(bytes = bytes.len(), "Proteus document exported");
    Ok(bytes)
}

struct Exporter<'a> {
    graph: &'a GraphModel,
    registry: &'a Registry,
    options: &'a ExportOptions,
    ids: IdRegistry,
    emitted_piping: FxHashSet<ComponentId>,
}

type XmlWriter<'w> = Writer<&'w mut Cursor<Vec<u8>>>;

impl<'a> Exporter<'a> {
    fn write(&mut self) -> Result<Vec<u8>, ExportError> {
        // Symbol gate: every kind must resolve at or above the configured
        // confidence before anything is emitted.
        let resolver =
            SymbolResolver::new(self.registry).with_min_confidence(self.options.symbol_confidence);
        for component in self.graph.components() {
            resolver.resolve(component.kind.class_name())?;
        }

        let mut buffer = Cursor::new(Vec::new());
        let mut writer = Writer::new_with_indent(&mut buffer, b' ', 2);

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| ExportError::xml(e.to_string()))?;

        // Root: no default namespace, schema bound by location only.
        let mut root = BytesStart::new("PlantModel");
        root.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
        root.push_attribute(("xsi:noNamespaceSchemaLocation", SCHEMA_LOCATION));
        emit(&mut writer, Event::Start(root))?;

        self.write_plant_information(&mut writer)?;
        self.write_drawing(&mut writer)?;
        self.write_equipment(&mut writer)?;
        self.write_piping(&mut writer)?;
        self.write_instrumentation(&mut writer)?;

        emit(&mut writer, Event::End(BytesEnd::new("PlantModel")))?;

        let mut output = buffer.into_inner();
        output.push(b'\n');
        Ok(output)
    }

    fn write_plant_information(&self, writer: &mut XmlWriter<'_>) -> Result<(), ExportError> {
        let timestamp = self
            .options
            .timestamp
            .unwrap_or_else(|| Utc::now().fixed_offset());
        let date = timestamp.format("%Y-%m-%d").to_string();
        let rfc3339 = timestamp.to_rfc3339_opts(SecondsFormat::Secs, false);
        let mut info = BytesStart::new("PlantInformation");
        info.push_attribute(("SchemaVersion", SCHEMA_VERSION));
        info.push_attribute(("OriginatingSystem", self.options.originating_system.as_str()));
        info.push_attribute(("Date", date.as_str()));
        info.push_attribute(("Time", &rfc3339[11..]));
        info.push_attribute(("Is3D", if self.options.is_3d { "yes" } else { "no" }));
        info.push_attribute(("Units", self.options.units.as_str()));
        info.push_attribute(("Discipline", self.options.discipline.as_str()));
        emit(writer, Event::Start(info))?;

        // UnitsOfMeasure is a child of PlantInformation, not a sibling.
        let mut units = BytesStart::new("UnitsOfMeasure");
        units.push_attribute(("Distance", self.options.units.as_str()));
        emit(writer, Event::Empty(units))?;

        emit(writer, Event::End(BytesEnd::new("PlantInformation")))
    }

    fn write_drawing(&self, writer: &mut XmlWriter<'_>) -> Result<(), ExportError> {
        let mut drawing = BytesStart::new("Drawing");
        drawing.push_attribute(("Name", self.options.drawing_name.as_str()));
        drawing.push_attribute(("Type", self.options.discipline.as_str()));
        emit(writer, Event::Start(drawing))?;

        let mut presentation = BytesStart::new("Presentation");
        presentation.push_attribute(("Layer", "Default"));
        presentation.push_attribute(("LineType", "Solid"));
        presentation.push_attribute(("LineWeight", "0.25"));
        presentation.push_attribute(("R", "0"));
        presentation.push_attribute(("G", "0"));
        presentation.push_attribute(("B", "0"));
        emit(writer, Event::Empty(presentation))?;

        emit(writer, Event::Start(BytesStart::new("Extent")))?;
        let mut min = BytesStart::new("Min");
        min.push_attribute(("X", "0"));
        min.push_attribute(("Y", "0"));
        emit(writer, Event::Empty(min))?;
        let mut max = BytesStart::new("Max");
        max.push_attribute(("X", "841"));
        max.push_attribute(("Y", "594"));
        emit(writer, Event::Empty(max))?;
        emit(writer, Event::End(BytesEnd::new("Extent")))?;

        emit(writer, Event::End(BytesEnd::new("Drawing")))
    }

    // ── Phase 1: equipment ──────────────────────────────────────────

    fn write_equipment(&mut self, writer: &mut XmlWriter<'_>) -> Result<(), ExportError> {
        for component in self.graph.components() {
            if self.discipline_of(component)? != Discipline::Equipment {
                continue;
            }
            let prefix = self.registry.id_prefix(&component.kind)?;
            let id = self.ids.assign(component.id.as_str(), &prefix);

            let mut equipment = BytesStart::new("Equipment");
            equipment.push_attribute(("ID", id.as_str()));
            equipment.push_attribute(("ComponentClass", component.kind.class_name()));
            equipment.push_attribute(("ComponentName", component.tag.as_str()));
            let has_children = !component.ports.is_empty()
                || !component.attributes.is_empty()
                || !component.custom_attributes.is_empty();
            if !has_children {
                emit(writer, Event::Empty(equipment))?;
                continue;
            }
            emit(writer, Event::Start(equipment))?;

            for (index, port) in component.ports.iter().enumerate() {
                let nozzle_id = self.ids.assign_fixed(
                    &format!("{}/{}", component.id, index),
                    &format!("{id}-N{}", index + 1),
                )?;
                let mut nozzle = BytesStart::new("Nozzle");
                nozzle.push_attribute(("ID", nozzle_id.as_str()));
                nozzle.push_attribute(("ComponentClass", "Nozzle"));
                nozzle.push_attribute(("ComponentName", port.name.as_str()));
                emit(writer, Event::Empty(nozzle))?;
            }

            write_generic_attributes(writer, "DexpiAttributes", &component.attributes)?;
            write_generic_attributes(writer, "CustomAttributes", &component.custom_attributes)?;
            emit(writer, Event::End(BytesEnd::new("Equipment")))?;
        }
        Ok(())
    }

    // ── Phase 2: piping ─────────────────────────────────────────────

    fn write_piping(&mut self, writer: &mut XmlWriter<'_>) -> Result<(), ExportError> {
        for network in &self.graph.networks {
            let system_id = self.ids.assign(network.id.as_str(), "PNS");
            let mut system = BytesStart::new("PipingNetworkSystem");
            system.push_attribute(("ID", system_id.as_str()));
            emit(writer, Event::Start(system))?;

            for segment in &network.segments {
                self.write_segment(writer, segment)?;
            }

            emit(writer, Event::End(BytesEnd::new("PipingNetworkSystem")))?;
        }
        Ok(())
    }

    fn write_segment(
        &mut self,
        writer: &mut XmlWriter<'_>,
        segment: &Segment,
    ) -> Result<(), ExportError> {
        let segment_id = self.ids.assign(segment.id.as_str(), "PSG");
        let mut seg = BytesStart::new("PipingNetworkSegment");
        seg.push_attribute(("ID", segment_id.as_str()));
        if let Some(line) = &segment.line_number {
            seg.push_attribute(("LineNumber", line.as_str()));
        }
        emit(writer, Event::Start(seg))?;

        // Contained piping items first, registering their ids and emitting
        // their ConnectionPoints.
        for connection in &segment.connections {
            for endpoint in [&connection.from, &connection.to] {
                let component = self
                    .graph
                    .get(&endpoint.item)
                    .ok_or_else(|| ExportError::ReferenceUndefined {
                        id: endpoint.item.to_string(),
                        context: "connection endpoint".into(),
                    })?;
                if self.discipline_of(component)? != Discipline::Piping {
                    continue;
                }
                if !self.emitted_piping.insert(component.id.clone()) {
                    continue;
                }
                self.write_piping_component(writer, component)?;
            }
        }

        // Then the connections, referencing ids registered above.
        for connection in &segment.connections {
            let from = self.endpoint_attrs(&connection.from)?;
            let to = self.endpoint_attrs(&connection.to)?;
            self.ids.validate_reference(&from.0, "Connection/@FromID")?;
            self.ids.validate_reference(&to.0, "Connection/@ToID")?;

            let mut conn = BytesStart::new("Connection");
            conn.push_attribute(("FromID", from.0.as_str()));
            conn.push_attribute(("FromNode", from.1.as_str()));
            conn.push_attribute(("ToID", to.0.as_str()));
            conn.push_attribute(("ToNode", to.1.as_str()));
            emit(writer, Event::Empty(conn))?;
        }

        emit(writer, Event::End(BytesEnd::new("PipingNetworkSegment")))
    }

    fn write_piping_component(
        &mut self,
        writer: &mut XmlWriter<'_>,
        component: &Component,
    ) -> Result<(), ExportError> {
        let prefix = self.registry.id_prefix(&component.kind)?;
        let id = self.ids.assign(component.id.as_str(), &prefix);

        let mut item = BytesStart::new("PipingComponent");
        item.push_attribute(("ID", id.as_str()));
        item.push_attribute(("ComponentClass", component.kind.class_name()));
        item.push_attribute(("ComponentName", component.tag.as_str()));
        emit(writer, Event::Start(item))?;

        // Zero-node items must not emit ConnectionPoints at all.
        if !component.ports.is_empty() {
            let node_count = component.ports.len();
            let mut points = BytesStart::new("ConnectionPoints");
            points.push_attribute(("NumPoints", node_count.to_string().as_str()));
            points.push_attribute(("FlowIn", format_flow_indices(&[0], node_count)?.as_str()));
            points.push_attribute((
                "FlowOut",
                format_flow_indices(&[node_count - 1], node_count)?.as_str(),
            ));
            emit(writer, Event::Empty(points))?;
        }

        write_generic_attributes(writer, "DexpiAttributes", &component.attributes)?;
        write_generic_attributes(writer, "CustomAttributes", &component.custom_attributes)?;
        emit(writer, Event::End(BytesEnd::new("PipingComponent")))
    }

    // ── Phase 3: instrumentation ────────────────────────────────────

    fn write_instrumentation(&mut self, writer: &mut XmlWriter<'_>) -> Result<(), ExportError> {
        for function in &self.graph.instrumentation {
            if !function.enabled {
                continue;
            }
            let function_id = self.ids.assign(function.id.as_str(), "PIF");
            let mut pif = BytesStart::new("ProcessInstrumentationFunction");
            pif.push_attribute(("ID", function_id.as_str()));
            pif.push_attribute(("ComponentName", function.tag.as_str()));
            emit(writer, Event::Start(pif))?;

            // Sensors first: their ids must exist before any flow references
            // them.
            for sensor in &function.sensors {
                let sensor_id = self.ids.assign_fixed(
                    &format!("{}/{}", function.id, sensor.tag),
                    sensor.tag.as_str(),
                )?;
                let mut psgf = BytesStart::new("ProcessSignalGeneratingFunction");
                psgf.push_attribute(("ID", sensor_id.as_str()));
                psgf.push_attribute(("ComponentClass", sensor.kind.class_name()));
                psgf.push_attribute(("ComponentName", sensor.tag.as_str()));
                emit(writer, Event::Empty(psgf))?;
            }

            for line in &function.signal_lines {
                let flow_id = self.ids.assign(line.id.as_str(), "FLW");
                self.ids
                    .validate_reference(line.from_sensor.as_str(), "InformationFlow logical start")?;
                self.ids
                    .validate_reference(&function_id, "InformationFlow logical end")?;

                let mut flow = BytesStart::new("InformationFlow");
                flow.push_attribute(("ID", flow_id.as_str()));
                emit(writer, Event::Start(flow))?;
                write_association(writer, "has logical start", line.from_sensor.as_str())?;
                write_association(writer, "has logical end", &function_id)?;
                emit(writer, Event::End(BytesEnd::new("InformationFlow")))?;
            }

            // Associations close the parent: every referenced child already
            // exists.
            for association in &function.associations {
                let item_id = self
                    .ids
                    .lookup(association.item.as_str())
                    .cloned()
                    .ok_or_else(|| ExportError::ReferenceUndefined {
                        id: association.item.to_string(),
                        context: "ProcessInstrumentationFunction association".into(),
                    })?;
                self.ids.validate_reference(&item_id, "Association/@ItemID")?;
                write_association(writer, association.assoc_type.as_str(), &item_id)?;
            }

            emit(writer, Event::End(BytesEnd::new("ProcessInstrumentationFunction")))?;
        }
        Ok(())
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn discipline_of(&self, component: &Component) -> Result<Discipline, ExportError> {
        Ok(self.registry.def(&component.kind)?.discipline())
    }

    /// (exported id, 1-based node attribute) of an endpoint.
    fn endpoint_attrs(
        &self,
        endpoint: &crate::model::Endpoint,
    ) -> Result<(SmolStr, String), ExportError> {
        let component = self
            .graph
            .get(&endpoint.item)
            .ok_or_else(|| ExportError::ReferenceUndefined {
                id: endpoint.item.to_string(),
                context: "connection endpoint".into(),
            })?;
        let id = self
            .ids
            .lookup(endpoint.item.as_str())
            .cloned()
            .ok_or_else(|| ExportError::ReferenceUndefined {
                id: endpoint.item.to_string(),
                context: "connection endpoint".into(),
            })?;
        let node = format_flow_indices(&[endpoint.port], component.ports.len())?;
        Ok((id, node))
    }
}

fn write_association<W: std::io::Write>(
    writer: &mut Writer<W>,
    assoc_type: &str,
    item_id: &str,
) -> Result<(), ExportError> {
    let mut association = BytesStart::new("Association");
    association.push_attribute(("Type", assoc_type));
    association.push_attribute(("ItemID", item_id));
    writer
        .write_event(Event::Empty(association))
        .map_err(|e| ExportError::xml(e.to_string()))
}

fn emit(writer: &mut XmlWriter<'_>, event: Event<'_>) -> Result<(), ExportError> {
    writer
        .write_event(event)
        .map_err(|e| ExportError::xml(e.to_string()))
}
