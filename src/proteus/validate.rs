//! Structural validation of a finished Proteus document.
//!
//! A reader pass over the produced bytes enforcing the schema rules the
//! exporter must satisfy: root shape, required `PlantInformation`
//! attributes with `UnitsOfMeasure` as child, `Drawing` with a leading
//! `Presentation`, unique ids, forward-reference-free cross-references, and
//! positive node indices within their `NumPoints`. Failures carry the
//! element, attribute, and XPath.

use indexmap::IndexSet;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::ExportError;
use super::nodes::validate_flow_attribute;

const PLANT_INFORMATION_ATTRS: [&str; 7] =
    ["SchemaVersion", "OriginatingSystem", "Date", "Time", "Is3D", "Units", "Discipline"];

/// Validate exported bytes. The first violation is returned.
pub fn validate_document(bytes: &[u8]) -> Result<(), ExportError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut validator = Validator::default();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                validator.enter(&e)?;
            }
            Ok(Event::Empty(e)) => {
                validator.enter(&e)?;
                validator.leave();
            }
            Ok(Event::End(_)) => validator.leave(),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(ExportError::xml(e.to_string())),
        }
        buf.clear();
    }
    validator.finish()
}

#[derive(Default)]
struct Validator {
    /// Open element names, root first.
    stack: Vec<String>,
    /// Child-element counters per open element (parallel to `stack`).
    child_counts: Vec<usize>,
    seen_ids: IndexSet<String>,
    root_checked: bool,
    plant_information_seen: bool,
    units_of_measure_seen: bool,
    drawing_seen: bool,
}

impl Validator {
    fn xpath(&self) -> String {
        format!("/{}", self.stack.join("/"))
    }

    fn fail(
        &self,
        element: &str,
        attribute: Option<&str>,
        reason: impl Into<String>,
    ) -> ExportError {
        ExportError::XsdInvalid {
            element: element.to_string(),
            attribute: attribute.map(str::to_string),
            xpath: self.xpath(),
            reason: reason.into(),
        }
    }

    fn enter(&mut self, e: &BytesStart<'_>) -> Result<(), ExportError> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let parent = self.stack.last().cloned();
        let sibling_index = self.child_counts.last().copied().unwrap_or(0);
        if let Some(count) = self.child_counts.last_mut() {
            *count += 1;
        }
        self.stack.push(name.clone());
        self.child_counts.push(0);

        let attrs = collect_attrs(e).map_err(ExportError::xml)?;

        match (parent.as_deref(), name.as_str()) {
            (None, "PlantModel") => {
                self.root_checked = true;
                if attrs.iter().any(|(k, _)| k == "xmlns") {
                    return Err(self.fail(&name, Some("xmlns"), "no default namespace is allowed"));
                }
                if !attrs.iter().any(|(k, _)| k == "xsi:noNamespaceSchemaLocation") {
                    return Err(self.fail(
                        &name,
                        Some("xsi:noNamespaceSchemaLocation"),
                        "schema location is required",
                    ));
                }
            }
            (None, other) => {
                return Err(self.fail(other, None, "root element must be PlantModel"));
            }
            (Some("PlantModel"), "PlantInformation") => {
                if sibling_index != 0 {
                    return Err(self.fail(&name, None, "PlantInformation must come first"));
                }
                self.plant_information_seen = true;
                for required in PLANT_INFORMATION_ATTRS {
                    if !attrs.iter().any(|(k, _)| k == required) {
                        return Err(self.fail(&name, Some(required), "required attribute missing"));
                    }
                }
            }
            (Some("PlantInformation"), "UnitsOfMeasure") => {
                self.units_of_measure_seen = true;
            }
            (Some("PlantModel"), "Drawing") => {
                self.drawing_seen = true;
            }
            (Some("Drawing"), child) => {
                if sibling_index == 0 && child != "Presentation" {
                    return Err(self.fail(child, None, "Drawing must start with Presentation"));
                }
            }
            _ => {}
        }

        // Id registration and cross-reference checks are positional: a
        // reference is valid only if its target appeared earlier.
        for (key, value) in &attrs {
            match key.as_str() {
                "ID" => {
                    if !self.seen_ids.insert(value.clone()) {
                        return Err(self.fail(&name, Some("ID"), format!("duplicate id `{value}`")));
                    }
                }
                "FromID" | "ToID" | "ItemID" => {
                    if !self.seen_ids.contains(value) {
                        return Err(self.fail(
                            &name,
                            Some(key),
                            format!("forward or dangling reference `{value}`"),
                        ));
                    }
                }
                _ => {}
            }
        }

        if name == "ConnectionPoints" {
            let num_points: usize = attrs
                .iter()
                .find(|(k, _)| k == "NumPoints")
                .ok_or_else(|| self.fail(&name, Some("NumPoints"), "required attribute missing"))?
                .1
                .parse()
                .map_err(|_| self.fail(&name, Some("NumPoints"), "must be an integer"))?;
            if num_points == 0 {
                return Err(self.fail(&name, Some("NumPoints"), "xsd:positiveInteger (>= 1)"));
            }
            for flow in ["FlowIn", "FlowOut"] {
                if let Some((_, value)) = attrs.iter().find(|(k, _)| k == flow) {
                    validate_flow_attribute(value, num_points)?;
                }
            }
        }
        for node_attr in ["FromNode", "ToNode"] {
            if let Some((_, value)) = attrs.iter().find(|(k, _)| k == node_attr) {
                let parsed: usize = value
                    .parse()
                    .map_err(|_| self.fail(&name, Some(node_attr), "must be an integer"))?;
                if parsed == 0 {
                    return Err(self.fail(&name, Some(node_attr), "xsd:positiveInteger (>= 1)"));
                }
            }
        }

        Ok(())
    }

    fn leave(&mut self) {
        self.stack.pop();
        self.child_counts.pop();
    }

    fn finish(&self) -> Result<(), ExportError> {
        if !self.root_checked {
            return Err(self.fail("PlantModel", None, "document has no root element"));
        }
        if !self.plant_information_seen {
            return Err(self.fail("PlantInformation", None, "PlantInformation is required"));
        }
        if !self.units_of_measure_seen {
            return Err(self.fail(
                "UnitsOfMeasure",
                None,
                "UnitsOfMeasure must be a child of PlantInformation",
            ));
        }
        if !self.drawing_seen {
            return Err(self.fail("Drawing", None, "Drawing is required"));
        }
        Ok(())
    }
}

fn collect_attrs(e: &BytesStart<'_>) -> Result<Vec<(String, String)>, String> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
        out.push((key, value));
    }
    Ok(out)
}
