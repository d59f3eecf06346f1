//! GenericAttributes emission.
//!
//! Every non-null data attribute on a typed component becomes a
//! `GenericAttribute` under `Set="DexpiAttributes"`; custom attributes go
//! under `Set="CustomAttributes"`. The name is the capitalised attribute
//! name with `AssignmentClass` appended; the format comes from the value's
//! static type; quantities carry units; multi-language strings emit one
//! entry per language.

use indexmap::IndexMap;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use smol_str::SmolStr;

use super::ExportError;
use crate::model::AttrValue;

/// Write one `GenericAttributes` block. Empty maps emit nothing.
pub(super) fn write_generic_attributes<W: std::io::Write>(
    writer: &mut Writer<W>,
    set: &str,
    attributes: &IndexMap<SmolStr, AttrValue>,
) -> Result<(), ExportError> {
    if attributes.is_empty() {
        return Ok(());
    }

    let entries: usize = attributes
        .values()
        .map(|v| match v {
            AttrValue::MultiLanguage(languages) => languages.len(),
            _ => 1,
        })
        .sum();

    let mut start = BytesStart::new("GenericAttributes");
    start.push_attribute(("Set", set));
    start.push_attribute(("Number", entries.to_string().as_str()));
    writer
        .write_event(Event::Start(start))
        .map_err(|e| ExportError::xml(e.to_string()))?;

    for (name, value) in attributes {
        match value {
            AttrValue::MultiLanguage(languages) => {
                for (language, text) in languages {
                    write_attribute(writer, name, "string", text, None, Some(language))?;
                }
            }
            AttrValue::String(s) => write_attribute(writer, name, value.format(), s, None, None)?,
            AttrValue::Enum(token) => {
                write_attribute(writer, name, value.format(), token, None, None)?;
            }
            AttrValue::Double(d) => {
                write_attribute(writer, name, value.format(), &d.to_string(), None, None)?;
            }
            AttrValue::Integer(i) => {
                write_attribute(writer, name, value.format(), &i.to_string(), None, None)?;
            }
            AttrValue::Boolean(b) => {
                write_attribute(writer, name, value.format(), &b.to_string(), None, None)?;
            }
            AttrValue::Quantity { value: quantity, units } => {
                write_attribute(writer, name, value.format(), &quantity.to_string(), Some(units), None)?;
            }
        }
    }

    writer
        .write_event(Event::End(BytesEnd::new("GenericAttributes")))
        .map_err(|e| ExportError::xml(e.to_string()))?;
    Ok(())
}

fn write_attribute<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    format: &str,
    value: &str,
    units: Option<&str>,
    language: Option<&str>,
) -> Result<(), ExportError> {
    let mut attr = BytesStart::new("GenericAttribute");
    attr.push_attribute(("Name", assignment_name(name).as_str()));
    attr.push_attribute(("Format", format));
    attr.push_attribute(("Value", value));
    if let Some(units) = units {
        attr.push_attribute(("Units", units));
    }
    if let Some(language) = language {
        attr.push_attribute(("Language", language));
    }
    writer
        .write_event(Event::Empty(attr))
        .map_err(|e| ExportError::xml(e.to_string()))
}

/// `design_pressure` → `DesignPressureAssignmentClass`.
pub(super) fn assignment_name(attribute: &str) -> String {
    let mut out = String::with_capacity(attribute.len() + 16);
    let mut upper_next = true;
    for c in attribute.chars() {
        if c == '_' || c == '-' {
            upper_next = true;
            continue;
        }
        if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out.push_str("AssignmentClass");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_names_are_capitalised() {
        assert_eq!(assignment_name("design_pressure"), "DesignPressureAssignmentClass");
        assert_eq!(assignment_name("volume"), "VolumeAssignmentClass");
    }

    fn render(attributes: &IndexMap<SmolStr, AttrValue>) -> String {
        let mut buffer = std::io::Cursor::new(Vec::new());
        let mut writer = Writer::new(&mut buffer);
        write_generic_attributes(&mut writer, "DexpiAttributes", attributes).unwrap();
        String::from_utf8(buffer.into_inner()).unwrap()
    }

    #[test]
    fn quantity_carries_units() {
        let mut attributes = IndexMap::new();
        attributes.insert(
            SmolStr::new("design_pressure"),
            AttrValue::Quantity { value: 6.5, units: SmolStr::new("bar") },
        );
        let xml = render(&attributes);
        assert!(xml.contains(r#"Name="DesignPressureAssignmentClass""#));
        assert!(xml.contains(r#"Format="double""#));
        assert!(xml.contains(r#"Value="6.5""#));
        assert!(xml.contains(r#"Units="bar""#));
    }

    #[test]
    fn multi_language_emits_one_entry_per_language() {
        let mut languages = IndexMap::new();
        languages.insert(SmolStr::new("en"), SmolStr::new("Feed tank"));
        languages.insert(SmolStr::new("de"), SmolStr::new("Vorlagebehälter"));
        let mut attributes = IndexMap::new();
        attributes.insert(SmolStr::new("description"), AttrValue::MultiLanguage(languages));

        let xml = render(&attributes);
        assert!(xml.contains(r#"Language="en""#));
        assert!(xml.contains(r#"Language="de""#));
        assert!(xml.contains(r#"Number="2""#));
    }

    #[test]
    fn empty_map_emits_nothing() {
        assert!(render(&IndexMap::new()).is_empty());
    }
}
