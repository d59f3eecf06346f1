//! The linear dialect: an ordered graph of units, streams, and controls.
//!
//! The canonical string encoding lives in [`crate::sfiles`]; this module
//! holds the in-memory form and its validator.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use super::{ModelError, ModelMetadata};

/// A process unit: a name and a bracketed kind alias.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub name: SmolStr,
    /// Registry alias or class name, as written between brackets.
    pub kind: SmolStr,
}

/// A directed stream between two units, with optional tags and properties.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    pub from: SmolStr,
    pub to: SmolStr,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<SmolStr>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<SmolStr, serde_json::Value>,
}

/// A control attached to a unit (`{TC}` after the unit token).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Control {
    pub unit: SmolStr,
    /// Control kind mnemonic (`TC`, `LC`, `FC`, ...).
    pub kind: SmolStr,
}

/// The string-dialect model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    #[serde(default)]
    pub metadata: ModelMetadata,
    /// Units in first-mention order; names are unique.
    pub units: IndexMap<SmolStr, Unit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub streams: Vec<Stream>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controls: Vec<Control>,
}

impl LinearModel {
    pub fn new(metadata: ModelMetadata) -> Self {
        Self {
            metadata,
            units: IndexMap::new(),
            streams: Vec::new(),
            controls: Vec::new(),
        }
    }

    pub fn add_unit(&mut self, name: impl AsRef<str>, kind: impl AsRef<str>) -> Result<(), ModelError> {
        let name = SmolStr::new(name.as_ref());
        if self.units.contains_key(&name) {
            return Err(ModelError::TagConflict(crate::base::Tag::new(&name)));
        }
        self.units.insert(name.clone(), Unit { name, kind: SmolStr::new(kind.as_ref()) });
        Ok(())
    }

    pub fn add_stream(&mut self, from: impl AsRef<str>, to: impl AsRef<str>) -> Result<(), ModelError> {
        let from = SmolStr::new(from.as_ref());
        let to = SmolStr::new(to.as_ref());
        for end in [&from, &to] {
            if !self.units.contains_key(end) {
                return Err(ModelError::TargetNotFound(end.to_string()));
            }
        }
        self.streams.push(Stream {
            from,
            to,
            tags: Vec::new(),
            properties: IndexMap::new(),
        });
        Ok(())
    }

    pub fn add_control(&mut self, unit: impl AsRef<str>, kind: impl AsRef<str>) -> Result<(), ModelError> {
        let unit = SmolStr::new(unit.as_ref());
        if !self.units.contains_key(&unit) {
            return Err(ModelError::TargetNotFound(unit.to_string()));
        }
        self.controls.push(Control { unit, kind: SmolStr::new(kind.as_ref()) });
        Ok(())
    }

    /// Find a stream by its endpoints.
    pub fn stream_mut(&mut self, from: &str, to: &str) -> Option<&mut Stream> {
        self.streams.iter_mut().find(|s| s.from == from && s.to == to)
    }

    /// Outgoing streams of a unit, in declaration order.
    pub fn outgoing(&self, unit: &str) -> impl Iterator<Item = &Stream> {
        self.streams.iter().filter(move |s| s.from == unit)
    }

    /// Incoming stream count per unit name.
    pub fn in_degree(&self, unit: &str) -> usize {
        self.streams.iter().filter(|s| s.to == unit).count()
    }

    /// Validate stream endpoints and control hosts.
    pub fn validate(&self) -> Result<(), ModelError> {
        for stream in &self.streams {
            for end in [&stream.from, &stream.to] {
                if !self.units.contains_key(end) {
                    return Err(ModelError::InvariantViolation(format!(
                        "stream references unknown unit {end}"
                    )));
                }
            }
        }
        for control in &self.controls {
            if !self.units.contains_key(&control.unit) {
                return Err(ModelError::InvariantViolation(format!(
                    "control {} attached to unknown unit {}",
                    control.kind, control.unit
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_endpoints_must_exist() {
        let mut model = LinearModel::new(ModelMetadata::default());
        model.add_unit("tank", "tank").unwrap();
        assert!(matches!(
            model.add_stream("tank", "pump"),
            Err(ModelError::TargetNotFound(_))
        ));
    }

    #[test]
    fn duplicate_unit_names_are_rejected() {
        let mut model = LinearModel::new(ModelMetadata::default());
        model.add_unit("tank", "tank").unwrap();
        assert!(model.add_unit("tank", "vessel").is_err());
    }

    #[test]
    fn validate_catches_dangling_control() {
        let mut model = LinearModel::new(ModelMetadata::default());
        model.add_unit("reactor", "reactor").unwrap();
        model.add_control("reactor", "TC").unwrap();
        model.units.shift_remove("reactor");
        assert!(model.validate().is_err());
    }
}
