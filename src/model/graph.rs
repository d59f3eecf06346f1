//! The graph dialect: typed components, ports, connections, and
//! instrumentation.
//!
//! A `GraphModel` exclusively owns its components, ports, connections, and
//! instrumentation items. Cross-references (connection endpoints,
//! instrumentation associations) are by opaque id and resolved through the
//! model's lookup tables; port indices are 0-based internally and converted
//! at the external boundary.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::BTreeMap;

use super::{ModelError, ModelMetadata};
use crate::base::{ComponentId, Tag};
use crate::registry::ComponentKind;

// ============================================================================
// COMPONENTS AND PORTS
// ============================================================================

/// The flavor of a connection point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
    /// Connection point on equipment.
    Nozzle,
    /// Connection point on a piping item.
    Node,
    /// Connection point on an instrumentation item.
    Signal,
}

/// A typed connection point owned by its component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub name: SmolStr,
    pub kind: PortKind,
}

impl Port {
    pub fn new(name: impl AsRef<str>, kind: PortKind) -> Self {
        Self { name: SmolStr::new(name.as_ref()), kind }
    }
}

/// A kind-specific data attribute value.
///
/// The variant selects the `Format` of the exported generic attribute;
/// quantities carry units, multi-language strings one entry per language.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    String(SmolStr),
    Double(f64),
    Integer(i64),
    Boolean(bool),
    Enum(SmolStr),
    Quantity { value: f64, units: SmolStr },
    MultiLanguage(IndexMap<SmolStr, SmolStr>),
}

impl AttrValue {
    /// The static format token used by the exporter.
    pub fn format(&self) -> &'static str {
        match self {
            Self::String(_) | Self::MultiLanguage(_) => "string",
            Self::Double(_) | Self::Quantity { .. } => "double",
            Self::Integer(_) => "integer",
            Self::Boolean(_) => "boolean",
            Self::Enum(_) => "enum",
        }
    }

    /// Decode a payload value into a typed attribute.
    ///
    /// Scalars map directly; `{"value": n, "units": "..."}` is a physical
    /// quantity; `{"enum": "..."}` an enumeration; any other string-valued
    /// object is a multi-language string keyed by language.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, String> {
        use serde_json::Value;
        match value {
            Value::String(s) => Ok(Self::String(s.as_str().into())),
            Value::Bool(b) => Ok(Self::Boolean(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Integer(i))
                } else {
                    Ok(Self::Double(n.as_f64().expect("number is f64")))
                }
            }
            Value::Object(map) => {
                if let (Some(v), Some(units)) = (map.get("value"), map.get("units")) {
                    let value = v.as_f64().ok_or("quantity value must be a number")?;
                    let units = units.as_str().ok_or("quantity units must be a string")?;
                    return Ok(Self::Quantity { value, units: units.into() });
                }
                if let Some(e) = map.get("enum") {
                    let token = e.as_str().ok_or("enum token must be a string")?;
                    return Ok(Self::Enum(token.into()));
                }
                let mut languages = IndexMap::new();
                for (lang, text) in map {
                    let text = text
                        .as_str()
                        .ok_or("multi-language entries must be strings")?;
                    languages.insert(SmolStr::new(lang), SmolStr::new(text));
                }
                if languages.is_empty() {
                    return Err("empty attribute object".into());
                }
                Ok(Self::MultiLanguage(languages))
            }
            other => Err(format!("unsupported attribute value {other}")),
        }
    }
}

/// A plant component: kind, tag, stable id, typed ports, attributes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: ComponentId,
    pub kind: ComponentKind,
    pub tag: Tag,
    pub ports: Vec<Port>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<SmolStr, AttrValue>,
    /// Custom (non-catalogue) attributes, exported under a separate set.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub custom_attributes: IndexMap<SmolStr, AttrValue>,
}

impl Component {
    /// Whether `port` is a valid 0-based index for this component.
    pub fn port_in_range(&self, port: usize) -> bool {
        port < self.ports.len()
    }
}

// ============================================================================
// CONNECTIONS
// ============================================================================

/// One end of a connection: an item and a 0-based port index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub item: ComponentId,
    pub port: usize,
}

impl Endpoint {
    pub fn new(item: ComponentId, port: usize) -> Self {
        Self { item, port }
    }

    /// The 1-based index exposed to external consumers.
    pub fn external_port(&self) -> usize {
        self.port + 1
    }
}

/// A directed connection between two ports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub from: Endpoint,
    pub to: Endpoint,
}

/// A contiguous chain of connections within a network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<SmolStr>,
    pub connections: Vec<Connection>,
}

/// A piping network: an ordered set of segments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub id: SmolStr,
    pub segments: Vec<Segment>,
}

impl Network {
    /// Component ids appearing at either end of any contained connection.
    pub fn member_items(&self) -> impl Iterator<Item = &ComponentId> {
        self.segments
            .iter()
            .flat_map(|s| s.connections.iter())
            .flat_map(|c| [&c.from.item, &c.to.item])
    }
}

// ============================================================================
// INSTRUMENTATION
// ============================================================================

/// A measuring element owned by an instrumentation function.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    /// Sensor tags double as export ids (`TT-101`).
    pub tag: Tag,
    pub kind: ComponentKind,
    /// The equipment or piping item the sensor is mounted on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub located_in: Option<ComponentId>,
}

/// A signal line from a sensor to the enclosing function.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalLine {
    pub id: SmolStr,
    /// Tag of the sensor the signal starts at.
    pub from_sensor: Tag,
}

/// The standard association types on instrumentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationType {
    IsLocatedIn,
    HasLogicalStart,
    HasLogicalEnd,
}

impl AssociationType {
    /// The wire token (`is located in`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IsLocatedIn => "is located in",
            Self::HasLogicalStart => "has logical start",
            Self::HasLogicalEnd => "has logical end",
        }
    }
}

/// A by-id reference from instrumentation to a model item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Association {
    pub assoc_type: AssociationType,
    pub item: ComponentId,
}

/// An instrumentation function: sensors, signal lines, associations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstrumentationFunction {
    pub id: SmolStr,
    pub tag: Tag,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sensors: Vec<Sensor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signal_lines: Vec<SignalLine>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associations: Vec<Association>,
}

fn default_enabled() -> bool {
    true
}

// ============================================================================
// GRAPH MODEL
// ============================================================================

/// The typed node-and-port model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphModel {
    #[serde(default)]
    pub metadata: ModelMetadata,
    components: IndexMap<ComponentId, Component>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<Network>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instrumentation: Vec<InstrumentationFunction>,
    /// Per-prefix id counters; BTreeMap keeps serialization deterministic.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    id_counters: BTreeMap<SmolStr, u32>,
    #[serde(skip)]
    tag_index: FxHashMap<Tag, ComponentId>,
}

impl GraphModel {
    pub fn new(metadata: ModelMetadata) -> Self {
        Self {
            metadata,
            components: IndexMap::new(),
            networks: Vec::new(),
            instrumentation: Vec::new(),
            id_counters: BTreeMap::new(),
            tag_index: FxHashMap::default(),
        }
    }

    // ── Id generation ───────────────────────────────────────────────

    /// Next id for a prefix. Counters only ever advance, so ids stay stable
    /// across transactions and removals.
    pub fn next_id(&mut self, prefix: &str) -> ComponentId {
        let counter = self.id_counters.entry(SmolStr::new(prefix)).or_insert(0);
        *counter += 1;
        ComponentId::from_counter(prefix, *counter)
    }

    fn next_aux_id(&mut self, prefix: &str) -> SmolStr {
        let counter = self.id_counters.entry(SmolStr::new(prefix)).or_insert(0);
        *counter += 1;
        SmolStr::new(format!("{prefix}-{counter}"))
    }

    /// Create a component from a catalogue row: fresh id under `prefix`,
    /// default ports per the row's count, port kind per its discipline.
    pub fn create_component_from_def(
        &mut self,
        def: &crate::registry::KindDef,
        prefix: &str,
        tag: Tag,
    ) -> Result<ComponentId, ModelError> {
        if self.tag_index.contains_key(&tag) {
            return Err(ModelError::TagConflict(tag));
        }
        let port_kind = match def.discipline() {
            crate::registry::Discipline::Equipment => PortKind::Nozzle,
            crate::registry::Discipline::Piping => PortKind::Node,
            crate::registry::Discipline::Instrumentation => PortKind::Signal,
        };
        let ports = (0..def.port_count)
            .map(|i| Port::new(format!("N{}", i + 1), port_kind))
            .collect();
        let id = self.next_id(prefix);
        self.insert_component(Component {
            id,
            kind: def.kind(),
            tag,
            ports,
            attributes: IndexMap::new(),
            custom_attributes: IndexMap::new(),
        })
    }

    // ── Component access ────────────────────────────────────────────

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    pub fn component_ids(&self) -> impl Iterator<Item = &ComponentId> {
        self.components.keys()
    }

    pub fn get(&self, id: &ComponentId) -> Option<&Component> {
        self.components.get(id)
    }

    pub fn get_mut(&mut self, id: &ComponentId) -> Option<&mut Component> {
        self.components.get_mut(id)
    }

    pub fn by_tag(&self, tag: &Tag) -> Option<&Component> {
        self.tag_index.get(tag).and_then(|id| self.components.get(id))
    }

    /// Resolve a selector that may be a tag or an id. A selector matching
    /// the tag of one component and the id of a different one is ambiguous.
    pub fn resolve_target(&self, selector: &str) -> Result<ComponentId, ModelError> {
        let by_tag = self.tag_index.get(&Tag::new(selector)).cloned();
        let by_id = {
            let candidate = ComponentId::new(selector);
            self.components.contains_key(&candidate).then_some(candidate)
        };
        match (by_tag, by_id) {
            (Some(t), Some(i)) if t != i => Err(ModelError::TargetAmbiguous {
                selector: selector.to_string(),
                candidates: vec![t.to_string(), i.to_string()],
            }),
            (Some(t), _) => Ok(t),
            (None, Some(i)) => Ok(i),
            (None, None) => Err(ModelError::TargetNotFound(selector.to_string())),
        }
    }

    // ── Mutation ────────────────────────────────────────────────────

    /// Insert a fully-formed component. The id must be fresh and the tag
    /// unused.
    pub fn insert_component(&mut self, component: Component) -> Result<ComponentId, ModelError> {
        if self.components.contains_key(&component.id) {
            return Err(ModelError::InvariantViolation(format!(
                "duplicate component id {}",
                component.id
            )));
        }
        if self.tag_index.contains_key(&component.tag) {
            return Err(ModelError::TagConflict(component.tag));
        }
        let id = component.id.clone();
        self.tag_index.insert(component.tag.clone(), id.clone());
        self.components.insert(id.clone(), component);
        Ok(id)
    }

    /// Remove a component. With `cascade` incident connections (and any
    /// segments or networks emptied by their removal) and instrumentation
    /// references go too; without it, incident connections are an error.
    pub fn remove_component(&mut self, id: &ComponentId, cascade: bool) -> Result<Component, ModelError> {
        if !self.components.contains_key(id) {
            return Err(ModelError::TargetNotFound(id.to_string()));
        }
        let incident = self
            .networks
            .iter()
            .flat_map(|n| n.segments.iter())
            .flat_map(|s| s.connections.iter())
            .any(|c| &c.from.item == id || &c.to.item == id);
        if incident && !cascade {
            return Err(ModelError::ConnectionInvalid(format!(
                "component {id} has incident connections; removal requires cascade"
            )));
        }
        if cascade {
            for network in &mut self.networks {
                for segment in &mut network.segments {
                    segment.connections.retain(|c| &c.from.item != id && &c.to.item != id);
                }
                network.segments.retain(|s| !s.connections.is_empty());
            }
            self.networks.retain(|n| !n.segments.is_empty());
            for function in &mut self.instrumentation {
                function.associations.retain(|a| &a.item != id);
                for sensor in &mut function.sensors {
                    if sensor.located_in.as_ref() == Some(id) {
                        sensor.located_in = None;
                    }
                }
            }
        }
        let component = self.components.shift_remove(id).expect("checked above");
        self.tag_index.remove(&component.tag);
        Ok(component)
    }

    /// Change a component's tag, preserving uniqueness.
    pub fn retag(&mut self, id: &ComponentId, new_tag: Tag) -> Result<Tag, ModelError> {
        if let Some(holder) = self.tag_index.get(&new_tag) {
            if holder != id {
                return Err(ModelError::TagConflict(new_tag));
            }
            return Ok(new_tag);
        }
        let component = self
            .components
            .get_mut(id)
            .ok_or_else(|| ModelError::TargetNotFound(id.to_string()))?;
        let old = std::mem::replace(&mut component.tag, new_tag.clone());
        self.tag_index.remove(&old);
        self.tag_index.insert(new_tag, id.clone());
        Ok(old)
    }

    // ── Connections ─────────────────────────────────────────────────

    fn check_endpoint(&self, endpoint: &Endpoint) -> Result<(), ModelError> {
        let component = self
            .get(&endpoint.item)
            .ok_or_else(|| ModelError::TargetNotFound(endpoint.item.to_string()))?;
        if !component.port_in_range(endpoint.port) {
            return Err(ModelError::ConnectionInvalid(format!(
                "port index {} out of range for {} ({} ports)",
                endpoint.port,
                endpoint.item,
                component.ports.len()
            )));
        }
        Ok(())
    }

    fn network_of(&self, item: &ComponentId) -> Option<usize> {
        self.networks.iter().position(|n| n.member_items().any(|m| m == item))
    }

    /// Connect two ports. A new single-connection segment is appended to the
    /// network containing either endpoint; networks bridged by the new
    /// connection are merged; otherwise a new network is created.
    pub fn connect(
        &mut self,
        from: Endpoint,
        to: Endpoint,
        line_number: Option<SmolStr>,
    ) -> Result<SmolStr, ModelError> {
        self.check_endpoint(&from)?;
        self.check_endpoint(&to)?;
        if from.item == to.item {
            return Err(ModelError::ConnectionInvalid(format!(
                "self-connection on {}",
                from.item
            )));
        }

        let segment_id = self.next_aux_id("SEG");
        let segment = Segment {
            id: segment_id.clone(),
            line_number,
            connections: vec![Connection { from: from.clone(), to: to.clone() }],
        };

        match (self.network_of(&from.item), self.network_of(&to.item)) {
            (Some(a), Some(b)) if a != b => {
                // The connection bridges two networks; fold the later one in.
                let (keep, fold) = if a < b { (a, b) } else { (b, a) };
                let folded = self.networks.remove(fold);
                self.networks[keep].segments.extend(folded.segments);
                self.networks[keep].segments.push(segment);
            }
            (Some(a), _) | (_, Some(a)) => self.networks[a].segments.push(segment),
            (None, None) => {
                let network_id = self.next_aux_id("NET");
                self.networks.push(Network { id: network_id, segments: vec![segment] });
            }
        }
        Ok(segment_id)
    }

    pub fn segment(&self, segment_id: &str) -> Option<&Segment> {
        self.networks.iter().flat_map(|n| n.segments.iter()).find(|s| s.id == segment_id)
    }

    fn segment_position(&self, segment_id: &str) -> Option<(usize, usize)> {
        self.networks.iter().enumerate().find_map(|(ni, n)| {
            n.segments.iter().position(|s| s.id == segment_id).map(|si| (ni, si))
        })
    }

    /// Insert a component inline into a segment at a fractional position.
    ///
    /// The position selects the connection to cut; `0.0` and `1.0` are out
    /// of range by contract. The inserted component takes over the cut
    /// connection's endpoints through its first (entry) and last (exit)
    /// ports.
    pub fn insert_inline(
        &mut self,
        segment_id: &str,
        position: f64,
        component: Component,
    ) -> Result<ComponentId, ModelError> {
        if !(position > 0.0 && position < 1.0) {
            return Err(ModelError::PositionOutOfRange { position, low: 0.0, high: 1.0 });
        }
        let (ni, si) = self
            .segment_position(segment_id)
            .ok_or_else(|| ModelError::TargetNotFound(segment_id.to_string()))?;
        if component.ports.is_empty() {
            return Err(ModelError::ConnectionInvalid(format!(
                "inline component {} has no ports",
                component.tag
            )));
        }

        let entry = 0usize;
        let exit = component.ports.len().saturating_sub(1);
        let id = self.insert_component(component)?;

        let segment = &mut self.networks[ni].segments[si];
        let cut = ((position * segment.connections.len() as f64) as usize)
            .min(segment.connections.len() - 1);
        let old = segment.connections.remove(cut);
        segment.connections.insert(
            cut,
            Connection { from: old.from, to: Endpoint::new(id.clone(), entry) },
        );
        segment.connections.insert(
            cut + 1,
            Connection { from: Endpoint::new(id.clone(), exit), to: old.to },
        );
        Ok(id)
    }

    /// Split a segment at a fractional position into two adjacent segments.
    pub fn split_segment(
        &mut self,
        segment_id: &str,
        position: f64,
    ) -> Result<(SmolStr, SmolStr), ModelError> {
        if !(position > 0.0 && position < 1.0) {
            return Err(ModelError::PositionOutOfRange { position, low: 0.0, high: 1.0 });
        }
        let (ni, si) = self
            .segment_position(segment_id)
            .ok_or_else(|| ModelError::TargetNotFound(segment_id.to_string()))?;
        let len = self.networks[ni].segments[si].connections.len();
        if len < 2 {
            return Err(ModelError::PositionOutOfRange { position, low: 0.0, high: 1.0 });
        }
        let cut = ((position * len as f64) as usize).clamp(1, len - 1);

        let tail_id = self.next_aux_id("SEG");
        let segment = &mut self.networks[ni].segments[si];
        let tail_connections = segment.connections.split_off(cut);
        let head_id = segment.id.clone();
        let line_number = segment.line_number.clone();
        self.networks[ni].segments.insert(
            si + 1,
            Segment { id: tail_id.clone(), line_number, connections: tail_connections },
        );
        Ok((head_id, tail_id))
    }

    /// Merge two adjacent segments: the first must end at the component the
    /// second starts from.
    pub fn merge_segments(&mut self, first: &str, second: &str) -> Result<SmolStr, ModelError> {
        let (ni_a, si_a) = self
            .segment_position(first)
            .ok_or_else(|| ModelError::TargetNotFound(first.to_string()))?;
        let (ni_b, si_b) = self
            .segment_position(second)
            .ok_or_else(|| ModelError::TargetNotFound(second.to_string()))?;

        let not_adjacent =
            || ModelError::SegmentsNotAdjacent(SmolStr::new(first), SmolStr::new(second));
        if ni_a != ni_b {
            return Err(not_adjacent());
        }
        let end_of_a = self.networks[ni_a].segments[si_a]
            .connections
            .last()
            .map(|c| c.to.item.clone())
            .ok_or_else(not_adjacent)?;
        let start_of_b = self.networks[ni_b].segments[si_b]
            .connections
            .first()
            .map(|c| c.from.item.clone())
            .ok_or_else(not_adjacent)?;
        if end_of_a != start_of_b {
            return Err(not_adjacent());
        }

        let merged = self.networks[ni_b].segments.remove(si_b);
        let si_a = if si_b < si_a { si_a - 1 } else { si_a };
        self.networks[ni_a].segments[si_a].connections.extend(merged.connections);
        Ok(self.networks[ni_a].segments[si_a].id.clone())
    }

    /// Repoint the target of one connection.
    ///
    /// With `reroute_connections`, every later connection in the segment
    /// leaving the old target follows onto the new one, keeping its port
    /// index — the only documented local recovery. Without it only the
    /// addressed connection changes and the old target's outgoing
    /// connections are left as they were. Returns how many connections were
    /// rerouted besides the addressed one. The whole rewire is validated
    /// before anything mutates.
    pub fn rewire_connection(
        &mut self,
        segment_id: &str,
        connection_index: usize,
        new_to: Endpoint,
        reroute_connections: bool,
    ) -> Result<usize, ModelError> {
        self.check_endpoint(&new_to)?;
        let new_port_count = self
            .get(&new_to.item)
            .expect("endpoint checked above")
            .ports
            .len();
        let (ni, si) = self
            .segment_position(segment_id)
            .ok_or_else(|| ModelError::TargetNotFound(segment_id.to_string()))?;

        let segment = &self.networks[ni].segments[si];
        let connection = segment.connections.get(connection_index).ok_or_else(|| {
            ModelError::ConnectionInvalid(format!(
                "segment {segment_id} has no connection at index {connection_index}"
            ))
        })?;
        if connection.from.item == new_to.item {
            return Err(ModelError::ConnectionInvalid(format!(
                "self-connection on {}",
                new_to.item
            )));
        }
        let old_target = connection.to.item.clone();

        let mut followers = Vec::new();
        if reroute_connections {
            for (index, follower) in
                segment.connections.iter().enumerate().skip(connection_index + 1)
            {
                if follower.from.item != old_target {
                    continue;
                }
                if follower.from.port >= new_port_count {
                    return Err(ModelError::ConnectionInvalid(format!(
                        "cannot reroute connection {index}: port index {} out of range for {} ({} ports)",
                        follower.from.port, new_to.item, new_port_count
                    )));
                }
                if follower.to.item == new_to.item {
                    return Err(ModelError::ConnectionInvalid(format!(
                        "rerouting connection {index} would self-connect {}",
                        new_to.item
                    )));
                }
                followers.push(index);
            }
        }

        let segment = &mut self.networks[ni].segments[si];
        segment.connections[connection_index].to = new_to.clone();
        for index in &followers {
            segment.connections[*index].from.item = new_to.item.clone();
        }
        Ok(followers.len())
    }

    // ── Instrumentation ─────────────────────────────────────────────

    pub fn add_instrumentation(
        &mut self,
        tag: Tag,
        sensors: Vec<Sensor>,
        associations: Vec<Association>,
    ) -> Result<SmolStr, ModelError> {
        for association in &associations {
            if !self.components.contains_key(&association.item) {
                return Err(ModelError::TargetNotFound(association.item.to_string()));
            }
        }
        for sensor in &sensors {
            if let Some(host) = &sensor.located_in {
                if !self.components.contains_key(host) {
                    return Err(ModelError::TargetNotFound(host.to_string()));
                }
            }
        }
        let id = self.next_aux_id("PIF");
        let signal_lines = sensors
            .iter()
            .map(|s| SignalLine { id: self.next_aux_id("FLW"), from_sensor: s.tag.clone() })
            .collect();
        self.instrumentation.push(InstrumentationFunction {
            id: id.clone(),
            tag,
            enabled: true,
            sensors,
            signal_lines,
            associations,
        });
        Ok(id)
    }

    pub fn instrumentation_by_tag(&mut self, tag: &Tag) -> Option<&mut InstrumentationFunction> {
        self.instrumentation.iter_mut().find(|f| &f.tag == tag)
    }

    pub fn remove_instrumentation(&mut self, tag: &Tag) -> Result<InstrumentationFunction, ModelError> {
        let index = self
            .instrumentation
            .iter()
            .position(|f| &f.tag == tag)
            .ok_or_else(|| ModelError::TargetNotFound(tag.to_string()))?;
        Ok(self.instrumentation.remove(index))
    }

    // ── Validation ──────────────────────────────────────────────────

    /// Whole-model structural validation: tag uniqueness, endpoint
    /// existence, port ranges, association targets.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut seen_tags: FxHashMap<&Tag, &ComponentId> = FxHashMap::default();
        for (id, component) in &self.components {
            if component.id != *id {
                return Err(ModelError::InvariantViolation(format!(
                    "component keyed {id} carries id {}",
                    component.id
                )));
            }
            if let Some(other) = seen_tags.insert(&component.tag, id) {
                return Err(ModelError::InvariantViolation(format!(
                    "tag {} used by both {other} and {id}",
                    component.tag
                )));
            }
        }
        for network in &self.networks {
            for segment in &network.segments {
                for connection in &segment.connections {
                    self.check_endpoint(&connection.from)?;
                    self.check_endpoint(&connection.to)?;
                }
            }
        }
        for function in &self.instrumentation {
            for association in &function.associations {
                if !self.components.contains_key(&association.item) {
                    return Err(ModelError::InvariantViolation(format!(
                        "instrumentation {} references missing item {}",
                        function.tag, association.item
                    )));
                }
            }
            for sensor in &function.sensors {
                if let Some(host) = &sensor.located_in {
                    if !self.components.contains_key(host) {
                        return Err(ModelError::InvariantViolation(format!(
                            "sensor {} located in missing item {host}",
                            sensor.tag
                        )));
                    }
                }
            }
            for line in &function.signal_lines {
                if !function.sensors.iter().any(|s| s.tag == line.from_sensor) {
                    return Err(ModelError::InvariantViolation(format!(
                        "signal line {} starts at unknown sensor {}",
                        line.id, line.from_sensor
                    )));
                }
            }
        }
        Ok(())
    }

    /// Rebuild the tag lookup after deserialization.
    pub fn rebuild_tag_index(&mut self) {
        self.tag_index = self
            .components
            .iter()
            .map(|(id, c)| (c.tag.clone(), id.clone()))
            .collect();
    }

    /// All connections in traversal order (network, segment, connection).
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.networks
            .iter()
            .flat_map(|n| n.segments.iter())
            .flat_map(|s| s.connections.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn component(model: &mut GraphModel, registry: &Registry, alias: &str, tag: &str) -> ComponentId {
        let kind = registry.resolve(alias).unwrap();
        let def = registry.def(&kind).unwrap();
        let port_kind = match def.discipline() {
            crate::registry::Discipline::Equipment => PortKind::Nozzle,
            crate::registry::Discipline::Piping => PortKind::Node,
            crate::registry::Discipline::Instrumentation => PortKind::Signal,
        };
        let prefix = registry.id_prefix(&kind).unwrap();
        let id = model.next_id(&prefix);
        let ports = (0..def.port_count).map(|i| Port::new(format!("N{}", i + 1), port_kind)).collect();
        model
            .insert_component(Component {
                id: id.clone(),
                kind,
                tag: Tag::new(tag),
                ports,
                attributes: IndexMap::new(),
                custom_attributes: IndexMap::new(),
            })
            .unwrap()
    }

    fn pump_tank_model() -> (GraphModel, ComponentId, ComponentId) {
        let registry = Registry::load().unwrap();
        let mut model = GraphModel::new(ModelMetadata::default());
        let tank = component(&mut model, &registry, "tank", "T-001");
        let pump = component(&mut model, &registry, "pump", "P-101");
        (model, tank, pump)
    }

    #[test]
    fn tag_conflict_is_rejected() {
        let registry = Registry::load().unwrap();
        let (mut model, _, _) = pump_tank_model();
        let kind = registry.resolve("pump").unwrap();
        let id = model.next_id("PMP");
        let err = model
            .insert_component(Component {
                id,
                kind,
                tag: Tag::new("P-101"),
                ports: vec![],
                attributes: IndexMap::new(),
                custom_attributes: IndexMap::new(),
            })
            .unwrap_err();
        assert!(matches!(err, ModelError::TagConflict(_)));
    }

    #[test]
    fn connect_validates_port_range() {
        let (mut model, tank, pump) = pump_tank_model();
        let err = model
            .connect(Endpoint::new(tank, 5), Endpoint::new(pump, 0), None)
            .unwrap_err();
        assert!(matches!(err, ModelError::ConnectionInvalid(_)));
    }

    #[test]
    fn connect_creates_network_and_segment() {
        let (mut model, tank, pump) = pump_tank_model();
        let segment = model
            .connect(Endpoint::new(tank, 0), Endpoint::new(pump, 0), Some(SmolStr::new("001")))
            .unwrap();
        assert_eq!(model.networks.len(), 1);
        assert_eq!(model.segment(&segment).unwrap().connections.len(), 1);
        model.validate().unwrap();
    }

    #[test]
    fn split_positions_zero_and_one_are_out_of_range() {
        let (mut model, tank, pump) = pump_tank_model();
        let segment = model.connect(Endpoint::new(tank, 0), Endpoint::new(pump, 0), None).unwrap();
        for position in [0.0, 1.0] {
            let err = model.split_segment(&segment, position).unwrap_err();
            assert!(matches!(err, ModelError::PositionOutOfRange { .. }));
        }
    }

    #[test]
    fn insert_inline_rewires_the_cut_connection() {
        let registry = Registry::load().unwrap();
        let (mut model, tank, pump) = pump_tank_model();
        let segment = model.connect(Endpoint::new(tank.clone(), 0), Endpoint::new(pump.clone(), 0), None).unwrap();

        let kind = registry.resolve("valve").unwrap();
        let id = model.next_id("VLV");
        let valve = Component {
            id,
            kind,
            tag: Tag::new("V-001"),
            ports: vec![Port::new("N1", PortKind::Node), Port::new("N2", PortKind::Node)],
            attributes: IndexMap::new(),
            custom_attributes: IndexMap::new(),
        };
        let valve_id = model.insert_inline(&segment, 0.5, valve).unwrap();

        let connections: Vec<_> = model.connections().cloned().collect();
        assert_eq!(connections.len(), 2);
        assert_eq!(connections[0].from.item, tank);
        assert_eq!(connections[0].to.item, valve_id);
        assert_eq!(connections[1].from.item, valve_id);
        assert_eq!(connections[1].from.port, 1);
        assert_eq!(connections[1].to.item, pump);
        model.validate().unwrap();
    }

    #[test]
    fn merge_requires_adjacency() {
        let registry = Registry::load().unwrap();
        let (mut model, tank, pump) = pump_tank_model();
        let heater = component(&mut model, &registry, "heater", "E-001");
        let cooler = component(&mut model, &registry, "cooler", "E-002");
        let a = model.connect(Endpoint::new(tank, 0), Endpoint::new(pump.clone(), 0), None).unwrap();
        let b = model.connect(Endpoint::new(pump, 1), Endpoint::new(heater.clone(), 0), None).unwrap();
        let c = model.connect(Endpoint::new(cooler, 0), Endpoint::new(heater, 1), None).unwrap();

        assert!(matches!(
            model.merge_segments(&a, &c),
            Err(ModelError::SegmentsNotAdjacent(_, _))
        ));
        model.merge_segments(&a, &b).unwrap();
        assert_eq!(model.segment(&a).unwrap().connections.len(), 2);
    }

    #[test]
    fn rewire_without_reroute_changes_one_connection() {
        let registry = Registry::load().unwrap();
        let (mut model, tank, pump) = pump_tank_model();
        let heater = component(&mut model, &registry, "heater", "E-1");
        let cooler = component(&mut model, &registry, "cooler", "E-2");
        let a = model.connect(Endpoint::new(tank.clone(), 0), Endpoint::new(pump.clone(), 0), None).unwrap();
        let b = model.connect(Endpoint::new(pump.clone(), 1), Endpoint::new(heater.clone(), 0), None).unwrap();
        model.merge_segments(&a, &b).unwrap();

        let rerouted = model
            .rewire_connection(&a, 0, Endpoint::new(cooler.clone(), 0), false)
            .unwrap();
        assert_eq!(rerouted, 0);
        let connections: Vec<_> = model.segment(&a).unwrap().connections.clone();
        assert_eq!(connections[0].to.item, cooler);
        // The old target's outgoing connection is left as it was.
        assert_eq!(connections[1].from.item, pump);
        assert_eq!(connections[1].to.item, heater);
    }

    #[test]
    fn rewire_with_reroute_makes_downstream_connections_follow() {
        let registry = Registry::load().unwrap();
        let (mut model, tank, pump) = pump_tank_model();
        let heater = component(&mut model, &registry, "heater", "E-1");
        let cooler = component(&mut model, &registry, "cooler", "E-2");
        let a = model.connect(Endpoint::new(tank.clone(), 0), Endpoint::new(pump.clone(), 0), None).unwrap();
        let b = model.connect(Endpoint::new(pump.clone(), 1), Endpoint::new(heater.clone(), 0), None).unwrap();
        model.merge_segments(&a, &b).unwrap();

        let rerouted = model
            .rewire_connection(&a, 0, Endpoint::new(cooler.clone(), 0), true)
            .unwrap();
        assert_eq!(rerouted, 1);
        let connections: Vec<_> = model.segment(&a).unwrap().connections.clone();
        assert_eq!(connections[0].from.item, tank);
        assert_eq!(connections[0].to.item, cooler);
        // The downstream connection followed, keeping its port index.
        assert_eq!(connections[1].from.item, cooler);
        assert_eq!(connections[1].from.port, 1);
        assert_eq!(connections[1].to.item, heater);
        model.validate().unwrap();
    }

    #[test]
    fn reroute_validates_before_mutating() {
        let registry = Registry::load().unwrap();
        let (mut model, tank, pump) = pump_tank_model();
        let heater = component(&mut model, &registry, "heater", "E-1");
        // Agitator has a single port, so the follower's port 1 cannot move.
        let agitator = component(&mut model, &registry, "agitator", "A-1");
        let a = model.connect(Endpoint::new(tank.clone(), 0), Endpoint::new(pump.clone(), 0), None).unwrap();
        let b = model.connect(Endpoint::new(pump.clone(), 1), Endpoint::new(heater.clone(), 0), None).unwrap();
        model.merge_segments(&a, &b).unwrap();

        let err = model
            .rewire_connection(&a, 0, Endpoint::new(agitator, 0), true)
            .unwrap_err();
        assert!(matches!(err, ModelError::ConnectionInvalid(_)));
        // Nothing changed.
        let connections: Vec<_> = model.segment(&a).unwrap().connections.clone();
        assert_eq!(connections[0].to.item, pump);
        assert_eq!(connections[1].from.item, pump);
    }

    #[test]
    fn cascade_removal_clears_connections_and_associations() {
        let (mut model, tank, pump) = pump_tank_model();
        model.connect(Endpoint::new(tank.clone(), 0), Endpoint::new(pump.clone(), 0), None).unwrap();
        let registry = Registry::load().unwrap();
        let sensor_kind = registry.resolve("temperature_element").unwrap();
        model
            .add_instrumentation(
                Tag::new("TIC-101"),
                vec![Sensor { tag: Tag::new("TT-101"), kind: sensor_kind, located_in: Some(tank.clone()) }],
                vec![Association { assoc_type: AssociationType::IsLocatedIn, item: tank.clone() }],
            )
            .unwrap();

        assert!(model.remove_component(&tank, false).is_err());
        model.remove_component(&tank, true).unwrap();
        assert!(model.networks.is_empty());
        assert!(model.instrumentation[0].associations.is_empty());
        assert!(model.instrumentation[0].sensors[0].located_in.is_none());
        model.validate().unwrap();
    }

    #[test]
    fn ids_stay_stable_after_removal() {
        let (mut model, _, pump) = pump_tank_model();
        model.remove_component(&pump, true).unwrap();
        let next = model.next_id("PMP");
        assert_eq!(next.as_str(), "PMP-2");
    }

    #[test]
    fn json_roundtrip_is_byte_stable() {
        let (mut model, tank, pump) = pump_tank_model();
        model.connect(Endpoint::new(tank, 0), Endpoint::new(pump, 0), None).unwrap();
        let first = serde_json::to_string_pretty(&model).unwrap();
        let mut reparsed: GraphModel = serde_json::from_str(&first).unwrap();
        reparsed.rebuild_tag_index();
        let second = serde_json::to_string_pretty(&reparsed).unwrap();
        assert_eq!(first, second);
        assert_eq!(model, reparsed);
    }
}
