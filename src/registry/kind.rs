//! Kind classification: disciplines, categories, and the kind handle.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// The three top-level component disciplines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Discipline {
    Equipment,
    Piping,
    Instrumentation,
}

impl Discipline {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equipment => "EQUIPMENT",
            Self::Piping => "PIPING",
            Self::Instrumentation => "INSTRUMENTATION",
        }
    }
}

impl std::fmt::Display for Discipline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of component categories across all three disciplines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    // Equipment
    Rotating,
    HeatTransfer,
    Separation,
    Storage,
    Reaction,
    Treatment,
    Transport,
    Custom,

    // Piping
    Valve,
    Pipe,
    Connection,
    FlowMeasurement,
    Filtration,
    Safety,
    Structure,
    OtherPiping,

    // Instrumentation
    Actuating,
    Signal,
    Measurement,
    Control,
    ControlLoop,
    Sensing,
    Detector,
    Transmitter,
    Converter,
    OtherInstrumentation,
}

impl Category {
    /// Parse a catalogue token (`HEAT_TRANSFER`, `VALVE`, ...).
    pub fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "ROTATING" => Self::Rotating,
            "HEAT_TRANSFER" => Self::HeatTransfer,
            "SEPARATION" => Self::Separation,
            "STORAGE" => Self::Storage,
            "REACTION" => Self::Reaction,
            "TREATMENT" => Self::Treatment,
            "TRANSPORT" => Self::Transport,
            "CUSTOM" => Self::Custom,
            "VALVE" => Self::Valve,
            "PIPE" => Self::Pipe,
            "CONNECTION" => Self::Connection,
            "FLOW_MEASUREMENT" => Self::FlowMeasurement,
            "FILTRATION" => Self::Filtration,
            "SAFETY" => Self::Safety,
            "STRUCTURE" => Self::Structure,
            "OTHER_PIPING" => Self::OtherPiping,
            "ACTUATING" => Self::Actuating,
            "SIGNAL" => Self::Signal,
            "MEASUREMENT" => Self::Measurement,
            "CONTROL" => Self::Control,
            "CONTROL_LOOP" => Self::ControlLoop,
            "SENSING" => Self::Sensing,
            "DETECTOR" => Self::Detector,
            "TRANSMITTER" => Self::Transmitter,
            "CONVERTER" => Self::Converter,
            "OTHER_INSTRUMENTATION" => Self::OtherInstrumentation,
            _ => return None,
        })
    }

    /// The catalogue token for this category.
    pub fn as_token(&self) -> &'static str {
        match self {
            Self::Rotating => "ROTATING",
            Self::HeatTransfer => "HEAT_TRANSFER",
            Self::Separation => "SEPARATION",
            Self::Storage => "STORAGE",
            Self::Reaction => "REACTION",
            Self::Treatment => "TREATMENT",
            Self::Transport => "TRANSPORT",
            Self::Custom => "CUSTOM",
            Self::Valve => "VALVE",
            Self::Pipe => "PIPE",
            Self::Connection => "CONNECTION",
            Self::FlowMeasurement => "FLOW_MEASUREMENT",
            Self::Filtration => "FILTRATION",
            Self::Safety => "SAFETY",
            Self::Structure => "STRUCTURE",
            Self::OtherPiping => "OTHER_PIPING",
            Self::Actuating => "ACTUATING",
            Self::Signal => "SIGNAL",
            Self::Measurement => "MEASUREMENT",
            Self::Control => "CONTROL",
            Self::ControlLoop => "CONTROL_LOOP",
            Self::Sensing => "SENSING",
            Self::Detector => "DETECTOR",
            Self::Transmitter => "TRANSMITTER",
            Self::Converter => "CONVERTER",
            Self::OtherInstrumentation => "OTHER_INSTRUMENTATION",
        }
    }

    /// The discipline this category belongs to.
    pub fn discipline(&self) -> Discipline {
        match self {
            Self::Rotating
            | Self::HeatTransfer
            | Self::Separation
            | Self::Storage
            | Self::Reaction
            | Self::Treatment
            | Self::Transport
            | Self::Custom => Discipline::Equipment,
            Self::Valve
            | Self::Pipe
            | Self::Connection
            | Self::FlowMeasurement
            | Self::Filtration
            | Self::Safety
            | Self::Structure
            | Self::OtherPiping => Discipline::Piping,
            Self::Actuating
            | Self::Signal
            | Self::Measurement
            | Self::Control
            | Self::ControlLoop
            | Self::Sensing
            | Self::Detector
            | Self::Transmitter
            | Self::Converter
            | Self::OtherInstrumentation => Discipline::Instrumentation,
        }
    }

    /// Three-letter prefix used for placeholder symbols and exporter ids of
    /// kinds that carry no symbol entry.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Rotating => "ROT",
            Self::HeatTransfer => "HTX",
            Self::Separation => "SPR",
            Self::Storage => "STG",
            Self::Reaction => "RXN",
            Self::Treatment => "TRT",
            Self::Transport => "TRP",
            Self::Custom => "CST",
            Self::Valve => "VLV",
            Self::Pipe => "PIP",
            Self::Connection => "CXN",
            Self::FlowMeasurement => "FLM",
            Self::Filtration => "FLR",
            Self::Safety => "SAF",
            Self::Structure => "STU",
            Self::OtherPiping => "OPG",
            Self::Actuating => "ACT",
            Self::Signal => "SIG",
            Self::Measurement => "MEA",
            Self::Control => "CTL",
            Self::ControlLoop => "CLP",
            Self::Sensing => "SNS",
            Self::Detector => "DTC",
            Self::Transmitter => "XMT",
            Self::Converter => "CVR",
            Self::OtherInstrumentation => "OIN",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_token())
    }
}

/// Opaque handle to a catalogue kind, carrying the canonical class name.
///
/// The registry's `resolve` is the only way to obtain a validated handle;
/// deserialized handles are re-checked by model validation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentKind(pub(crate) SmolStr);

impl ComponentKind {
    /// The canonical class name (`CentrifugalPump`).
    pub fn class_name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One catalogue row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KindDef {
    pub class_name: SmolStr,
    pub sfiles_alias: SmolStr,
    pub is_primary: bool,
    /// Family alias this kind belongs to, if any (`pump`).
    pub family: Option<SmolStr>,
    pub category: Category,
    /// Symbol id from the known map; `None` means a placeholder is derived.
    pub symbol_id: Option<SmolStr>,
    pub port_count: usize,
    pub display_name: SmolStr,
}

impl KindDef {
    pub fn discipline(&self) -> Discipline {
        self.category.discipline()
    }

    pub fn kind(&self) -> ComponentKind {
        ComponentKind(self.class_name.clone())
    }
}

/// Description of a kind as returned by `Registry::describe`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KindInfo {
    pub class_name: SmolStr,
    pub category: Category,
    pub discipline: Discipline,
    pub family: Option<SmolStr>,
    /// The family's primary kind, when the kind belongs to a family.
    pub primary: Option<SmolStr>,
    pub default_port_count: usize,
    pub default_symbol_id: SmolStr,
    pub all_aliases: Vec<SmolStr>,
    pub display_name: SmolStr,
}
