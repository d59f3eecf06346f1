//! Operation descriptors: the typed contract of one operation.

use semver::Version;
use serde::Serialize;
use smol_str::SmolStr;

use super::{OpError, OperationOutcome, Params};
use crate::model::Model;
use crate::registry::Category;

/// Handler: a function from (model, params) to an outcome.
pub type Handler = Box<dyn Fn(&mut Model, &Params<'_>) -> Result<OperationOutcome, OpError> + Send + Sync>;

/// Pre/post validation hook.
pub type Hook = Box<dyn Fn(&Model, &Params<'_>) -> Result<(), OpError> + Send + Sync>;

/// Where an operation applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpCategory {
    /// Graph dialect only.
    GraphDialect,
    /// Linear dialect only.
    LinearDialect,
    /// Either dialect.
    Universal,
    /// Convenience wrapper over a universal operation.
    Tactical,
    /// Multi-step, model-shaping operation.
    Strategic,
}

/// Declared parameter types for payload validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    Float,
    Boolean,
    Object,
    List,
}

impl ParamType {
    fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::List => value.is_array(),
        }
    }
}

/// One declared parameter.
#[derive(Clone, Debug)]
pub struct ParamSpec {
    pub name: SmolStr,
    pub ty: ParamType,
    pub required: bool,
    pub description: SmolStr,
}

impl ParamSpec {
    pub fn required(name: &str, ty: ParamType, description: &str) -> Self {
        Self { name: SmolStr::new(name), ty, required: true, description: SmolStr::new(description) }
    }

    pub fn optional(name: &str, ty: ParamType, description: &str) -> Self {
        Self { name: SmolStr::new(name), ty, required: false, description: SmolStr::new(description) }
    }
}

/// Diff metadata: what the operation may touch.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DiffMeta {
    pub adds: bool,
    pub removes: bool,
    pub modifies: bool,
    /// Component categories the operation touches, when bounded.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub touches: Vec<Category>,
}

/// Deprecation lifecycle of a descriptor.
///
/// Deprecated descriptors stay registered until the next major bump.
#[derive(Clone, Debug, Serialize)]
pub struct Deprecation {
    pub introduced: Version,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated_in: Option<Version>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removal_planned: Option<Version>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub replaces: Vec<SmolStr>,
}

impl Deprecation {
    pub fn introduced(version: &str) -> Self {
        Self {
            introduced: Version::parse(version).expect("static version must parse"),
            deprecated_in: None,
            removal_planned: None,
            replaces: Vec::new(),
        }
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecated_in.is_some()
    }
}

/// The full contract of one registered operation.
pub struct OperationDescriptor {
    pub name: SmolStr,
    pub version: Version,
    pub category: OpCategory,
    pub description: SmolStr,
    pub params: Vec<ParamSpec>,
    pub diff: DiffMeta,
    pub deprecation: Deprecation,
    pub handler: Handler,
    pub pre: Option<Hook>,
    pub post: Option<Hook>,
}

impl OperationDescriptor {
    /// Check a JSON payload against the declared parameters: required
    /// parameters present, declared types respected, no undeclared keys.
    pub fn validate_payload(&self, payload: &serde_json::Value) -> Result<(), OpError> {
        let invalid = |reason: String| OpError::InvalidPayload {
            operation: self.name.clone(),
            reason,
        };

        let object = match payload {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null if self.params.iter().all(|p| !p.required) => return Ok(()),
            _ => return Err(invalid("payload must be an object".into())),
        };

        for spec in &self.params {
            match object.get(spec.name.as_str()) {
                Some(value) if spec.ty.matches(value) => {}
                Some(serde_json::Value::Null) if !spec.required => {}
                Some(value) => {
                    return Err(invalid(format!(
                        "parameter `{}` must be {:?}, found {value}",
                        spec.name, spec.ty
                    )));
                }
                None if spec.required => {
                    return Err(invalid(format!("missing required parameter `{}`", spec.name)));
                }
                None => {}
            }
        }

        for key in object.keys() {
            if !self.params.iter().any(|p| p.name == key.as_str()) {
                return Err(invalid(format!("undeclared parameter `{key}`")));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("category", &self.category)
            .field("params", &self.params.len())
            .finish_non_exhaustive()
    }
}
