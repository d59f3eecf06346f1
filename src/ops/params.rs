//! Typed access to an operation's JSON payload.
//!
//! The payload is structurally validated against the descriptor before a
//! handler runs; these accessors still return `InvalidPayload` rather than
//! panicking so handlers stay total.

use smol_str::SmolStr;

use super::OpError;

/// A validated payload with its owning operation name, for error context.
pub struct Params<'a> {
    operation: &'a SmolStr,
    value: &'a serde_json::Value,
}

impl<'a> Params<'a> {
    pub fn new(operation: &'a SmolStr, value: &'a serde_json::Value) -> Self {
        Self { operation, value }
    }

    pub fn operation(&self) -> &SmolStr {
        self.operation
    }

    pub fn raw(&self) -> &serde_json::Value {
        self.value
    }

    fn invalid(&self, reason: String) -> OpError {
        OpError::InvalidPayload { operation: self.operation.clone(), reason }
    }

    fn get(&self, name: &str) -> Option<&'a serde_json::Value> {
        match self.value.get(name) {
            Some(serde_json::Value::Null) | None => None,
            Some(value) => Some(value),
        }
    }

    // ── Required accessors ──────────────────────────────────────────

    pub fn str(&self, name: &str) -> Result<&'a str, OpError> {
        self.opt_str(name)?
            .ok_or_else(|| self.invalid(format!("missing required parameter `{name}`")))
    }

    pub fn f64(&self, name: &str) -> Result<f64, OpError> {
        self.opt_f64(name)?
            .ok_or_else(|| self.invalid(format!("missing required parameter `{name}`")))
    }

    pub fn usize(&self, name: &str) -> Result<usize, OpError> {
        self.opt_usize(name)?
            .ok_or_else(|| self.invalid(format!("missing required parameter `{name}`")))
    }

    // ── Optional accessors ──────────────────────────────────────────

    pub fn opt_str(&self, name: &str) -> Result<Option<&'a str>, OpError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| self.invalid(format!("parameter `{name}` must be a string"))),
        }
    }

    pub fn opt_f64(&self, name: &str) -> Result<Option<f64>, OpError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.invalid(format!("parameter `{name}` must be a number"))),
        }
    }

    pub fn opt_usize(&self, name: &str) -> Result<Option<usize>, OpError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => value
                .as_u64()
                .map(|v| Some(v as usize))
                .ok_or_else(|| self.invalid(format!("parameter `{name}` must be a non-negative integer"))),
        }
    }

    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool, OpError> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => value
                .as_bool()
                .ok_or_else(|| self.invalid(format!("parameter `{name}` must be a boolean"))),
        }
    }

    pub fn opt_object(
        &self,
        name: &str,
    ) -> Result<Option<&'a serde_json::Map<String, serde_json::Value>>, OpError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => value
                .as_object()
                .map(Some)
                .ok_or_else(|| self.invalid(format!("parameter `{name}` must be an object"))),
        }
    }
}
