//! The wire error envelope.
//!
//! Every externally visible failure serializes as
//! `{ok: false, error: {code, message, details?}}`. Context that helps the
//! caller act (XPath for schema failures, token index for parse failures,
//! candidate lists for ambiguous targets) travels in `details`.

use serde::Serialize;
use serde_json::json;

use super::EngineError;
use crate::base::ErrorCode;
use crate::model::ModelError;
use crate::ops::OpError;
use crate::proteus::ExportError;

/// The serialized failure body.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// The uniform failure envelope.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: ErrorBody,
}

impl ErrorEnvelope {
    pub fn new(error: &EngineError) -> Self {
        Self {
            ok: false,
            error: ErrorBody {
                code: error.code(),
                message: error.to_string(),
                details: details_of(error),
            },
        }
    }
}

fn details_of(error: &EngineError) -> Option<serde_json::Value> {
    match error {
        EngineError::Parse(parse) => Some(json!({
            "token_index": parse.token_index,
            "offset": parse.offset,
        })),
        EngineError::Export(ExportError::XsdInvalid { element, attribute, xpath, .. }) => {
            Some(json!({
                "element": element,
                "attribute": attribute,
                "xpath": xpath,
            }))
        }
        EngineError::Export(ExportError::FlowIndexOutOfRange { value, node_count }) => {
            Some(json!({ "value": value, "node_count": node_count }))
        }
        EngineError::Model(ModelError::TargetAmbiguous { selector, candidates })
        | EngineError::Op(OpError::Model(ModelError::TargetAmbiguous { selector, candidates })) => {
            Some(json!({ "selector": selector, "candidates": candidates }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sfiles;

    #[test]
    fn envelope_carries_code_and_details() {
        let parse = sfiles::parse("a[tank]->->b[pump]").unwrap_err();
        let error = EngineError::Parse(parse);
        let envelope = ErrorEnvelope::new(&error);

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["ok"], json!(false));
        assert_eq!(value["error"]["code"], json!("PARSE_ERROR"));
        assert_eq!(value["error"]["details"]["token_index"], json!(5));
    }
}
