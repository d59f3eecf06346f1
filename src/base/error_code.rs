//! Wire-level error codes.
//!
//! Every externally visible failure carries one of these codes in the error
//! envelope; per-operation records inside a transaction use the same set.

use serde::Serialize;

/// The closed set of externally visible error codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ModelNotFound,
    TransactionNotFound,
    TransactionAlreadyActive,
    OperationNotFound,
    InvalidPayload,
    ValidationFailed,
    TagConflict,
    TargetNotFound,
    TargetAmbiguous,
    ConnectionInvalid,
    PositionOutOfRange,
    SegmentsNotAdjacent,
    TemplateNotFound,
    UnknownKind,
    ParseError,
    XsdInvalid,
    ReferenceUndefined,
    TransactionFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelNotFound => "MODEL_NOT_FOUND",
            Self::TransactionNotFound => "TRANSACTION_NOT_FOUND",
            Self::TransactionAlreadyActive => "TRANSACTION_ALREADY_ACTIVE",
            Self::OperationNotFound => "OPERATION_NOT_FOUND",
            Self::InvalidPayload => "INVALID_PAYLOAD",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::TagConflict => "TAG_CONFLICT",
            Self::TargetNotFound => "TARGET_NOT_FOUND",
            Self::TargetAmbiguous => "TARGET_AMBIGUOUS",
            Self::ConnectionInvalid => "CONNECTION_INVALID",
            Self::PositionOutOfRange => "POSITION_OUT_OF_RANGE",
            Self::SegmentsNotAdjacent => "SEGMENTS_NOT_ADJACENT",
            Self::TemplateNotFound => "TEMPLATE_NOT_FOUND",
            Self::UnknownKind => "UNKNOWN_KIND",
            Self::ParseError => "PARSE_ERROR",
            Self::XsdInvalid => "XSD_INVALID",
            Self::ReferenceUndefined => "REFERENCE_UNDEFINED",
            Self::TransactionFailed => "TRANSACTION_FAILED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
