//! Error types for the sync engine.

use thiserror::Error;

/// All possible errors from the sync engine's pure operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("missing required field: {0}")]
    MissingRequiredField(String),

    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("type mismatch for field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    #[error("failed to canonicalize content for checksum: {0}")]
    Canonicalization(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::UnknownEntityType("attachment_v2".into());
        assert_eq!(err.to_string(), "unknown entity type: attachment_v2");

        let err = Error::TypeMismatch {
            field: "priority".into(),
            expected: "string".into(),
            got: "number".into(),
        };
        assert_eq!(
            err.to_string(),
            "type mismatch for field 'priority': expected string, got number"
        );
    }
}
