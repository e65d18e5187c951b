//! Error types for feed decoding and row conversion.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding feed messages.
#[derive(Error, Debug)]
pub enum Error {
    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A feed timestamp could not be parsed.
    #[error("invalid timestamp '{value}': {reason}")]
    InvalidTimestamp {
        /// The raw timestamp string from the feed.
        value: String,
        /// Description of what's wrong.
        reason: String,
    },

    /// A message field has an invalid value (e.g., an empty id).
    #[error("invalid field '{field}': {reason}")]
    InvalidField {
        /// The name of the invalid field.
        field: &'static str,
        /// Description of what's wrong.
        reason: String,
    },

    /// The line is valid JSON but not a message kind the feed is known to send.
    #[error("unrecognized feed message: {0}")]
    UnrecognizedMessage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Error Display formatting tests
    // =========================================================================

    #[test]
    fn test_invalid_timestamp_display() {
        let err = Error::InvalidTimestamp {
            value: "yesterday".to_string(),
            reason: "input contains invalid characters".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("invalid timestamp"));
        assert!(msg.contains("yesterday"));
        assert!(msg.contains("invalid characters"));
    }

    #[test]
    fn test_invalid_field_display() {
        let err = Error::InvalidField {
            field: "id_str",
            reason: "must not be empty".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("id_str"));
        assert!(msg.contains("must not be empty"));
    }

    #[test]
    fn test_unrecognized_message_display() {
        let err = Error::UnrecognizedMessage("keys: scrub_geo".to_string());
        assert!(err.to_string().contains("scrub_geo"));
    }

    // =========================================================================
    // Error From conversions
    // =========================================================================

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not valid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
        assert!(err.to_string().contains("JSON error"));
    }
}
