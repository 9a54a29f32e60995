/// Why an inbound intent was refused before it could touch session state.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Payload did not match the declared shape for its event.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Payload was well-formed but cannot apply to the current state.
    #[error("illegal intent: {0}")]
    IllegalIntent(String),

    #[error("unknown display option: {0}")]
    UnknownOption(String),

    #[error("invalid value for display option {name}: expected {expected}")]
    InvalidOptionValue { name: String, expected: String },
}

impl ValidationError {
    /// Wire code sent back to the originating connection.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::IllegalIntent(_) | Self::UnknownOption(_) | Self::InvalidOptionValue { .. } => {
                "ILLEGAL_INTENT"
            }
        }
    }
}

/// Failure reported by a scripture collaborator (search / reading lists).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("query failed: {0}")]
    Query(String),

    #[error("scripture source unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Query(_) => "query",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_errors_map_to_invalid_payload() {
        assert_eq!(
            ValidationError::InvalidPayload("missing lineId".into()).code(),
            "INVALID_PAYLOAD"
        );
    }

    #[test]
    fn state_errors_map_to_illegal_intent() {
        assert_eq!(ValidationError::IllegalIntent("x".into()).code(), "ILLEGAL_INTENT");
        assert_eq!(ValidationError::UnknownOption("x".into()).code(), "ILLEGAL_INTENT");
        assert_eq!(
            ValidationError::InvalidOptionValue {
                name: "spacing".into(),
                expected: "one of center".into(),
            }
            .code(),
            "ILLEGAL_INTENT"
        );
    }

    #[test]
    fn display_includes_detail() {
        let err = ValidationError::UnknownOption("fontSize".into());
        assert_eq!(err.to_string(), "unknown display option: fontSize");
        let err = SourceError::Query("no such table: lines".into());
        assert_eq!(err.to_string(), "query failed: no such table: lines");
        assert_eq!(err.error_kind(), "query");
    }
}
