use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::scripture::{Bani, LineRecord};
use crate::state::SessionState;

/// Inbound query event. Not an intent.
pub const SEARCH: &str = "search";
/// Inbound role announcement.
pub const HELLO: &str = "hello";

pub const PARSE_ERROR: &str = "PARSE_ERROR";
pub const SEARCH_FAILED: &str = "SEARCH_FAILED";

/// Self-declared purpose of a connection. Recorded, never enforced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Controller,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Controller => "controller",
            Self::Viewer => "viewer",
        }
    }
}

/// Refusal sent back to the one connection whose event was rejected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorAck {
    /// Inbound event name that caused the error, empty if it could not be read.
    pub event: String,
    pub code: String,
    pub message: String,
}

impl ErrorAck {
    pub fn new(event: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Every server-to-client frame.
///
/// Serializes as `{"event": <name>, "payload": <body>}`.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum OutboundEvent<'a> {
    State(&'a SessionState),
    Banis(&'a [Bani]),
    Results { matches: &'a [LineRecord] },
    Error(&'a ErrorAck),
}

impl OutboundEvent<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::State(_) => "state",
            Self::Banis(_) => "banis",
            Self::Results { .. } => "results",
            Self::Error(_) => "error",
        }
    }

    /// Serialize once; the result is shared by every recipient.
    pub fn encode(&self) -> Result<Arc<str>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }
}
