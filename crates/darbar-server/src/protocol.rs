use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use darbar_core::errors::ValidationError;
use darbar_core::events::{ErrorAck, OutboundEvent, Role, PARSE_ERROR};

/// One inbound frame: `{"event": <name>, "payload": <json>}`.
#[derive(Debug, Deserialize)]
pub struct InboundFrame {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

/// Parse a raw text frame. Failures become a `PARSE_ERROR` ack.
pub fn parse_frame(raw: &str) -> Result<InboundFrame, ErrorAck> {
    let frame: InboundFrame = serde_json::from_str(raw)
        .map_err(|e| ErrorAck::new("", PARSE_ERROR, format!("Parse error: {e}")))?;
    if frame.event.trim().is_empty() {
        return Err(ErrorAck::new("", PARSE_ERROR, "Parse error: empty event name"));
    }
    Ok(frame)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SearchPayload {
    Object { text: String },
    Bare(String),
}

/// Extract the query from a `search` payload: `{text}` or a bare string.
pub fn search_text(payload: Value) -> Result<String, ValidationError> {
    match serde_json::from_value(payload) {
        Ok(SearchPayload::Object { text }) | Ok(SearchPayload::Bare(text)) => Ok(text),
        Err(_) => Err(ValidationError::InvalidPayload(
            "search expects {text} or a string".into(),
        )),
    }
}

#[derive(Deserialize)]
struct HelloPayload {
    role: Role,
}

pub fn hello_role(payload: Value) -> Result<Role, ValidationError> {
    serde_json::from_value::<HelloPayload>(payload)
        .map(|p| p.role)
        .map_err(|e| ValidationError::InvalidPayload(format!("hello: {e}")))
}

/// Error ack for a rejected event.
pub fn rejection(event: &str, err: &ValidationError) -> ErrorAck {
    ErrorAck::new(event, err.code(), err.to_string())
}

/// Serialize an outbound event, logging instead of failing.
pub fn encode(event: &OutboundEvent<'_>) -> Option<Arc<str>> {
    match event.encode() {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::error!(event = event.name(), error = %e, "failed to encode outbound frame");
            None
        }
    }
}
