//! Client intents: requested mutations of the shared session.
//!
//! Decoding checks payload *shape* only. Whether an intent is legal against
//! the current state is decided by [`crate::state::SessionState::apply`].

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::ValidationError;
use crate::ids::{CompositionId, LineId};
use crate::options::OptionValue;

pub const NAVIGATE: &str = "navigate";
pub const CLEAR: &str = "clear";
pub const OPTION: &str = "option";
pub const OPTIONS: &str = "options";
pub const RESET_OPTIONS: &str = "resetOptions";

/// Every inbound event name that maps to an intent.
pub const INTENT_EVENTS: &[&str] = &[NAVIGATE, CLEAR, OPTION, OPTIONS, RESET_OPTIONS];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientIntent {
    /// Show a line. Without a composition id the line is taken from the
    /// currently displayed composition.
    Navigate {
        composition_id: Option<CompositionId>,
        line_id: LineId,
    },
    /// Blank the display.
    Clear,
    SetOption {
        name: String,
        value: OptionValue,
    },
    /// Several options, applied all-or-nothing.
    SetOptions(BTreeMap<String, OptionValue>),
    ResetOptions,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct NavigatePayload {
    composition_id: Option<String>,
    line_id: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct OptionPayload {
    name: String,
    value: OptionValue,
}

fn parse<T: DeserializeOwned>(event: &str, payload: Value) -> Result<T, ValidationError> {
    serde_json::from_value(payload)
        .map_err(|e| ValidationError::InvalidPayload(format!("{event}: {e}")))
}

fn non_empty(field: &str, raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidPayload(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Payload-less intents accept `null`, a missing payload, or `{}`.
fn expect_empty(event: &str, payload: &Value) -> Result<(), ValidationError> {
    match payload {
        Value::Null => Ok(()),
        Value::Object(map) if map.is_empty() => Ok(()),
        _ => Err(ValidationError::InvalidPayload(format!("{event} takes no payload"))),
    }
}

impl ClientIntent {
    /// Decode the payload of an intent event into a typed intent.
    pub fn decode(event: &str, payload: Value) -> Result<Self, ValidationError> {
        match event {
            NAVIGATE => {
                let p: NavigatePayload = parse(event, payload)?;
                let composition_id = p
                    .composition_id
                    .map(|c| non_empty("compositionId", &c))
                    .transpose()?
                    .map(CompositionId::from_raw);
                Ok(Self::Navigate {
                    composition_id,
                    line_id: LineId::from_raw(non_empty("lineId", &p.line_id)?),
                })
            }
            CLEAR => expect_empty(event, &payload).map(|()| Self::Clear),
            OPTION => {
                let p: OptionPayload = parse(event, payload)?;
                Ok(Self::SetOption {
                    name: p.name,
                    value: p.value,
                })
            }
            OPTIONS => {
                let map: BTreeMap<String, OptionValue> = parse(event, payload)?;
                if map.is_empty() {
                    return Err(ValidationError::InvalidPayload(
                        "options must name at least one option".into(),
                    ));
                }
                Ok(Self::SetOptions(map))
            }
            RESET_OPTIONS => expect_empty(event, &payload).map(|()| Self::ResetOptions),
            other => Err(ValidationError::InvalidPayload(format!(
                "{other} is not an intent"
            ))),
        }
    }

    /// Inbound event name this intent travels under.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Navigate { .. } => NAVIGATE,
            Self::Clear => CLEAR,
            Self::SetOption { .. } => OPTION,
            Self::SetOptions(_) => OPTIONS,
            Self::ResetOptions => RESET_OPTIONS,
        }
    }
}
