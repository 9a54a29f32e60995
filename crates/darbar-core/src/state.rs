use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::ids::{CompositionId, LineId};
use crate::intent::ClientIntent;
use crate::options::DisplayOptions;

/// Which line is on screen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRef {
    pub composition_id: CompositionId,
    pub line_id: LineId,
}

impl LineRef {
    pub fn new(composition_id: impl Into<String>, line_id: impl Into<String>) -> Self {
        Self {
            composition_id: CompositionId::from_raw(composition_id),
            line_id: LineId::from_raw(line_id),
        }
    }
}

/// The single shared truth every connected client renders from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// Number of intents applied since process start.
    pub revision: u64,
    pub line: Option<LineRef>,
    pub options: DisplayOptions,
}

impl SessionState {
    /// Compute the successor state for `intent`.
    ///
    /// Pure: `self` is never touched, so a rejected intent leaves the
    /// caller's state exactly as it was.
    pub fn apply(&self, intent: &ClientIntent) -> Result<Self, ValidationError> {
        let mut next = match intent {
            ClientIntent::Navigate {
                composition_id,
                line_id,
            } => {
                let composition_id = match (composition_id, &self.line) {
                    (Some(id), _) => id.clone(),
                    (None, Some(current)) => current.composition_id.clone(),
                    (None, None) => {
                        return Err(ValidationError::IllegalIntent(
                            "navigate without compositionId requires a line on screen".into(),
                        ))
                    }
                };
                Self {
                    line: Some(LineRef {
                        composition_id,
                        line_id: line_id.clone(),
                    }),
                    ..self.clone()
                }
            }
            ClientIntent::Clear => Self {
                line: None,
                ..self.clone()
            },
            ClientIntent::SetOption { name, value } => {
                let updates = std::iter::once((name.clone(), value.clone())).collect();
                Self {
                    options: self.options.with_all(&updates)?,
                    ..self.clone()
                }
            }
            ClientIntent::SetOptions(updates) => Self {
                options: self.options.with_all(updates)?,
                ..self.clone()
            },
            ClientIntent::ResetOptions => Self {
                options: DisplayOptions::default(),
                ..self.clone()
            },
        };
        next.revision = self.revision + 1;
        Ok(next)
    }
}
