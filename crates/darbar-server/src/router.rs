use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use darbar_core::errors::ValidationError;
use darbar_core::ids::ConnectionId;
use serde_json::Value;

/// Handles one named inbound event.
///
/// Implementations decode their payload at the boundary. A returned error is
/// sent back to the originating connection as an `error` ack; anything that
/// completes later (search results, state broadcasts) is delivered by the
/// handler itself.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(
        &self,
        conn: &ConnectionId,
        event: &str,
        payload: Value,
    ) -> Result<(), ValidationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("handler already registered for event {0}")]
    DuplicateHandler(String),
}

#[derive(Debug, PartialEq, Eq)]
pub enum DispatchError {
    UnknownEvent,
    Rejected(ValidationError),
}

/// Named-event dispatch table: exactly one handler per event name.
#[derive(Default)]
pub struct EventRouter {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        &mut self,
        event: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), RouterError> {
        let event = event.into();
        if self.handlers.contains_key(&event) {
            return Err(RouterError::DuplicateHandler(event));
        }
        self.handlers.insert(event, handler);
        Ok(())
    }

    /// Registered event names, sorted.
    pub fn events(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub async fn dispatch(
        &self,
        conn: &ConnectionId,
        event: &str,
        payload: Value,
    ) -> Result<(), DispatchError> {
        let Some(handler) = self.handlers.get(event) else {
            tracing::debug!(conn_id = %conn, event, "no handler for event, ignoring");
            return Err(DispatchError::UnknownEvent);
        };
        handler
            .handle(conn, event, payload)
            .await
            .map_err(DispatchError::Rejected)
    }
}
