//! Inbound event handlers, one per concern.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use darbar_core::errors::ValidationError;
use darbar_core::events::{ErrorAck, OutboundEvent, HELLO, SEARCH, SEARCH_FAILED};
use darbar_core::ids::ConnectionId;
use darbar_core::intent::{ClientIntent, INTENT_EVENTS};
use darbar_core::scripture::ScriptureSource;
use darbar_telemetry::MetricsRecorder;

use crate::client::ClientRegistry;
use crate::metrics::{
    OUTCOME_ERROR, OUTCOME_INVALID, OUTCOME_OK, OUTCOME_REJECTED, SEARCH_DURATION_MS,
    SEARCH_IN_FLIGHT, SEARCH_REQUESTS_TOTAL, SESSION_INTENTS_TOTAL,
};
use crate::protocol;
use crate::router::{EventHandler, EventRouter, RouterError};
use crate::session::SessionHandle;

/// Decodes intent payloads and queues them at the session actor.
pub struct IntentHandler {
    session: SessionHandle,
    metrics: Arc<MetricsRecorder>,
}

impl IntentHandler {
    pub fn new(session: SessionHandle, metrics: Arc<MetricsRecorder>) -> Self {
        Self { session, metrics }
    }
}

#[async_trait]
impl EventHandler for IntentHandler {
    async fn handle(
        &self,
        conn: &ConnectionId,
        event: &str,
        payload: Value,
    ) -> Result<(), ValidationError> {
        let intent = ClientIntent::decode(event, payload).inspect_err(|e| {
            debug!(conn_id = %conn, event, error = %e, "malformed intent");
            self.metrics.counter_inc(
                SESSION_INTENTS_TOTAL,
                &[("event", event), ("outcome", OUTCOME_INVALID)],
                1,
            );
        })?;
        if let Err(e) = self.session.submit(conn.clone(), intent).await {
            warn!(conn_id = %conn, event, error = %e, "dropping intent");
        }
        Ok(())
    }
}

/// Searches one connection may have outstanding at once.
pub const MAX_SEARCHES_PER_CONNECTION: usize = 4;
/// Searches running against the source at once, across all connections.
pub const MAX_CONCURRENT_SEARCHES: usize = 8;

/// Outstanding searches per connection.
struct InFlight {
    counts: DashMap<ConnectionId, usize>,
    metrics: Arc<MetricsRecorder>,
}

impl InFlight {
    fn try_begin(self: &Arc<Self>, conn: &ConnectionId) -> Option<SearchSlot> {
        {
            let mut count = self.counts.entry(conn.clone()).or_insert(0);
            if *count >= MAX_SEARCHES_PER_CONNECTION {
                return None;
            }
            *count += 1;
        }
        self.metrics.gauge_inc(SEARCH_IN_FLIGHT, &[], 1.0);
        Some(SearchSlot {
            inflight: Arc::clone(self),
            conn: conn.clone(),
        })
    }
}

/// Releases one in-flight search when dropped.
struct SearchSlot {
    inflight: Arc<InFlight>,
    conn: ConnectionId,
}

impl Drop for SearchSlot {
    fn drop(&mut self) {
        self.inflight
            .counts
            .remove_if_mut(&self.conn, |_, count| {
                *count = count.saturating_sub(1);
                *count == 0
            });
        self.inflight.metrics.gauge_inc(SEARCH_IN_FLIGHT, &[], -1.0);
    }
}

/// Forwards queries to the scripture source off the dispatch task and
/// answers the requesting connection only.
///
/// Each connection may have [`MAX_SEARCHES_PER_CONNECTION`] searches
/// outstanding; extra requests are answered with `SEARCH_FAILED` at once.
/// Searches whose requester has gone by the time a slot frees up are
/// skipped.
pub struct SearchHandler {
    source: Arc<dyn ScriptureSource>,
    registry: Arc<ClientRegistry>,
    metrics: Arc<MetricsRecorder>,
    inflight: Arc<InFlight>,
    limiter: Arc<Semaphore>,
}

impl SearchHandler {
    pub fn new(
        source: Arc<dyn ScriptureSource>,
        registry: Arc<ClientRegistry>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        let inflight = Arc::new(InFlight {
            counts: DashMap::new(),
            metrics: Arc::clone(&metrics),
        });
        Self {
            source,
            registry,
            metrics,
            inflight,
            limiter: Arc::new(Semaphore::new(MAX_CONCURRENT_SEARCHES)),
        }
    }

    fn reject(&self, conn: &ConnectionId) {
        self.metrics
            .counter_inc(SEARCH_REQUESTS_TOTAL, &[("outcome", OUTCOME_REJECTED)], 1);
        warn!(conn_id = %conn, "too many searches in flight");
        let ack = ErrorAck::new(SEARCH, SEARCH_FAILED, "too many searches in flight");
        if let Some(frame) = protocol::encode(&OutboundEvent::Error(&ack)) {
            self.registry.send_to(conn, frame);
        }
    }
}

#[async_trait]
impl EventHandler for SearchHandler {
    async fn handle(
        &self,
        conn: &ConnectionId,
        _event: &str,
        payload: Value,
    ) -> Result<(), ValidationError> {
        let text = protocol::search_text(payload)?;
        let Some(slot) = self.inflight.try_begin(conn) else {
            self.reject(conn);
            return Ok(());
        };
        let source = Arc::clone(&self.source);
        let registry = Arc::clone(&self.registry);
        let metrics = Arc::clone(&self.metrics);
        let limiter = Arc::clone(&self.limiter);
        let conn = conn.clone();

        tokio::spawn(async move {
            let _slot = slot;
            let Ok(_permit) = limiter.acquire_owned().await else {
                return;
            };
            if !registry.contains(&conn) {
                debug!(conn_id = %conn, "requester gone, skipping search");
                return;
            }
            let started = Instant::now();
            let result = if text.trim().is_empty() {
                Ok(Vec::new())
            } else {
                source.search_lines(&text).await
            };
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            metrics.histogram_observe(SEARCH_DURATION_MS, &[], elapsed_ms);

            let frame = match result {
                Ok(matches) => {
                    metrics.counter_inc(SEARCH_REQUESTS_TOTAL, &[("outcome", OUTCOME_OK)], 1);
                    debug!(conn_id = %conn, matches = matches.len(), elapsed_ms, "search complete");
                    protocol::encode(&OutboundEvent::Results { matches: &matches })
                }
                Err(e) => {
                    metrics.counter_inc(SEARCH_REQUESTS_TOTAL, &[("outcome", OUTCOME_ERROR)], 1);
                    warn!(conn_id = %conn, kind = e.error_kind(), error = %e, "search failed");
                    let ack = ErrorAck::new(SEARCH, SEARCH_FAILED, e.to_string());
                    protocol::encode(&OutboundEvent::Error(&ack))
                }
            };
            if let Some(frame) = frame {
                registry.send_to(&conn, frame);
            }
        });
        Ok(())
    }
}

/// Records a connection's self-declared role.
pub struct HelloHandler {
    registry: Arc<ClientRegistry>,
}

impl HelloHandler {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl EventHandler for HelloHandler {
    async fn handle(
        &self,
        conn: &ConnectionId,
        _event: &str,
        payload: Value,
    ) -> Result<(), ValidationError> {
        let role = protocol::hello_role(payload)?;
        if self.registry.set_role(conn, role) {
            tracing::info!(conn_id = %conn, role = role.as_str(), "client identified");
        }
        Ok(())
    }
}

/// Router wired with every inbound event the server understands.
pub fn default_router(
    session: SessionHandle,
    source: Arc<dyn ScriptureSource>,
    registry: Arc<ClientRegistry>,
    metrics: Arc<MetricsRecorder>,
) -> Result<EventRouter, RouterError> {
    let mut router = EventRouter::new();
    let intents = Arc::new(IntentHandler::new(session, Arc::clone(&metrics)));
    for event in INTENT_EVENTS {
        router.on(*event, intents.clone())?;
    }
    router.on(
        SEARCH,
        Arc::new(SearchHandler::new(source, Arc::clone(&registry), metrics)),
    )?;
    router.on(HELLO, Arc::new(HelloHandler::new(registry)))?;
    Ok(router)
}
