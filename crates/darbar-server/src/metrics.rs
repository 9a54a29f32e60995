//! Metric name constants shared by the transport and session layers.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Frames dropped because a client's send queue was full (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Intents received (counter, labels: event, outcome).
pub const SESSION_INTENTS_TOTAL: &str = "session_intents_total";
/// `state` broadcasts emitted (counter).
pub const SESSION_BROADCASTS_TOTAL: &str = "session_broadcasts_total";
/// Search requests (counter, labels: outcome).
pub const SEARCH_REQUESTS_TOTAL: &str = "search_requests_total";
/// Search latency in milliseconds (histogram).
pub const SEARCH_DURATION_MS: &str = "search_duration_ms";
/// Searches accepted and not yet answered (gauge).
pub const SEARCH_IN_FLIGHT: &str = "search_in_flight";

pub const OUTCOME_APPLIED: &str = "applied";
pub const OUTCOME_REJECTED: &str = "rejected";
pub const OUTCOME_INVALID: &str = "invalid";
pub const OUTCOME_OK: &str = "ok";
pub const OUTCOME_ERROR: &str = "error";
