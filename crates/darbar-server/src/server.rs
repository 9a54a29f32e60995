use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use darbar_core::events::{ErrorAck, OutboundEvent};
use darbar_core::ids::ConnectionId;
use darbar_core::scripture::{Bani, ScriptureSource};
use darbar_settings::ServerSettings;
use darbar_telemetry::MetricsRecorder;

use crate::client::{self, ClientRegistry, TransportConfig};
use crate::handlers;
use crate::protocol;
use crate::router::{DispatchError, EventRouter, RouterError};
use crate::session::SessionHandle;

const MESSAGE_QUEUE: usize = 1024;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub transport: TransportConfig,
    pub cleanup_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            transport: TransportConfig::default(),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            transport: TransportConfig {
                max_send_queue: s.max_send_queue,
                max_drops: s.max_drops,
                heartbeat_interval: Duration::from_secs(s.heartbeat_interval_secs),
                client_timeout: Duration::from_secs(s.client_timeout_secs),
            },
            cleanup_interval: Duration::from_secs(s.cleanup_interval_secs),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ClientRegistry>,
    pub session: SessionHandle,
    pub message_tx: mpsc::Sender<(ConnectionId, String)>,
    pub metrics: Arc<MetricsRecorder>,
    pub started_at: Instant,
    pub shutdown: CancellationToken,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/state", get(state_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle to shut it down.
///
/// The reading lists are fetched once here; a failing source is logged and
/// the server starts with an empty collection.
pub async fn start(
    config: ServerConfig,
    source: Arc<dyn ScriptureSource>,
    metrics: Arc<MetricsRecorder>,
) -> Result<ServerHandle, ServerError> {
    let banis: Arc<[Bani]> = match source.banis().await {
        Ok(banis) => Arc::from(banis),
        Err(e) => {
            tracing::warn!(error = %e, "could not load reading lists, starting with none");
            Arc::from(Vec::<Bani>::new())
        }
    };
    tracing::info!(banis = banis.len(), "reading lists loaded");

    let shutdown = CancellationToken::new();
    let registry = Arc::new(ClientRegistry::new(config.transport.clone(), Arc::clone(&metrics)));

    let (session, session_task) = SessionHandle::spawn(
        Arc::clone(&registry),
        banis,
        Arc::clone(&metrics),
        shutdown.clone(),
    );
    let router = handlers::default_router(
        session.clone(),
        source,
        Arc::clone(&registry),
        Arc::clone(&metrics),
    )?;

    let cleanup_task = client::start_cleanup_task(
        Arc::clone(&registry),
        config.cleanup_interval,
        shutdown.clone(),
    );

    let (msg_tx, msg_rx) = mpsc::channel::<(ConnectionId, String)>(MESSAGE_QUEUE);
    let dispatch_task = tokio::spawn(process_messages(
        msg_rx,
        Arc::new(router),
        Arc::clone(&registry),
        shutdown.clone(),
    ));

    let app = build_router(AppState {
        registry,
        session,
        message_tx: msg_tx,
        metrics,
        started_at: Instant::now(),
        shutdown: shutdown.clone(),
    });

    let addr = format!("{}:{}", config.host, config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(source) => {
            shutdown.cancel();
            return Err(ServerError::Bind { addr, source });
        }
    };
    let local_addr = listener.local_addr()?;

    tracing::info!(addr = %local_addr, "Darbar server started");

    let serve_shutdown = shutdown.clone();
    let server_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(serve_shutdown.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "server exited with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        addr: local_addr,
        shutdown,
        tasks: vec![server_task, dispatch_task, session_task, cleanup_task],
    })
}

/// Handle returned by `start()`. Keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    pub addr: SocketAddr,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    /// Stop accepting connections, close every socket and wait for the
    /// background tasks to finish.
    pub async fn shutdown(self) {
        tracing::info!("shutting down");
        self.shutdown.cancel();
        for task in self.tasks {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                tracing::warn!("background task did not stop in time");
            }
        }
        tracing::info!("shutdown complete");
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (conn_id, rx) = state.registry.register();
    tracing::info!(conn_id = %conn_id, "WebSocket client connected");

    // Snapshot is queued before the reader starts, so it precedes any reply.
    if let Err(e) = state.session.connect(conn_id.clone()).await {
        tracing::warn!(conn_id = %conn_id, error = %e, "rejecting connection");
        state.registry.unregister(&conn_id);
        return;
    }

    client::handle_ws_connection(
        socket,
        conn_id,
        rx,
        state.registry,
        state.message_tx,
        state.shutdown,
    )
    .await;
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.started_at.elapsed().as_secs();
    let connections = state.registry.count();
    match state.session.snapshot().await {
        Ok(session) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "connections": connections,
                "revision": session.revision,
                "uptimeSecs": uptime,
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unavailable",
                "connections": connections,
                "uptimeSecs": uptime,
                "error": e.to_string(),
            })),
        ),
    }
}

async fn state_handler(State(state): State<AppState>) -> Response {
    match state.session.snapshot().await {
        Ok(session) => Json(session).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

fn send_ack(registry: &ClientRegistry, conn: &ConnectionId, ack: &ErrorAck) {
    if let Some(frame) = protocol::encode(&OutboundEvent::Error(ack)) {
        registry.send_to(conn, frame);
    }
}

/// Decode every inbound frame in arrival order and route it.
async fn process_messages(
    mut rx: mpsc::Receiver<(ConnectionId, String)>,
    router: Arc<EventRouter>,
    registry: Arc<ClientRegistry>,
    shutdown: CancellationToken,
) {
    loop {
        let (conn_id, raw) = tokio::select! {
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
            () = shutdown.cancelled() => break,
        };

        let frame = match protocol::parse_frame(&raw) {
            Ok(frame) => frame,
            Err(ack) => {
                tracing::debug!(conn_id = %conn_id, "unparseable frame");
                send_ack(&registry, &conn_id, &ack);
                continue;
            }
        };

        match router.dispatch(&conn_id, &frame.event, frame.payload).await {
            Ok(()) | Err(DispatchError::UnknownEvent) => {}
            Err(DispatchError::Rejected(e)) => {
                tracing::debug!(conn_id = %conn_id, event = %frame.event, error = %e, "event rejected");
                send_ack(&registry, &conn_id, &protocol::rejection(&frame.event, &e));
            }
        }
    }
    tracing::debug!("message dispatch stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use darbar_core::errors::SourceError;
    use darbar_core::scripture::LineRecord;

    struct EmptySource;

    #[async_trait]
    impl ScriptureSource for EmptySource {
        async fn search_lines(&self, _query: &str) -> Result<Vec<LineRecord>, SourceError> {
            Ok(Vec::new())
        }

        async fn banis(&self) -> Result<Vec<Bani>, SourceError> {
            Err(SourceError::Unavailable("no database".into()))
        }
    }

    fn local_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..Default::default()
        }
    }

    #[test]
    fn config_from_settings() {
        let settings = ServerSettings {
            port: 9090,
            heartbeat_interval_secs: 10,
            ..Default::default()
        };
        let config = ServerConfig::from(&settings);
        assert_eq!(config.port, 9090);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.transport.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.transport.max_send_queue, 256);
        assert_eq!(config.cleanup_interval, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let metrics = Arc::new(MetricsRecorder::new());
        let handle = start(local_config(), Arc::new(EmptySource), metrics)
            .await
            .unwrap();
        assert!(handle.port > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["revision"], 0);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let metrics = Arc::new(MetricsRecorder::new());
        let first = start(local_config(), Arc::new(EmptySource), metrics.clone())
            .await
            .unwrap();
        let config = ServerConfig {
            port: first.port,
            ..local_config()
        };
        let err = start(config, Arc::new(EmptySource), metrics)
            .await
            .err()
            .expect("second bind should fail");
        assert!(matches!(err, ServerError::Bind { .. }));
        first.shutdown().await;
    }

    #[tokio::test]
    async fn build_router_creates_routes() {
        let metrics = Arc::new(MetricsRecorder::new());
        let registry = Arc::new(ClientRegistry::new(TransportConfig::default(), metrics.clone()));
        let shutdown = CancellationToken::new();
        let (session, _task) = SessionHandle::spawn(
            registry.clone(),
            Arc::from(Vec::<Bani>::new()),
            metrics.clone(),
            shutdown.clone(),
        );
        let (msg_tx, _) = mpsc::channel(32);

        let _router = build_router(AppState {
            registry,
            session,
            message_tx: msg_tx,
            metrics,
            started_at: Instant::now(),
            shutdown,
        });
    }
}
