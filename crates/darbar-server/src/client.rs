use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use darbar_core::events::Role;
use darbar_core::ids::ConnectionId;
use darbar_telemetry::MetricsRecorder;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::metrics::{
    WS_BROADCAST_DROPS_TOTAL, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};

/// Per-connection transport limits.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    pub max_send_queue: usize,
    pub max_drops: u64,
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_send_queue: 256,
            max_drops: 100,
            heartbeat_interval: Duration::from_secs(30),
            client_timeout: Duration::from_secs(90),
        }
    }
}

/// Frames a joiner is sent before anything else: `banis` then `state`.
pub const SNAPSHOT_FRAMES: usize = 2;

/// A connected WebSocket client.
///
/// A client is pending until its snapshot is queued; broadcasts skip it
/// until then.
pub struct Client {
    pub id: ConnectionId,
    tx: mpsc::Sender<Arc<str>>,
    connected: AtomicBool,
    ready: AtomicBool,
    last_seen: AtomicU64,
    drops: AtomicU64,
    role: RwLock<Option<Role>>,
}

impl Client {
    fn new(id: ConnectionId, tx: mpsc::Sender<Arc<str>>) -> Self {
        Self {
            id,
            tx,
            connected: AtomicBool::new(true),
            ready: AtomicBool::new(false),
            last_seen: AtomicU64::new(now_secs()),
            drops: AtomicU64::new(0),
            role: RwLock::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Record a pong or any inbound frame.
    pub fn touch(&self) {
        self.last_seen.store(now_secs(), Ordering::Relaxed);
    }

    fn is_alive(&self, timeout: Duration) -> bool {
        let last = self.last_seen.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < timeout.as_secs()
    }

    pub fn role(&self) -> Option<Role> {
        *self.role.read()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

enum Delivery {
    Queued,
    Dropped { slow: bool },
    Closed,
}

/// Registry of all live WebSocket clients.
pub struct ClientRegistry {
    clients: DashMap<ConnectionId, Arc<Client>>,
    config: TransportConfig,
    metrics: Arc<MetricsRecorder>,
}

impl ClientRegistry {
    pub fn new(config: TransportConfig, metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            clients: DashMap::new(),
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Register a new, pending client and return its id plus the receiving
    /// end of its outbound queue. The queue has room for the snapshot on top
    /// of `max_send_queue`.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<Arc<str>>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.config.max_send_queue + SNAPSHOT_FRAMES);
        self.clients
            .insert(id.clone(), Arc::new(Client::new(id.clone(), tx)));
        self.metrics.counter_inc(WS_CONNECTIONS_TOTAL, &[], 1);
        self.update_active_gauge();
        (id, rx)
    }

    /// Remove a client. Returns `false` if it was already gone.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        let Some((_, client)) = self.clients.remove(id) else {
            return false;
        };
        client.connected.store(false, Ordering::Relaxed);
        self.metrics.counter_inc(WS_DISCONNECTIONS_TOTAL, &[], 1);
        self.update_active_gauge();
        true
    }

    fn update_active_gauge(&self) {
        self.metrics
            .gauge_set(WS_CONNECTIONS_ACTIVE, &[], self.clients.len() as f64);
    }

    fn get(&self, id: &ConnectionId) -> Option<Arc<Client>> {
        self.clients.get(id).map(|entry| Arc::clone(entry.value()))
    }

    fn deliver(&self, client: &Client, frame: Arc<str>) -> Delivery {
        if !client.is_connected() {
            return Delivery::Closed;
        }
        match client.tx.try_send(frame) {
            Ok(()) => Delivery::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let drops = client.drops.fetch_add(1, Ordering::Relaxed) + 1;
                self.metrics.counter_inc(WS_BROADCAST_DROPS_TOTAL, &[], 1);
                tracing::warn!(conn_id = %client.id, drops, "send queue full, dropping frame");
                Delivery::Dropped {
                    slow: drops >= self.config.max_drops,
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Queue a frame for one client. Unknown, closed or backed-up clients
    /// are a logged no-op returning `false`.
    pub fn send_to(&self, id: &ConnectionId, frame: Arc<str>) -> bool {
        let Some(client) = self.get(id) else {
            tracing::debug!(conn_id = %id, "send to unknown connection");
            return false;
        };
        match self.deliver(&client, frame) {
            Delivery::Queued => true,
            Delivery::Dropped { slow } => {
                if slow {
                    self.disconnect_slow(id);
                }
                false
            }
            Delivery::Closed => {
                tracing::debug!(conn_id = %id, "send to closed connection");
                false
            }
        }
    }

    /// Admit a pending client to broadcasts. Call after its snapshot is
    /// queued, from the same task that broadcasts.
    pub fn mark_ready(&self, id: &ConnectionId) -> bool {
        match self.get(id) {
            Some(client) => {
                client.ready.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Queue a frame for every ready client. Returns how many accepted it.
    pub fn broadcast(&self, frame: Arc<str>) -> usize {
        // Snapshot first so no shard lock is held while unregistering.
        let clients: Vec<Arc<Client>> = self
            .clients
            .iter()
            .filter(|e| e.value().is_ready())
            .map(|e| Arc::clone(e.value()))
            .collect();
        let mut delivered = 0;
        let mut slow = Vec::new();
        for client in &clients {
            match self.deliver(client, Arc::clone(&frame)) {
                Delivery::Queued => delivered += 1,
                Delivery::Dropped { slow: true } => slow.push(client.id.clone()),
                Delivery::Dropped { slow: false } | Delivery::Closed => {}
            }
        }
        for id in slow {
            self.disconnect_slow(&id);
        }
        delivered
    }

    fn disconnect_slow(&self, id: &ConnectionId) {
        if self.unregister(id) {
            tracing::warn!(conn_id = %id, max_drops = self.config.max_drops, "disconnecting slow client");
        }
    }

    /// Record the self-declared role of a client.
    pub fn set_role(&self, id: &ConnectionId, role: Role) -> bool {
        match self.get(id) {
            Some(client) => {
                *client.role.write() = Some(role);
                true
            }
            None => false,
        }
    }

    pub fn role(&self, id: &ConnectionId) -> Option<Role> {
        self.get(id).and_then(|c| c.role())
    }

    pub fn touch(&self, id: &ConnectionId) {
        if let Some(client) = self.clients.get(id) {
            client.touch();
        }
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.clients.contains_key(id)
    }

    /// Number of connected clients.
    pub fn count(&self) -> usize {
        self.clients.len()
    }

    /// Remove clients that have been silent longer than the client timeout.
    pub fn cleanup_dead_clients(&self) -> usize {
        let timeout = self.config.client_timeout;
        let dead: Vec<ConnectionId> = self
            .clients
            .iter()
            .filter(|entry| !entry.value().is_alive(timeout))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for id in dead {
            if self.unregister(&id) {
                removed += 1;
                tracing::info!(conn_id = %id, "cleaned up dead client");
            }
        }
        removed
    }
}

/// Drive one WebSocket: a writer draining the client's queue plus heartbeat
/// pings, and a reader forwarding text frames to the dispatcher. Returns once
/// either side ends; the client is unregistered on the way out.
pub async fn handle_ws_connection(
    socket: WebSocket,
    conn_id: ConnectionId,
    mut rx: mpsc::Receiver<Arc<str>>,
    registry: Arc<ClientRegistry>,
    on_message: mpsc::Sender<(ConnectionId, String)>,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let heartbeat = registry.config().heartbeat_interval;

    let writer_id = conn_id.clone();
    let writer_shutdown = shutdown.clone();
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat);
        ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(frame) = msg else { break };
                    if ws_tx.send(WsMessage::Text(frame.to_string().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(conn_id = %writer_id, "sent ping");
                }
                () = writer_shutdown.cancelled() => {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break;
                }
            }
        }
    });

    let reader_id = conn_id.clone();
    let reader_registry = Arc::clone(&registry);
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => {
                    reader_registry.touch(&reader_id);
                    if on_message
                        .send((reader_id.clone(), text.to_string()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                WsMessage::Pong(_) => reader_registry.touch(&reader_id),
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    let writer_abort = writer.abort_handle();
    let reader_abort = reader.abort_handle();
    tokio::select! {
        _ = writer => reader_abort.abort(),
        _ = reader => writer_abort.abort(),
    }

    if registry.unregister(&conn_id) {
        tracing::info!(conn_id = %conn_id, "WebSocket client disconnected");
    }
}

/// Periodically reap clients that stopped answering pings.
pub fn start_cleanup_task(
    registry: Arc<ClientRegistry>,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = registry.cleanup_dead_clients();
                    if removed > 0 {
                        tracing::info!(removed, "dead client cleanup");
                    }
                }
                () = shutdown.cancelled() => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(max_send_queue: usize, max_drops: u64) -> ClientRegistry {
        ClientRegistry::new(
            TransportConfig {
                max_send_queue,
                max_drops,
                ..TransportConfig::default()
            },
            Arc::new(MetricsRecorder::new()),
        )
    }

    fn frame(s: &str) -> Arc<str> {
        Arc::from(s)
    }

    fn joined(registry: &ClientRegistry) -> (ConnectionId, mpsc::Receiver<Arc<str>>) {
        let (id, rx) = registry.register();
        registry.mark_ready(&id);
        (id, rx)
    }

    #[test]
    fn register_and_unregister() {
        let registry = registry_with(32, 100);
        let (id1, _rx1) = registry.register();
        let (id2, _rx2) = registry.register();
        assert_eq!(registry.count(), 2);
        assert!(id1.as_str().starts_with("conn_"));

        assert!(registry.unregister(&id1));
        assert!(!registry.unregister(&id1));
        assert_eq!(registry.count(), 1);
        assert!(!registry.contains(&id1));
        assert!(registry.contains(&id2));
    }

    #[test]
    fn connection_metrics_follow_membership() {
        let metrics = Arc::new(MetricsRecorder::new());
        let registry = ClientRegistry::new(TransportConfig::default(), metrics.clone());
        let (id, _rx) = registry.register();
        let (_id2, _rx2) = registry.register();
        registry.unregister(&id);
        registry.unregister(&id);

        assert_eq!(metrics.counter_get(WS_CONNECTIONS_TOTAL, &[]), 2);
        assert_eq!(metrics.counter_get(WS_DISCONNECTIONS_TOTAL, &[]), 1);
        assert_eq!(metrics.gauge_get(WS_CONNECTIONS_ACTIVE, &[]), 1.0);
    }

    #[tokio::test]
    async fn send_to_specific_client() {
        let registry = registry_with(32, 100);
        let (id, mut rx) = registry.register();
        let (_other, mut other_rx) = registry.register();

        assert!(registry.send_to(&id, frame("hello")));
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
        assert!(other_rx.try_recv().is_err());
    }

    #[test]
    fn send_to_unknown_or_closed_is_noop() {
        let registry = registry_with(32, 100);
        assert!(!registry.send_to(&ConnectionId::new(), frame("x")));

        let (id, rx) = registry.register();
        drop(rx);
        assert!(!registry.send_to(&id, frame("x")));
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let metrics = Arc::new(MetricsRecorder::new());
        let registry = ClientRegistry::new(
            TransportConfig {
                max_send_queue: 2,
                ..TransportConfig::default()
            },
            metrics.clone(),
        );
        let (id, _rx) = registry.register();
        for i in 0..2 + SNAPSHOT_FRAMES {
            assert!(registry.send_to(&id, frame(&i.to_string())));
        }
        assert!(!registry.send_to(&id, frame("overflow")));
        assert_eq!(metrics.counter_get(WS_BROADCAST_DROPS_TOTAL, &[]), 1);
        assert!(registry.contains(&id));
    }

    #[test]
    fn slow_client_is_disconnected_after_max_drops() {
        let registry = registry_with(1, 3);
        let (id, _rx) = joined(&registry);
        for _ in 0..1 + SNAPSHOT_FRAMES {
            assert!(registry.send_to(&id, frame("fill")));
        }
        for _ in 0..2 {
            assert!(!registry.send_to(&id, frame("drop")));
            assert!(registry.contains(&id));
        }
        assert!(!registry.send_to(&id, frame("drop")));
        assert!(!registry.contains(&id));
    }

    #[test]
    fn snapshot_fits_the_smallest_queue() {
        let registry = registry_with(1, 100);
        let (id, mut rx) = registry.register();
        assert!(registry.send_to(&id, frame("banis")));
        assert!(registry.send_to(&id, frame("state")));
        registry.mark_ready(&id);
        assert_eq!(registry.broadcast(frame("next")), 1);

        assert_eq!(&*rx.try_recv().unwrap(), "banis");
        assert_eq!(&*rx.try_recv().unwrap(), "state");
        assert_eq!(&*rx.try_recv().unwrap(), "next");
    }

    #[test]
    fn broadcast_reaches_every_ready_client() {
        let registry = registry_with(32, 100);
        let (_id1, mut rx1) = joined(&registry);
        let (_id2, mut rx2) = joined(&registry);
        let (id3, mut rx3) = joined(&registry);
        registry.unregister(&id3);

        assert_eq!(registry.broadcast(frame("state")), 2);
        assert_eq!(&*rx1.try_recv().unwrap(), "state");
        assert_eq!(&*rx2.try_recv().unwrap(), "state");
        assert!(rx3.try_recv().is_err());
    }

    #[test]
    fn broadcast_skips_pending_client() {
        let registry = registry_with(32, 100);
        let (_ready, mut ready_rx) = joined(&registry);
        let (pending, mut pending_rx) = registry.register();

        assert_eq!(registry.broadcast(frame("state")), 1);
        assert_eq!(&*ready_rx.try_recv().unwrap(), "state");
        assert!(pending_rx.try_recv().is_err());

        assert!(registry.mark_ready(&pending));
        assert_eq!(registry.broadcast(frame("again")), 2);
        assert_eq!(&*pending_rx.try_recv().unwrap(), "again");
        assert!(!registry.mark_ready(&ConnectionId::new()));
    }

    #[test]
    fn broadcast_skips_backed_up_client() {
        let registry = registry_with(1, 100);
        let (slow, _slow_rx) = joined(&registry);
        let (_fast, mut fast_rx) = joined(&registry);
        for _ in 0..1 + SNAPSHOT_FRAMES {
            assert!(registry.send_to(&slow, frame("fill")));
        }

        assert_eq!(registry.broadcast(frame("state")), 1);
        assert_eq!(&*fast_rx.try_recv().unwrap(), "state");
        assert!(registry.contains(&slow));
    }

    #[test]
    fn broadcast_shares_one_allocation() {
        let registry = registry_with(4, 100);
        let (_a, mut rx_a) = joined(&registry);
        let (_b, mut rx_b) = joined(&registry);
        registry.broadcast(frame("shared"));
        let a = rx_a.try_recv().unwrap();
        let b = rx_b.try_recv().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn roles_are_recorded() {
        let registry = registry_with(4, 100);
        let (id, _rx) = registry.register();
        assert_eq!(registry.role(&id), None);
        assert!(registry.set_role(&id, Role::Controller));
        assert_eq!(registry.role(&id), Some(Role::Controller));
        assert!(!registry.set_role(&ConnectionId::new(), Role::Viewer));
    }

    #[test]
    fn cleanup_dead_clients_removes_expired() {
        let registry = registry_with(4, 100);
        let (id, _rx) = registry.register();
        let (live, _live_rx) = registry.register();

        registry.get(&id).unwrap().last_seen.store(0, Ordering::Relaxed);

        assert_eq!(registry.cleanup_dead_clients(), 1);
        assert!(!registry.contains(&id));
        assert!(registry.contains(&live));
    }

    #[test]
    fn touch_keeps_client_alive() {
        let registry = registry_with(4, 100);
        let (id, _rx) = registry.register();
        let client = registry.get(&id).unwrap();
        client.last_seen.store(0, Ordering::Relaxed);
        registry.touch(&id);
        assert!(client.is_alive(Duration::from_secs(90)));
    }
}
