//! The session actor: sole owner and sole writer of [`SessionState`].
//!
//! Every mutation and every connect snapshot goes through one queue, so
//! intents are applied strictly in arrival order and a late joiner's
//! snapshot is consistent with the broadcasts that follow it.

use std::sync::Arc;

use darbar_core::events::OutboundEvent;
use darbar_core::ids::ConnectionId;
use darbar_core::intent::ClientIntent;
use darbar_core::scripture::Bani;
use darbar_core::state::SessionState;
use darbar_telemetry::MetricsRecorder;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ClientRegistry;
use crate::metrics::{
    OUTCOME_APPLIED, OUTCOME_REJECTED, SESSION_BROADCASTS_TOTAL, SESSION_INTENTS_TOTAL,
};
use crate::protocol::{self, rejection};

const COMMAND_QUEUE: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session actor has stopped")]
    Closed,
}

enum Command {
    Connect {
        conn: ConnectionId,
        done: oneshot::Sender<()>,
    },
    Intent {
        conn: ConnectionId,
        intent: ClientIntent,
    },
    Snapshot {
        reply: oneshot::Sender<SessionState>,
    },
}

/// Cloneable front door to the session actor.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
}

impl SessionHandle {
    /// Spawn the actor. It runs until `shutdown` is cancelled or every
    /// handle is dropped.
    pub fn spawn(
        registry: Arc<ClientRegistry>,
        banis: Arc<[Bani]>,
        metrics: Arc<MetricsRecorder>,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let banis_frame = protocol::encode(&OutboundEvent::Banis(&banis[..]));
        let actor = SessionActor {
            state: SessionState::default(),
            registry,
            banis_frame,
            metrics,
        };
        let task = tokio::spawn(actor.run(rx, shutdown));
        (Self { tx }, task)
    }

    /// Queue the initial snapshot (`banis` then `state`) for a new
    /// connection. Resolves once the snapshot is in the connection's
    /// outbound queue, so nothing the connection sends afterwards can be
    /// answered ahead of it.
    pub async fn connect(&self, conn: ConnectionId) -> Result<(), SessionError> {
        let (done, wait) = oneshot::channel();
        self.tx
            .send(Command::Connect { conn, done })
            .await
            .map_err(|_| SessionError::Closed)?;
        wait.await.map_err(|_| SessionError::Closed)
    }

    /// Queue an intent for validation and application.
    pub async fn submit(&self, conn: ConnectionId, intent: ClientIntent) -> Result<(), SessionError> {
        self.tx
            .send(Command::Intent { conn, intent })
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Current state, read through the same queue as mutations.
    pub async fn snapshot(&self) -> Result<SessionState, SessionError> {
        let (reply, wait) = oneshot::channel();
        self.tx
            .send(Command::Snapshot { reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        wait.await.map_err(|_| SessionError::Closed)
    }
}

struct SessionActor {
    state: SessionState,
    registry: Arc<ClientRegistry>,
    banis_frame: Option<Arc<str>>,
    metrics: Arc<MetricsRecorder>,
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>, shutdown: CancellationToken) {
        info!("session actor started");
        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
                () = shutdown.cancelled() => break,
            }
        }
        info!(revision = self.state.revision, "session actor stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { conn, done } => {
                self.send_snapshot(&conn);
                let _ = done.send(());
            }
            Command::Intent { conn, intent } => self.apply(&conn, &intent),
            Command::Snapshot { reply } => {
                let _ = reply.send(self.state.clone());
            }
        }
    }

    /// Queue `banis` then `state`, then admit the connection to broadcasts.
    /// Both happen in one actor step, so no broadcast can overtake the
    /// snapshot.
    fn send_snapshot(&self, conn: &ConnectionId) {
        if let Some(frame) = &self.banis_frame {
            self.registry.send_to(conn, Arc::clone(frame));
        }
        if let Some(frame) = protocol::encode(&OutboundEvent::State(&self.state)) {
            self.registry.send_to(conn, frame);
        }
        if self.registry.mark_ready(conn) {
            debug!(conn_id = %conn, revision = self.state.revision, "sent snapshot");
        }
    }

    fn apply(&mut self, conn: &ConnectionId, intent: &ClientIntent) {
        let event = intent.event_name();
        let next = match self.state.apply(intent) {
            Ok(next) => next,
            Err(e) => {
                warn!(conn_id = %conn, event, error = %e, "intent rejected");
                self.metrics.counter_inc(
                    SESSION_INTENTS_TOTAL,
                    &[("event", event), ("outcome", OUTCOME_REJECTED)],
                    1,
                );
                if let Some(frame) = protocol::encode(&OutboundEvent::Error(&rejection(event, &e))) {
                    self.registry.send_to(conn, frame);
                }
                return;
            }
        };

        // Encode before swapping so a broadcast always accompanies a mutation.
        let Some(frame) = protocol::encode(&OutboundEvent::State(&next)) else {
            return;
        };
        self.state = next;
        let delivered = self.registry.broadcast(frame);

        self.metrics.counter_inc(
            SESSION_INTENTS_TOTAL,
            &[("event", event), ("outcome", OUTCOME_APPLIED)],
            1,
        );
        self.metrics.counter_inc(SESSION_BROADCASTS_TOTAL, &[], 1);
        info!(
            conn_id = %conn,
            event,
            revision = self.state.revision,
            delivered,
            "intent applied"
        );
    }
}
