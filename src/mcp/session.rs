//! SSE sessions and the registry they are broadcast through.
//!
//! The SSE event loop that opens a session owns its receiving ends
//! ([`SessionStreams`]); the registry only keeps an `Arc<Session>` handle to
//! enqueue into. Once the loop drops its receivers every send fails cleanly,
//! so a broadcast racing a disconnect can never fault.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::mcp::protocol::Notification;
use crate::metrics::Metrics;

/// Default bound for both per-session queues.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Queue bounds for new sessions.
#[derive(Debug, Clone, Copy)]
pub struct QueueCapacity {
    pub events: usize,
    pub inbox: usize,
}

impl Default for QueueCapacity {
    fn default() -> Self {
        Self {
            events: DEFAULT_QUEUE_CAPACITY,
            inbox: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// One live SSE connection.
#[derive(Debug)]
pub struct Session {
    id: String,
    user_agent: String,
    created_at: DateTime<Utc>,
    connected: AtomicBool,
    /// Serialized JSON-RPC replies, streamed as `message` events.
    events: mpsc::Sender<String>,
    /// Notifications, framed by the event loop.
    inbox: mpsc::Sender<Notification>,
    /// Session lifecycle; a child of the server's root token.
    cancel: CancellationToken,
    /// Fired once the event loop has exited.
    done: CancellationToken,
}

/// Receiving ends of a session's queues, owned by its event loop.
#[derive(Debug)]
pub struct SessionStreams {
    pub events: mpsc::Receiver<String>,
    pub inbox: mpsc::Receiver<Notification>,
}

impl Session {
    /// Allocate a session with a fresh UUID.
    pub fn open(
        user_agent: impl Into<String>,
        capacity: QueueCapacity,
        root: &CancellationToken,
    ) -> (Arc<Session>, SessionStreams) {
        let (events_tx, events_rx) = mpsc::channel(capacity.events.max(1));
        let (inbox_tx, inbox_rx) = mpsc::channel(capacity.inbox.max(1));

        let session = Arc::new(Session {
            id: Uuid::new_v4().to_string(),
            user_agent: user_agent.into(),
            created_at: Utc::now(),
            connected: AtomicBool::new(true),
            events: events_tx,
            inbox: inbox_tx,
            cancel: root.child_token(),
            done: CancellationToken::new(),
        });

        let streams = SessionStreams {
            events: events_rx,
            inbox: inbox_rx,
        };

        (session, streams)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Lifecycle token; cancelled when the session is asked to close.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Queue a serialized reply without blocking.
    pub fn push_event(&self, payload: String) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::SessionNotFound(self.id.clone()));
        }
        self.events.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => Error::Delivery(format!("event queue full for {}", self.id)),
            TrySendError::Closed(_) => Error::SessionNotFound(self.id.clone()),
        })
    }

    /// Queue a notification without blocking.
    pub fn deliver(&self, notification: Notification) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::SessionNotFound(self.id.clone()));
        }
        self.inbox.try_send(notification).map_err(|e| match e {
            TrySendError::Full(_) => Error::Delivery(format!("inbox full for {}", self.id)),
            TrySendError::Closed(_) => Error::SessionNotFound(self.id.clone()),
        })
    }

    /// Ask the event loop to stop.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Mark the session dead. Called by the event loop on its way out.
    pub(crate) fn mark_closed(&self) {
        self.connected.store(false, Ordering::Release);
        self.cancel.cancel();
        self.done.cancel();
    }

    /// Resolves once the event loop has exited.
    pub async fn closed(&self) {
        self.done.cancelled().await
    }
}

/// Concurrency-safe set of live sessions keyed by id.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    metrics: Arc<Metrics>,
}

impl SessionRegistry {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    /// Register a session.
    pub async fn add(&self, session: Arc<Session>) {
        let mut sessions = self.sessions.write().await;
        debug!(session_id = %session.id(), "Registering session");
        sessions.insert(session.id().to_string(), session);
        self.metrics.set_active_sessions(sessions.len() as u64);
    }

    /// Unregister a session. Later lookups and broadcasts will not see it.
    pub async fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(id);
        if let Some(session) = &removed {
            session.connected.store(false, Ordering::Release);
            debug!(session_id = %id, "Unregistered session");
        }
        self.metrics.set_active_sessions(sessions.len() as u64);
        removed
    }

    /// Look up a live session.
    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(id)
            .filter(|s| s.is_connected())
            .cloned()
    }

    /// Deliver a notification to every session.
    ///
    /// Delivery is best-effort: a full or closed inbox drops the notification
    /// for that session only. Returns how many sessions accepted it, or
    /// [`Error::Delivery`] if any session missed it.
    pub async fn broadcast(&self, notification: &Notification) -> Result<usize> {
        let sessions = self.sessions.read().await;
        let mut delivered = 0usize;
        let mut missed = Vec::new();

        for session in sessions.values().filter(|s| s.is_connected()) {
            match session.deliver(notification.clone()) {
                Ok(()) => {
                    delivered += 1;
                    self.metrics.inc_notifications_sent();
                }
                Err(e) => {
                    self.metrics.inc_notifications_dropped();
                    debug!(session_id = %session.id(), "Dropped notification: {}", e);
                    missed.push(session.id().to_string());
                }
            }
        }

        if missed.is_empty() {
            Ok(delivered)
        } else {
            Err(Error::Delivery(format!(
                "'{}' dropped for {} of {} sessions",
                notification.method,
                missed.len(),
                delivered + missed.len()
            )))
        }
    }

    /// Close and unregister every session.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write().await;
            let drained = sessions.drain().map(|(_, s)| s).collect();
            self.metrics.set_active_sessions(0);
            drained
        };

        for session in &drained {
            session.connected.store(false, Ordering::Release);
            session.close();
        }

        if !drained.is_empty() {
            info!("Closed {} SSE sessions", drained.len());
        }
        drained.len()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry").finish_non_exhaustive()
    }
}
