//! Server-to-client notification fan-out.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::mcp::protocol::{ListKind, Notification};
use crate::mcp::session::SessionRegistry;

/// Publishes notifications to one session or to all of them.
#[derive(Clone, Debug)]
pub struct NotificationHub {
    registry: Arc<SessionRegistry>,
}

impl NotificationHub {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Deliver to a single session.
    pub async fn notify(&self, session_id: &str, notification: Notification) -> Result<()> {
        let session = self
            .registry
            .get(session_id)
            .await
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        debug!(session_id = %session_id, method = %notification.method, "Notifying session");
        session.deliver(notification)
    }

    /// Deliver to every registered session. Returns the number reached.
    pub async fn broadcast_notify(&self, notification: Notification) -> Result<usize> {
        debug!(method = %notification.method, "Broadcasting notification");
        self.registry.broadcast(&notification).await
    }

    /// Fire-and-forget `<kind>/list/changed` broadcast.
    ///
    /// Failures are logged and swallowed so they never fail the mutation
    /// that triggered them.
    pub async fn list_changed(&self, kind: ListKind) {
        if let Err(e) = self.broadcast_notify(Notification::list_changed(kind)).await {
            warn!("{} list change not fully delivered: {}", kind.as_str(), e);
        }
    }
}
