//! Prometheus metrics for monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Total requests dispatched
    pub requests_total: AtomicU64,
    /// Requests answered with a result
    pub requests_success: AtomicU64,
    /// Requests answered with an error
    pub requests_failed: AtomicU64,
    /// Tool calls
    pub tool_calls: AtomicU64,
    /// Notifications queued into a session inbox
    pub notifications_sent: AtomicU64,
    /// Notifications dropped because an inbox was full or closed
    pub notifications_dropped: AtomicU64,
    /// Open SSE sessions
    pub active_sessions: AtomicU64,
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Increment requests total.
    pub fn inc_requests(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment successful requests.
    pub fn inc_success(&self) {
        self.requests_success.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment failed requests.
    pub fn inc_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment tool calls.
    pub fn inc_tool_calls(&self) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notifications_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notifications_dropped(&self) {
        self.notifications_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Set active sessions.
    pub fn set_active_sessions(&self, count: u64) {
        self.active_sessions.store(count, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_success: self.requests_success.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            tool_calls: self.tool_calls.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_dropped: self.notifications_dropped.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP mcp_engine_requests_total Total number of JSON-RPC requests
# TYPE mcp_engine_requests_total counter
mcp_engine_requests_total {}

# HELP mcp_engine_requests_success Requests answered with a result
# TYPE mcp_engine_requests_success counter
mcp_engine_requests_success {}

# HELP mcp_engine_requests_failed Requests answered with an error
# TYPE mcp_engine_requests_failed counter
mcp_engine_requests_failed {}

# HELP mcp_engine_tool_calls Tool calls count
# TYPE mcp_engine_tool_calls counter
mcp_engine_tool_calls {}

# HELP mcp_engine_notifications_sent Notifications queued for delivery
# TYPE mcp_engine_notifications_sent counter
mcp_engine_notifications_sent {}

# HELP mcp_engine_notifications_dropped Notifications dropped on full or closed inboxes
# TYPE mcp_engine_notifications_dropped counter
mcp_engine_notifications_dropped {}

# HELP mcp_engine_active_sessions Open SSE sessions
# TYPE mcp_engine_active_sessions gauge
mcp_engine_active_sessions {}
"#,
            s.requests_total,
            s.requests_success,
            s.requests_failed,
            s.tool_calls,
            s.notifications_sent,
            s.notifications_dropped,
            s.active_sessions
        )
    }
}

/// Metrics snapshot.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub requests_success: u64,
    pub requests_failed: u64,
    pub tool_calls: u64,
    pub notifications_sent: u64,
    pub notifications_dropped: u64,
    pub active_sessions: u64,
}

/// Timer for measuring durations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_snapshot() {
        let metrics = Metrics::new();
        metrics.inc_requests();
        metrics.inc_requests();
        metrics.inc_success();
        metrics.inc_failed();
        metrics.inc_notifications_sent();
        metrics.set_active_sessions(3);

        let snap = metrics.snapshot();
        assert_eq!(snap.requests_total, 2);
        assert_eq!(snap.requests_success, 1);
        assert_eq!(snap.requests_failed, 1);
        assert_eq!(snap.notifications_sent, 1);
        assert_eq!(snap.notifications_dropped, 0);
        assert_eq!(snap.active_sessions, 3);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();
        metrics.inc_tool_calls();
        let text = metrics.to_prometheus();
        assert!(text.contains("# TYPE mcp_engine_tool_calls counter"));
        assert!(text.contains("mcp_engine_tool_calls 1"));
        assert!(text.contains("mcp_engine_active_sessions 0"));
    }
}
