//! JSON-RPC method router.
//!
//! Holds the method table and turns every inbound message into at most one
//! response: decode, look up, run the handler under a deadline, wrap.

use futures::FutureExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::mcp::handler::{MethodHandler, RequestContext};
use crate::mcp::protocol::{
    decode, Incoming, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};
use crate::metrics::{Metrics, Timer};

/// Per-call deadline applied when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Request ids are only unique within one SSE session.
type InFlightKey = (String, RequestId);

/// A cancellable call; `seq` tells apart calls that reuse an id.
struct InFlight {
    seq: u64,
    token: CancellationToken,
}

/// Method name to handler table plus the dispatch algorithm.
///
/// Registration happens before the router is shared; afterwards the table is
/// only read, so lookups need no locking.
pub struct MethodRouter {
    methods: HashMap<String, Arc<dyn MethodHandler>>,
    notifications: HashMap<String, Arc<dyn MethodHandler>>,
    timeout: Duration,
    metrics: Arc<Metrics>,
    /// Cancellation handles of running session requests, for `notifications/cancelled`.
    active_requests: RwLock<HashMap<InFlightKey, InFlight>>,
    next_seq: AtomicU64,
}

impl MethodRouter {
    /// Create an empty router.
    pub fn new(timeout: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            methods: HashMap::new(),
            notifications: HashMap::new(),
            timeout,
            metrics,
            active_requests: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Register a request handler, replacing any previous one for `method`.
    pub fn register<H: MethodHandler + 'static>(&mut self, method: impl Into<String>, handler: H) {
        self.register_arc(method, Arc::new(handler));
    }

    /// Register a request handler (Arc version).
    pub fn register_arc(&mut self, method: impl Into<String>, handler: Arc<dyn MethodHandler>) {
        self.methods.insert(method.into(), handler);
    }

    /// Register side effects for a one-way client notification.
    pub fn on_notification<H: MethodHandler + 'static>(
        &mut self,
        method: impl Into<String>,
        handler: H,
    ) {
        self.notifications.insert(method.into(), Arc::new(handler));
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Registered method names, sorted.
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Decode raw bytes and dispatch them.
    ///
    /// Undecodable payloads are answered here; `None` means the message was a
    /// one-way notification.
    pub async fn dispatch_bytes(
        &self,
        bytes: &[u8],
        parent: &CancellationToken,
        session_id: Option<&str>,
    ) -> Option<JsonRpcResponse> {
        match decode(bytes) {
            Ok(message) => self.dispatch(message, parent, session_id).await,
            Err(e) => {
                warn!("Rejected inbound message: {:?}", e);
                self.metrics.inc_requests();
                self.metrics.inc_failed();
                Some(e.into_response())
            }
        }
    }

    /// Dispatch a decoded message.
    pub async fn dispatch(
        &self,
        message: Incoming,
        parent: &CancellationToken,
        session_id: Option<&str>,
    ) -> Option<JsonRpcResponse> {
        match message {
            Incoming::Request(req) => Some(self.handle_request(req, parent, session_id).await),
            Incoming::Notification(notif) => {
                self.handle_notification(notif, parent, session_id).await;
                None
            }
        }
    }

    /// Handle a JSON-RPC request.
    async fn handle_request(
        &self,
        req: JsonRpcRequest,
        parent: &CancellationToken,
        session_id: Option<&str>,
    ) -> JsonRpcResponse {
        debug!(method = %req.method, id = ?req.id, session_id = ?session_id, "Handling request");
        self.metrics.inc_requests();
        let timer = Timer::start();

        let Some(handler) = self.methods.get(&req.method).cloned() else {
            self.metrics.inc_failed();
            return JsonRpcResponse::from_error(req.id, &Error::MethodNotFound(req.method));
        };

        let token = parent.child_token();
        let mut ctx = RequestContext::new(req.id.clone(), req.method.clone(), token.clone());
        if let Some(session_id) = session_id {
            ctx = ctx.with_session(session_id);
        }

        // Only session traffic can be cancelled by id. Plain HTTP callers
        // share no id space, and stdio never has a cancel in flight.
        let tracked = match (session_id, &req.id) {
            (Some(session_id), Some(id)) => {
                let key = (session_id.to_string(), id.clone());
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                let entry = InFlight {
                    seq,
                    token: token.clone(),
                };
                self.active_requests.write().await.insert(key.clone(), entry);
                Some((key, seq))
            }
            _ => None,
        };

        let outcome = self.invoke(handler, ctx, req.params, &token).await;

        if let Some((key, seq)) = tracked {
            let mut active = self.active_requests.write().await;
            if active.get(&key).is_some_and(|entry| entry.seq == seq) {
                active.remove(&key);
            }
        }

        debug!(method = %req.method, elapsed_ms = timer.elapsed_ms(), "Request finished");

        match outcome {
            Ok(value) => {
                self.metrics.inc_success();
                JsonRpcResponse::success(req.id, value.unwrap_or_else(|| json!({})))
            }
            Err(e) => {
                self.metrics.inc_failed();
                debug!(method = %req.method, code = e.code(), "Request failed: {}", e);
                JsonRpcResponse::from_error(req.id, &e)
            }
        }
    }

    /// Run a handler under the deadline, the cancellation token, and a panic guard.
    async fn invoke(
        &self,
        handler: Arc<dyn MethodHandler>,
        ctx: RequestContext,
        params: Option<Value>,
        token: &CancellationToken,
    ) -> Result<Option<Value>, Error> {
        let method = ctx.method.clone();
        let call = AssertUnwindSafe(handler.call(ctx, params)).catch_unwind();

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Error::Cancelled),
            res = tokio::time::timeout(self.timeout, call) => match res {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => {
                    warn!(method = %method, "Handler panicked");
                    Err(Error::Internal(format!("handler for '{}' panicked", method)))
                }
                Err(_) => {
                    token.cancel();
                    warn!(method = %method, "Handler exceeded {:?}", self.timeout);
                    Err(Error::Timeout { seconds: self.timeout.as_secs() })
                }
            },
        }
    }

    /// Handle a one-way notification. Never produces a response.
    async fn handle_notification(
        &self,
        notif: JsonRpcNotification,
        parent: &CancellationToken,
        session_id: Option<&str>,
    ) {
        debug!(method = %notif.method, "Handling notification");

        match notif.method.as_str() {
            "notifications/initialized" => info!(session_id = ?session_id, "Client initialized"),
            "notifications/cancelled" => {
                self.cancel_request(notif.params.as_ref(), session_id).await
            }
            _ => {}
        }

        let Some(handler) = self.notifications.get(&notif.method).cloned() else {
            return;
        };

        let token = parent.child_token();
        let mut ctx = RequestContext::new(None, notif.method.clone(), token.clone());
        if let Some(session_id) = session_id {
            ctx = ctx.with_session(session_id);
        }
        if let Err(e) = self.invoke(handler, ctx, notif.params, &token).await {
            warn!(method = %notif.method, "Notification handler failed: {}", e);
        }
    }

    async fn cancel_request(&self, params: Option<&Value>, session_id: Option<&str>) {
        #[derive(serde::Deserialize)]
        struct CancelledParams {
            #[serde(rename = "requestId")]
            request_id: RequestId,
        }

        let Some(cancel) = params
            .cloned()
            .and_then(|p| serde_json::from_value::<CancelledParams>(p).ok())
        else {
            debug!("Ignoring malformed cancellation");
            return;
        };

        let Some(session_id) = session_id else {
            debug!("Ignoring cancellation outside a session");
            return;
        };

        let key = (session_id.to_string(), cancel.request_id);
        if let Some(entry) = self.active_requests.read().await.get(&key) {
            info!(session_id = %session_id, "Cancelling request: {:?}", key.1);
            entry.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::mcp::handler::handler_fn;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn router() -> MethodRouter {
        let mut router = MethodRouter::new(DEFAULT_REQUEST_TIMEOUT, Metrics::new());
        router.register(
            "ping",
            handler_fn(|_ctx, _params| async { Ok::<_, Error>(None) }),
        );
        router
    }

    async fn call(router: &MethodRouter, raw: &str) -> Option<Value> {
        router
            .dispatch_bytes(raw.as_bytes(), &CancellationToken::new(), None)
            .await
            .map(|r| serde_json::to_value(r).unwrap())
    }

    #[tokio::test]
    async fn test_ping_returns_empty_object() {
        let resp = call(&router(), r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
            .await
            .unwrap();
        assert_eq!(resp, json!({"jsonrpc": "2.0", "id": 1, "result": {}}));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let resp = call(&router(), r#"{"jsonrpc":"2.0","id":5,"method":"foo/bar"}"#)
            .await
            .unwrap();
        assert_eq!(resp["id"], 5);
        assert_eq!(resp["error"]["code"], -32601);
        assert_eq!(resp["error"]["message"], "Method 'foo/bar' not found");
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let resp = call(&router(), r#"{"jsonrpc":"#).await.unwrap();
        assert_eq!(resp["error"]["code"], -32700);
        assert_eq!(resp["id"], Value::Null);
    }

    #[tokio::test]
    async fn test_notification_produces_no_response() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let mut router = router();
        router.on_notification(
            "notifications/custom",
            handler_fn(move |_ctx, _params| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Error>(None)
                }
            }),
        );

        let resp = call(&router, r#"{"jsonrpc":"2.0","method":"notifications/custom"}"#).await;
        assert!(resp.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let unknown = call(&router, r#"{"jsonrpc":"2.0","method":"notifications/whatever"}"#).await;
        assert!(unknown.is_none());
    }

    #[tokio::test]
    async fn test_handler_error_is_preserved() {
        let mut router = router();
        router.register(
            "custom/fail",
            handler_fn(|_ctx, _params| async {
                Err::<Option<Value>, _>(Error::rpc(
                    -32050,
                    "custom failure",
                    Some(json!({"hint": "retry later"})),
                ))
            }),
        );

        let resp = call(&router, r#"{"jsonrpc":"2.0","id":"x","method":"custom/fail"}"#)
            .await
            .unwrap();
        assert_eq!(resp["id"], "x");
        assert_eq!(
            resp["error"],
            json!({"code": -32050, "message": "custom failure", "data": {"hint": "retry later"}})
        );
        assert!(resp.get("result").is_none());
    }

    #[tokio::test]
    async fn test_handler_result_is_wrapped() {
        let mut router = router();
        router.register(
            "custom/sum",
            handler_fn(|_ctx, params: Option<Value>| async move {
                let params = params.unwrap_or_default();
                let a = params["a"].as_i64().unwrap_or(0);
                let b = params["b"].as_i64().unwrap_or(0);
                Ok::<_, Error>(Some(json!({"sum": a + b})))
            }),
        );

        let resp = call(
            &router,
            r#"{"jsonrpc":"2.0","id":2,"method":"custom/sum","params":{"a":2,"b":3}}"#,
        )
        .await
        .unwrap();
        assert_eq!(resp["result"], json!({"sum": 5}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_promptly() {
        let mut router = MethodRouter::new(Duration::from_secs(1), Metrics::new());
        router.register(
            "slow",
            handler_fn(|_ctx, _params| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, Error>(None)
            }),
        );

        let resp = call(&router, r#"{"jsonrpc":"2.0","id":9,"method":"slow"}"#)
            .await
            .unwrap();
        assert_eq!(resp["id"], 9);
        assert_eq!(resp["error"]["code"], -32603);
        assert!(resp["error"]["message"]
            .as_str()
            .unwrap()
            .contains("timed out"));
    }

    #[tokio::test]
    async fn test_parent_cancellation_aborts_call() {
        let mut router = router();
        router.register(
            "wait",
            handler_fn(|ctx: RequestContext, _params| async move {
                ctx.cancel.cancelled().await;
                Ok::<_, Error>(Some(json!("unreachable")))
            }),
        );

        let parent = CancellationToken::new();
        parent.cancel();
        let resp = router
            .dispatch_bytes(br#"{"jsonrpc":"2.0","id":1,"method":"wait"}"#, &parent, None)
            .await
            .unwrap();
        assert!(resp.error.is_some());
    }

    #[tokio::test]
    async fn test_client_cancellation_notification() {
        let mut router = router();
        router.register(
            "wait",
            handler_fn(|ctx: RequestContext, _params| async move {
                ctx.cancel.cancelled().await;
                Ok::<_, Error>(None)
            }),
        );
        let router = Arc::new(router);
        let parent = CancellationToken::new();

        let pending = {
            let router = router.clone();
            let parent = parent.clone();
            tokio::spawn(async move {
                router
                    .dispatch_bytes(
                        br#"{"jsonrpc":"2.0","id":42,"method":"wait"}"#,
                        &parent,
                        Some("s1"),
                    )
                    .await
            })
        };

        // Wait until the request is registered as in flight.
        loop {
            let key = ("s1".to_string(), RequestId::from(42));
            if router.active_requests.read().await.contains_key(&key) {
                break;
            }
            tokio::task::yield_now().await;
        }

        let none = router
            .dispatch_bytes(
                br#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{"requestId":42}}"#,
                &parent,
                Some("s1"),
            )
            .await;
        assert!(none.is_none());

        let resp = pending.await.unwrap().unwrap();
        assert_eq!(resp.error.unwrap().code, -32603);
    }

    fn waiting_router() -> Arc<MethodRouter> {
        let mut router = router();
        router.register(
            "wait",
            handler_fn(|ctx: RequestContext, _params| async move {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => Ok::<_, Error>(Some(json!("cancelled"))),
                    _ = tokio::time::sleep(Duration::from_millis(50)) => Ok(Some(json!("done"))),
                }
            }),
        );
        Arc::new(router)
    }

    #[tokio::test]
    async fn test_cancellation_without_session_is_ignored() {
        let router = waiting_router();
        let parent = CancellationToken::new();

        let pending = {
            let router = router.clone();
            let parent = parent.clone();
            tokio::spawn(async move {
                router
                    .dispatch_bytes(br#"{"jsonrpc":"2.0","id":1,"method":"wait"}"#, &parent, None)
                    .await
            })
        };
        tokio::task::yield_now().await;

        // A different sessionless caller tries to cancel id 1.
        router
            .dispatch_bytes(
                br#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{"requestId":1}}"#,
                &parent,
                None,
            )
            .await;

        let resp = pending.await.unwrap().unwrap();
        assert!(resp.error.is_none());
        assert_eq!(resp.result, Some(json!("done")));
        assert!(router.active_requests.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_is_scoped_to_session() {
        let router = waiting_router();
        let parent = CancellationToken::new();

        let pending = {
            let router = router.clone();
            let parent = parent.clone();
            tokio::spawn(async move {
                router
                    .dispatch_bytes(
                        br#"{"jsonrpc":"2.0","id":1,"method":"wait"}"#,
                        &parent,
                        Some("s1"),
                    )
                    .await
            })
        };
        loop {
            let key = ("s1".to_string(), RequestId::from(1));
            if router.active_requests.read().await.contains_key(&key) {
                break;
            }
            tokio::task::yield_now().await;
        }

        router
            .dispatch_bytes(
                br#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{"requestId":1}}"#,
                &parent,
                Some("s2"),
            )
            .await;

        let resp = pending.await.unwrap().unwrap();
        assert_eq!(resp.result, Some(json!("done")));
    }

    #[tokio::test]
    async fn test_reused_id_keeps_latest_entry() {
        let mut router = router();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let release_rx = Arc::new(tokio::sync::Mutex::new(Some(release_rx)));
        let unclaimed = release_rx.clone();
        router.register(
            "hold",
            handler_fn(move |ctx: RequestContext, _params| {
                let release_rx = release_rx.clone();
                async move {
                    let rx = release_rx.lock().await.take();
                    match rx {
                        // The first call waits for the test; later ones until cancelled.
                        Some(rx) => {
                            let _ = rx.await;
                        }
                        None => ctx.cancel.cancelled().await,
                    }
                    Ok::<_, Error>(None)
                }
            }),
        );
        let router = Arc::new(router);
        let parent = CancellationToken::new();
        let key = ("s1".to_string(), RequestId::from(7));
        let raw = br#"{"jsonrpc":"2.0","id":7,"method":"hold"}"#;

        let first = {
            let (router, parent) = (router.clone(), parent.clone());
            tokio::spawn(async move { router.dispatch_bytes(raw, &parent, Some("s1")).await })
        };
        while unclaimed.lock().await.is_some() {
            tokio::task::yield_now().await;
        }
        let first_seq = router.active_requests.read().await[&key].seq;

        let second = {
            let (router, parent) = (router.clone(), parent.clone());
            tokio::spawn(async move { router.dispatch_bytes(raw, &parent, Some("s1")).await })
        };
        while router.active_requests.read().await[&key].seq == first_seq {
            tokio::task::yield_now().await;
        }

        release_tx.send(()).unwrap();
        first.await.unwrap().unwrap();

        // The first call finishing must not drop the second call's handle.
        assert!(router.active_requests.read().await.contains_key(&key));
        router
            .dispatch_bytes(
                br#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{"requestId":7}}"#,
                &parent,
                Some("s1"),
            )
            .await;
        let resp = second.await.unwrap().unwrap();
        assert_eq!(resp.error.unwrap().code, -32603);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_contained() {
        let mut router = router();
        router.register(
            "boom",
            handler_fn(|_ctx, _params| async {
                let res: Result<Option<Value>> = Err(Error::Internal("never".into()));
                if res.is_err() {
                    panic!("handler exploded");
                }
                res
            }),
        );

        let resp = call(&router, r#"{"jsonrpc":"2.0","id":1,"method":"boom"}"#)
            .await
            .unwrap();
        assert_eq!(resp["error"]["code"], -32603);
    }

    #[tokio::test]
    async fn test_metrics_are_counted() {
        let router = router();
        call(&router, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).await;
        call(&router, r#"{"jsonrpc":"2.0","id":2,"method":"nope"}"#).await;

        let snap = router.metrics().snapshot();
        assert_eq!(snap.requests_total, 2);
        assert_eq!(snap.requests_success, 1);
        assert_eq!(snap.requests_failed, 1);
    }

    #[test]
    fn test_registration() {
        let router = router();
        assert!(router.has_method("ping"));
        assert!(!router.has_method("tools/list"));
        assert_eq!(router.method_count(), 1);
        assert_eq!(router.method_names(), vec!["ping".to_string()]);
    }
}
