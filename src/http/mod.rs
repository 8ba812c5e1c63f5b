//! HTTP transport for MCP: JSON-RPC over POST plus SSE sessions.
//!
//! Routes:
//!
//! - `POST /`, `POST /jsonrpc` - one request in, one response out
//! - `GET /sse` - open an SSE session (see [`sse`])
//! - `POST /message?sessionId=<id>` - request whose reply goes to the stream
//! - `GET /events` - redirect to `/sse`
//! - `GET /status`, `GET /health`, `GET /metrics`

pub mod sse;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::mcp::protocol::MCP_VERSION;
use crate::mcp::router::MethodRouter;
use crate::mcp::session::SessionRegistry;
use crate::metrics::Metrics;
use crate::service::AppService;

pub use sse::SseSettings;

/// HTTP server state.
#[derive(Clone)]
pub struct HttpState {
    pub router: Arc<MethodRouter>,
    pub service: Arc<AppService>,
    pub registry: Arc<SessionRegistry>,
    pub metrics: Arc<Metrics>,
    /// Process root; every session and in-flight call derives from it.
    pub root: CancellationToken,
    pub sse: SseSettings,
}

/// Build the axum router.
pub fn app(state: HttpState) -> Router {
    Router::new()
        .route("/", post(jsonrpc))
        .route("/jsonrpc", post(jsonrpc))
        .route("/events", get(events_redirect))
        .route("/sse", get(sse::sse_handler))
        .route("/message", post(sse::message_handler))
        .route("/status", get(status))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Shutdown timing for [`serve`].
#[derive(Debug, Clone, Copy)]
pub struct ShutdownPolicy {
    pub grace: Duration,
    pub drain: Duration,
}

impl From<&Config> for ShutdownPolicy {
    fn from(config: &Config) -> Self {
        Self {
            grace: config.shutdown_grace(),
            drain: config.drain_delay(),
        }
    }
}

/// Serve until the root token is cancelled, then shut down in order:
/// stop accepting and wait for in-flight requests up to the grace period,
/// close every SSE session, pause for the drain delay.
pub async fn serve(state: HttpState, addr: &str, policy: ShutdownPolicy) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP transport listening on {}", listener.local_addr()?);
    serve_listener(state, listener, policy).await
}

/// [`serve`] on an already bound listener.
pub async fn serve_listener(
    state: HttpState,
    listener: tokio::net::TcpListener,
    policy: ShutdownPolicy,
) -> Result<()> {
    let root = state.root.clone();
    let registry = state.registry.clone();
    let shutdown = root.clone().cancelled_owned();
    let app = app(state);

    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
    });

    let stopped_early = tokio::select! {
        finished = &mut server => Some(finished),
        _ = root.cancelled() => None,
    };

    info!("Shutting down HTTP transport");
    let outcome = match stopped_early {
        Some(finished) => {
            root.cancel();
            server_outcome(finished)
        }
        None => match tokio::time::timeout(policy.grace, &mut server).await {
            Ok(finished) => server_outcome(finished),
            Err(_) => {
                warn!("In-flight requests still running after {:?}, aborting", policy.grace);
                server.abort();
                Ok(())
            }
        },
    };

    registry.close_all().await;
    tokio::time::sleep(policy.drain).await;
    info!("HTTP transport stopped");
    outcome
}

fn server_outcome(
    finished: std::result::Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    match finished {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Error::HttpServer(e.to_string())),
        Err(e) => Err(Error::HttpServer(format!("server task failed: {}", e))),
    }
}

/// `POST /` and `POST /jsonrpc`
async fn jsonrpc(State(state): State<HttpState>, body: Bytes) -> Response {
    let parent = state.root.child_token();
    match state.router.dispatch_bytes(&body, &parent, None).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// `GET /events`
async fn events_redirect() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/sse")]).into_response()
}

/// `GET /status`
async fn status(State(state): State<HttpState>) -> impl IntoResponse {
    let info = state.service.server_info();
    Json(serde_json::json!({
        "status": "ok",
        "name": info.name,
        "version": info.version,
        "protocol": MCP_VERSION
    }))
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION
    }))
}

/// Prometheus text exposition.
async fn metrics(State(state): State<HttpState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}
