//! SSE transport: `GET /sse` streams, `POST /message` feeds them.
//!
//! Each stream is driven by one event loop task that owns the session's
//! receiving queues. Replies to `/message` requests are pushed onto the
//! stream instead of the POST response.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::HttpState;
use crate::mcp::protocol::{encode_notification, encode_response};
use crate::mcp::session::{QueueCapacity, Session, SessionStreams};
use crate::service::SessionRecord;

/// Events buffered between the event loop and the HTTP body.
const BODY_BUFFER: usize = 16;

type EventSender = mpsc::Sender<Result<Event, Infallible>>;

/// Queue and keep-alive settings for new streams.
#[derive(Debug, Clone, Copy)]
pub struct SseSettings {
    pub queue: QueueCapacity,
    pub keep_alive: Duration,
}

impl Default for SseSettings {
    fn default() -> Self {
        Self {
            queue: QueueCapacity::default(),
            keep_alive: Duration::from_secs(30),
        }
    }
}

/// A serialized JSON-RPC message as an SSE `message` event.
pub fn message_event(payload: &[u8]) -> Event {
    Event::default()
        .event("message")
        .data(String::from_utf8_lossy(payload))
}

/// `GET /sse`
pub async fn sse_handler(
    State(state): State<HttpState>,
    headers: HeaderMap,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let (session, streams) = Session::open(user_agent, state.sse.queue, &state.root);
    state.registry.add(session.clone()).await;

    let record = SessionRecord {
        id: session.id().to_string(),
        user_agent: session.user_agent().to_string(),
        connected_at: session.created_at(),
    };
    if let Err(e) = state.service.sessions().add(record).await {
        warn!(session_id = %session.id(), "Failed to record session: {}", e);
    }

    info!(
        session_id = %session.id(),
        user_agent = %session.user_agent(),
        "SSE session opened"
    );

    let keep_alive = KeepAlive::new()
        .interval(state.sse.keep_alive)
        .text("keep-alive");
    let (out, events) = mpsc::channel(BODY_BUFFER);
    tokio::spawn(run_event_loop(state, session, streams, out));

    Sse::new(ReceiverStream::new(events)).keep_alive(keep_alive)
}

/// Hand one event to the response body unless the session is cancelled first.
async fn write(out: &EventSender, cancel: &CancellationToken, event: Event) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = out.send(Ok(event)) => sent.is_ok(),
    }
}

async fn run_event_loop(
    state: HttpState,
    session: Arc<Session>,
    streams: SessionStreams,
    out: EventSender,
) {
    let SessionStreams {
        mut events,
        mut inbox,
    } = streams;
    let id = session.id().to_string();
    let cancel = session.cancellation().clone();

    let greeting = [
        Event::default()
            .event("connected")
            .data(json!({ "sessionId": id }).to_string()),
        Event::default()
            .event("endpoint")
            .data(format!("/message?sessionId={}", id)),
    ];
    let mut open = true;
    for event in greeting {
        if !write(&out, &cancel, event).await {
            open = false;
            break;
        }
    }

    while open {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = out.closed() => {
                debug!(session_id = %id, "SSE client went away");
                break;
            }
            Some(payload) = events.recv() => message_event(payload.as_bytes()),
            Some(notification) = inbox.recv() => match encode_notification(&notification) {
                Ok(payload) => message_event(&payload),
                Err(e) => {
                    warn!(session_id = %id, method = %notification.method, "Skipped notification: {}", e);
                    continue;
                }
            },
        };
        open = write(&out, &cancel, event).await;
    }

    // Unregister before marking closed so no lookup can return a dead session.
    state.registry.remove(&id).await;
    session.mark_closed();
    drop(inbox);

    if let Err(e) = state.service.sessions().delete(&id).await {
        debug!(session_id = %id, "Session record already gone: {}", e);
    }
    info!(session_id = %id, "SSE session closed");
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// `POST /message?sessionId=<id>`
pub async fn message_handler(
    State(state): State<HttpState>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Response {
    let Some(session_id) = query.session_id.filter(|s| !s.is_empty()) else {
        return error_body(StatusCode::BAD_REQUEST, "Missing sessionId");
    };
    let Some(session) = state.registry.get(&session_id).await else {
        return error_body(StatusCode::NOT_FOUND, "Session not found");
    };

    let router = state.router.clone();
    tokio::spawn(async move {
        let parent = session.cancellation().clone();
        let Some(response) = router
            .dispatch_bytes(&body, &parent, Some(session.id()))
            .await
        else {
            return;
        };
        let payload = String::from_utf8_lossy(&encode_response(&response)).into_owned();
        if let Err(e) = session.push_event(payload) {
            warn!(session_id = %session.id(), "Dropped SSE reply: {}", e);
        }
    });

    StatusCode::ACCEPTED.into_response()
}
