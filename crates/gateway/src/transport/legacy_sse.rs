//! Legacy SSE transport (§4.5): the event-stream session layer used by MCP
//! clients that predate Streamable HTTP.
//!
//! Grounded on `channel_sse_transport.py::ChannelAwareSseTransport` for the
//! protocol (mint session, bind channel, advertise a per-session POST-back
//! endpoint, forward posted messages as `message` events) and on the
//! teacher's `api/tasks.rs::task_events_sse`/`make_task_event_stream` for
//! the `async-stream::stream!` + `Sse::new(...).keep_alive(...)` plumbing.
//!
//! Decoding and acting on the posted JSON-RPC messages is the MCP framing
//! library's job (out of scope, §1); this transport only owns session
//! lifecycle and message forwarding, so posted bodies are treated as opaque
//! [`serde_json::Value`]s.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::stream::Stream;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::channel::{ChannelRegistry, DEFAULT_CHANNEL};
use crate::state::AppState;

/// Path the unified dispatcher mounts [`handle_post_message`] under.
pub const MESSAGE_PATH: &str = "/mcp/message";

/// Live legacy-SSE sessions: session id (hex) → sender for messages posted
/// back to that session.
#[derive(Default)]
pub struct SessionRegistry {
    writers: Mutex<HashMap<String, mpsc::UnboundedSender<Value>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, session_id: String, tx: mpsc::UnboundedSender<Value>) {
        self.writers.lock().insert(session_id, tx);
    }

    fn remove(&self, session_id: &str) {
        self.writers.lock().remove(session_id);
    }

    fn get(&self, session_id: &str) -> Option<mpsc::UnboundedSender<Value>> {
        self.writers.lock().get(session_id).cloned()
    }
}

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    #[serde(default)]
    pub channel: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// `GET /mcp` (legacy SSE branch of the unified dispatcher).
///
/// Mints a session, binds it to the requested channel, and opens an SSE
/// stream: first an `endpoint` event advertising the per-session POST-back
/// URL, then forwarded `message` events for whatever is posted to it.
pub async fn connect_sse(
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
) -> impl IntoResponse {
    let channel = query
        .channel
        .as_deref()
        .map(|raw| {
            let normalized = ChannelRegistry::validate(raw);
            if normalized != raw {
                sa_domain::trace::TraceEvent::ChannelNormalized {
                    raw: raw.to_string(),
                    normalized: normalized.clone(),
                }
                .emit();
            }
            normalized
        })
        .unwrap_or_else(|| DEFAULT_CHANNEL.to_string());

    let session_id = uuid::Uuid::new_v4().simple().to_string();
    state.channel_registry.bind(&session_id, &channel);

    let (tx, rx) = mpsc::unbounded_channel::<Value>();
    state.legacy_sessions.insert(session_id.clone(), tx);

    let mut endpoint_path = format!("{MESSAGE_PATH}?session_id={session_id}");
    if channel != DEFAULT_CHANNEL {
        endpoint_path.push_str(&format!("&channel={channel}"));
    }

    let cleanup = SessionCleanup {
        registry: state.legacy_sessions.clone(),
        channel_registry: state.channel_registry.clone(),
        session_id: session_id.clone(),
    };

    let stream = session_stream(endpoint_path, rx, cleanup);

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Drops the session's writer and channel binding when the SSE stream ends,
/// regardless of which branch it ends on.
struct SessionCleanup {
    registry: Arc<SessionRegistry>,
    channel_registry: Arc<ChannelRegistry>,
    session_id: String,
}

impl Drop for SessionCleanup {
    fn drop(&mut self) {
        self.registry.remove(&self.session_id);
        self.channel_registry.unbind(&self.session_id);
    }
}

fn session_stream(
    endpoint_path: String,
    mut rx: mpsc::UnboundedReceiver<Value>,
    cleanup: SessionCleanup,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        let _cleanup = cleanup;
        yield Ok(Event::default().event("endpoint").data(endpoint_path));

        while let Some(message) = rx.recv().await {
            let data = serde_json::to_string(&message).unwrap_or_default();
            yield Ok(Event::default().event("message").data(data));
        }
    }
}

/// `POST /mcp/message` — the legacy back-channel clients post JSON-RPC
/// messages to.
pub async fn handle_post_message(
    State(state): State<AppState>,
    Query(query): Query<PostQuery>,
    body: axum::body::Bytes,
) -> Response {
    use axum::http::StatusCode;
    use axum::response::Json;

    let Some(session_id) = query.session_id else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "session_id is required" })),
        )
            .into_response();
    };

    if uuid::Uuid::parse_str(&session_id).is_err() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "Invalid session ID" })),
        )
            .into_response();
    }

    let Some(writer) = state.legacy_sessions.get(&session_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Could not find session" })),
        )
            .into_response();
    };

    match serde_json::from_slice::<Value>(&body) {
        Ok(message) => {
            let _ = writer.send(message);
            StatusCode::ACCEPTED.into_response()
        }
        Err(e) => {
            // Dual-surfaced: reply 400 to the poster *and* forward the
            // decode failure into the session's stream, matching
            // `handle_post_message`'s behavior in the original transport.
            let err_value = serde_json::json!({ "error": format!("invalid message body: {e}") });
            let _ = writer.send(err_value.clone());
            (StatusCode::BAD_REQUEST, Json(err_value)).into_response()
        }
    }
}
