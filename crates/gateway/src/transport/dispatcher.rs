//! Unified MCP dispatcher (§4.6): multiplexes `/mcp` onto either the modern
//! Streamable HTTP transport or the legacy SSE transport based on method and
//! headers.
//!
//! Grounded on `server.py`'s `McpUnifiedApp`/`_wants_sse`/`_is_streamable_get`
//! routing rule, ported to an axum router.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures_util::stream::Stream;
use serde_json::Value;

use super::legacy_sse;
use crate::middleware::channel_binding::SESSION_ID_HEADER;
use crate::state::AppState;

const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";
const LAST_EVENT_ID_HEADER: &str = "last-event-id";
const CONTENT_TYPE_SSE: &str = "text/event-stream";

fn wants_sse(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains(CONTENT_TYPE_SSE))
        .unwrap_or(false)
}

fn is_streamable_get(headers: &HeaderMap) -> bool {
    headers.contains_key(SESSION_ID_HEADER)
        || headers.contains_key(PROTOCOL_VERSION_HEADER)
        || headers.contains_key(LAST_EVENT_ID_HEADER)
}

/// Builds the `/mcp` + `/mcp/message` route group.
pub fn mcp_router() -> Router<AppState> {
    Router::new()
        .route(
            "/mcp",
            get(mcp_get).post(mcp_post).delete(mcp_delete),
        )
        .route(legacy_sse::MESSAGE_PATH, post(legacy_sse::handle_post_message))
}

async fn mcp_get(state: State<AppState>, headers: HeaderMap, query: axum::extract::Query<legacy_sse::ConnectQuery>) -> Response {
    if wants_sse(&headers) {
        if is_streamable_get(&headers) {
            modern_stream_get().await.into_response()
        } else {
            legacy_sse::connect_sse(state, query).await.into_response()
        }
    } else {
        modern_stream_get().await.into_response()
    }
}

/// Modern Streamable HTTP session resume (GET with session headers).
///
/// Actual event replay by `last-event-id` is the MCP framing library's
/// responsibility (out of scope, §1); this keeps the connection open with
/// keep-alive pings only.
async fn modern_stream_get() -> impl IntoResponse {
    let stream: futures_util::stream::Empty<Result<Event, std::convert::Infallible>> =
        futures_util::stream::empty();
    let stream: std::pin::Pin<Box<dyn Stream<Item = Result<Event, std::convert::Infallible>> + Send>> =
        Box::pin(stream);
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, serde::Deserialize)]
struct JsonRpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

/// Modern Streamable HTTP POST: the only shape this bridge interprets is a
/// `tools/call` request, which it resolves the same way the REST mirror
/// does (§4.7). Every other MCP method (`initialize`, `tools/list`, …) is
/// the framing library's territory.
async fn mcp_post(
    state: State<AppState>,
    axum::extract::Extension(channel): axum::extract::Extension<
        crate::middleware::channel_binding::EffectiveChannel,
    >,
    Json(req): Json<JsonRpcRequest>,
) -> Response {
    if req.method != "tools/call" {
        return Json(serde_json::json!({
            "jsonrpc": "2.0",
            "id": req.id,
            "error": { "code": -32601, "message": format!("method not handled by bridge: {}", req.method) },
        }))
        .into_response();
    }

    let tool = match req.params.get("name").and_then(Value::as_str) {
        Some(name) => name.to_string(),
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": "tools/call requires params.name" })),
            )
                .into_response();
        }
    };
    let arguments = req
        .params
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));

    let result = crate::api::ingress::execute_tool(&state, &channel.0, &tool, arguments).await;

    Json(serde_json::json!({
        "jsonrpc": "2.0",
        "id": req.id,
        "result": result,
    }))
    .into_response()
}

/// `DELETE /mcp` — modern transport session termination.
async fn mcp_delete(state: State<AppState>, headers: HeaderMap) -> Response {
    if let Some(session_id) = headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        state.channel_registry.unbind(session_id);
    }
    StatusCode::NO_CONTENT.into_response()
}
