//! Ingress handlers (§4.7, §6): MCP tool execution, the REST mirror, and
//! the business-client poll/result endpoints.
//!
//! `execute_tool` is the one place the submit→await→translate-timeout flow
//! lives; both the REST mirror and the modern MCP transport's `tools/call`
//! handling call it, mirroring how every tool handler in `mcp_handler.py`
//! calls the shared `_execute_1c_command` helper.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{header::CONTENT_TYPE, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::{json, Value};

use sa_domain::error::Error;

use crate::middleware::channel_binding::EffectiveChannel;
use crate::state::AppState;

/// Fixed allow-list of result metadata fields passed through from
/// `/1c/result` untouched. Never "copy all unknown fields" — see
/// DESIGN.md's Open Question decision.
const PASSTHROUGH_META_FIELDS: &[&str] = &[
    "truncated",
    "limit",
    "returned",
    "count",
    "offset",
    "has_more",
    "next_offset",
    "configuration",
    "extension",
    "last_date",
    "next_same_second_offset",
];

/// Submit `tool`/`params` on `channel` and await its result, honoring the
/// configured command timeout. Never returns an HTTP error itself — a
/// timeout or broker error is folded into `{"success": false, "error": ...}`
/// per §7.4.
pub async fn execute_tool(state: &AppState, channel: &str, tool: &str, params: Value) -> Value {
    let params = match state.tool_validator.validate(tool, params) {
        Ok(p) => p,
        Err(e) => return json!({ "success": false, "error": e.to_string() }),
    };

    let command_id = state.channel_queue.add_command(channel, tool, params);
    let timeout = Duration::from_secs_f64(state.config.bridge.command_timeout_secs);

    match state.channel_queue.wait_for_result(&command_id, timeout).await {
        Ok(result) => state.result_formatter.format(tool, result),
        Err(Error::Timeout(_)) => json!({
            "success": false,
            "error": format!("timeout on channel {channel}"),
        }),
        Err(e) => json!({ "success": false, "error": e.to_string() }),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /1c/poll — business-client long-poll
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default, Deserialize)]
pub struct PollQuery {
    #[serde(default)]
    pub timeout: Option<f64>,
}

pub async fn poll_command(
    State(state): State<AppState>,
    Extension(channel): Extension<EffectiveChannel>,
    Query(q): Query<PollQuery>,
) -> Response {
    let timeout_secs = q.timeout.unwrap_or(state.config.bridge.poll_timeout_secs);
    let timeout = (timeout_secs > 0.0).then(|| Duration::from_secs_f64(timeout_secs));

    match state
        .channel_queue
        .get_next_command(&channel.0, timeout)
        .await
    {
        Some(command) => Json(command.to_wire()).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /1c/result — business-client result submission
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn receive_result(
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid JSON body: {e}") })),
            )
                .into_response();
        }
    };

    let Some(obj) = value.as_object() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "request body must be a JSON object / тело запроса должно быть JSON объектом" })),
        )
            .into_response();
    };

    let mut errors: Vec<String> = Vec::new();
    let id = obj.get("id").and_then(Value::as_str).map(str::to_string);
    if id.is_none() {
        errors.push("id: field required / поле обязательно".to_string());
    }
    let success = obj.get("success").and_then(Value::as_bool);
    if success.is_none() {
        errors.push(
            "success: field required and must be a boolean / поле обязательно и должно быть булевым"
                .to_string(),
        );
    }

    if !errors.is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": errors.join("; ") })),
        )
            .into_response();
    }
    let id = id.expect("checked above");
    let success = success.expect("checked above");

    let mut result_data = serde_json::Map::new();
    result_data.insert("success".to_string(), Value::Bool(success));
    result_data.insert(
        "data".to_string(),
        obj.get("data").cloned().unwrap_or(Value::Null),
    );
    result_data.insert(
        "error".to_string(),
        obj.get("error").cloned().unwrap_or(Value::Null),
    );
    if success {
        if let Some(schema) = obj.get("schema").filter(|v| !v.is_null()) {
            result_data.insert("schema".to_string(), schema.clone());
        }
    }
    for field in PASSTHROUGH_META_FIELDS {
        if let Some(v) = obj.get(*field).filter(|v| !v.is_null()) {
            result_data.insert((*field).to_string(), v.clone());
        }
    }

    let completed = state.channel_queue.set_result(&id, Value::Object(result_data));
    if completed {
        Json(json!({ "status": "ok" })).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Command not found or already completed / Команда не найдена или уже выполнена" })),
        )
            .into_response()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /api/:tool — REST mirror of the MCP tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per spec.md:174 / `server.py`'s route table: `get_metadata` is the only
/// tool registered with `methods=["GET", "POST"]` — every other tool is
/// `POST`-only.
const GET_ALLOWED_TOOL: &str = "get_metadata";

pub async fn rest_tool(
    State(state): State<AppState>,
    Path(tool): Path<String>,
    Extension(channel): Extension<EffectiveChannel>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method == Method::GET && tool != GET_ALLOWED_TOOL {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(json!({
                "success": false,
                "error": format!("{tool} does not support GET; use POST"),
            })),
        )
            .into_response();
    }

    let params = if method == Method::POST {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !content_type.to_ascii_lowercase().starts_with("application/json") {
            return (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                Json(json!({
                    "success": false,
                    "error": "Content-Type must be application/json / Content-Type должен быть application/json",
                })),
            )
                .into_response();
        }

        if body.is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_slice::<Value>(&body) {
                Ok(Value::Object(map)) => Value::Object(map),
                Ok(_) => {
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(json!({
                            "success": false,
                            "error": "request body must be a JSON object / тело запроса должно быть JSON объектом",
                        })),
                    )
                        .into_response();
                }
                Err(e) => {
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(json!({ "success": false, "error": format!("invalid JSON: {e}") })),
                    )
                        .into_response();
                }
            }
        }
    } else {
        Value::Object(Default::default())
    };

    let result = execute_tool(&state, &channel.0, &tool, params).await;
    Json(result).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::config::Config;

    fn test_state() -> AppState {
        AppState::new(std::sync::Arc::new(Config::default()))
    }

    #[tokio::test]
    async fn poll_command_returns_no_content_when_empty() {
        let state = test_state();
        let response = poll_command(
            State(state),
            Extension(EffectiveChannel("default".into())),
            Query(PollQuery::default()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn poll_command_returns_pending_command() {
        let state = test_state();
        state
            .channel_queue
            .add_command("default", "execute_query", json!({"q": "select 1"}));

        let response = poll_command(
            State(state),
            Extension(EffectiveChannel("default".into())),
            Query(PollQuery::default()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn receive_result_rejects_non_object_body() {
        let state = test_state();
        let response = receive_result(State(state), Bytes::from_static(b"[1,2,3]")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn receive_result_requires_id_and_success() {
        let state = test_state();
        let response = receive_result(State(state), Bytes::from_static(b"{}")).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn receive_result_unknown_command_is_404() {
        let state = test_state();
        let body = serde_json::to_vec(&json!({"id": "missing", "success": true})).unwrap();
        let response = receive_result(State(state), Bytes::from(body)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn receive_result_completes_pending_command() {
        let state = test_state();
        let id = state
            .channel_queue
            .add_command("default", "execute_query", json!({}));

        let body =
            serde_json::to_vec(&json!({"id": id, "success": true, "data": {"rows": []}}))
                .unwrap();
        let response = receive_result(State(state.clone()), Bytes::from(body)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let result = state
            .channel_queue
            .wait_for_result(&id, Duration::from_millis(50))
            .await
            .expect("result delivered");
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["data"], json!({"rows": []}));
    }

    #[tokio::test]
    async fn rest_tool_rejects_wrong_content_type() {
        let state = test_state();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "text/plain".parse().unwrap());

        let response = rest_tool(
            State(state),
            Path("execute_query".into()),
            Extension(EffectiveChannel("default".into())),
            Method::POST,
            headers,
            Bytes::from_static(b"{}"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn rest_tool_times_out_as_structured_failure() {
        let mut config = Config::default();
        config.bridge.command_timeout_secs = 0.02;
        let state = AppState::new(std::sync::Arc::new(config));

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "application/json".parse().unwrap());

        let response = rest_tool(
            State(state),
            Path("execute_query".into()),
            Extension(EffectiveChannel("default".into())),
            Method::POST,
            headers,
            Bytes::new(),
        )
        .await;
        // A timed-out command is a 200 with a structured failure body, not
        // an HTTP error (§7.4) — no business client ever answers it here.
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rest_tool_rejects_get_for_non_metadata_tools() {
        let state = test_state();
        let response = rest_tool(
            State(state),
            Path("execute_query".into()),
            Extension(EffectiveChannel("default".into())),
            Method::GET,
            HeaderMap::new(),
            Bytes::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn rest_tool_allows_get_for_get_metadata() {
        let mut config = Config::default();
        config.bridge.command_timeout_secs = 0.02;
        let state = AppState::new(std::sync::Arc::new(config));

        let response = rest_tool(
            State(state),
            Path("get_metadata".into()),
            Extension(EffectiveChannel("default".into())),
            Method::GET,
            HeaderMap::new(),
            Bytes::new(),
        )
        .await;
        // get_metadata is the one tool allowed over GET (spec.md:174); the
        // request still reaches execute_tool and times out structurally.
        assert_eq!(response.status(), StatusCode::OK);
    }
}
