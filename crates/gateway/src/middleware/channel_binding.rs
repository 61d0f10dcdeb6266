//! Channel binding middleware (§4.4).
//!
//! Resolves the effective channel for every request and, when a brand-new
//! MCP session is minted by this request, binds it to that channel so later
//! requests carrying only `mcp-session-id` still land on the right channel.
//!
//! Grounded on `channel_middleware.py`'s `ChannelMiddleware` for the
//! precedence rule (bound channel wins over the query channel) and on the
//! teacher's `api/auth.rs` for the `from_fn_with_state` shape.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use serde::Deserialize;

use crate::channel::DEFAULT_CHANNEL;
use crate::state::AppState;

/// Header carrying the MCP session id, both on requests (once a client has
/// one) and on responses (when a transport mints a new one).
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

#[derive(Debug, Default, Deserialize)]
struct ChannelQuery {
    #[serde(default)]
    channel: Option<String>,
}

/// The channel resolved for this request, exposed via request extensions
/// for every downstream handler to read instead of re-parsing the query
/// string.
#[derive(Debug, Clone)]
pub struct EffectiveChannel(pub String);

pub async fn channel_binding(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let query_channel = Query::<ChannelQuery>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(q)| q.channel)
        .map(|raw| {
            let normalized = crate::channel::ChannelRegistry::validate(&raw);
            if normalized != raw {
                sa_domain::trace::TraceEvent::ChannelNormalized {
                    raw: raw.clone(),
                    normalized: normalized.clone(),
                }
                .emit();
            }
            normalized
        })
        .unwrap_or_else(|| DEFAULT_CHANNEL.to_string());

    let request_session_id = req
        .headers()
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    // A bound session's channel always wins over whatever the query string
    // says — the binding is immutable once made (P2).
    let effective_channel = match &request_session_id {
        Some(session_id) if state.channel_registry.is_bound(session_id) => {
            state.channel_registry.channel_of(session_id)
        }
        _ => query_channel,
    };

    req.extensions_mut()
        .insert(EffectiveChannel(effective_channel.clone()));

    let response = next.run(req).await;

    // Only a request that arrived with no session id can mint one; bind it
    // to the channel this request resolved, not to whatever a later
    // request might claim.
    if request_session_id.is_none() {
        if let Some(new_session_id) = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
        {
            state
                .channel_registry
                .bind(&new_session_id, &effective_channel);
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;
    use sa_domain::config::Config;
    use tower::ServiceExt;

    async fn echo_channel(
        axum::extract::Extension(channel): axum::extract::Extension<EffectiveChannel>,
    ) -> String {
        channel.0
    }

    fn test_app(state: AppState) -> Router {
        Router::new()
            .route("/probe", get(echo_channel))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                channel_binding,
            ))
            .with_state(state)
    }

    #[tokio::test]
    async fn query_channel_is_used_with_no_session_header() {
        let state = AppState::new(std::sync::Arc::new(Config::default()));
        let app = test_app(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/probe?channel=alpha")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn bound_session_channel_overrides_query_channel() {
        let state = AppState::new(std::sync::Arc::new(Config::default()));
        state.channel_registry.bind("sess-1", "alpha");
        let app = test_app(state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/probe?channel=beta")
                    .header(SESSION_ID_HEADER, "sess-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"alpha");
    }

    #[tokio::test]
    async fn missing_query_channel_falls_back_to_default() {
        let state = AppState::new(std::sync::Arc::new(Config::default()));
        let app = test_app(state);

        let response = app
            .oneshot(Request::builder().uri("/probe").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], DEFAULT_CHANNEL.as_bytes());
    }
}
