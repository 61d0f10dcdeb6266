pub mod health;
pub mod ingress;
pub mod validation;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::middleware::channel_binding;
use crate::state::AppState;
use crate::transport;

/// Build the full API router (§6): the unified MCP transport group, the
/// business-client poll/result endpoints, health, and the REST tool mirror.
///
/// `state` is needed up front to wire the channel-binding middleware at
/// build time, same as the teacher wires its auth middleware.
pub fn router(state: AppState) -> Router<AppState> {
    // `TraceLayer` is applied to the `/mcp` group alone, before any other
    // route is added — per SPEC_FULL.md §10.6 (`server.py`'s
    // `MCPLoggingMiddleware`), request/response logging is scoped to paths
    // under `/mcp`, not the whole API surface.
    let mcp = transport::mcp_router().layer(tower_http::trace::TraceLayer::new_for_http());

    mcp.route("/1c/poll", get(ingress::poll_command))
        .route("/1c/result", post(ingress::receive_result))
        .route("/health", get(health::health))
        .route(
            "/api/:tool",
            get(ingress::rest_tool).post(ingress::rest_tool),
        )
        .layer(middleware::from_fn_with_state(
            state,
            channel_binding::channel_binding,
        ))
}
