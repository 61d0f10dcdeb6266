//! `GET /health` — broker health summary.
//!
//! Grounded on `server.py::health_check` for the response shape (aggregate
//! counts always present; per-channel breakdowns gated behind
//! `HEALTH_INCLUDE_CHANNEL_DETAILS`) and on the teacher's
//! `api/admin/health.rs` for the axum JSON-response idiom.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let channel_stats = state.channel_queue.stats();
    let active_sessions = state.channel_registry.active_channels();

    let pending_commands: usize = channel_stats.values().sum();
    let pending_channels_count = channel_stats.values().filter(|&&n| n > 0).count();
    let active_sessions_count: usize = active_sessions.values().sum();

    let mut body = serde_json::json!({
        "status": "ok",
        "pending_commands": pending_commands,
        "pending_channels_count": pending_channels_count,
        "active_channels_count": state.channel_queue.active_channels_count(),
        "active_sessions_count": active_sessions_count,
        "mcp_endpoint": "/mcp",
    });

    if state.config.health.include_channel_details {
        let obj = body.as_object_mut().expect("object literal");
        obj.insert(
            "pending_commands_by_channel".to_string(),
            serde_json::to_value(&channel_stats).unwrap_or_default(),
        );
        obj.insert(
            "active_sessions_by_channel".to_string(),
            serde_json::to_value(&active_sessions).unwrap_or_default(),
        );
    }

    Json(body)
}
