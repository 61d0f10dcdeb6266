use std::sync::Arc;

use sa_domain::config::Config;

use crate::api::validation::{PassthroughFormatter, PassthroughValidator, ResultFormatter, ToolValidator};
use crate::channel::ChannelRegistry;
use crate::command::ChannelCommandQueue;
use crate::transport::legacy_sse::SessionRegistry;

/// Shared application state passed to every handler and middleware.
///
/// Fields are grouped by concern:
/// - **Core** — config
/// - **Broker** — channel registry, channel-isolated command queue
/// - **Transport** — legacy SSE session registry
/// - **Extension seams** — tool validation / result formatting (§10.7)
#[derive(Clone)]
pub struct AppState {
    // ── Core ──────────────────────────────────────────────────────────
    pub config: Arc<Config>,

    // ── Broker ────────────────────────────────────────────────────────
    pub channel_registry: Arc<ChannelRegistry>,
    pub channel_queue: Arc<ChannelCommandQueue>,

    // ── Transport ─────────────────────────────────────────────────────
    pub legacy_sessions: Arc<SessionRegistry>,

    // ── Extension seams (pass-through defaults; see api::validation) ──
    pub tool_validator: Arc<dyn ToolValidator>,
    pub result_formatter: Arc<dyn ResultFormatter>,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            channel_registry: Arc::new(ChannelRegistry::new()),
            channel_queue: Arc::new(ChannelCommandQueue::new()),
            legacy_sessions: Arc::new(SessionRegistry::new()),
            tool_validator: Arc::new(PassthroughValidator),
            result_formatter: Arc::new(PassthroughFormatter),
        }
    }
}
