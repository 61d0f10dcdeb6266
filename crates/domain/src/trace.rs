use serde::Serialize;

/// Structured trace events emitted across the bridge.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ChannelBound {
        session_id: String,
        channel_id: String,
        is_new_session: bool,
    },
    ChannelNormalized {
        raw: String,
        normalized: String,
    },
    CommandEnqueued {
        command_id: String,
        channel_id: String,
        tool: String,
    },
    CommandDelivered {
        command_id: String,
        channel_id: String,
    },
    CommandCompleted {
        command_id: String,
        channel_id: String,
        success: bool,
    },
    CommandTimedOut {
        command_id: String,
        channel_id: String,
    },
    QueueCreated {
        channel_id: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "bridge_event");
    }
}
