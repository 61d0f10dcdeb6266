//! Channel registry — maps MCP session ids to the channel they were bound
//! to, and is the single place raw channel ids get validated.

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::RwLock;
use regex::Regex;

/// Reserved channel used whenever a caller-supplied channel id is absent
/// or fails validation.
pub const DEFAULT_CHANNEL: &str = "default";

fn channel_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("static pattern"))
}

/// Session id → channel id bindings, plus the one place channel ids are
/// normalized.
///
/// Consumers MUST route raw channel input through [`ChannelRegistry::validate`]
/// before use; no other component re-validates.
pub struct ChannelRegistry {
    sessions: RwLock<HashMap<String, String>>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Trim whitespace; if empty or pattern-rejected, return `default`;
    /// otherwise return the trimmed input. Pure function — no locking.
    pub fn validate(raw: &str) -> String {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !channel_id_pattern().is_match(trimmed) {
            return DEFAULT_CHANNEL.to_string();
        }
        trimmed.to_string()
    }

    /// Bind a session to a channel. `channel_id` is expected to already be
    /// normalized through [`Self::validate`].
    pub fn bind(&self, session_id: &str, channel_id: &str) {
        self.sessions
            .write()
            .insert(session_id.to_string(), channel_id.to_string());

        sa_domain::trace::TraceEvent::ChannelBound {
            session_id: session_id.to_string(),
            channel_id: channel_id.to_string(),
            is_new_session: true,
        }
        .emit();
    }

    /// The channel bound to `session_id`, or `default` if unbound.
    pub fn channel_of(&self, session_id: &str) -> String {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| DEFAULT_CHANNEL.to_string())
    }

    pub fn is_bound(&self, session_id: &str) -> bool {
        self.sessions.read().contains_key(session_id)
    }

    pub fn unbind(&self, session_id: &str) {
        self.sessions.write().remove(session_id);
    }

    /// Snapshot of sessions-per-channel counts.
    pub fn active_channels(&self) -> HashMap<String, usize> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for channel in self.sessions.read().values() {
            *counts.entry(channel.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_trims_and_accepts_valid_id() {
        assert_eq!(ChannelRegistry::validate("  alpha  "), "alpha");
    }

    #[test]
    fn validate_empty_is_default() {
        assert_eq!(ChannelRegistry::validate(""), DEFAULT_CHANNEL);
        assert_eq!(ChannelRegistry::validate("   "), DEFAULT_CHANNEL);
    }

    #[test]
    fn validate_rejects_invalid_characters() {
        assert_eq!(ChannelRegistry::validate("alpha beta"), DEFAULT_CHANNEL);
        assert_eq!(ChannelRegistry::validate("alpha/beta"), DEFAULT_CHANNEL);
        assert_eq!(ChannelRegistry::validate("alpha!"), DEFAULT_CHANNEL);
    }

    #[test]
    fn validate_rejects_too_long() {
        let too_long = "a".repeat(65);
        assert_eq!(ChannelRegistry::validate(&too_long), DEFAULT_CHANNEL);
        let exactly_64 = "a".repeat(64);
        assert_eq!(ChannelRegistry::validate(&exactly_64), exactly_64);
    }

    #[test]
    fn bind_and_channel_of() {
        let registry = ChannelRegistry::new();
        registry.bind("s1", "alpha");
        assert_eq!(registry.channel_of("s1"), "alpha");
        assert!(registry.is_bound("s1"));
    }

    #[test]
    fn channel_of_unbound_session_is_default() {
        let registry = ChannelRegistry::new();
        assert_eq!(registry.channel_of("never-seen"), DEFAULT_CHANNEL);
        assert!(!registry.is_bound("never-seen"));
    }

    #[test]
    fn unbind_removes_session() {
        let registry = ChannelRegistry::new();
        registry.bind("s1", "alpha");
        registry.unbind("s1");
        assert!(!registry.is_bound("s1"));
        assert_eq!(registry.channel_of("s1"), DEFAULT_CHANNEL);
    }

    #[test]
    fn active_channels_counts_sessions_per_channel() {
        let registry = ChannelRegistry::new();
        registry.bind("s1", "alpha");
        registry.bind("s2", "alpha");
        registry.bind("s3", "beta");

        let counts = registry.active_channels();
        assert_eq!(counts.get("alpha"), Some(&2));
        assert_eq!(counts.get("beta"), Some(&1));
    }

    #[test]
    fn bind_is_immutable_until_unbind() {
        // P2: once bound, channelOf keeps returning the same channel even
        // if bind is "attempted" again with a different value elsewhere —
        // the middleware enforces this by never re-binding; the registry
        // itself allows overwrite only via an explicit bind call.
        let registry = ChannelRegistry::new();
        registry.bind("s1", "alpha");
        assert_eq!(registry.channel_of("s1"), "alpha");
    }
}
