//! AppState construction and background-task spawning, extracted from
//! `main.rs` the way the teacher's `bootstrap.rs` extracts its own.

use std::sync::Arc;
use std::time::Duration;

use sa_domain::config::{Config, ConfigSeverity};

use crate::state::AppState;

/// Validate config and build a fully-wired [`AppState`]. Mirrors the
/// teacher's `build_app_state`, minus the subsystems this bridge has no use
/// for (LLM providers, sessions, skills, nodes, …).
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    let state = AppState::new(config);
    tracing::info!("channel registry + channel command queue ready");

    Ok(state)
}

/// Spawn the long-running background tasks. Today this is just the purge
/// sweep (§4.2 `purgeOlderThan`, §9) — the one periodic task this bridge
/// actually needs, wired into the teacher's `tokio::spawn` +
/// `tokio::time::interval` idiom.
pub fn spawn_background_tasks(state: &AppState) {
    let channel_queue = state.channel_queue.clone();
    let interval_secs = state.config.bridge.purge_interval_secs;
    let max_age = Duration::from_secs_f64(state.config.bridge.purge_max_age_secs);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            let removed = channel_queue.purge_older_than(max_age);
            if removed > 0 {
                tracing::info!(removed, "purged stale pending commands");
            }
        }
    });
    tracing::info!(
        interval_secs,
        max_age_secs = state.config.bridge.purge_max_age_secs,
        "purge sweep started"
    );
}
