//! Command queue with channel isolation: each channel gets its own
//! [`CommandQueue`], and a command-id → channel index gives O(1) routing
//! for completion and cancellation without scanning any channel's FIFO.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;

use sa_domain::error::{Error, Result};
use sa_domain::trace::TraceEvent;

use super::queue::{Command, CommandQueue};
use crate::channel::DEFAULT_CHANNEL;

struct Inner {
    channels: HashMap<String, Arc<CommandQueue>>,
    command_index: HashMap<String, String>,
}

/// Channel-isolated command broker.
///
/// The inner lock guards only the two index maps; all waiting happens on
/// the per-channel [`CommandQueue`] outside the lock, so one channel's
/// long poll never blocks another channel's enqueue.
pub struct ChannelCommandQueue {
    inner: Mutex<Inner>,
}

impl Default for ChannelCommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelCommandQueue {
    pub fn new() -> Self {
        let mut channels = HashMap::new();
        channels.insert(DEFAULT_CHANNEL.to_string(), Arc::new(CommandQueue::new()));
        Self {
            inner: Mutex::new(Inner {
                channels,
                command_index: HashMap::new(),
            }),
        }
    }

    /// Add a command to `channel`'s queue, creating the queue if this is
    /// the first command seen for it.
    pub fn add_command(&self, channel: &str, tool: &str, params: Value) -> String {
        let queue = {
            let mut inner = self.inner.lock();
            inner
                .channels
                .entry(channel.to_string())
                .or_insert_with(|| {
                    TraceEvent::QueueCreated {
                        channel_id: channel.to_string(),
                    }
                    .emit();
                    Arc::new(CommandQueue::new())
                })
                .clone()
        };

        let command_id = queue.add_command(tool, params);

        self.inner
            .lock()
            .command_index
            .insert(command_id.clone(), channel.to_string());

        TraceEvent::CommandEnqueued {
            command_id: command_id.clone(),
            channel_id: channel.to_string(),
            tool: tool.to_string(),
        }
        .emit();

        command_id
    }

    /// Poll `channel` for its next command. Unknown channels return `None`
    /// without creating a queue. Commands cancelled out from under the
    /// poller (their index entry erased by a timed-out waiter) are skipped
    /// transparently, preserving the caller's remaining wait budget.
    pub async fn get_next_command(&self, channel: &str, timeout: Option<Duration>) -> Option<Command> {
        let queue = { self.inner.lock().channels.get(channel).cloned() }?;

        let deadline = timeout.filter(|d| !d.is_zero()).map(|d| Instant::now() + d);

        loop {
            let current_timeout = match deadline {
                Some(dl) => {
                    let remaining = dl.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return None;
                    }
                    Some(remaining)
                }
                None => None,
            };

            let command = queue.get_next_command(current_timeout).await?;

            let still_deliverable = self.inner.lock().command_index.contains_key(&command.id);
            if still_deliverable {
                TraceEvent::CommandDelivered {
                    command_id: command.id.clone(),
                    channel_id: channel.to_string(),
                }
                .emit();
                return Some(command);
            }
            // Index entry was erased (timed out waiter); skip and keep
            // polling within whatever time remains.
        }
    }

    pub fn set_result(&self, command_id: &str, result: Value) -> bool {
        let channel = match self.inner.lock().command_index.get(command_id).cloned() {
            Some(c) => c,
            None => return false,
        };
        let queue = match self.inner.lock().channels.get(&channel).cloned() {
            Some(q) => q,
            None => return false,
        };
        let ok = queue.set_result(command_id, result);
        if ok {
            TraceEvent::CommandCompleted {
                command_id: command_id.to_string(),
                channel_id: channel,
                success: true,
            }
            .emit();
        }
        ok
    }

    /// Wait for a command's result. On success or timeout the index entry
    /// is erased; on timeout the pending entry itself is also dropped from
    /// the channel queue (cheap O(1) cancellation — no FIFO scan).
    pub async fn wait_for_result(&self, command_id: &str, timeout: Duration) -> Result<Value> {
        let channel = self
            .inner
            .lock()
            .command_index
            .get(command_id)
            .cloned()
            .ok_or_else(|| Error::UnknownCommand(command_id.to_string()))?;

        let queue = self
            .inner
            .lock()
            .channels
            .get(&channel)
            .cloned()
            .ok_or_else(|| Error::UnknownChannel(channel.clone()))?;

        match queue.wait_for_result(command_id, timeout).await {
            Ok(value) => {
                self.inner.lock().command_index.remove(command_id);
                Ok(value)
            }
            Err(err) => {
                self.inner.lock().command_index.remove(command_id);
                queue.remove_command(command_id);
                if matches!(err, Error::Timeout(_)) {
                    TraceEvent::CommandTimedOut {
                        command_id: command_id.to_string(),
                        channel_id: channel,
                    }
                    .emit();
                }
                Err(err)
            }
        }
    }

    /// Pending-command counts per channel, omitting channels with none
    /// pending.
    pub fn stats(&self) -> HashMap<String, usize> {
        let snapshot: Vec<(String, Arc<CommandQueue>)> = self
            .inner
            .lock()
            .channels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        snapshot
            .into_iter()
            .filter_map(|(channel, queue)| {
                let count = queue.pending_count();
                (count > 0).then_some((channel, count))
            })
            .collect()
    }

    pub fn active_channels_count(&self) -> usize {
        self.inner.lock().channels.len()
    }

    /// Sweep every channel's queue for commands older than `max_age`,
    /// returning the total removed. Stale index entries for purged
    /// commands are removed as well, so a later `get_next_command` never
    /// treats a purged id as still deliverable.
    pub fn purge_older_than(&self, max_age: Duration) -> usize {
        let snapshot: Vec<Arc<CommandQueue>> =
            self.inner.lock().channels.values().cloned().collect();

        let purged_ids: Vec<String> = snapshot
            .iter()
            .flat_map(|q| q.purge_older_than(max_age))
            .collect();

        if !purged_ids.is_empty() {
            let mut inner = self.inner.lock();
            for id in &purged_ids {
                inner.command_index.remove(id);
            }
        }

        purged_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_command_creates_channel_on_first_use() {
        let queue = ChannelCommandQueue::new();
        assert_eq!(queue.active_channels_count(), 1); // default only
        queue.add_command("alpha", "execute_query", serde_json::json!({}));
        assert_eq!(queue.active_channels_count(), 2);
    }

    #[tokio::test]
    async fn commands_are_isolated_per_channel() {
        let queue = ChannelCommandQueue::new();
        let alpha_id = queue.add_command("alpha", "execute_query", serde_json::json!({"n": 1}));
        queue.add_command("beta", "execute_query", serde_json::json!({"n": 2}));

        let delivered = queue
            .get_next_command("alpha", Some(Duration::from_millis(50)))
            .await
            .expect("alpha command");
        assert_eq!(delivered.id, alpha_id);

        // alpha's queue is now empty even though beta has one pending.
        assert!(queue
            .get_next_command("alpha", Some(Duration::from_millis(10)))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn poll_unknown_channel_returns_none_without_creating_it() {
        let queue = ChannelCommandQueue::new();
        assert!(queue
            .get_next_command("never-seen", Some(Duration::from_millis(10)))
            .await
            .is_none());
        assert_eq!(queue.active_channels_count(), 1);
    }

    #[tokio::test]
    async fn set_and_wait_round_trip() {
        let queue = Arc::new(ChannelCommandQueue::new());
        let id = queue.add_command("alpha", "execute_query", serde_json::json!({}));

        let waiter = {
            let queue = queue.clone();
            let id = id.clone();
            tokio::spawn(async move { queue.wait_for_result(&id, Duration::from_secs(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(queue.set_result(&id, serde_json::json!({"success": true})));

        let result = waiter.await.unwrap().expect("result");
        assert_eq!(result, serde_json::json!({"success": true}));
    }

    #[tokio::test]
    async fn timeout_erases_index_so_poll_skips_it() {
        let queue = Arc::new(ChannelCommandQueue::new());
        let id = queue.add_command("alpha", "execute_query", serde_json::json!({}));

        // Pop it off the FIFO concurrently with the wait timing out, so
        // the index is erased by the time the poll is asked whether the
        // command is still deliverable.
        let wait_err = queue
            .wait_for_result(&id, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(wait_err, Error::Timeout(_)));

        // Re-enqueue fresh and confirm index-based skip logic works: a
        // command whose id was never indexed (simulated by removing the
        // entry after enqueue) is skipped by get_next_command.
        let id2 = queue.add_command("alpha", "execute_query", serde_json::json!({}));
        queue.inner.lock().command_index.remove(&id2);
        let result = queue
            .get_next_command("alpha", Some(Duration::from_millis(30)))
            .await;
        assert!(result.is_none());
    }

    #[test]
    fn stats_omit_empty_channels() {
        let queue = ChannelCommandQueue::new();
        queue.add_command("alpha", "execute_query", serde_json::json!({}));
        let stats = queue.stats();
        assert_eq!(stats.get("alpha"), Some(&1));
        assert!(stats.get("default").is_none());
    }

    #[test]
    fn wait_for_unknown_command_errors() {
        let queue = ChannelCommandQueue::new();
        let result = futures_util::FutureExt::now_or_never(
            queue.wait_for_result("missing", Duration::from_millis(10)),
        );
        let err = result.expect("ready immediately").unwrap_err();
        assert!(matches!(err, Error::UnknownCommand(_)));
    }

    #[tokio::test]
    async fn purge_older_than_also_clears_the_index() {
        // A command purged out of a channel's pending map must also be
        // erased from the command_index, or a later poll would still find
        // it "still deliverable" and a later /1c/result would 404 on an
        // id that was in fact just handed to a poller.
        let queue = ChannelCommandQueue::new();
        let id = queue.add_command("alpha", "execute_query", serde_json::json!({}));
        assert!(queue.inner.lock().command_index.contains_key(&id));

        tokio::time::sleep(Duration::from_millis(5)).await;
        let removed = queue.purge_older_than(Duration::from_millis(0));
        assert_eq!(removed, 1);
        assert!(!queue.inner.lock().command_index.contains_key(&id));

        let delivered = queue
            .get_next_command("alpha", Some(Duration::from_millis(20)))
            .await;
        assert!(delivered.is_none());
    }
}
