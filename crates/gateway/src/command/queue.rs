//! Single-channel command queue: a FIFO of pending commands plus a
//! command-id-keyed pending map used to deliver results back to whoever
//! is awaiting them.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, Notify};

use sa_domain::error::{Error, Result};

/// A command waiting to be picked up by a business-app poller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    pub tool: String,
    pub params: Value,
    #[serde(skip_serializing, skip_deserializing)]
    pub created_at: DateTime<Utc>,
}

impl Command {
    /// The wire shape handed to pollers — excludes `created_at`, which is
    /// bookkeeping only.
    pub fn to_wire(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "tool": self.tool,
            "params": self.params,
        })
    }
}

/// Completion slot for one command: a result-once-set flag plus a
/// [`Notify`] used to wake whoever is awaiting it. Storing the result in
/// the slot (rather than relying on `Notify` alone) is what makes the
/// completion signal level-triggered: a result set before the waiter ever
/// calls `notified()` is still observed on the next slot check.
struct PendingEntry {
    command: Command,
    result: Mutex<Option<Value>>,
    notify: Notify,
}

/// FIFO command queue for a single channel.
pub struct CommandQueue {
    pending: Mutex<HashMap<String, std::sync::Arc<PendingEntry>>>,
    tx: mpsc::UnboundedSender<Command>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Command>>,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            pending: Mutex::new(HashMap::new()),
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Enqueue a new command and return its id. Never blocks — the FIFO is
    /// unbounded.
    pub fn add_command(&self, tool: &str, params: Value) -> String {
        let command_id = uuid::Uuid::new_v4().to_string();
        let command = Command {
            id: command_id.clone(),
            tool: tool.to_string(),
            params,
            created_at: Utc::now(),
        };

        self.pending.lock().insert(
            command_id.clone(),
            std::sync::Arc::new(PendingEntry {
                command: command.clone(),
                result: Mutex::new(None),
                notify: Notify::new(),
            }),
        );

        // An unbounded sender only fails if the receiver was dropped, which
        // never happens while `self` is alive.
        let _ = self.tx.send(command);
        command_id
    }

    /// Pop the next command, for a business-app poller.
    ///
    /// `timeout: None` (or zero) is a non-blocking poll — returns
    /// immediately if nothing is queued. `Some(d)` blocks up to `d`.
    pub async fn get_next_command(&self, timeout: Option<Duration>) -> Option<Command> {
        let mut rx = self.rx.lock().await;
        match timeout {
            None => rx.try_recv().ok(),
            Some(d) if d.is_zero() => rx.try_recv().ok(),
            Some(d) => tokio::time::timeout(d, rx.recv()).await.ok().flatten(),
        }
    }

    /// Record the result for a pending command and wake its waiter.
    /// Returns `false` if the command is unknown (already completed,
    /// removed, or never existed).
    pub fn set_result(&self, command_id: &str, result: Value) -> bool {
        let pending = self.pending.lock();
        match pending.get(command_id) {
            Some(entry) => {
                *entry.result.lock() = Some(result);
                entry.notify.notify_one();
                true
            }
            None => false,
        }
    }

    /// Wait for a command's result, up to `timeout`. Removes the pending
    /// entry on success; callers are responsible for removing it on
    /// timeout via [`Self::remove_command`].
    pub async fn wait_for_result(&self, command_id: &str, timeout: Duration) -> Result<Value> {
        let entry = {
            let pending = self.pending.lock();
            pending.get(command_id).cloned()
        }
        .ok_or_else(|| Error::UnknownCommand(command_id.to_string()))?;

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(result) = entry.result.lock().take() {
                self.pending.lock().remove(command_id);
                return Ok(result);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout(command_id.to_string()));
            }

            if tokio::time::timeout(remaining, entry.notify.notified())
                .await
                .is_err()
            {
                return Err(Error::Timeout(command_id.to_string()));
            }
            // Either woke on notify or the wait elapsed exactly at the
            // remaining-time boundary; loop back to re-check the slot.
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Remove commands older than `max_age`, returning the ids that were
    /// dropped so the caller (the channel-isolated broker above this
    /// layer) can also erase them from its command-id → channel index.
    pub fn purge_older_than(&self, max_age: Duration) -> Vec<String> {
        let now = Utc::now();
        let mut pending = self.pending.lock();
        let expired: Vec<String> = pending
            .iter()
            .filter(|(_, entry)| {
                now.signed_duration_since(entry.command.created_at)
                    .to_std()
                    .map(|age| age > max_age)
                    .unwrap_or(false)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            pending.remove(id);
        }
        expired
    }

    pub fn remove_command(&self, command_id: &str) -> bool {
        self.pending.lock().remove(command_id).is_some()
    }
}
