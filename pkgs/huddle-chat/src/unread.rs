//! Unread tracking over conversation-list snapshots
//!
//! [`UnreadTracker`] is a plain reducer: feed it snapshots and foreground
//! transitions, read back the number of conversations with unseen activity.
//! [`UnreadBadge`] runs one on a task for the lifetime of a session and
//! publishes its state on a watch channel.

use huddle_store::{Conversation, Subscription};
use std::collections::HashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Window/tab title with the unread badge, e.g. `(2) Huddle`
pub fn badge_title(count: usize, base: &str) -> String {
    if count > 0 {
        format!("({}) {}", count, base)
    } else {
        base.to_string()
    }
}

/// Per-session seen-time cache and the count derived from it
#[derive(Debug, Clone)]
pub struct UnreadTracker {
    self_id: String,
    seen: HashMap<String, i64>,
    latest: Vec<(String, i64)>,
    initialized: bool,
    foreground: bool,
    count: usize,
}

impl UnreadTracker {
    pub fn new(self_id: impl Into<String>, foreground: bool) -> Self {
        Self {
            self_id: self_id.into(),
            seen: HashMap::new(),
            latest: Vec::new(),
            initialized: false,
            foreground,
            count: 0,
        }
    }

    /// Reduce one full conversation-list snapshot and return the new count
    pub fn observe(&mut self, snapshot: &[Conversation]) -> usize {
        self.latest = snapshot
            .iter()
            .map(|c| (c.id.clone(), c.last_activity_millis()))
            .collect();

        if !self.initialized {
            self.initialized = true;
            self.mark_all_seen();
            return self.count;
        }

        self.count = snapshot
            .iter()
            .filter(|c| {
                let from_someone_else = c
                    .last_message_sender_id
                    .as_deref()
                    .is_some_and(|sender| sender != self.self_id);
                let seen_at = self.seen.get(&c.id).copied().unwrap_or(0);
                from_someone_else && c.last_activity_millis() > seen_at
            })
            .count();

        trace!("Unread conversations: {}", self.count);

        if self.foreground {
            self.mark_all_seen();
        }
        self.count
    }

    /// Record a foreground/background transition and return the new count
    pub fn set_foreground(&mut self, foreground: bool) -> usize {
        let became_visible = foreground && !self.foreground;
        self.foreground = foreground;

        if became_visible && self.count > 0 {
            self.mark_all_seen();
        }
        self.count
    }

    fn mark_all_seen(&mut self) {
        for (id, at) in &self.latest {
            self.seen.insert(id.clone(), *at);
        }
        self.count = 0;
    }

    /// Drop the seen-time cache; the next snapshot seeds it again
    pub fn reset(&mut self) {
        self.seen.clear();
        self.latest.clear();
        self.initialized = false;
        self.count = 0;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_foreground(&self) -> bool {
        self.foreground
    }
}

/// State published by [`UnreadBadge`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnreadStatus {
    /// First snapshot has been seen
    pub initialized: bool,
    pub count: usize,
}

/// Background driver owning an [`UnreadTracker`]
pub struct UnreadBadge {
    status: watch::Receiver<UnreadStatus>,
    foreground: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl UnreadBadge {
    /// Start tracking `subscription`, which must list `self_id`'s conversations
    pub fn spawn(
        self_id: &str,
        mut subscription: Subscription<Vec<Conversation>>,
        foreground: bool,
    ) -> Self {
        let (status_tx, status_rx) = watch::channel(UnreadStatus::default());
        let (foreground_tx, mut foreground_rx) = watch::channel(foreground);
        let mut tracker = UnreadTracker::new(self_id, foreground);
        let label = self_id.to_string();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    snapshot = subscription.next() => {
                        let Some(snapshot) = snapshot else { break };
                        tracker.observe(&snapshot);
                    }
                    changed = foreground_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let visible = *foreground_rx.borrow_and_update();
                        tracker.set_foreground(visible);
                    }
                }

                status_tx.send_replace(UnreadStatus {
                    initialized: tracker.is_initialized(),
                    count: tracker.count(),
                });
            }
            debug!("Unread badge for {} stopped", label);
        });

        Self {
            status: status_rx,
            foreground: foreground_tx,
            task,
        }
    }

    pub fn set_foreground(&self, foreground: bool) {
        self.foreground.send_replace(foreground);
    }

    pub fn count(&self) -> usize {
        self.status.borrow().count
    }

    pub fn status(&self) -> UnreadStatus {
        *self.status.borrow()
    }

    /// Receiver for awaiting status changes
    pub fn watch(&self) -> watch::Receiver<UnreadStatus> {
        self.status.clone()
    }

    pub fn title(&self, base: &str) -> String {
        badge_title(self.count(), base)
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for UnreadBadge {
    fn drop(&mut self) {
        self.task.abort();
    }
}
