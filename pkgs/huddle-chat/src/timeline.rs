//! Client-side merge of the live tail window and older pages

use crate::ChatConfig;
use huddle_store::{Message, MessageCursor};
use std::collections::BTreeMap;

/// What a merge changed, for the viewport controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    /// Messages not seen before
    pub added: usize,
    /// Whether any of them sort after the previous newest message
    pub grew_at_bottom: bool,
}

/// Ordered, de-duplicated view of one conversation's messages.
///
/// Tail windows and backward pages can overlap at their boundary; entries
/// are keyed by `(created_at, id)` and de-duplicated by id. Messages that
/// slide out of the live window stay in the timeline.
#[derive(Debug, Clone)]
pub struct Timeline {
    entries: BTreeMap<MessageCursor, Message>,
    tail_window: usize,
    page_size: usize,
    history_exhausted: bool,
    initialized: bool,
}

impl Timeline {
    /// `tail_window` and `page_size` must match the stream feeding this timeline
    pub fn new(tail_window: usize, page_size: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            tail_window,
            page_size,
            history_exhausted: false,
            initialized: false,
        }
    }

    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(config.tail_window, config.page_size)
    }

    /// Merge a full tail window snapshot
    pub fn apply_tail(&mut self, window: Vec<Message>) -> MergeOutcome {
        // A first window that is not full means there is nothing older
        if !self.initialized && window.len() < self.tail_window {
            self.history_exhausted = true;
        }
        self.initialized = true;
        self.merge(window)
    }

    /// Merge a page returned by a backward fetch
    pub fn apply_older_page(&mut self, page: Vec<Message>) -> MergeOutcome {
        if page.len() < self.page_size {
            self.history_exhausted = true;
        }
        self.merge(page)
    }

    fn merge(&mut self, batch: Vec<Message>) -> MergeOutcome {
        let previous_newest = self.entries.keys().next_back().cloned();
        let mut outcome = MergeOutcome::default();

        for message in batch {
            if self.contains(&message.id) {
                continue;
            }
            let cursor = message.cursor();
            if previous_newest.as_ref().map_or(true, |newest| cursor > *newest) {
                outcome.grew_at_bottom = true;
            }
            self.entries.insert(cursor, message);
            outcome.added += 1;
        }

        outcome
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.entries.values().any(|m| m.id == message_id)
    }

    /// Cursor to pass to the next backward fetch
    pub fn oldest_cursor(&self) -> Option<MessageCursor> {
        self.entries.keys().next().cloned()
    }

    pub fn newest(&self) -> Option<&Message> {
        self.entries.values().next_back()
    }

    /// No older messages remain on the server
    pub fn history_exhausted(&self) -> bool {
        self.history_exhausted
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.values()
    }

    pub fn to_vec(&self) -> Vec<Message> {
        self.entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn msg(id: &str, millis: i64) -> Message {
        Message {
            id: id.to_string(),
            sender_id: "alice".to_string(),
            text: id.to_string(),
            created_at: Utc.timestamp_millis_opt(millis).unwrap(),
            read: false,
            reply_to: None,
        }
    }

    fn ids(timeline: &Timeline) -> Vec<String> {
        timeline.messages().map(|m| m.id.clone()).collect()
    }

    #[test]
    fn test_overlapping_page_is_deduplicated() {
        let mut timeline = Timeline::new(3, 3);
        timeline.apply_tail(vec![msg("c", 3), msg("d", 4), msg("e", 5)]);
        let outcome = timeline.apply_older_page(vec![msg("a", 1), msg("b", 2), msg("c", 3)]);

        assert_eq!(outcome.added, 2);
        assert!(!outcome.grew_at_bottom);
        assert_eq!(ids(&timeline), vec!["a", "b", "c", "d", "e"]);
        assert!(!timeline.history_exhausted());
    }

    #[test]
    fn test_slid_out_messages_are_retained() {
        let mut timeline = Timeline::new(2, 2);
        timeline.apply_tail(vec![msg("a", 1), msg("b", 2)]);
        let outcome = timeline.apply_tail(vec![msg("b", 2), msg("c", 3)]);

        assert_eq!(outcome.added, 1);
        assert!(outcome.grew_at_bottom);
        assert_eq!(ids(&timeline), vec!["a", "b", "c"]);
        assert_eq!(timeline.newest().unwrap().id, "c");
        assert_eq!(timeline.oldest_cursor().unwrap().id, "a");
    }

    #[test]
    fn test_equal_timestamps_order_by_id() {
        let mut timeline = Timeline::new(30, 30);
        timeline.apply_tail(vec![msg("y", 7), msg("x", 7)]);
        assert_eq!(ids(&timeline), vec!["x", "y"]);
    }

    #[test]
    fn test_history_exhaustion() {
        let mut short = Timeline::new(30, 30);
        short.apply_tail(vec![msg("a", 1)]);
        assert!(short.history_exhausted());

        let mut full = Timeline::new(2, 2);
        full.apply_tail(vec![msg("c", 3), msg("d", 4)]);
        assert!(!full.history_exhausted());
        full.apply_older_page(vec![msg("b", 2)]);
        assert!(full.history_exhausted());
    }

    #[test]
    fn test_full_window_smaller_than_page_keeps_history_open() {
        let mut timeline = Timeline::new(2, 5);
        timeline.apply_tail(vec![msg("d", 4), msg("e", 5)]);
        assert!(!timeline.history_exhausted());

        timeline.apply_older_page(vec![msg("a", 1), msg("b", 2), msg("c", 3)]);
        assert!(timeline.history_exhausted());
        assert_eq!(ids(&timeline), vec!["a", "b", "c", "d", "e"]);
    }
}
