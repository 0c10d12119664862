//! Conversation list synchronizer
//!
//! The store returns a member's conversations unordered; sorting by recency
//! happens here on every snapshot.

use futures::{Stream, StreamExt};
use huddle_store::{Conversation, ConversationStore, Subscription};
use std::cmp::Reverse;
use tracing::debug;

/// Newest activity first. Ties fall back to id so snapshots sort stably.
pub fn sort_by_recency(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| {
        Reverse(a.last_activity_millis())
            .cmp(&Reverse(b.last_activity_millis()))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Live, recency-sorted list of one user's conversations
pub struct ConversationListSubscription {
    inner: Subscription<Vec<Conversation>>,
}

impl ConversationListSubscription {
    pub async fn next(&mut self) -> Option<Vec<Conversation>> {
        let mut snapshot = self.inner.next().await?;
        sort_by_recency(&mut snapshot);
        Some(snapshot)
    }

    pub fn into_stream(self) -> impl Stream<Item = Vec<Conversation>> {
        self.inner.map(|mut snapshot| {
            sort_by_recency(&mut snapshot);
            snapshot
        })
    }

    pub fn unsubscribe(self) {
        self.inner.unsubscribe();
    }
}

/// One conversation as seen by a particular viewer
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationView {
    Visible(Conversation),
    /// The conversation exists but the viewer is not a participant
    Unauthorized,
    Missing,
}

impl ConversationView {
    pub fn for_viewer(document: Option<Conversation>, viewer_id: &str) -> Self {
        match document {
            Some(c) if c.has_participant(viewer_id) => ConversationView::Visible(c),
            Some(_) => ConversationView::Unauthorized,
            None => ConversationView::Missing,
        }
    }
}

/// Live view of a single conversation, gated on membership
pub struct ConversationWatch {
    inner: Subscription<Option<Conversation>>,
    viewer_id: String,
}

impl ConversationWatch {
    pub async fn next(&mut self) -> Option<ConversationView> {
        let document = self.inner.next().await?;
        Some(ConversationView::for_viewer(document, &self.viewer_id))
    }

    pub fn unsubscribe(self) {
        self.inner.unsubscribe();
    }
}

#[derive(Clone)]
pub struct ConversationList {
    conversations: ConversationStore,
}

impl ConversationList {
    pub fn new(conversations: ConversationStore) -> Self {
        Self { conversations }
    }

    pub fn subscribe(&self, user_id: &str) -> ConversationListSubscription {
        debug!("Subscribing to conversations of {}", user_id);
        ConversationListSubscription {
            inner: self.conversations.subscribe_member(user_id),
        }
    }

    pub fn watch(&self, conversation_id: &str, viewer_id: &str) -> ConversationWatch {
        ConversationWatch {
            inner: self.conversations.subscribe_document(conversation_id),
            viewer_id: viewer_id.to_string(),
        }
    }
}
