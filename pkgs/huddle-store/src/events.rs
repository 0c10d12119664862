//! Change feed shared by every store handle

use tokio::sync::broadcast;
use tracing::trace;

/// A committed write, published after the database transaction succeeds
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// A conversation document was created or rewritten.
    ///
    /// `members` holds participants from before and after the write so that
    /// removed users also re-query.
    ConversationChanged { id: String, members: Vec<String> },
    /// A message was appended to a conversation's sub-collection
    MessageAppended {
        conversation_id: String,
        message_id: String,
    },
}

impl StoreEvent {
    pub fn touches_conversation(&self, conversation_id: &str) -> bool {
        match self {
            StoreEvent::ConversationChanged { id, .. } => id == conversation_id,
            StoreEvent::MessageAppended {
                conversation_id: id,
                ..
            } => id == conversation_id,
        }
    }

    pub fn touches_member(&self, user_id: &str) -> bool {
        match self {
            StoreEvent::ConversationChanged { members, .. } => {
                members.iter().any(|m| m == user_id)
            }
            StoreEvent::MessageAppended { .. } => false,
        }
    }
}

/// In-process fan-out of [`StoreEvent`]s
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<StoreEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: StoreEvent) {
        // No live subscriptions is the normal idle state
        if self.tx.send(event).is_err() {
            trace!("Change published with no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }
}
