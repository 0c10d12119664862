//! Message stream - sending, the live tail window and backward paging

use huddle_store::{
    ConversationStore, Message, MessageCursor, MessageStore, NewMessage, ReplyTo, Subscription,
};
use tracing::{debug, instrument, warn};

use crate::config::ChatConfig;
use crate::error::{ChatError, Result};

/// Build the reply snapshot stored alongside a new message.
///
/// The snapshot is frozen at send time; later changes to the source message
/// are never reflected.
pub fn reply_snapshot(source: &Message, sender_name: &str, max_chars: usize) -> ReplyTo {
    let text = if source.text.chars().count() > max_chars {
        let mut cut: String = source.text.chars().take(max_chars).collect();
        cut.push('…');
        cut
    } else {
        source.text.clone()
    };

    ReplyTo {
        id: source.id.clone(),
        text,
        sender_name: sender_name.to_string(),
    }
}

#[derive(Clone)]
pub struct MessageStream {
    messages: MessageStore,
    conversations: ConversationStore,
    config: ChatConfig,
}

impl MessageStream {
    pub fn new(messages: MessageStore, conversations: ConversationStore, config: ChatConfig) -> Self {
        Self {
            messages,
            conversations,
            config,
        }
    }

    /// Append a message, then refresh the conversation preview.
    ///
    /// The append and the preview update are two writes. A failed preview
    /// update is logged and the send still succeeds.
    #[instrument(skip(self, text, reply_to))]
    pub async fn send(
        &self,
        conversation_id: &str,
        sender_id: &str,
        text: &str,
        reply_to: Option<ReplyTo>,
    ) -> Result<Message> {
        if text.trim().is_empty() {
            return Err(ChatError::Validation("Message text is empty".to_string()));
        }

        if self.conversations.get(conversation_id).await?.is_none() {
            return Err(ChatError::NotFound(conversation_id.to_string()));
        }

        let message = self
            .messages
            .append(
                conversation_id,
                NewMessage {
                    sender_id: sender_id.to_string(),
                    text: text.to_string(),
                    reply_to,
                },
            )
            .await?;

        match self
            .conversations
            .update_summary(conversation_id, &message.text, message.created_at, sender_id)
            .await
        {
            Ok(true) => {}
            Ok(false) => debug!("Preview of {} already newer than {}", conversation_id, message.id),
            Err(e) => warn!(
                "Message {} stored but preview of {} not updated: {}",
                message.id, conversation_id, e
            ),
        }

        Ok(message)
    }

    /// Reply snapshot with the configured preview length
    pub fn reply_to(&self, source: &Message, sender_name: &str) -> ReplyTo {
        reply_snapshot(source, sender_name, self.config.reply_preview_max_chars)
    }

    /// Live window over the newest messages; each item replaces the previous window
    pub fn subscribe_tail(&self, conversation_id: &str) -> Subscription<Vec<Message>> {
        self.messages
            .subscribe_tail(conversation_id, self.config.tail_window)
    }

    /// One page of messages strictly older than `before`, ascending
    pub async fn load_older_page(
        &self,
        conversation_id: &str,
        before: &MessageCursor,
    ) -> Result<Vec<Message>> {
        Ok(self
            .messages
            .before(conversation_id, before, self.config.page_size)
            .await?)
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(text: &str) -> Message {
        Message {
            id: "m1".to_string(),
            sender_id: "alice".to_string(),
            text: text.to_string(),
            created_at: Utc::now(),
            read: false,
            reply_to: None,
        }
    }

    #[test]
    fn test_reply_snapshot_keeps_short_text() {
        let snapshot = reply_snapshot(&message("lunch?"), "Alice", 80);
        assert_eq!(snapshot.text, "lunch?");
        assert_eq!(snapshot.id, "m1");
        assert_eq!(snapshot.sender_name, "Alice");
    }

    #[test]
    fn test_reply_snapshot_truncates_with_ellipsis() {
        let exact = "x".repeat(80);
        assert_eq!(reply_snapshot(&message(&exact), "Alice", 80).text, exact);

        let long = "ü".repeat(81);
        let snapshot = reply_snapshot(&message(&long), "Alice", 80);
        assert_eq!(snapshot.text.chars().count(), 81);
        assert!(snapshot.text.ends_with('…'));
        assert!(snapshot.text.starts_with(&"ü".repeat(80)));
    }
}
