//! Message store - append-only message sub-collections
//!
//! Messages are ordered by `(created_at, id)`. `created_at` comes from the
//! store's [`ServerClock`], so it is monotonic per conversation and callers
//! never supply it.

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::clock::{from_millis, ServerClock};
use crate::entities::messages;
use crate::error::StoreError;
use crate::events::{ChangeFeed, StoreEvent};
use crate::subscription::Subscription;
use crate::StoreConfig;

/// Snapshot of the message being replied to, captured at send time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyTo {
    pub id: String,
    pub text: String,
    pub sender_name: String,
}

/// Stored message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub text: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Written as false and never read back
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyTo>,
}

impl Message {
    pub fn cursor(&self) -> MessageCursor {
        MessageCursor {
            created_at: self.created_at,
            id: self.id.clone(),
        }
    }
}

/// Position in a conversation's message order
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageCursor {
    pub created_at: DateTime<Utc>,
    pub id: String,
}

impl From<&Message> for MessageCursor {
    fn from(message: &Message) -> Self {
        message.cursor()
    }
}

/// Fields a sender controls
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: String,
    pub text: String,
    pub reply_to: Option<ReplyTo>,
}

/// Message store
#[derive(Clone)]
pub struct MessageStore {
    db: DatabaseConnection,
    feed: ChangeFeed,
    clock: Arc<ServerClock>,
    config: StoreConfig,
}

impl MessageStore {
    pub(crate) fn new(
        db: DatabaseConnection,
        feed: ChangeFeed,
        clock: Arc<ServerClock>,
        config: StoreConfig,
    ) -> Self {
        Self {
            db,
            feed,
            clock,
            config,
        }
    }

    /// Append a message with a server-assigned id and timestamp
    pub async fn append(
        &self,
        conversation_id: &str,
        new_message: NewMessage,
    ) -> Result<Message, StoreError> {
        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            sender_id: new_message.sender_id,
            text: new_message.text,
            created_at: self.clock.now(),
            read: false,
            reply_to: new_message.reply_to,
        };

        let reply_to_json = message
            .reply_to
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let active = messages::ActiveModel {
            id: Set(message.id.clone()),
            conversation_id: Set(conversation_id.to_string()),
            sender_id: Set(message.sender_id.clone()),
            text: Set(message.text.clone()),
            created_at: Set(message.created_at.timestamp_millis()),
            read: Set(message.read),
            reply_to_json: Set(reply_to_json),
        };

        messages::Entity::insert(active)
            .exec_without_returning(&self.db)
            .await?;

        debug!(
            "Appended message {} to conversation {}",
            message.id, conversation_id
        );

        self.feed.publish(StoreEvent::MessageAppended {
            conversation_id: conversation_id.to_string(),
            message_id: message.id.clone(),
        });

        Ok(message)
    }

    /// Most recent `limit` messages, ascending
    pub async fn tail(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>, StoreError> {
        let models = messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .order_by_desc(messages::Column::CreatedAt)
            .order_by_desc(messages::Column::Id)
            .limit(limit as u64)
            .all(&self.db)
            .await?;

        newest_first_to_ascending(models)
    }

    /// Up to `limit` messages strictly before `cursor`, ascending
    pub async fn before(
        &self,
        conversation_id: &str,
        cursor: &MessageCursor,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let cursor_millis = cursor.created_at.timestamp_millis();

        let models = messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .filter(
                Condition::any()
                    .add(messages::Column::CreatedAt.lt(cursor_millis))
                    .add(
                        Condition::all()
                            .add(messages::Column::CreatedAt.eq(cursor_millis))
                            .add(messages::Column::Id.lt(cursor.id.as_str())),
                    ),
            )
            .order_by_desc(messages::Column::CreatedAt)
            .order_by_desc(messages::Column::Id)
            .limit(limit as u64)
            .all(&self.db)
            .await?;

        debug!(
            "Loaded {} messages of {} before {}",
            models.len(),
            conversation_id,
            cursor_millis
        );

        newest_first_to_ascending(models)
    }

    /// Get message by ID
    pub async fn get(&self, message_id: &str) -> Result<Option<Message>, StoreError> {
        let model = messages::Entity::find_by_id(message_id).one(&self.db).await?;

        model.map(model_to_message).transpose()
    }

    /// Live query over the newest `window` messages
    pub fn subscribe_tail(&self, conversation_id: &str, window: usize) -> Subscription<Vec<Message>> {
        let store = self.clone();
        let id = conversation_id.to_string();
        let filter_id = id.clone();

        Subscription::spawn(
            format!("tail:{}", id),
            &self.feed,
            self.config.subscription_buffer,
            move |event| {
                matches!(event, StoreEvent::MessageAppended { conversation_id, .. } if *conversation_id == filter_id)
            },
            move || {
                let store = store.clone();
                let id = id.clone();
                async move { store.tail(&id, window).await }
            },
        )
    }
}

fn newest_first_to_ascending(models: Vec<messages::Model>) -> Result<Vec<Message>, StoreError> {
    let mut out = models
        .into_iter()
        .map(model_to_message)
        .collect::<Result<Vec<_>, _>>()?;
    out.reverse();
    Ok(out)
}

fn model_to_message(model: messages::Model) -> Result<Message, StoreError> {
    Ok(Message {
        id: model.id,
        sender_id: model.sender_id,
        text: model.text,
        created_at: from_millis(model.created_at),
        read: model.read,
        reply_to: model
            .reply_to_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_ordering_breaks_ties_by_id() {
        let at = from_millis(1_000);
        let a = MessageCursor {
            created_at: at,
            id: "a".to_string(),
        };
        let b = MessageCursor {
            created_at: at,
            id: "b".to_string(),
        };
        let later = MessageCursor {
            created_at: from_millis(1_001),
            id: "0".to_string(),
        };
        assert!(a < b);
        assert!(b < later);
    }

    #[test]
    fn test_reply_to_wire_shape() {
        let message = Message {
            id: "m1".to_string(),
            sender_id: "bob".to_string(),
            text: "sure".to_string(),
            created_at: from_millis(5),
            read: false,
            reply_to: Some(ReplyTo {
                id: "m0".to_string(),
                text: "lunch?".to_string(),
                sender_name: "Alice".to_string(),
            }),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["senderId"], "bob");
        assert_eq!(json["createdAt"], 5);
        assert_eq!(json["replyTo"]["senderName"], "Alice");

        let plain = Message {
            reply_to: None,
            ..message
        };
        let json = serde_json::to_value(&plain).unwrap();
        assert!(json.get("replyTo").is_none());
    }
}
