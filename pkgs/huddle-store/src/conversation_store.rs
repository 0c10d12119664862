//! Conversation store - versioned conversation documents
//!
//! Every write bumps the document `version`. Multi-step changes go through
//! [`ConversationStore::run_transaction`], which reads the document, lets the
//! caller validate and build the next state, then commits with a conditional
//! write on the version it read. A concurrent writer makes the condition fail;
//! the callback is then re-run against fresh data, up to
//! `StoreConfig::max_transaction_attempts` times.

use chrono::{DateTime, Utc};
use sea_orm::{
    prelude::Expr, ActiveValue::NotSet, ColumnTrait, Condition, DatabaseConnection,
    DatabaseTransaction, EntityTrait, QueryFilter, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::clock::{from_millis, ServerClock};
use crate::entities::{conversation_members, conversations};
use crate::error::StoreError;
use crate::events::{ChangeFeed, StoreEvent};
use crate::subscription::Subscription;
use crate::StoreConfig;

/// Conversation document, serialized with its persisted field names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub participants: Vec<String>,
    #[serde(rename = "participantUsernames", alias = "participantNames")]
    pub participant_names: BTreeMap<String, String>,
    pub participant_avatars: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub last_message: String,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_sender_id: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_group: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<String>,
    /// Write counter, not part of the document body
    #[serde(skip)]
    pub version: i64,
}

impl Conversation {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    /// `lastMessageAt` in millis, 0 when never set
    pub fn last_activity_millis(&self) -> i64 {
        self.last_message_at
            .map(|t| t.timestamp_millis())
            .unwrap_or(0)
    }
}

/// Conversation store
#[derive(Clone)]
pub struct ConversationStore {
    db: DatabaseConnection,
    feed: ChangeFeed,
    clock: Arc<ServerClock>,
    config: StoreConfig,
}

impl ConversationStore {
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

    /// Insert a new conversation document.
    ///
    /// A blank `id` gets a fresh UUID. `lastMessageAt` is stamped with server
    /// time so new threads sort next to recently active ones.
    pub async fn create(&self, mut draft: Conversation) -> Result<Conversation, StoreError> {
        if draft.id.is_empty() {
            draft.id = uuid::Uuid::new_v4().to_string();
        }
        draft.version = 1;
        draft.last_message_at = Some(self.clock.now());

        let now = Utc::now().timestamp_millis();
        let mut active = to_active_model(&draft, now)?;
        active.id = Set(draft.id.clone());
        active.created_at = Set(now);

        let txn = self.db.begin().await?;
        conversations::Entity::insert(active)
            .exec_without_returning(&txn)
            .await?;
        write_members(&txn, &draft.id, &draft.participants).await?;
        txn.commit().await?;

        info!(
            "Conversation {} created with {} participants",
            draft.id,
            draft.participants.len()
        );

        self.feed.publish(StoreEvent::ConversationChanged {
            id: draft.id.clone(),
            members: draft.participants.clone(),
        });

        Ok(draft)
    }

    /// Get a single conversation by ID
    pub async fn get(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        let model = conversations::Entity::find_by_id(id).one(&self.db).await?;

        model.map(model_to_conversation).transpose()
    }

    /// All conversations that list `user_id` among their participants, unordered
    pub async fn list_for_member(&self, user_id: &str) -> Result<Vec<Conversation>, StoreError> {
        let models = conversations::Entity::find()
            .inner_join(conversation_members::Entity)
            .filter(conversation_members::Column::UserId.eq(user_id))
            .all(&self.db)
            .await?;

        debug!(
            "Found {} conversations for member {}",
            models.len(),
            user_id
        );

        models.into_iter().map(model_to_conversation).collect()
    }

    /// Replace `expected` with `next` if nobody wrote the document since
    /// `expected` was read. Returns false on a version conflict.
    pub async fn compare_and_swap(
        &self,
        expected: &Conversation,
        next: &Conversation,
    ) -> Result<bool, StoreError> {
        let now = Utc::now().timestamp_millis();
        let mut active = to_active_model(next, now)?;
        active.version = Set(expected.version + 1);

        let txn = self.db.begin().await?;
        let result = conversations::Entity::update_many()
            .set(active)
            .filter(conversations::Column::Id.eq(expected.id.as_str()))
            .filter(conversations::Column::Version.eq(expected.version))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(false);
        }

        conversation_members::Entity::delete_many()
            .filter(conversation_members::Column::ConversationId.eq(expected.id.as_str()))
            .exec(&txn)
            .await?;
        write_members(&txn, &expected.id, &next.participants).await?;
        txn.commit().await?;

        let mut members = expected.participants.clone();
        for p in &next.participants {
            if !members.contains(p) {
                members.push(p.clone());
            }
        }
        self.feed.publish(StoreEvent::ConversationChanged {
            id: expected.id.clone(),
            members,
        });

        Ok(true)
    }

    /// Read-validate-write a single conversation.
    ///
    /// `mutate` receives the current document and returns the full next
    /// state, or an error that aborts the transaction without retry. When the
    /// conditional write loses a race, the document is re-read and `mutate`
    /// runs again. Gives up with [`StoreError::TransactionExhausted`] once the
    /// attempt budget is spent.
    #[instrument(skip(self, mutate))]
    pub async fn run_transaction<F, E>(&self, id: &str, mut mutate: F) -> Result<Conversation, E>
    where
        F: FnMut(&Conversation) -> Result<Conversation, E>,
        E: From<StoreError>,
    {
        let attempts = self.config.max_transaction_attempts.max(1);

        for attempt in 1..=attempts {
            let current = self
                .get(id)
                .await?
                .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))?;

            let mut next = mutate(&current)?;
            next.id = current.id.clone();

            if self.compare_and_swap(&current, &next).await? {
                next.version = current.version + 1;
                debug!("Transaction on {} committed at attempt {}", id, attempt);
                return Ok(next);
            }

            debug!(
                "Write conflict on conversation {} (attempt {}/{})",
                id, attempt, attempts
            );
        }

        warn!(
            "Transaction on conversation {} exhausted {} attempts",
            id, attempts
        );
        Err(StoreError::TransactionExhausted {
            id: id.to_string(),
            attempts,
        }
        .into())
    }

    /// Update the last-message preview fields.
    ///
    /// Never moves `lastMessageAt` backwards: a summary older than the stored
    /// one is dropped. Returns whether the summary was applied.
    pub async fn update_summary(
        &self,
        id: &str,
        text: &str,
        at: DateTime<Utc>,
        sender_id: &str,
    ) -> Result<bool, StoreError> {
        let at_millis = at.timestamp_millis();

        let result = conversations::Entity::update_many()
            .col_expr(conversations::Column::LastMessage, Expr::value(text))
            .col_expr(conversations::Column::LastMessageAt, Expr::value(at_millis))
            .col_expr(
                conversations::Column::LastMessageSenderId,
                Expr::value(sender_id),
            )
            .col_expr(
                conversations::Column::Version,
                Expr::col(conversations::Column::Version).add(1),
            )
            .col_expr(
                conversations::Column::UpdatedAt,
                Expr::value(Utc::now().timestamp_millis()),
            )
            .filter(conversations::Column::Id.eq(id))
            .filter(
                Condition::any()
                    .add(conversations::Column::LastMessageAt.is_null())
                    .add(conversations::Column::LastMessageAt.lte(at_millis)),
            )
            .exec(&self.db)
            .await?;

        let conversation = self
            .get(id)
            .await?
            .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))?;

        if result.rows_affected == 0 {
            debug!(
                "Stale summary for conversation {} ignored ({} <= stored)",
                id, at_millis
            );
            return Ok(false);
        }

        self.feed.publish(StoreEvent::ConversationChanged {
            id: id.to_string(),
            members: conversation.participants,
        });

        Ok(true)
    }

    /// Live query over every conversation containing `user_id`
    pub fn subscribe_member(&self, user_id: &str) -> Subscription<Vec<Conversation>> {
        let store = self.clone();
        let user = user_id.to_string();
        let filter_user = user.clone();

        Subscription::spawn(
            format!("conversations-of:{}", user),
            &self.feed,
            self.config.subscription_buffer,
            move |event| event.touches_member(&filter_user),
            move || {
                let store = store.clone();
                let user = user.clone();
                async move { store.list_for_member(&user).await }
            },
        )
    }

    /// Live query over a single conversation document
    pub fn subscribe_document(&self, id: &str) -> Subscription<Option<Conversation>> {
        let store = self.clone();
        let id = id.to_string();
        let filter_id = id.clone();

        Subscription::spawn(
            format!("conversation:{}", id),
            &self.feed,
            self.config.subscription_buffer,
            move |event| {
                matches!(event, StoreEvent::ConversationChanged { id, .. } if *id == filter_id)
            },
            move || {
                let store = store.clone();
                let id = id.clone();
                async move { store.get(&id).await }
            },
        )
    }
}

async fn write_members(
    txn: &DatabaseTransaction,
    conversation_id: &str,
    participants: &[String],
) -> Result<(), StoreError> {
    if participants.is_empty() {
        return Ok(());
    }

    let rows = participants
        .iter()
        .enumerate()
        .map(|(position, user_id)| conversation_members::ActiveModel {
            conversation_id: Set(conversation_id.to_string()),
            user_id: Set(user_id.clone()),
            position: Set(position as i32),
        });

    conversation_members::Entity::insert_many(rows)
        .exec_without_returning(txn)
        .await?;

    Ok(())
}

/// Document body as an active model. Leaves `id`, `created_at` and `version`
/// unset for the caller to decide.
fn to_active_model(
    conversation: &Conversation,
    updated_at: i64,
) -> Result<conversations::ActiveModel, StoreError> {
    Ok(conversations::ActiveModel {
        id: NotSet,
        participants_json: Set(serde_json::to_string(&conversation.participants)?),
        participant_names_json: Set(serde_json::to_string(&conversation.participant_names)?),
        participant_avatars_json: Set(serde_json::to_string(
            &conversation.participant_avatars,
        )?),
        last_message: Set(conversation.last_message.clone()),
        last_message_at: Set(conversation.last_message_at.map(|t| t.timestamp_millis())),
        last_message_sender_id: Set(conversation.last_message_sender_id.clone()),
        is_group: Set(conversation.is_group),
        group_name: Set(conversation.group_name.clone()),
        admin_id: Set(conversation.admin_id.clone()),
        version: Set(conversation.version),
        created_at: NotSet,
        updated_at: Set(updated_at),
    })
}

fn model_to_conversation(model: conversations::Model) -> Result<Conversation, StoreError> {
    Ok(Conversation {
        id: model.id,
        participants: serde_json::from_str(&model.participants_json)?,
        participant_names: serde_json::from_str(&model.participant_names_json)?,
        participant_avatars: serde_json::from_str(&model.participant_avatars_json)?,
        last_message: model.last_message,
        last_message_at: model.last_message_at.map(from_millis),
        last_message_sender_id: model.last_message_sender_id,
        is_group: model.is_group,
        group_name: model.group_name,
        admin_id: model.admin_id,
        version: model.version,
    })
}
