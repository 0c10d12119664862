//! Huddle Store - conversation documents with live queries
//!
//! This crate provides the document layer the chat engine runs on: SQLite via
//! Sea-ORM, modelled after a hosted real-time document store.
//!
//! # Architecture
//!
//! - **ConversationStore**: versioned conversation documents, a membership
//!   index for "conversations containing user X", and an optimistic
//!   read-validate-write transaction with automatic retry on conflict
//! - **MessageStore**: append-only per-conversation message collections with
//!   tail and backward (cursor) queries
//! - **ChangeFeed**: in-process broadcast of committed writes
//! - **Subscription**: live query handle; every item is a full snapshot
//! - **ServerClock**: strictly increasing server timestamps
//!
//! # Database Schema
//!
//! - `conversations`: document body, `version` write counter
//! - `conversation_members`: (conversation, user) index rows
//! - `messages`: message body, server timestamp, reply snapshot
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use huddle_store::{DocumentDb, NewMessage, StoreConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = DocumentDb::open(StoreConfig {
//!     db_path: "huddle.db".into(),
//!     ..Default::default()
//! })
//! .await?;
//!
//! let mut tail = db.messages().subscribe_tail("some-conversation", 30);
//! db.messages()
//!     .append(
//!         "some-conversation",
//!         NewMessage {
//!             sender_id: "alice".to_string(),
//!             text: "hi".to_string(),
//!             reply_to: None,
//!         },
//!     )
//!     .await?;
//! let window = tail.next().await;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod conversation_store;
pub mod entities;
mod error;
pub mod events;
pub mod message_store;
pub mod migration;
pub mod subscription;

pub use clock::ServerClock;
pub use conversation_store::{Conversation, ConversationStore};
pub use error::StoreError;
pub use events::{ChangeFeed, StoreEvent};
pub use message_store::{Message, MessageCursor, MessageStore, NewMessage, ReplyTo};
pub use subscription::Subscription;

use sea_orm::{Database, DatabaseConnection, EntityTrait, QueryOrder};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use tracing::info;

use crate::entities::{conversations, messages};

/// Configuration for the document store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    pub db_path: std::path::PathBuf,

    /// Attempts a conversation transaction gets before failing as transient (default: 5)
    pub max_transaction_attempts: u32,

    /// Snapshots buffered per subscription before the query task waits (default: 32)
    pub subscription_buffer: usize,

    /// Committed writes buffered in the change feed before slow subscribers lag (default: 256)
    pub change_feed_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: std::path::PathBuf::from("huddle-store.db"),
            max_transaction_attempts: 5,
            subscription_buffer: 32,
            change_feed_capacity: 256,
        }
    }
}

/// Shared handle over one database: connection, change feed and clock
#[derive(Clone)]
pub struct DocumentDb {
    db: DatabaseConnection,
    feed: ChangeFeed,
    clock: Arc<ServerClock>,
    config: StoreConfig,
}

impl DocumentDb {
    /// Open (creating if needed) the database at `config.db_path` and run migrations
    pub async fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let db_path_str = config
            .db_path
            .to_str()
            .ok_or_else(|| StoreError::InvalidPath(config.db_path.clone()))?
            .replace("\\", "/");

        let db_url = format!("sqlite:{}?mode=rwc", db_path_str);
        let db: DatabaseConnection = Database::connect(db_url.as_str()).await?;

        crate::migration::Migrator::up(&db, None).await?;

        info!("Document store initialized at {}", config.db_path.display());

        Self::with_connection(db, config).await
    }

    /// Wrap an already-migrated connection
    pub async fn with_connection(
        db: DatabaseConnection,
        config: StoreConfig,
    ) -> Result<Self, StoreError> {
        let clock = Arc::new(ServerClock::starting_after(latest_timestamp(&db).await?));

        Ok(Self {
            feed: ChangeFeed::new(config.change_feed_capacity),
            db,
            clock,
            config,
        })
    }

    pub fn conversations(&self) -> ConversationStore {
        ConversationStore::new(
            self.db.clone(),
            self.feed.clone(),
            self.clock.clone(),
            self.config.clone(),
        )
    }

    pub fn messages(&self) -> MessageStore {
        MessageStore::new(
            self.db.clone(),
            self.feed.clone(),
            self.clock.clone(),
            self.config.clone(),
        )
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub fn clock(&self) -> &ServerClock {
        &self.clock
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

/// Highest timestamp already persisted, so a restarted clock stays monotonic
async fn latest_timestamp(db: &DatabaseConnection) -> Result<i64, StoreError> {
    let newest_message = messages::Entity::find()
        .order_by_desc(messages::Column::CreatedAt)
        .one(db)
        .await?
        .map(|m| m.created_at)
        .unwrap_or(0);

    let newest_summary = conversations::Entity::find()
        .order_by_desc(conversations::Column::LastMessageAt)
        .one(db)
        .await?
        .and_then(|c| c.last_message_at)
        .unwrap_or(0);

    Ok(newest_message.max(newest_summary))
}
