//! Huddle Chat - conversation and membership consistency engine
//!
//! Builds the chat rules on top of [`huddle_store`]:
//!
//! - **MembershipManager**: find-or-create 1:1 threads, create groups, and
//!   add/remove/leave/rename as single-document transactions
//! - **MessageStream**: send with best-effort preview update, live tail
//!   window, backward pages
//! - **Timeline** / **ScrollController** / **Composer**: client-side merge of
//!   tail and pages, scroll decisions, and the send-retry policy
//! - **ConversationList**: a user's conversations sorted by recency, plus a
//!   membership-gated watch on one conversation
//! - **UnreadTracker** / **UnreadBadge**: unread count derived from list snapshots
//! - **PendingOverlay**: optimistic membership changes until confirmed
//! - **ChatSession**: owns all of the above for one signed-in user
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use huddle_chat::{ChatConfig, ChatSession, UserIdentity};
//! use huddle_store::{DocumentDb, StoreConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = DocumentDb::open(StoreConfig::default()).await?;
//! let alice = UserIdentity::new("alice", "Alice");
//! let bob = UserIdentity::new("bob", "Bob");
//!
//! let session = ChatSession::start(&db, alice, ChatConfig::default(), true);
//! let conversation_id = session.open_direct(&bob).await?;
//! session
//!     .messages()
//!     .send(&conversation_id, "alice", "hi", None)
//!     .await?;
//! session.logout();
//! # Ok(())
//! # }
//! ```

pub mod composer;
pub mod config;
pub mod conversation_list;
mod error;
pub mod identity;
pub mod membership;
pub mod message_stream;
pub mod pending;
pub mod session;
pub mod timeline;
pub mod unread;
pub mod viewport;

pub use composer::{Composer, SendOutcome};
pub use config::ChatConfig;
pub use conversation_list::{
    sort_by_recency, ConversationList, ConversationListSubscription, ConversationView,
    ConversationWatch,
};
pub use error::{ChatError, Result};
pub use identity::UserIdentity;
pub use membership::MembershipManager;
pub use message_stream::{reply_snapshot, MessageStream};
pub use pending::{PendingChange, PendingId, PendingOverlay};
pub use session::ChatSession;
pub use timeline::{MergeOutcome, Timeline};
pub use unread::{badge_title, UnreadBadge, UnreadStatus, UnreadTracker};
pub use viewport::{ScrollAction, ScrollController, ViewportMetrics};
