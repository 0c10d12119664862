//! Per-login session scope
//!
//! Everything tied to the signed-in user lives here: the unread tracker and
//! its seen-time cache, the pending overlay, and the handles used to act on
//! the user's behalf. `start` on login, `logout` to stop the unread badge.
//! List, tail and watch subscriptions handed out by the session belong to the
//! caller and are dropped by it.

use huddle_store::{Conversation, DocumentDb};
use parking_lot::Mutex;
use std::future::Future;
use tracing::info;

use crate::config::ChatConfig;
use crate::conversation_list::{ConversationList, ConversationListSubscription};
use crate::error::Result;
use crate::identity::UserIdentity;
use crate::membership::{normalize_group_name, MembershipManager};
use crate::message_stream::MessageStream;
use crate::pending::{PendingChange, PendingOverlay};
use crate::unread::UnreadBadge;

pub struct ChatSession {
    identity: UserIdentity,
    membership: MembershipManager,
    stream: MessageStream,
    list: ConversationList,
    unread: UnreadBadge,
    pending: Mutex<PendingOverlay>,
}

impl ChatSession {
    /// Start a session for `identity`; `foreground` is the host surface's current visibility
    pub fn start(db: &DocumentDb, identity: UserIdentity, config: ChatConfig, foreground: bool) -> Self {
        let conversations = db.conversations();
        let list = ConversationList::new(conversations.clone());
        let unread = UnreadBadge::spawn(
            &identity.id,
            conversations.subscribe_member(&identity.id),
            foreground,
        );

        info!("Chat session started for {}", identity.id);

        Self {
            membership: MembershipManager::new(conversations.clone(), config.clone()),
            stream: MessageStream::new(db.messages(), conversations, config),
            list,
            unread,
            pending: Mutex::new(PendingOverlay::new()),
            identity,
        }
    }

    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    pub fn membership(&self) -> &MembershipManager {
        &self.membership
    }

    pub fn messages(&self) -> &MessageStream {
        &self.stream
    }

    pub fn conversation_list(&self) -> &ConversationList {
        &self.list
    }

    /// The signed-in user's conversations, newest first
    pub fn subscribe_conversations(&self) -> ConversationListSubscription {
        self.list.subscribe(&self.identity.id)
    }

    pub fn unread(&self) -> &UnreadBadge {
        &self.unread
    }

    pub fn set_foreground(&self, foreground: bool) {
        self.unread.set_foreground(foreground);
    }

    pub async fn open_direct(&self, other: &UserIdentity) -> Result<String> {
        self.membership
            .find_or_create_direct(&self.identity, other)
            .await
    }

    pub async fn create_group(&self, members: &[UserIdentity], name: &str) -> Result<String> {
        self.membership
            .create_group(&self.identity, members, name)
            .await
    }

    pub async fn add_member(&self, conversation_id: &str, member: &UserIdentity) -> Result<Conversation> {
        self.optimistic(conversation_id, PendingChange::AddMember(member.clone()), || {
            self.membership
                .add_member(conversation_id, &self.identity.id, member)
        })
        .await
    }

    pub async fn remove_member(&self, conversation_id: &str, target_id: &str) -> Result<Conversation> {
        self.optimistic(conversation_id, PendingChange::RemoveMember(target_id.to_string()), || {
            self.membership
                .remove_member(conversation_id, &self.identity.id, target_id)
        })
        .await
    }

    pub async fn leave_group(&self, conversation_id: &str) -> Result<Conversation> {
        self.optimistic(conversation_id, PendingChange::Leave(self.identity.id.clone()), || {
            self.membership
                .leave_group(conversation_id, &self.identity.id)
        })
        .await
    }

    pub async fn rename_group(&self, conversation_id: &str, new_name: &str) -> Result<Conversation> {
        let staged = normalize_group_name(new_name, self.stream.config().group_name_max_chars)?;
        self.optimistic(conversation_id, PendingChange::Rename(staged), || {
            self.membership
                .rename_group(conversation_id, &self.identity.id, new_name)
        })
        .await
    }

    /// Authoritative snapshot with this session's outstanding changes applied
    pub fn project(&self, snapshot: &Conversation) -> Conversation {
        let mut pending = self.pending.lock();
        pending.reconcile(snapshot);
        pending.project(snapshot)
    }

    pub fn pending_changes(&self, conversation_id: &str) -> usize {
        self.pending.lock().outstanding(conversation_id)
    }

    /// Stop the session's unread subscription and drop the seen-time cache
    pub fn logout(self) {
        let user = self.identity.id.clone();
        self.unread.stop();
        info!("Chat session for {} ended", user);
    }

    async fn optimistic<F, Fut>(
        &self,
        conversation_id: &str,
        change: PendingChange,
        commit: F,
    ) -> Result<Conversation>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Conversation>>,
    {
        let id = self.pending.lock().stage(conversation_id, change);

        match commit().await {
            Ok(updated) => {
                self.pending.lock().confirm(id, updated.version);
                Ok(updated)
            }
            Err(e) => {
                self.pending.lock().rollback(id);
                Err(e)
            }
        }
    }
}
