//! Optimistic local changes layered over authoritative snapshots
//!
//! A change is staged before its transaction runs and projected onto every
//! snapshot of its conversation. Once the transaction commits it is
//! confirmed with the resulting document version; the entry is dropped as
//! soon as a snapshot at or past that version arrives. A failed transaction
//! rolls the entry back.

use huddle_store::Conversation;

use crate::identity::UserIdentity;
use crate::membership::without_participant;

#[derive(Debug, Clone, PartialEq)]
pub enum PendingChange {
    AddMember(UserIdentity),
    RemoveMember(String),
    Leave(String),
    Rename(String),
}

impl PendingChange {
    fn project(&self, conversation: &mut Conversation) {
        match self {
            PendingChange::AddMember(member) => {
                if !conversation.has_participant(&member.id) {
                    conversation.participants.push(member.id.clone());
                    conversation
                        .participant_names
                        .insert(member.id.clone(), member.display_name.clone());
                    conversation
                        .participant_avatars
                        .insert(member.id.clone(), member.avatar_url.clone());
                }
            }
            PendingChange::RemoveMember(user_id) => {
                *conversation = without_participant(conversation, user_id);
            }
            PendingChange::Leave(user_id) => {
                let was_admin = conversation.admin_id.as_deref() == Some(user_id.as_str());
                *conversation = without_participant(conversation, user_id);
                if was_admin {
                    conversation.admin_id = conversation.participants.first().cloned();
                }
            }
            PendingChange::Rename(name) => {
                conversation.group_name = Some(name.clone());
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingId(u64);

#[derive(Debug, Clone)]
struct PendingEntry {
    id: PendingId,
    conversation_id: String,
    change: PendingChange,
    confirmed_at: Option<i64>,
}

#[derive(Debug, Default)]
pub struct PendingOverlay {
    next_id: u64,
    entries: Vec<PendingEntry>,
}

impl PendingOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&mut self, conversation_id: &str, change: PendingChange) -> PendingId {
        self.next_id += 1;
        let id = PendingId(self.next_id);
        self.entries.push(PendingEntry {
            id,
            conversation_id: conversation_id.to_string(),
            change,
            confirmed_at: None,
        });
        id
    }

    /// The change committed; the document is at `version` or later
    pub fn confirm(&mut self, id: PendingId, version: i64) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.confirmed_at = Some(version);
        }
    }

    /// The transaction failed; forget the change
    pub fn rollback(&mut self, id: PendingId) -> Option<PendingChange> {
        let index = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(index).change)
    }

    /// Drop confirmed entries that `snapshot` already reflects
    pub fn reconcile(&mut self, snapshot: &Conversation) {
        self.entries.retain(|e| {
            e.conversation_id != snapshot.id
                || e.confirmed_at.map_or(true, |version| snapshot.version < version)
        });
    }

    /// `snapshot` with every outstanding change for it applied, in staging order
    pub fn project(&self, snapshot: &Conversation) -> Conversation {
        let mut projected = snapshot.clone();
        for entry in self.entries.iter().filter(|e| e.conversation_id == snapshot.id) {
            let reflected = entry
                .confirmed_at
                .is_some_and(|version| snapshot.version >= version);
            if !reflected {
                entry.change.project(&mut projected);
            }
        }
        projected
    }

    pub fn outstanding(&self, conversation_id: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| e.conversation_id == conversation_id)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
