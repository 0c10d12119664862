//! Membership transactions over conversation documents
//!
//! Every mutating operation is a single read-validate-write transaction on
//! one conversation: the rule functions below receive the document as read
//! inside [`ConversationStore::run_transaction`] and return the next state or
//! a deterministic rejection. Rejections abort the transaction; write
//! conflicts re-run the rules against fresh data.

use huddle_store::{Conversation, ConversationStore};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, instrument};

use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::identity::UserIdentity;

/// Creates and mutates conversations on behalf of an authenticated caller
#[derive(Clone)]
pub struct MembershipManager {
    conversations: ConversationStore,
    config: ChatConfig,
}

impl MembershipManager {
    pub fn new(conversations: ConversationStore, config: ChatConfig) -> Self {
        Self {
            conversations,
            config,
        }
    }

    /// Return the existing 1:1 thread between `me` and `other`, or create one.
    ///
    /// The lookup and the create are separate steps. Two users contacting
    /// each other for the first time at the same moment can both miss the
    /// lookup and end up with two threads.
    #[instrument(skip(self, me, other), fields(user = %me.id, peer = %other.id))]
    pub async fn find_or_create_direct(
        &self,
        me: &UserIdentity,
        other: &UserIdentity,
    ) -> Result<String> {
        if me.id == other.id {
            return Err(ChatError::Validation(
                "Cannot start a conversation with yourself".to_string(),
            ));
        }

        let existing = self
            .conversations
            .list_for_member(&me.id)
            .await?
            .into_iter()
            .find(|c| !c.is_group && c.participants.len() == 2 && c.has_participant(&other.id));

        if let Some(conversation) = existing {
            debug!("Reusing direct conversation {}", conversation.id);
            return Ok(conversation.id);
        }

        let created = self
            .conversations
            .create(draft_conversation(&[me, other], None, None))
            .await?;

        info!("Direct conversation {} created", created.id);
        Ok(created.id)
    }

    /// Create a group with `creator` as admin and first participant
    #[instrument(skip(self, creator, members), fields(admin = %creator.id, size = members.len() + 1))]
    pub async fn create_group(
        &self,
        creator: &UserIdentity,
        members: &[UserIdentity],
        name: &str,
    ) -> Result<String> {
        let mut everyone = Vec::with_capacity(members.len() + 1);
        everyone.push(creator);
        everyone.extend(members.iter());

        if everyone.len() < self.config.min_group_size || everyone.len() > self.config.max_group_size {
            return Err(ChatError::Validation(format!(
                "A group needs between {} and {} members",
                self.config.min_group_size, self.config.max_group_size
            )));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = everyone.iter().find(|m| !seen.insert(m.id.as_str())) {
            return Err(ChatError::Validation(format!(
                "User {} is listed twice",
                dup.id
            )));
        }

        let name = normalize_group_name(name, self.config.group_name_max_chars)?;

        let created = self
            .conversations
            .create(draft_conversation(&everyone, Some(name), Some(creator.id.clone())))
            .await?;

        info!(
            "Group {} created by {} with {} participants",
            created.id,
            creator.id,
            created.participants.len()
        );
        Ok(created.id)
    }

    #[instrument(skip(self, new_member), fields(member = %new_member.id))]
    pub async fn add_member(
        &self,
        conversation_id: &str,
        admin_id: &str,
        new_member: &UserIdentity,
    ) -> Result<Conversation> {
        let max = self.config.max_group_size;
        let updated = self
            .conversations
            .run_transaction(conversation_id, |current| {
                apply_add_member(current, admin_id, new_member, max)
            })
            .await?;

        info!("{} added to group {}", new_member.id, conversation_id);
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn remove_member(
        &self,
        conversation_id: &str,
        admin_id: &str,
        target_id: &str,
    ) -> Result<Conversation> {
        if admin_id == target_id {
            return Err(ChatError::Validation(
                "The admin cannot remove themselves, leave the group instead".to_string(),
            ));
        }

        let updated = self
            .conversations
            .run_transaction(conversation_id, |current| {
                apply_remove_member(current, admin_id, target_id)
            })
            .await?;

        info!("{} removed from group {}", target_id, conversation_id);
        Ok(updated)
    }

    /// Leave a group. A departing admin hands over to whoever is first in
    /// the remaining participant list.
    #[instrument(skip(self))]
    pub async fn leave_group(&self, conversation_id: &str, user_id: &str) -> Result<Conversation> {
        let updated = self
            .conversations
            .run_transaction(conversation_id, |current| apply_leave(current, user_id))
            .await?;

        if updated.participants.is_empty() {
            info!("Group {} has no participants left", conversation_id);
        } else {
            info!("{} left group {}", user_id, conversation_id);
        }
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn rename_group(
        &self,
        conversation_id: &str,
        admin_id: &str,
        new_name: &str,
    ) -> Result<Conversation> {
        let name = normalize_group_name(new_name, self.config.group_name_max_chars)?;

        let updated = self
            .conversations
            .run_transaction(conversation_id, |current| {
                apply_rename(current, admin_id, &name)
            })
            .await?;

        info!("Group {} renamed", conversation_id);
        Ok(updated)
    }
}

fn draft_conversation(
    members: &[&UserIdentity],
    group_name: Option<String>,
    admin_id: Option<String>,
) -> Conversation {
    let mut participant_names = BTreeMap::new();
    let mut participant_avatars = BTreeMap::new();
    for member in members {
        participant_names.insert(member.id.clone(), member.display_name.clone());
        participant_avatars.insert(member.id.clone(), member.avatar_url.clone());
    }

    Conversation {
        id: String::new(),
        participants: members.iter().map(|m| m.id.clone()).collect(),
        participant_names,
        participant_avatars,
        last_message: String::new(),
        last_message_at: None,
        last_message_sender_id: None,
        is_group: group_name.is_some(),
        group_name,
        admin_id,
        version: 0,
    }
}

/// Trim and cap to `max_chars` characters; blank names are rejected
pub(crate) fn normalize_group_name(name: &str, max_chars: usize) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ChatError::Validation("Group name cannot be empty".to_string()));
    }
    Ok(trimmed.chars().take(max_chars).collect())
}

fn require_admin(current: &Conversation, caller: &str) -> Result<()> {
    if current.admin_id.as_deref() != Some(caller) {
        return Err(ChatError::Permission(format!(
            "{} is not the admin of {}",
            caller, current.id
        )));
    }
    Ok(())
}

pub(crate) fn without_participant(current: &Conversation, user_id: &str) -> Conversation {
    let mut next = current.clone();
    next.participants.retain(|p| p != user_id);
    next.participant_names.remove(user_id);
    next.participant_avatars.remove(user_id);
    next
}

pub(crate) fn apply_add_member(
    current: &Conversation,
    caller: &str,
    new_member: &UserIdentity,
    max_group_size: usize,
) -> Result<Conversation> {
    require_admin(current, caller)?;
    if !current.is_group {
        return Err(ChatError::NotGroup(current.id.clone()));
    }
    if current.participants.len() >= max_group_size {
        return Err(ChatError::Capacity {
            max: max_group_size,
        });
    }
    if current.has_participant(&new_member.id) {
        return Err(ChatError::DuplicateMember(new_member.id.clone()));
    }

    let mut next = current.clone();
    next.participants.push(new_member.id.clone());
    next.participant_names
        .insert(new_member.id.clone(), new_member.display_name.clone());
    next.participant_avatars
        .insert(new_member.id.clone(), new_member.avatar_url.clone());
    Ok(next)
}

pub(crate) fn apply_remove_member(
    current: &Conversation,
    caller: &str,
    target_id: &str,
) -> Result<Conversation> {
    require_admin(current, caller)?;
    if !current.has_participant(target_id) {
        return Err(ChatError::NotMember(target_id.to_string()));
    }
    Ok(without_participant(current, target_id))
}

pub(crate) fn apply_leave(current: &Conversation, user_id: &str) -> Result<Conversation> {
    if !current.is_group {
        return Err(ChatError::NotGroup(current.id.clone()));
    }
    if !current.has_participant(user_id) {
        return Err(ChatError::NotMember(user_id.to_string()));
    }

    let mut next = without_participant(current, user_id);
    if current.admin_id.as_deref() == Some(user_id) {
        next.admin_id = next.participants.first().cloned();
    }
    Ok(next)
}

pub(crate) fn apply_rename(current: &Conversation, caller: &str, name: &str) -> Result<Conversation> {
    require_admin(current, caller)?;
    if !current.is_group {
        return Err(ChatError::NotGroup(current.id.clone()));
    }

    let mut next = current.clone();
    next.group_name = Some(name.to_string());
    Ok(next)
}
