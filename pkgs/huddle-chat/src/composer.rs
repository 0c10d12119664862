//! Message composer with the keep-draft-on-failure send policy

use huddle_store::{Message, ReplyTo};
use tracing::error;

use crate::error::ChatError;
use crate::message_stream::MessageStream;

#[derive(Debug)]
pub enum SendOutcome {
    /// Draft was blank or a send is already in flight
    Ignored,
    Sent(Message),
    /// Draft and reply target are kept so the user can retry
    Failed(ChatError),
}

/// Draft state for one conversation's input box
#[derive(Debug, Default)]
pub struct Composer {
    conversation_id: String,
    draft: String,
    reply_to: Option<ReplyTo>,
    sending: bool,
}

impl Composer {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            ..Default::default()
        }
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_reply_to(&mut self, reply_to: ReplyTo) {
        self.reply_to = Some(reply_to);
    }

    pub fn cancel_reply(&mut self) {
        self.reply_to = None;
    }

    pub fn reply_to(&self) -> Option<&ReplyTo> {
        self.reply_to.as_ref()
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    /// Send the trimmed draft. Clears the draft and reply target on success only.
    pub async fn submit(&mut self, stream: &MessageStream, sender_id: &str) -> SendOutcome {
        let text = self.draft.trim().to_string();
        if text.is_empty() || self.sending {
            return SendOutcome::Ignored;
        }

        self.sending = true;
        let result = stream
            .send(&self.conversation_id, sender_id, &text, self.reply_to.clone())
            .await;
        self.sending = false;

        match result {
            Ok(message) => {
                self.draft.clear();
                self.reply_to = None;
                SendOutcome::Sent(message)
            }
            Err(e) => {
                error!("Send error in {}: {}", self.conversation_id, e);
                SendOutcome::Failed(e)
            }
        }
    }
}
