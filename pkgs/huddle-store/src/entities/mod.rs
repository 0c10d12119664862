//! Sea-ORM entities for huddle-store

pub mod conversation_members;
pub mod conversations;
pub mod messages;

pub use conversation_members::Entity as ConversationMembers;
pub use conversations::Entity as Conversations;
pub use messages::Entity as Messages;
