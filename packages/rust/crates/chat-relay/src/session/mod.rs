//! Conversation model shared by the relay backends.

mod message;

pub use message::{ConversationMessage, Role, parse_conversation};
