//! Chat message types (OpenAI-compatible role/content pairs).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RelayError, Result};

/// Speaker of one conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message in a conversation. Position in the sequence is its only identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Parse an inbound `messages` value into an ordered conversation.
///
/// Must be a non-empty array; every entry needs a known role and string content.
pub fn parse_conversation(value: &Value) -> Result<Vec<ConversationMessage>> {
    let Some(entries) = value.as_array() else {
        return Err(RelayError::InvalidRequest(
            "messages must be an array".to_string(),
        ));
    };
    if entries.is_empty() {
        return Err(RelayError::InvalidRequest(
            "messages must be non-empty".to_string(),
        ));
    }
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            serde_json::from_value::<ConversationMessage>(entry.clone()).map_err(|error| {
                RelayError::InvalidRequest(format!("messages[{index}] is invalid: {error}"))
            })
        })
        .collect()
}
