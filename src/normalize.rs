//! Flattens caller message history into role/text pairs for chat backends.

use crate::models::{ChatMessage, ContentPart, ConversationMessage, MessageContent};

/// Normalize a conversation into flat chat messages.
///
/// Output has exactly one entry per input message, in order. Empty text is
/// emitted as-is rather than dropped.
pub fn normalize(messages: &[ConversationMessage]) -> Vec<ChatMessage> {
    messages.iter().map(normalize_message).collect()
}

pub fn normalize_message(message: &ConversationMessage) -> ChatMessage {
    ChatMessage {
        // `analyst` was folded into `Role::Assistant` when the message was parsed
        role: message.role.as_str().to_string(),
        content: flatten_content(&message.content),
    }
}

/// Plain strings pass through; part lists keep only `text` parts, concatenated.
pub fn flatten_content(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect(),
    }
}
