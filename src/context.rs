use crate::models::{BackendRequest, ChatMessage, ConversationMessage};
use crate::normalize::normalize;

/// Builds the system instruction grounding the assistant in a semantic model.
///
/// The model text is embedded verbatim in a fenced yaml block; it is never parsed.
pub fn context_message(semantic_model: &str, language: &str) -> ChatMessage {
    let content = format!(
        r#"You are a data analysis assistant that helps users analyze and query their data.

The current semantic data model is:
```yaml
{semantic_model}
```

Answer the user's questions based on this semantic model. For data questions:
1. Understand the business need behind the question
2. Ground your suggestions in the tables, fields and relationships of the semantic model
3. Provide example SQL queries where they help
4. Keep answers professional and accurate

Please answer in {language}."#
    );
    ChatMessage::new("system", content)
}

/// Context instruction first, then the normalized history. Caller-supplied
/// system messages are kept as they are.
pub fn build_messages(
    semantic_model: &str,
    messages: &[ConversationMessage],
    language: &str,
) -> Vec<ChatMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    out.push(context_message(semantic_model, language));
    out.extend(normalize(messages));
    out
}

pub fn build_request(
    semantic_model: &str,
    messages: &[ConversationMessage],
    model: &str,
    language: &str,
) -> BackendRequest {
    BackendRequest {
        messages: build_messages(semantic_model, messages, language),
        history: messages.to_vec(),
        semantic_model: semantic_model.to_string(),
        model: model.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = "name: orders\ntables:\n  - name: orders\n    base_table: {database: db}\n";

    #[test]
    fn embeds_model_verbatim_in_fenced_block() {
        let msg = context_message(MODEL, "English");
        assert_eq!(msg.role, "system");
        assert!(msg.content.contains(&format!("```yaml\n{MODEL}\n```")));
        assert!(msg.content.ends_with("Please answer in English."));
    }

    #[test]
    fn exactly_one_system_message_prepended() {
        let history = vec![
            ConversationMessage::new("system", "be terse"),
            ConversationMessage::new("user", "How many orders last month?"),
        ];
        let out = build_messages(MODEL, &history, "English");
        assert_eq!(out.len(), 3);
        assert!(out[0].content.contains(MODEL));
        // caller's own system message is not merged
        assert_eq!(out[1], ChatMessage::new("system", "be terse"));
        let injected = out
            .iter()
            .filter(|m| m.role == "system" && m.content.contains("```yaml"))
            .count();
        assert_eq!(injected, 1);
    }

    #[test]
    fn empty_history_still_gets_context() {
        let req = build_request(MODEL, &[], "qwen-plus", "Chinese");
        assert_eq!(req.messages.len(), 1);
        assert!(req.history.is_empty());
        assert_eq!(req.model, "qwen-plus");
        assert_eq!(req.semantic_model, MODEL);
    }
}
