use crate::backend::RawReply;
use crate::error::{BridgeError, Result};
use crate::models::BackendReply;

/// Map a backend's native reply onto the canonical reply shape.
///
/// Chat replies are wrapped as a single text part. Analyst replies already
/// carry canonical parts and are only unwrapped from their envelope.
pub fn translate(raw: RawReply) -> Result<BackendReply> {
    match raw {
        RawReply::ChatLlm(response) => {
            let choice = response.output.choices.into_iter().next().ok_or_else(|| {
                BridgeError::Backend("chat backend returned empty choices".to_string())
            })?;
            let request_id = response.request_id.unwrap_or_else(|| {
                let generated = uuid::Uuid::new_v4().to_string();
                tracing::debug!("chat reply has no request id, using {}", generated);
                generated
            });
            Ok(BackendReply::from_text(choice.message.content, request_id))
        }
        RawReply::Analyst(reply) => Ok(BackendReply {
            content: reply.message.content,
            request_id: reply.request_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AnalystReply, GenerationResponse};
    use crate::models::ContentPart;
    use serde_json::json;

    fn chat(value: serde_json::Value) -> RawReply {
        RawReply::ChatLlm(serde_json::from_value::<GenerationResponse>(value).unwrap())
    }

    #[test]
    fn chat_reply_becomes_single_text_part() {
        let reply = translate(chat(json!({
            "request_id": "r-1",
            "output": {"choices": [{"message": {"role": "assistant", "content": "42 orders"}}]}
        })))
        .unwrap();
        assert_eq!(reply, BackendReply::from_text("42 orders", "r-1"));
    }

    #[test]
    fn chat_reply_without_choices_is_a_backend_error() {
        let err = translate(chat(json!({"request_id": "r-2", "output": {"choices": []}})))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Backend(_)));
    }

    #[test]
    fn missing_request_id_is_generated() {
        let reply = translate(chat(json!({
            "output": {"choices": [{"message": {"role": "assistant", "content": "ok"}}]}
        })))
        .unwrap();
        assert!(uuid::Uuid::parse_str(&reply.request_id).is_ok());
    }

    #[test]
    fn analyst_reply_passes_parts_through() {
        let raw: AnalystReply = serde_json::from_value(json!({
            "message": {
                "role": "analyst",
                "content": [
                    {"type": "text", "text": "Interpretation"},
                    {"type": "suggestions", "suggestions": ["Top products?"]}
                ]
            },
            "request_id": "a-9"
        }))
        .unwrap();
        let reply = translate(RawReply::Analyst(raw)).unwrap();
        assert_eq!(reply.request_id, "a-9");
        assert_eq!(
            reply.content,
            vec![
                ContentPart::text("Interpretation"),
                ContentPart::Suggestions {
                    suggestions: vec!["Top products?".to_string()]
                }
            ]
        );
    }
}
