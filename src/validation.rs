//! Semantic model validation through a conversational backend.
//!
//! The chat backend is asked for a verdict which is reduced to pass/fail by
//! keyword matching. The analyst backend is probed with a fixed request
//! instead: if it accepts the model, the model is valid. Neither path parses
//! the YAML itself.

use std::sync::Arc;

use crate::config::BackendKind;
use crate::dispatch::Dispatcher;
use crate::error::{BridgeError, Result};
use crate::models::{ContentPart, ConversationMessage, MessageContent, SessionConnection};

/// Reply the backend is told to give for a correct model.
pub const PASS_TOKEN: &str = "验证通过";

/// Markers of a negative verdict. Matched as case-sensitive substrings.
pub const FAILURE_KEYWORDS: [&str; 8] = [
    "错误", "Error", "error", "错", "问题", "不正确", "invalid", "Invalid",
];

pub const PROBE_TEXT: &str = "SMG app validation";

pub fn validation_prompt(yaml: &str) -> String {
    format!(
        r#"Check whether the following semantic model in YAML format is correct:

```yaml
{yaml}
```

Check the following:
1. The YAML syntax is valid
2. Required fields are present (name, description, tables, ...)
3. Data types are reasonable
4. Expression syntax is correct

If you find errors, describe each one in detail. If the model is correct, reply with "{PASS_TOKEN}"."#
    )
}

/// Reduce a free-text verdict to pass/fail.
///
/// Fails only when a failure keyword is present and the pass token is absent.
pub fn judge_verdict(verdict: &str) -> Result<()> {
    let flagged = FAILURE_KEYWORDS.iter().any(|kw| verdict.contains(kw));
    if flagged && !verdict.contains(PASS_TOKEN) {
        return Err(BridgeError::Validation(verdict.to_string()));
    }
    Ok(())
}

pub struct Validator {
    dispatcher: Arc<Dispatcher>,
    model: String,
}

impl Validator {
    pub fn new(dispatcher: Arc<Dispatcher>, model: String) -> Self {
        Self { dispatcher, model }
    }

    pub async fn validate(&self, session: &SessionConnection, semantic_model: &str) -> Result<()> {
        tracing::info!(
            "Validating semantic model ({} bytes) with {} backend",
            semantic_model.len(),
            self.dispatcher.backend_kind()
        );
        let outcome = match self.dispatcher.backend_kind() {
            BackendKind::ChatLlm => self.ask_for_verdict(session, semantic_model).await,
            BackendKind::Analyst => self.probe(session, semantic_model).await,
        };
        match &outcome {
            Ok(()) => tracing::info!("Semantic model validation passed"),
            Err(e) => tracing::error!("Semantic model validation failed: {}", e),
        }
        outcome
    }

    async fn ask_for_verdict(&self, session: &SessionConnection, semantic_model: &str) -> Result<()> {
        let client = self.dispatcher.client()?;
        let verdict = client
            .complete(session, &validation_prompt(semantic_model), &self.model)
            .await
            .map_err(BridgeError::into_backend)?;
        judge_verdict(&verdict)
    }

    /// The analyst rejects invalid models with an error status; its message
    /// becomes the validation detail.
    async fn probe(&self, session: &SessionConnection, semantic_model: &str) -> Result<()> {
        let probe = [ConversationMessage::new(
            "user",
            MessageContent::Parts(vec![ContentPart::text(PROBE_TEXT)]),
        )];
        match self
            .dispatcher
            .send_message(session, semantic_model, &probe)
            .await
        {
            Ok(_) => Ok(()),
            Err(BridgeError::Backend(message)) => Err(BridgeError::Validation(message)),
            Err(e) => Err(e),
        }
    }
}
