use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::platform::{PlatformApi, PlatformRequest};
use super::{BackendClient, RawReply};
use crate::config::{AnalystConfig, BackendKind};
use crate::error::{BridgeError, Result};
use crate::models::{
    BackendRequest, ContentPart, ConversationMessage, MessageContent, Role, SessionConnection,
};

pub const ANALYST_MESSAGE_PATH: &str = "/api/v2/cortex/analyst/message";

/// Trailing "please use the generator repository" sentence the vendor appends
/// to error messages. Removed up to the end of its line only.
static VENDOR_BOILERPLATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\s*Please use https://github\.com/(?:Snowflake-Labs/semantic-model-generator|\.\.\.).*",
    )
    .expect("Invalid boilerplate regex")
});

/// Analyst service backend. Talks to the per-session host directly, or
/// through the platform gateway when running hosted.
pub struct AnalystBackend {
    client: Client,
    settings: AnalystConfig,
    platform: Option<Arc<dyn PlatformApi>>,
}

impl AnalystBackend {
    pub fn new(settings: AnalystConfig, platform: Option<Arc<dyn PlatformApi>>) -> Result<Self> {
        if settings.hosted && platform.is_none() {
            return Err(BridgeError::Config(
                "hosted analyst mode requires a platform request forwarder".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()
            .map_err(|e| BridgeError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            settings,
            platform,
        })
    }

    async fn send(
        &self,
        session: &SessionConnection,
        body: &AnalystRequest<'_>,
    ) -> Result<AnalystReply> {
        let (status, content) = match (&self.platform, self.settings.hosted) {
            (Some(platform), true) => self.send_hosted(platform.as_ref(), body).await?,
            _ => self.send_direct(session, body).await?,
        };
        interpret_response(status, &content)
    }

    async fn send_hosted(
        &self,
        platform: &dyn PlatformApi,
        body: &AnalystRequest<'_>,
    ) -> Result<(u16, String)> {
        tracing::debug!("Forwarding analyst request through platform gateway");
        let request = PlatformRequest {
            method: "POST".to_string(),
            path: ANALYST_MESSAGE_PATH.to_string(),
            headers: HashMap::new(),
            query: HashMap::new(),
            body: serde_json::to_value(body)?,
            timeout_ms: self.settings.platform_timeout_ms,
        };
        let response = platform.send_api_request(request).await?;
        Ok((response.status, response.content))
    }

    async fn send_direct(
        &self,
        session: &SessionConnection,
        body: &AnalystRequest<'_>,
    ) -> Result<(u16, String)> {
        let base = match &self.settings.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None if session.host.is_empty() => {
                return Err(BridgeError::Backend(
                    "session host is required for direct analyst calls".to_string(),
                ));
            }
            None => format!("https://{}", session.host),
        };
        let url = format!("{base}{ANALYST_MESSAGE_PATH}");
        tracing::debug!("Posting analyst request to {}", url);

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("{} Token=\"{}\"", self.settings.auth_scheme, session.token),
            )
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                BridgeError::Backend(format!("Failed to send request to analyst service: {e}"))
            })?;

        let status = response.status().as_u16();
        let content = response.text().await.map_err(|e| {
            BridgeError::Backend(format!("Failed to read analyst response: {e}"))
        })?;
        Ok((status, content))
    }
}

#[async_trait]
impl BackendClient for AnalystBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Analyst
    }

    async fn complete(
        &self,
        session: &SessionConnection,
        prompt: &str,
        _model: &str,
    ) -> Result<String> {
        let body = AnalystRequest {
            messages: vec![AnalystMessage {
                role: "user".to_string(),
                content: vec![ContentPart::text(prompt)],
            }],
            semantic_model: "",
        };
        let reply = self.send(session, &body).await?;
        Ok(reply
            .message
            .content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect())
    }

    async fn chat(
        &self,
        session: &SessionConnection,
        request: &BackendRequest,
    ) -> Result<RawReply> {
        tracing::info!(
            "Calling analyst service ({} mode)",
            if self.settings.hosted { "hosted" } else { "direct" }
        );
        let body = AnalystRequest {
            messages: to_analyst_messages(&request.history),
            semantic_model: &request.semantic_model,
        };
        Ok(RawReply::Analyst(self.send(session, &body).await?))
    }
}

/// The caller's history in the analyst's native shape: every turn as a list
/// of typed parts, assistant turns under the `analyst` role. The context
/// instruction is not included; the semantic model travels in its own field.
fn to_analyst_messages(history: &[ConversationMessage]) -> Vec<AnalystMessage> {
    history
        .iter()
        .map(|m| AnalystMessage {
            role: match &m.role {
                Role::Assistant => "analyst".to_string(),
                other => other.as_str().to_string(),
            },
            content: match &m.content {
                MessageContent::Text(text) => vec![ContentPart::text(text.clone())],
                MessageContent::Parts(parts) => parts.clone(),
            },
        })
        .collect()
}

fn interpret_response(status: u16, content: &str) -> Result<AnalystReply> {
    if status < 400 {
        return serde_json::from_str(content).map_err(|e| {
            BridgeError::Backend(format!("Failed to parse analyst response: {e}"))
        });
    }
    let message = error_message(content);
    tracing::error!(status, "analyst service call failed: {}", message);
    Err(BridgeError::Backend(message))
}

/// Prefer the body's `message` field, stripped of vendor boilerplate; fall
/// back to the raw body.
fn error_message(content: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(content) {
        Ok(body) => match body.get("message").and_then(|m| m.as_str()) {
            Some(message) => strip_vendor_boilerplate(message),
            None => body.to_string(),
        },
        Err(_) => content.to_string(),
    }
}

pub fn strip_vendor_boilerplate(message: &str) -> String {
    VENDOR_BOILERPLATE.replace(message, "").into_owned()
}

#[derive(Debug, Serialize)]
struct AnalystRequest<'a> {
    messages: Vec<AnalystMessage>,
    semantic_model: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct AnalystMessage {
    role: String,
    content: Vec<ContentPart>,
}

/// Native analyst reply. Its content parts are already canonical.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalystReply {
    pub message: AnalystReplyMessage,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub warnings: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalystReplyMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Vec<ContentPart>,
}
