use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{BackendClient, RawReply};
use crate::config::{BackendKind, ChatLlmConfig};
use crate::error::{BridgeError, Result};
use crate::models::{BackendRequest, ChatMessage, SessionConnection};

/// Chat-LLM backend speaking the DashScope text-generation protocol.
pub struct DashScopeBackend {
    client: Client,
    api_key: String,
    settings: ChatLlmConfig,
}

impl DashScopeBackend {
    pub fn new(api_key: String, settings: &ChatLlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()
            .map_err(|e| BridgeError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            settings: settings.clone(),
        })
    }

    /// Reads the API key from the environment variable named in the settings.
    pub fn from_env(settings: &ChatLlmConfig) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                BridgeError::Config(format!(
                    "chat backend API key is required: set the {} environment variable",
                    settings.api_key_env
                ))
            })?;
        Self::new(api_key, settings)
    }

    async fn generate(&self, body: &GenerationRequest<'_>) -> Result<GenerationResponse> {
        let response = self
            .client
            .post(&self.settings.base_url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                BridgeError::Backend(format!("Failed to send request to chat backend: {e}"))
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            BridgeError::Backend(format!("Failed to read chat backend response: {e}"))
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .ok()
                .and_then(|body| body.message)
                .unwrap_or(text);
            tracing::error!(
                status = status.as_u16(),
                model = body.model,
                "chat backend call failed: {}",
                message
            );
            return Err(BridgeError::Backend(format!(
                "chat backend call failed with status {}: {}",
                status.as_u16(),
                message
            )));
        }

        serde_json::from_str(&text).map_err(|e| {
            BridgeError::Backend(format!("Failed to parse chat backend response: {e}"))
        })
    }
}

#[async_trait]
impl BackendClient for DashScopeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::ChatLlm
    }

    async fn complete(
        &self,
        _session: &SessionConnection,
        prompt: &str,
        model: &str,
    ) -> Result<String> {
        tracing::info!("Calling chat backend completion with model {}", model);
        let body = GenerationRequest {
            model,
            input: GenerationInput {
                messages: None,
                prompt: Some(prompt),
            },
            parameters: GenerationParameters {
                max_tokens: self.settings.complete_max_tokens,
                temperature: self.settings.temperature,
                top_p: self.settings.top_p,
                result_format: None,
            },
        };
        let response = self.generate(&body).await?;

        response
            .output
            .text
            .or_else(|| {
                response
                    .output
                    .choices
                    .into_iter()
                    .next()
                    .map(|choice| choice.message.content)
            })
            .map(|text| text.trim().to_string())
            .ok_or_else(|| {
                BridgeError::Backend("chat backend returned no completion text".to_string())
            })
    }

    async fn chat(
        &self,
        _session: &SessionConnection,
        request: &BackendRequest,
    ) -> Result<RawReply> {
        tracing::info!(
            "Calling chat backend with model {} ({} messages)",
            request.model,
            request.messages.len()
        );
        let body = GenerationRequest {
            model: &request.model,
            input: GenerationInput {
                messages: Some(&request.messages),
                prompt: None,
            },
            parameters: GenerationParameters {
                max_tokens: self.settings.chat_max_tokens,
                temperature: self.settings.temperature,
                top_p: self.settings.top_p,
                result_format: Some("message"),
            },
        };
        Ok(RawReply::ChatLlm(self.generate(&body).await?))
    }
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    input: GenerationInput<'a>,
    parameters: GenerationParameters<'a>,
}

#[derive(Debug, Serialize)]
struct GenerationInput<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    messages: Option<&'a [ChatMessage]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct GenerationParameters<'a> {
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    result_format: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

/// Native text-generation reply.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationResponse {
    #[serde(default)]
    pub request_id: Option<String>,
    pub output: GenerationOutput,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationOutput {
    /// Present for the plain text result format.
    #[serde(default)]
    pub text: Option<String>,
    /// Present for the message result format.
    #[serde(default)]
    pub choices: Vec<GenerationChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationChoice {
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}
