use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// A request forwarded through the hosting platform's API gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub body: serde_json::Value,
    pub timeout_ms: u64,
}

/// Status and raw body as reported by the platform.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlatformResponse {
    pub status: u16,
    /// JSON document, as a string.
    pub content: String,
}

/// In-platform request forwarding, used by the analyst backend in hosted mode.
/// The platform attaches credentials itself.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn send_api_request(&self, request: PlatformRequest) -> Result<PlatformResponse>;
}

/// Forwards platform requests to a local gateway over HTTP.
pub struct GatewayForwarder {
    client: Client,
    base_url: String,
}

impl GatewayForwarder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PlatformApi for GatewayForwarder {
    async fn send_api_request(&self, request: PlatformRequest) -> Result<PlatformResponse> {
        let method = Method::from_bytes(request.method.as_bytes()).map_err(|e| {
            BridgeError::Backend(format!("Invalid platform method {}: {e}", request.method))
        })?;
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self
            .client
            .request(method, &url)
            .timeout(Duration::from_millis(request.timeout_ms))
            .json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        let response = builder.send().await.map_err(|e| {
            BridgeError::Backend(format!("Platform request to {} failed: {e}", request.path))
        })?;
        let status = response.status().as_u16();
        let content = response.text().await.map_err(|e| {
            BridgeError::Backend(format!("Failed to read platform response: {e}"))
        })?;

        tracing::debug!(status, path = %request.path, "platform request completed");
        Ok(PlatformResponse { status, content })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn request(body: serde_json::Value) -> PlatformRequest {
        PlatformRequest {
            method: "POST".to_string(),
            path: "/api/v2/cortex/analyst/message".to_string(),
            headers: HashMap::new(),
            query: HashMap::new(),
            body,
            timeout_ms: 30000,
        }
    }

    #[tokio::test]
    async fn forwards_body_and_reports_status_without_judging_it() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v2/cortex/analyst/message")
                    .json_body(json!({"messages": [], "semantic_model": "name: x"}));
                then.status(400).body(r#"{"message":"bad model"}"#);
            })
            .await;

        let forwarder = GatewayForwarder::new(format!("{}/", server.base_url()));
        let resp = forwarder
            .send_api_request(request(json!({"messages": [], "semantic_model": "name: x"})))
            .await
            .expect("transport should succeed even on error status");

        mock.assert_async().await;
        assert_eq!(resp.status, 400);
        assert_eq!(resp.content, r#"{"message":"bad model"}"#);
    }

    #[tokio::test]
    async fn rejects_invalid_method() {
        let forwarder = GatewayForwarder::new("http://127.0.0.1:9");
        let mut req = request(json!({}));
        req.method = "NOT A METHOD".to_string();
        let err = forwarder.send_api_request(req).await.unwrap_err();
        assert!(matches!(err, BridgeError::Backend(_)));
    }
}
