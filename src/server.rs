use axum::{
    Json, Router,
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::BridgeService;
use crate::error::BridgeError;
use crate::models::{BackendReply, ConversationMessage, SessionConnection};

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    #[serde(default)]
    pub connection: SessionConnection,
    pub semantic_model: String,
    pub messages: Vec<ConversationMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    #[serde(default)]
    pub connection: SessionConnection,
    pub semantic_model: String,
}

/// Error body: `{"error": <message>, "kind": <kind>}`. The message is meant
/// to be shown to the user as-is.
pub struct ApiError(BridgeError);

impl From<BridgeError> for ApiError {
    fn from(e: BridgeError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BridgeError::Backend(_) => StatusCode::BAD_GATEWAY,
            BridgeError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({"error": self.0.to_string(), "kind": self.0.kind()}));
        (status, body).into_response()
    }
}

pub fn router(service: Arc<BridgeService>, bearer_token: Option<String>) -> Router {
    let mut router = Router::new()
        .route("/v1/message", post(send_message))
        .route("/v1/validate", post(validate))
        .with_state(service);
    if let Some(expected) = bearer_token {
        router = router.layer(middleware::from_fn_with_state(
            Arc::new(expected),
            require_bearer,
        ));
    }
    // Added after the auth layer so health checks stay open
    router.route("/health", get(|| async { "ok" }))
}

async fn send_message(
    State(service): State<Arc<BridgeService>>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<BackendReply>, ApiError> {
    let reply = service
        .send_message(&req.connection, &req.semantic_model, &req.messages)
        .await?;
    Ok(Json(reply))
}

async fn validate(
    State(service): State<Arc<BridgeService>>,
    Json(req): Json<ValidateRequest>,
) -> Result<StatusCode, ApiError> {
    service
        .validate(&req.semantic_model, &req.connection)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Accepts `Authorization: Bearer <token>` or an `access_token`/`token`
/// query parameter for clients that cannot set headers.
async fn require_bearer(State(expected): State<Arc<String>>, req: Request, next: Next) -> Response {
    let header_ok = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|v| v.strip_prefix("Bearer ") == Some(expected.as_str()));
    let query_ok = req.uri().query().is_some_and(|q| {
        q.split('&').filter_map(|pair| pair.split_once('=')).any(|(k, v)| {
            (k == "access_token" || k == "token") && v == expected.as_str()
        })
    });
    if header_ok || query_ok {
        return next.run(req).await;
    }
    (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GenerationResponse, MockBackendClient, RawReply};
    use crate::cache::MemoryReplyCache;
    use crate::config::{BackendKind, Config};
    use crate::dispatch::{Backends, Dispatcher};
    use axum::body::{Body, to_bytes};
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    fn app(mock: MockBackendClient, token: Option<&str>) -> Router {
        let config = Arc::new(Config::default());
        let backends = Arc::new(Backends::new(config.clone(), None).with_client(Arc::new(mock)));
        let cache = Arc::new(MemoryReplyCache::new(config.cache_ttl()));
        let dispatcher = Arc::new(Dispatcher::new(config, backends, cache));
        router(
            Arc::new(BridgeService::from_dispatcher(dispatcher)),
            token.map(str::to_string),
        )
    }

    fn mock_with_kind() -> MockBackendClient {
        let mut mock = MockBackendClient::new();
        mock.expect_kind().return_const(BackendKind::ChatLlm);
        mock
    }

    fn post_json(uri: &str, body: serde_json::Value) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, "Bearer secret")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn message_route_returns_canonical_reply() {
        let mut mock = mock_with_kind();
        mock.expect_chat().times(1).returning(|_, _| {
            let response: GenerationResponse = serde_json::from_value(json!({
                "request_id": "req-1",
                "output": {"choices": [{"message": {"role": "assistant", "content": "1,204"}}]}
            }))
            .unwrap();
            Ok(RawReply::ChatLlm(response))
        });

        let resp = app(mock, Some("secret"))
            .oneshot(post_json(
                "/v1/message",
                json!({
                    "connection": {"host": "acct.example.com", "token": "t"},
                    "semantic_model": "name: orders",
                    "messages": [{"role": "user", "content": "How many orders last month?"}]
                }),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            json!({"content": [{"type": "text", "text": "1,204"}], "requestId": "req-1"})
        );
    }

    #[tokio::test]
    async fn backend_error_maps_to_bad_gateway() {
        let mut mock = mock_with_kind();
        mock.expect_chat()
            .returning(|_, _| Err(BridgeError::Backend("Forbidden.".to_string())));

        let resp = app(mock, None)
            .oneshot(post_json(
                "/v1/message",
                json!({"semantic_model": "name: x", "messages": []}),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            body_json(resp).await,
            json!({"error": "Forbidden.", "kind": "backend"})
        );
    }

    #[tokio::test]
    async fn validate_route_reports_failures() {
        let mut mock = mock_with_kind();
        mock.expect_complete()
            .returning(|_, _, _| Ok("invalid: missing tables".to_string()));

        let resp = app(mock, None)
            .oneshot(post_json("/v1/validate", json!({"semantic_model": "name: x"})))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(resp).await["kind"], "validation");
    }

    #[tokio::test]
    async fn validate_route_accepts_valid_model() {
        let mut mock = mock_with_kind();
        mock.expect_complete()
            .returning(|_, _, _| Ok(crate::validation::PASS_TOKEN.to_string()));

        let resp = app(mock, None)
            .oneshot(post_json("/v1/validate", json!({"semantic_model": "name: x"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn bearer_token_is_enforced_except_for_health() {
        let router = app(mock_with_kind(), Some("secret"));

        let unauthorized = router
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/v1/validate")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"semantic_model":"x"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

        let health = router
            .oneshot(HttpRequest::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);
    }
}
