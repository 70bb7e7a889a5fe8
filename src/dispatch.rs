use once_cell::sync::OnceCell;
use std::sync::Arc;

use crate::backend::{AnalystBackend, BackendClient, DashScopeBackend, PlatformApi};
use crate::cache::{ReplyCache, fingerprint};
use crate::config::{BackendKind, Config};
use crate::context::build_request;
use crate::error::Result;
use crate::models::{BackendReply, ConversationMessage, SessionConnection};
use crate::translate::translate;

/// Process-wide backend clients, each built at most once on first use.
pub struct Backends {
    config: Arc<Config>,
    platform: Option<Arc<dyn PlatformApi>>,
    chat_llm: OnceCell<Arc<dyn BackendClient>>,
    analyst: OnceCell<Arc<dyn BackendClient>>,
}

impl Backends {
    pub fn new(config: Arc<Config>, platform: Option<Arc<dyn PlatformApi>>) -> Self {
        Self {
            config,
            platform,
            chat_llm: OnceCell::new(),
            analyst: OnceCell::new(),
        }
    }

    /// Install a ready-made client in the slot for its kind. A slot that is
    /// already filled keeps its client.
    pub fn with_client(self, client: Arc<dyn BackendClient>) -> Self {
        if self.slot(client.kind()).set(client).is_err() {
            tracing::warn!("Backend slot already initialised, keeping existing client");
        }
        self
    }

    pub fn get(&self, kind: BackendKind) -> Result<Arc<dyn BackendClient>> {
        self.slot(kind)
            .get_or_try_init(|| self.build(kind))
            .cloned()
    }

    fn slot(&self, kind: BackendKind) -> &OnceCell<Arc<dyn BackendClient>> {
        match kind {
            BackendKind::ChatLlm => &self.chat_llm,
            BackendKind::Analyst => &self.analyst,
        }
    }

    fn build(&self, kind: BackendKind) -> Result<Arc<dyn BackendClient>> {
        tracing::info!("Initialising {} backend client", kind);
        match kind {
            BackendKind::ChatLlm => Ok(Arc::new(DashScopeBackend::from_env(&self.config.chat_llm)?)),
            BackendKind::Analyst => Ok(Arc::new(AnalystBackend::new(
                self.config.analyst.clone(),
                self.platform.clone(),
            )?)),
        }
    }
}

/// Sends conversations to the selected backend, through the reply cache.
pub struct Dispatcher {
    backends: Arc<Backends>,
    cache: Arc<dyn ReplyCache>,
    backend: BackendKind,
    config: Arc<Config>,
}

impl Dispatcher {
    pub fn new(config: Arc<Config>, backends: Arc<Backends>, cache: Arc<dyn ReplyCache>) -> Self {
        Self {
            backend: config.dispatch.backend,
            backends,
            cache,
            config,
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend
    }

    pub fn client(&self) -> Result<Arc<dyn BackendClient>> {
        self.backends.get(self.backend)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Send a conversation grounded in `semantic_model` and return the
    /// canonical reply.
    ///
    /// Identical `(semantic_model, messages)` pairs within the cache window
    /// are answered from the cache without touching the backend. Concurrent
    /// identical misses are not coalesced. Any backend or translation failure
    /// surfaces as [`crate::error::BridgeError::Backend`].
    pub async fn send_message(
        &self,
        session: &SessionConnection,
        semantic_model: &str,
        messages: &[ConversationMessage],
    ) -> Result<BackendReply> {
        let key = fingerprint(semantic_model, messages)?;
        if let Some(reply) = self.cache.get(&key).await {
            tracing::debug!("Reply cache hit for {}", &key[..12]);
            return Ok(reply);
        }
        tracing::debug!("Reply cache miss for {}", &key[..12]);

        let client = self.client()?;
        let request = build_request(
            semantic_model,
            messages,
            self.config.chat_model_for(self.backend),
            &self.config.dispatch.response_language,
        );

        tracing::info!(
            "Dispatching {} messages to {} backend",
            request.messages.len(),
            self.backend
        );

        let reply = match client.chat(session, &request).await.and_then(translate) {
            Ok(reply) => reply,
            Err(e) => {
                let e = e.into_backend();
                tracing::error!("{} backend call failed: {}", self.backend, e);
                return Err(e);
            }
        };

        self.cache.put(&key, &reply).await;
        Ok(reply)
    }
}
