pub mod backend;
pub mod cache;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod normalize;
pub mod redis;
pub mod server;
pub mod translate;
pub mod validation;

use std::sync::Arc;

use crate::backend::{GatewayForwarder, PlatformApi};
use crate::cache::{MemoryReplyCache, ReplyCache};
use crate::config::{CacheStore, Config};
use crate::dispatch::{Backends, Dispatcher};
use crate::error::Result;
use crate::models::{BackendReply, ConversationMessage, SessionConnection};
use crate::redis::RedisReplyCache;
use crate::validation::Validator;

/// Entry point used by the UI layer: conversations and model validation.
pub struct BridgeService {
    dispatcher: Arc<Dispatcher>,
    validator: Validator,
}

impl BridgeService {
    pub async fn new(cfg: Arc<Config>) -> Result<Self> {
        let platform = cfg.analyst.hosted.then(|| {
            Arc::new(GatewayForwarder::new(cfg.analyst.platform_gateway_url.clone()))
                as Arc<dyn PlatformApi>
        });
        let backends = Arc::new(Backends::new(Arc::clone(&cfg), platform));
        let cache = Self::reply_cache(&cfg).await;
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&cfg), backends, cache));
        Ok(Self::from_dispatcher(dispatcher))
    }

    pub fn from_dispatcher(dispatcher: Arc<Dispatcher>) -> Self {
        let validator = Validator::new(
            Arc::clone(&dispatcher),
            dispatcher.config().chat_llm.validation_model.clone(),
        );
        Self {
            dispatcher,
            validator,
        }
    }

    async fn reply_cache(cfg: &Config) -> Arc<dyn ReplyCache> {
        match cfg.dispatch.cache_store {
            CacheStore::Memory => Arc::new(MemoryReplyCache::new(cfg.cache_ttl())),
            CacheStore::Redis => {
                match RedisReplyCache::new_with_config(&cfg.redis, cfg.cache_ttl()).await {
                    Ok(cache) => Arc::new(cache),
                    Err(e) => {
                        tracing::warn!(
                            "Redis reply cache unavailable ({}), falling back to in-memory cache",
                            e
                        );
                        Arc::new(MemoryReplyCache::new(cfg.cache_ttl()))
                    }
                }
            }
        }
    }

    pub async fn send_message(
        &self,
        session: &SessionConnection,
        semantic_model: &str,
        messages: &[ConversationMessage],
    ) -> Result<BackendReply> {
        self.dispatcher
            .send_message(session, semantic_model, messages)
            .await
    }

    pub async fn validate(&self, yaml: &str, session: &SessionConnection) -> Result<()> {
        self.validator.validate(session, yaml).await
    }
}
