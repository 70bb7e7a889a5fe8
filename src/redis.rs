use async_trait::async_trait;
use deadpool::managed::QueueMode;
use deadpool_redis::{Config as DeadpoolConfig, Pool, PoolConfig, Runtime, Timeouts};
use redis::AsyncCommands;
use std::time::Duration;

use crate::cache::ReplyCache;
use crate::config::RedisConfig;
use crate::error::{BridgeError, Result};
use crate::models::BackendReply;

/// Reply store shared across processes. Expiry is left to Redis (`SET EX`).
#[derive(Clone)]
pub struct RedisReplyCache {
    pool: Pool,
    key_prefix: String,
    ttl_seconds: u64,
}

impl RedisReplyCache {
    pub async fn new_with_config(config: &RedisConfig, ttl: Duration) -> Result<Self> {
        tracing::info!("Connecting reply cache to Redis at {}", redact_url(&config.url));

        let timeout = Duration::from_secs(config.timeout_seconds);
        let mut cfg = DeadpoolConfig::from_url(&config.url);
        cfg.pool = Some(PoolConfig {
            max_size: config.pool_size,
            timeouts: Timeouts {
                wait: Some(timeout),
                create: Some(timeout),
                recycle: Some(timeout),
            },
            queue_mode: QueueMode::Fifo,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| BridgeError::PoolCreation(e.to_string()))?;

        // Test the connection
        let mut conn = pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        tracing::info!("Redis connection established");

        Ok(Self {
            pool,
            key_prefix: config.key_prefix.clone(),
            ttl_seconds: ttl.as_secs().max(1),
        })
    }

    fn key(&self, fingerprint: &str) -> String {
        format!("{}:{}", self.key_prefix, fingerprint)
    }

    async fn try_get(&self, fingerprint: &str) -> Result<Option<BackendReply>> {
        let mut conn = self.pool.get().await?;
        let raw: Option<String> = conn.get(self.key(fingerprint)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn try_put(&self, fingerprint: &str, reply: &BackendReply) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let json = serde_json::to_string(reply)?;
        conn.set_ex::<_, _, ()>(self.key(fingerprint), json, self.ttl_seconds)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ReplyCache for RedisReplyCache {
    async fn get(&self, key: &str) -> Option<BackendReply> {
        match self.try_get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!("Failed to read cached reply: {}", e);
                None
            }
        }
    }

    async fn put(&self, key: &str, reply: &BackendReply) {
        if let Err(e) = self.try_put(key, reply).await {
            tracing::warn!("Failed to cache reply: {}", e);
        }
    }
}

/// Hide the password part of a Redis URL for logging.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
