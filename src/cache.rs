//! Short-lived reply cache keyed by a fingerprint of the request payload.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::Result;
use crate::models::{BackendReply, ConversationMessage};

/// Time source for cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic key for a `(semantic_model, messages)` pair.
///
/// Structurally equal inputs give equal keys. The session connection is not
/// part of the key.
pub fn fingerprint(semantic_model: &str, messages: &[ConversationMessage]) -> Result<String> {
    let payload = serde_json::to_vec(&(semantic_model, messages))?;
    Ok(hex::encode(Sha256::digest(&payload)))
}

/// Reply store consulted before every backend call.
///
/// Stores never fail the dispatch: a store that cannot be read behaves as a
/// miss, a failed write is skipped.
#[async_trait]
pub trait ReplyCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<BackendReply>;
    async fn put(&self, key: &str, reply: &BackendReply);
}

struct CacheEntry {
    reply: BackendReply,
    expires_at: DateTime<Utc>,
}

/// In-process store. Entries live for a fixed window from insertion.
pub struct MemoryReplyCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl MemoryReplyCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365)),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReplyCache for MemoryReplyCache {
    async fn get(&self, key: &str) -> Option<BackendReply> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = match entries.get(key) {
            Some(entry) if now < entry.expires_at => return Some(entry.reply.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        None
    }

    async fn put(&self, key: &str, reply: &BackendReply) {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, entry| now < entry.expires_at);
        entries.insert(
            key.to_string(),
            CacheEntry {
                reply: reply.clone(),
                expires_at: now + self.ttl,
            },
        );
    }
}

/// Manually advanced clock for expiry tests.
#[cfg(test)]
pub(crate) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new() -> Self {
        Self {
            now: Mutex::new(Utc::now()),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap();
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
