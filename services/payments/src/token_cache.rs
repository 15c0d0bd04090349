//! Bearer token caches for the gateway client
//!
//! Entries are keyed by a fingerprint of the consumer credentials, so one
//! process can serve several paybills. Two callers missing at the same time
//! both fetch a token and the last write wins; either token is valid.

use async_trait::async_trait;
use common::cache::RedisPool;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::warn;

#[async_trait]
pub trait TokenCache: Send + Sync {
    async fn get(&self, fingerprint: &str) -> Option<String>;

    async fn put(&self, fingerprint: &str, token: &str, ttl: Duration);
}

/// SHA-256 of `key:secret`, hex encoded. The raw credentials never become
/// cache keys.
pub fn credential_fingerprint(consumer_key: &str, consumer_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(consumer_key.as_bytes());
    hasher.update(b":");
    hasher.update(consumer_secret.as_bytes());
    hex::encode(hasher.finalize())
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Process-local token cache
#[derive(Clone, Default)]
pub struct MemoryTokenCache {
    entries: Arc<RwLock<HashMap<String, CachedToken>>>,
}

impl MemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenCache for MemoryTokenCache {
    async fn get(&self, fingerprint: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries
            .get(fingerprint)
            .filter(|cached| cached.expires_at > Instant::now())
            .map(|cached| cached.token.clone())
    }

    async fn put(&self, fingerprint: &str, token: &str, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, cached| cached.expires_at > Instant::now());
        entries.insert(
            fingerprint.to_string(),
            CachedToken {
                token: token.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

/// Token cache shared through Redis by every payments instance
#[derive(Clone)]
pub struct RedisTokenCache {
    pool: RedisPool,
}

impl RedisTokenCache {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    fn key(fingerprint: &str) -> String {
        format!("mpesa:token:{}", fingerprint)
    }
}

#[async_trait]
impl TokenCache for RedisTokenCache {
    async fn get(&self, fingerprint: &str) -> Option<String> {
        match self.pool.get(&Self::key(fingerprint)).await {
            Ok(token) => token,
            Err(e) => {
                warn!("Token cache read failed, fetching a new token: {}", e);
                None
            }
        }
    }

    async fn put(&self, fingerprint: &str, token: &str, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        if let Err(e) = self
            .pool
            .set_expiring(&Self::key(fingerprint), token, ttl)
            .await
        {
            warn!("Token cache write failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_hides_and_separates_credentials() {
        let a = credential_fingerprint("key", "secret");
        assert_eq!(a.len(), 64);
        assert!(!a.contains("secret"));
        assert_ne!(a, credential_fingerprint("keys", "ecret"));
        assert_eq!(a, credential_fingerprint("key", "secret"));
    }

    #[tokio::test]
    async fn memory_cache_honours_ttl() {
        let cache = MemoryTokenCache::new();
        cache.put("fp", "token-1", Duration::from_secs(60)).await;
        cache.put("stale", "token-0", Duration::ZERO).await;

        assert_eq!(cache.get("fp").await.as_deref(), Some("token-1"));
        assert_eq!(cache.get("stale").await, None);
        assert_eq!(cache.get("other").await, None);
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn redis_cache_round_trip() {
        let pool = RedisPool::new(&common::cache::RedisConfig::from_env()).expect("redis client");
        let cache = RedisTokenCache::new(pool);

        cache.put("fp-test", "token-1", Duration::from_secs(30)).await;
        assert_eq!(cache.get("fp-test").await.as_deref(), Some("token-1"));
    }
}
