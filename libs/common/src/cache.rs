//! Shared Redis access
//!
//! Every key is prefixed with a namespace so the auth and payments services
//! can share one Redis database without colliding.

use anyhow::Result;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub namespace: String,
}

impl RedisConfig {
    /// Reads `REDIS_URL` (default `redis://localhost:6379`) and
    /// `REDIS_NAMESPACE` (default `makazi`).
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            namespace: std::env::var("REDIS_NAMESPACE").unwrap_or_else(|_| "makazi".to_string()),
        }
    }
}

/// Cloneable Redis handle; each call borrows a multiplexed connection
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
    namespace: String,
}

impl RedisPool {
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        info!(
            "Redis client ready at {} (namespace {})",
            config.url, config.namespace
        );
        Ok(Self {
            client,
            namespace: config.namespace.clone(),
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Store a value that Redis drops after `ttl` (rounded up to a second)
    pub async fn set_expiring(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let seconds = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
        let mut conn = self.connection().await?;
        let _: () = conn
            .set_ex(self.namespaced(key), value, seconds.max(1))
            .await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        Ok(conn.get(self.namespaced(key)).await?)
    }

    /// `PING` round trip
    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.connection().await?;
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(reply == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> RedisPool {
        RedisPool::new(&RedisConfig {
            url: "redis://localhost:6379".to_string(),
            namespace: "makazi-test".to_string(),
        })
        .expect("valid redis url")
    }

    #[test]
    fn keys_carry_the_namespace() {
        assert_eq!(local().namespaced("mpesa:token"), "makazi-test:mpesa:token");
    }

    #[test]
    fn malformed_url_is_refused() {
        let config = RedisConfig {
            url: "not a url".to_string(),
            namespace: "makazi".to_string(),
        };
        assert!(RedisPool::new(&config).is_err());
    }

    #[tokio::test]
    #[ignore = "requires a running Redis instance"]
    async fn expiring_values_vanish_after_their_ttl() -> Result<()> {
        let pool = local();
        assert!(pool.health_check().await?);

        pool.set_expiring("ttl-check", "value", Duration::from_millis(500))
            .await?;
        assert_eq!(pool.get("ttl-check").await?, Some("value".to_string()));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(pool.get("ttl-check").await?, None);
        Ok(())
    }
}
