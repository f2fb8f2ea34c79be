// =====================================================================================
// BEST-EFFORT REDIS CACHE
// =====================================================================================

use deadpool_redis::{Config, Connection, Pool, Runtime};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis pool error: {0}")]
    Pool(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),
}

/// Non-authoritative side channel: callers treat every error as a cache miss.
#[derive(Clone)]
pub struct CacheClient {
    pool: Pool,
}

impl CacheClient {
    /// Builds the pool without connecting; the first command opens a connection.
    pub fn from_url(redis_url: &str) -> Result<Self, CacheError> {
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::Pool(format!("Pool creation error: {}", e)))?;
        Ok(Self { pool })
    }

    async fn get_connection(&self) -> Result<Connection, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::Pool(format!("Connection error: {}", e)))
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.get_connection().await?;
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply != "PONG" {
            return Err(CacheError::UnexpectedReply(reply));
        }
        Ok(())
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: u64) -> Result<(), CacheError> {
        let payload = serde_json::to_string(value)?;
        let mut conn = self.get_connection().await?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(payload)
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await?;
        debug!("Cached {} for {}s", key, ttl_seconds);
        Ok(())
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let mut conn = self.get_connection().await?;
        let raw: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ping_fails_cleanly_when_nothing_listens() {
        // port 1 is reserved; the connection is refused rather than hanging
        let cache = CacheClient::from_url("redis://127.0.0.1:1").unwrap();
        assert!(cache.ping().await.is_err());
    }

    #[test]
    fn rejects_malformed_urls() {
        assert!(CacheClient::from_url("not a url").is_err());
    }
}
