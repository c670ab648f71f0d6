//! Key/value cache shared by the token and rate caches.
//!
//! Created once at startup and handed around as `Arc<dyn Cache>`. Callers
//! close it explicitly on shutdown; every operation after `close` fails.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::{Mutex, RwLock};

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

pub struct RedisCache {
    conn: RwLock<Option<ConnectionManager>>,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        log::info!("Connected to Redis");

        Ok(Self {
            conn: RwLock::new(Some(conn)),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        self.conn
            .read()
            .await
            .clone()
            .ok_or_else(|| anyhow!("Redis cache is closed"))
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn
            .get(key)
            .await
            .context(format!("Failed to read `{}` from Redis", key))?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await
            .context(format!("Failed to write `{}` to Redis", key))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .del(key)
            .await
            .context(format!("Failed to delete `{}` from Redis", key))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.conn.write().await.take().is_some() {
            log::info!("Redis cache closed");
        }
        Ok(())
    }
}

/// In-process cache used when no Redis URL is configured, and in tests.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    closed: RwLock<bool>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn ensure_open(&self) -> Result<()> {
        if *self.closed.read().await {
            return Err(anyhow!("Memory cache is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.ensure_open().await?;
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.ensure_open().await?;
        self.entries
            .lock()
            .await
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.ensure_open().await?;
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        *self.closed.write().await = true;
        self.entries.lock().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_entries_expire() {
        let cache = MemoryCache::new();
        cache
            .set_ex("short", "v", Duration::from_millis(20))
            .await
            .unwrap();
        cache
            .set_ex("long", "v", Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(cache.get("short").await.unwrap(), None);
        assert_eq!(cache.get("long").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn closed_cache_rejects_operations() {
        let cache = MemoryCache::new();
        cache.set_ex("k", "v", Duration::from_secs(5)).await.unwrap();
        cache.close().await.unwrap();

        assert!(cache.get("k").await.is_err());
        assert!(cache.set_ex("k", "v", Duration::from_secs(5)).await.is_err());
    }
}
