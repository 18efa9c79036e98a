use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

// ============================================================================
// Tick Lock
// ============================================================================
//
// When the service runs as multiple instances, each scheduled task must be
// held by exactly one instance per tick. Acquisition hands out a token; the
// release checks the token so a holder whose TTL expired cannot free a lock
// someone else has since taken.
//
// ============================================================================

#[async_trait]
pub trait TickLock: Send + Sync {
    /// Try to take the lock. Some(token) on success, None when another
    /// instance holds it.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> anyhow::Result<Option<String>>;

    async fn release(&self, key: &str, token: &str) -> anyhow::Result<()>;
}

// ============================================================================
// Redis-backed lock (multi-instance deployments)
// ============================================================================

pub struct RedisTickLock {
    client: redis::Client,
}

impl RedisTickLock {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            client: redis::Client::open(url)?,
        })
    }
}

#[async_trait]
impl TickLock for RedisTickLock {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> anyhow::Result<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let token = Uuid::new_v4().to_string();

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        Ok(reply.map(|_| token))
    }

    async fn release(&self, key: &str, token: &str) -> anyhow::Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // Only delete if we still own it; an expired holder must not free the
        // next instance's lock.
        let current: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        if current.as_deref() == Some(token) {
            let _: () = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        }
        Ok(())
    }
}

// ============================================================================
// In-process lock (single instance, tests)
// ============================================================================

#[derive(Default)]
pub struct LocalTickLock {
    held: Mutex<HashMap<String, String>>,
}

impl LocalTickLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TickLock for LocalTickLock {
    async fn try_acquire(&self, key: &str, _ttl: Duration) -> anyhow::Result<Option<String>> {
        let mut held = self.held.lock().await;
        if held.contains_key(key) {
            return Ok(None);
        }
        let token = Uuid::new_v4().to_string();
        held.insert(key.to_string(), token.clone());
        Ok(Some(token))
    }

    async fn release(&self, key: &str, token: &str) -> anyhow::Result<()> {
        let mut held = self.held.lock().await;
        if held.get(key).map(String::as_str) == Some(token) {
            held.remove(key);
        }
        Ok(())
    }
}
