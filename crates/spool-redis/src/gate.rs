//! Redis list as a shared token pool.
//!
//! One element per available permit. `acquire` is LPOP, `release` is RPUSH,
//! so a single round trip arbitrates every permit and no two callers can pop
//! the same one. `initialize` resets the list to exactly `capacity` elements
//! and is meant to run once at startup, not on every instance joining an
//! already-initialized pool.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};

use spool_core::domain::SpoolError;
use spool_core::ports::TokenGate;

pub struct RedisTokenGate {
    manager: ConnectionManager,
    key: String,
}

impl RedisTokenGate {
    /// Connect to `url` and gate on the list stored at `key`.
    pub async fn connect(url: &str, key: impl Into<String>) -> Result<Self, SpoolError> {
        let client = redis::Client::open(url)
            .map_err(|err| SpoolError::Store(format!("invalid redis url: {err}")))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|err| SpoolError::Store(format!("redis connect failed: {err}")))?;
        let key = key.into();
        debug!(key = %key, "redis token gate connected");
        Ok(Self { manager, key })
    }

    /// Permits currently in the pool (observability only).
    pub async fn available(&self) -> Result<usize, SpoolError> {
        let mut conn = self.manager.clone();
        let len: usize = redis::cmd("LLEN")
            .arg(&self.key)
            .query_async(&mut conn)
            .await
            .map_err(|err| SpoolError::Store(format!("redis LLEN failed: {err}")))?;
        Ok(len)
    }

    async fn push_one(&self) -> Result<(), redis::RedisError> {
        let mut conn = self.manager.clone();
        redis::cmd("RPUSH")
            .arg(&self.key)
            .arg("1")
            .query_async::<()>(&mut conn)
            .await
    }
}

#[async_trait]
impl TokenGate for RedisTokenGate {
    async fn acquire(&self) -> Result<(), SpoolError> {
        let mut conn = self.manager.clone();
        let popped: Option<String> = redis::cmd("LPOP")
            .arg(&self.key)
            .query_async(&mut conn)
            .await
            .map_err(|err| SpoolError::Store(format!("redis LPOP failed: {err}")))?;
        match popped {
            Some(_) => Ok(()),
            None => Err(SpoolError::QueueSaturated),
        }
    }

    async fn release(&self) {
        // Release rides on a task outcome and must not fail it; a lost push
        // narrows capacity until the pool is re-initialized.
        if let Err(err) = self.push_one().await {
            warn!(key = %self.key, error = %err, "token release failed; pool is one permit short");
        }
    }

    async fn initialize(&self, capacity: usize) {
        let mut conn = self.manager.clone();
        if let Err(err) = redis::cmd("DEL")
            .arg(&self.key)
            .query_async::<()>(&mut conn)
            .await
        {
            warn!(key = %self.key, error = %err, "token pool reset failed");
            return;
        }
        for _ in 0..capacity {
            if let Err(err) = self.push_one().await {
                warn!(key = %self.key, error = %err, "token pool seeding stopped early");
                return;
            }
        }
        debug!(key = %self.key, capacity, "token pool initialized");
    }
}
