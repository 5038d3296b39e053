// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Shared counter stores for rate limiting.
//!
//! A counter store is a key-value service with per-key expiry. The gateway
//! only needs two operations, a read and a write-with-TTL; no atomic
//! increment is assumed, so concurrent writers can overwrite each other
//! near a window boundary.

use crate::clock::{Clock, SystemClock};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info};

/// Counter store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    #[error("counter store returned malformed value for {key}")]
    Malformed { key: String },
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Key-value store with TTL-based expiry.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read a counter. Absent or expired keys read as `None`.
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Write a counter that expires `ttl_secs` from now.
    async fn put(&self, key: &str, value: u64, ttl_secs: u64) -> Result<(), StoreError>;
}

/// Redis-backed counter store.
///
/// The connection is established on first use and re-established by the
/// connection manager after failures, so a Redis outage at boot does not
/// prevent the gateway from starting.
pub struct RedisCounterStore {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
}

impl RedisCounterStore {
    /// Create a store for the given `redis://` URL.
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        info!("Counter store configured for Redis");
        Ok(Self {
            client,
            conn: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let conn = self
            .conn
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        match raw {
            None => Ok(None),
            Some(v) => v
                .parse()
                .map(Some)
                .map_err(|_| StoreError::Malformed { key: key.to_string() }),
        }
    }

    async fn put(&self, key: &str, value: u64, ttl_secs: u64) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: u64,
    expires_at: i64,
}

/// In-process counter store.
///
/// Counters are not shared between instances, so this is only suitable for
/// a single-instance deployment and for tests.
#[derive(Debug)]
pub struct MemoryCounterStore {
    clock: Arc<dyn Clock>,
    entries: RwLock<Entries>,
}

#[derive(Debug)]
struct Entries {
    map: HashMap<String, Entry>,
    // Earliest expiry among stored entries; no sweep is needed before it.
    next_expiry: i64,
}

impl Entries {
    fn sweep(&mut self, now: i64) {
        if now < self.next_expiry {
            return;
        }
        let before = self.map.len();
        self.map.retain(|_, e| e.expires_at > now);
        if self.map.len() != before {
            debug!(evicted = before - self.map.len(), "Evicted expired counters");
        }
        self.next_expiry = self.map.values().map(|e| e.expires_at).min().unwrap_or(i64::MAX);
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store whose expiry follows the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: RwLock::new(Entries {
                map: HashMap::new(),
                next_expiry: i64::MAX,
            }),
        }
    }

    /// Number of live (unexpired) counters.
    pub async fn len(&self) -> usize {
        let now = self.clock.epoch_secs();
        self.entries
            .read()
            .await
            .map
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let now = self.clock.epoch_secs();
        let entries = self.entries.read().await;
        Ok(entries
            .map
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value))
    }

    async fn put(&self, key: &str, value: u64, ttl_secs: u64) -> Result<(), StoreError> {
        let now = self.clock.epoch_secs();
        let expires_at = now + ttl_secs.max(1) as i64;
        let mut entries = self.entries.write().await;
        // Expired keys are dropped lazily, once the earliest one is due.
        entries.sweep(now);
        entries.map.insert(key.to_string(), Entry { value, expires_at });
        entries.next_expiry = entries.next_expiry.min(expires_at);
        Ok(())
    }
}
