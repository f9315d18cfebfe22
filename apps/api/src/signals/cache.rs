//! Signal Cache: read-through cache of `SignalSet`s keyed by the case-preserving
//! reference hash.
//!
//! An unreachable or disabled backing store is always a miss, never an error.
//! An entry that is present but cannot be decoded, or decodes into a set that
//! breaks its invariants, is reported as `CacheError::Corrupt`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use thiserror::Error;
use tokio::sync::{OnceCell, RwLock};
use tracing::warn;

use crate::models::signals::SignalSet;

const KEY_PREFIX: &str = "signals:";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    #[error("cache entry {key} is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
}

#[async_trait]
pub trait SignalCache: Send + Sync {
    async fn get(&self, hash: &str) -> Result<Option<SignalSet>, CacheError>;

    /// Best effort. Failures are logged and swallowed.
    async fn put(&self, hash: &str, signals: &SignalSet, ttl: Duration);
}

pub fn cache_key(hash: &str) -> String {
    format!("{KEY_PREFIX}{hash}")
}

/// Decodes a stored entry and re-checks the set's invariants.
fn decode_entry(key: &str, raw: &str) -> Result<SignalSet, CacheError> {
    let signals: SignalSet = serde_json::from_str(raw).map_err(|e| CacheError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    signals.validate().map_err(|reason| CacheError::Corrupt {
        key: key.to_string(),
        reason,
    })?;
    Ok(signals)
}

// ────────────────────────────────────────────────────────────────────────────
// Redis
// ────────────────────────────────────────────────────────────────────────────

/// The connection is opened on first use and shared afterwards; the manager
/// reconnects on its own. A failed first connect is retried on the next call.
pub struct RedisSignalCache {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
    op_timeout: Duration,
}

impl RedisSignalCache {
    pub fn new(redis_url: &str, op_timeout: Duration) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
            op_timeout,
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, redis::RedisError> {
        self.conn
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await
            .cloned()
    }

    async fn fetch(&self, key: &str) -> Result<Option<String>, String> {
        let op = async {
            let mut conn = self.connection().await?;
            redis::cmd("GET")
                .arg(key)
                .query_async::<_, Option<String>>(&mut conn)
                .await
        };
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err("timed out".to_string()),
        }
    }

    async fn store(&self, key: &str, value: &str, ttl: Duration) -> Result<(), String> {
        let op = async {
            let mut conn = self.connection().await?;
            redis::cmd("SETEX")
                .arg(key)
                .arg(ttl.as_secs().max(1))
                .arg(value)
                .query_async::<_, ()>(&mut conn)
                .await
        };
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err("timed out".to_string()),
        }
    }
}

#[async_trait]
impl SignalCache for RedisSignalCache {
    async fn get(&self, hash: &str) -> Result<Option<SignalSet>, CacheError> {
        let key = cache_key(hash);
        match self.fetch(&key).await {
            Ok(Some(raw)) => decode_entry(&key, &raw).map(Some),
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(key = %key, "Signal cache unavailable, treating as miss: {e}");
                Ok(None)
            }
        }
    }

    async fn put(&self, hash: &str, signals: &SignalSet, ttl: Duration) {
        let key = cache_key(hash);
        let value = match serde_json::to_string(signals) {
            Ok(v) => v,
            Err(e) => {
                warn!(key = %key, "Failed to encode signal set: {e}");
                return;
            }
        };
        if let Err(e) = self.store(&key, &value, ttl).await {
            warn!(key = %key, "Signal cache write failed: {e}");
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-process
// ────────────────────────────────────────────────────────────────────────────

/// Process-local cache. Entries are stored serialized so reads go through the
/// same decode path as Redis.
#[derive(Default)]
pub struct InMemorySignalCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl InMemorySignalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a raw value under a hash and drops every expired entry.
    pub async fn put_raw(&self, hash: &str, raw: &str, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, expires)| *expires > now);
        entries.insert(cache_key(hash), (raw.to_string(), now + ttl));
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl SignalCache for InMemorySignalCache {
    async fn get(&self, hash: &str) -> Result<Option<SignalSet>, CacheError> {
        let key = cache_key(hash);
        let entries = self.entries.read().await;
        match entries.get(&key) {
            Some((raw, expires)) if *expires > Instant::now() => decode_entry(&key, raw).map(Some),
            _ => Ok(None),
        }
    }

    async fn put(&self, hash: &str, signals: &SignalSet, ttl: Duration) {
        match serde_json::to_string(signals) {
            Ok(raw) => self.put_raw(hash, &raw, ttl).await,
            Err(e) => warn!("Failed to encode signal set: {e}"),
        }
    }
}

/// No backing store: every read is a miss.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledSignalCache;

#[async_trait]
impl SignalCache for DisabledSignalCache {
    async fn get(&self, _hash: &str) -> Result<Option<SignalSet>, CacheError> {
        Ok(None)
    }

    async fn put(&self, _hash: &str, _signals: &SignalSet, _ttl: Duration) {}
}
