//! Completed-job store keyed by idempotency key. Injected into the pipeline,
//! never a global.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::job::JobOutput;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("job store unavailable: {0}")]
    Unavailable(String),
    #[error("stored output for {key} is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
}

#[async_trait]
pub trait JobResultStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<JobOutput>, StoreError>;
    async fn put(&self, key: &str, output: &JobOutput) -> Result<(), StoreError>;
    /// Returns whether an entry was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

/// Process-lifetime store. Entries are kept serialized so a replay hands back
/// exactly what was written.
#[derive(Default)]
pub struct InMemoryJobStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    #[cfg(test)]
    pub async fn put_raw(&self, key: &str, raw: &str) {
        self.entries
            .write()
            .await
            .insert(key.to_string(), raw.to_string());
    }
}

#[async_trait]
impl JobResultStore for InMemoryJobStore {
    async fn get(&self, key: &str) -> Result<Option<JobOutput>, StoreError> {
        let entries = self.entries.read().await;
        let Some(raw) = entries.get(key) else {
            return Ok(None);
        };
        serde_json::from_str(raw)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn put(&self, key: &str, output: &JobOutput) -> Result<(), StoreError> {
        let raw = serde_json::to_string(output)
            .map_err(|e| StoreError::Unavailable(format!("serialize failed: {e}")))?;
        self.entries.write().await.insert(key.to_string(), raw);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }
}
