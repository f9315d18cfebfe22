//! Per-key mutual exclusion so two concurrent runs of the same idempotency key
//! execute once: the second waits, then finds the first one's stored output.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard};

type KeyLock = Arc<TokioMutex<()>>;

#[derive(Default)]
pub struct KeyedLocks {
    locks: Arc<Mutex<HashMap<String, KeyLock>>>,
}

/// Held for the duration of one run. Dropping the last guard for a key removes
/// the key's entry.
pub struct FlightGuard {
    key: String,
    lock: KeyLock,
    locks: Arc<Mutex<HashMap<String, KeyLock>>>,
    _held: OwnedMutexGuard<()>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> FlightGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(TokioMutex::new(())))
                .clone()
        };
        let held = lock.clone().lock_owned().await;
        FlightGuard {
            key: key.to_string(),
            lock,
            locks: Arc::clone(&self.locks),
            _held: held,
        }
    }

    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // map entry + this guard's handle + the owned guard's handle
        if Arc::strong_count(&self.lock) <= 3 {
            locks.remove(&self.key);
        }
    }
}
