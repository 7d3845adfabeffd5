//! Per-key serialized read-merge-write.
//!
//! Every writer for a key waits on that key's async mutex, so a timer tick, a
//! visibility change and a pipeline write against the same record apply one
//! after another instead of interleaving their reads and writes. Tokio's mutex
//! is fair, which makes the lock a FIFO queue of pending writers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use super::PersistentStore;
use crate::error::Result;

type KeyLock = Arc<Mutex<()>>;

pub struct WriteQueue {
    store: Arc<dyn PersistentStore>,
    locks: StdMutex<HashMap<String, KeyLock>>,
}

impl WriteQueue {
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self {
            store,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn PersistentStore> {
        &self.store
    }

    /// Reads the current value for `key`, hands it to `merge`, and writes the
    /// result back. Returns the value that was written.
    pub async fn update<F>(&self, key: &str, merge: F) -> Result<Value>
    where
        F: FnOnce(Option<Value>) -> Value + Send,
    {
        let lock = self.key_lock(key);
        let result = {
            let _guard = lock.lock().await;
            self.read_merge_write(key, merge).await
        };
        self.release(key, lock);
        result
    }

    /// Same as [`WriteQueue::update`] but logs and drops the error, so a failed
    /// write never surfaces to the caller.
    pub async fn update_logged<F>(&self, key: &str, merge: F) -> Option<Value>
    where
        F: FnOnce(Option<Value>) -> Value + Send,
    {
        match self.update(key, merge).await {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key = %key, error = %err, "Queued store write failed");
                None
            }
        }
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        let lock = self.key_lock(key);
        let result = {
            let _guard = lock.lock().await;
            self.store.remove(&[key.to_string()]).await
        };
        self.release(key, lock);
        result
    }

    pub async fn read(&self, key: &str) -> Result<Option<Value>> {
        self.store.get_value(key).await
    }

    pub fn pending_keys(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    async fn read_merge_write<F>(&self, key: &str, merge: F) -> Result<Value>
    where
        F: FnOnce(Option<Value>) -> Value + Send,
    {
        let current = self.store.get_value(key).await?;
        let next = merge(current);
        self.store
            .set(HashMap::from([(key.to_string(), next.clone())]))
            .await?;
        Ok(next)
    }

    fn key_lock(&self, key: &str) -> KeyLock {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    // Drops the map entry once no writer holds or waits on it.
    fn release(&self, key: &str, lock: KeyLock) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        drop(lock);
        if let Some(existing) = locks.get(key) {
            if Arc::strong_count(existing) == 1 {
                locks.remove(key);
            }
        }
    }
}
