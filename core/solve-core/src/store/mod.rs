//! Key/value persistence.
//!
//! The store is a plain async key/value map: no transactions, last write wins
//! per key. Anything that needs read-modify-write goes through [`WriteQueue`],
//! which serializes writers per key.
//!
//! - [`MemoryStore`]: in-process map, used by tests and embedders that persist
//!   elsewhere
//! - [`JsonFileStore`]: versioned JSON file with atomic replace
//! - [`WriteQueue`]: per-key ordered read-merge-write

mod file;
mod queue;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::Result;

pub use file::JsonFileStore;
pub use queue::WriteQueue;

#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Returns the stored values for `keys`. Absent keys are simply missing
    /// from the map.
    async fn get(&self, keys: &[String]) -> Result<HashMap<String, Value>>;

    async fn set(&self, entries: HashMap<String, Value>) -> Result<()>;

    async fn remove(&self, keys: &[String]) -> Result<()>;

    async fn get_value(&self, key: &str) -> Result<Option<Value>> {
        let mut values = self.get(&[key.to_string()]).await?;
        Ok(values.remove(key))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn get(&self, keys: &[String]) -> Result<HashMap<String, Value>> {
        let entries = self.entries.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| entries.get(key).map(|value| (key.clone(), value.clone())))
            .collect())
    }

    async fn set(&self, entries: HashMap<String, Value>) -> Result<()> {
        self.entries.write().await.extend(entries);
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}
