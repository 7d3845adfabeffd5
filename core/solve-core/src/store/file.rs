//! File-backed record store.
//!
//! Records live in a single JSON file:
//!
//! ```json
//! {
//!   "version": 1,
//!   "records": {
//!     "https://leetcode.com/problems/two-sum/": { ... ProblemRecord fields ... }
//!   }
//! }
//! ```
//!
//! Loading tolerates empty files, corrupt JSON and version mismatches by
//! starting from an empty store. Writes go to a temp file in the same
//! directory and are renamed into place.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::warn;

use super::PersistentStore;
use crate::error::{Result, SolveError};

const STORE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    records: HashMap<String, Value>,
}

pub struct JsonFileStore {
    path: PathBuf,
    records: Mutex<HashMap<String, Value>>,
}

impl JsonFileStore {
    pub fn open(path: &Path) -> Result<Self> {
        let records = load_records(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &HashMap<String, Value>) -> Result<()> {
        let store_file = StoreFile {
            version: STORE_VERSION,
            records: records.clone(),
        };
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_store_file(&path, &store_file))
            .await
            .map_err(|err| SolveError::Storage(format!("store writer task failed: {}", err)))?
    }
}

#[async_trait]
impl PersistentStore for JsonFileStore {
    async fn get(&self, keys: &[String]) -> Result<HashMap<String, Value>> {
        let records = self.records.lock().await;
        Ok(keys
            .iter()
            .filter_map(|key| records.get(key).map(|value| (key.clone(), value.clone())))
            .collect())
    }

    async fn set(&self, entries: HashMap<String, Value>) -> Result<()> {
        // Held across the write so file replacements land in call order.
        let mut records = self.records.lock().await;
        let mut next = records.clone();
        next.extend(entries);
        self.persist(&next).await?;
        *records = next;
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        let mut records = self.records.lock().await;
        let mut next = records.clone();
        for key in keys {
            next.remove(key);
        }
        self.persist(&next).await?;
        *records = next;
        Ok(())
    }
}

fn load_records(path: &Path) -> Result<HashMap<String, Value>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let content = fs_err::read_to_string(path).map_err(|err| SolveError::Io {
        context: "reading record store".to_string(),
        source: err,
    })?;

    if content.trim().is_empty() {
        warn!(path = %path.display(), "Empty record store file, starting empty");
        return Ok(HashMap::new());
    }

    match serde_json::from_str::<StoreFile>(&content) {
        Ok(store_file) if store_file.version == STORE_VERSION => Ok(store_file.records),
        Ok(store_file) => {
            warn!(
                path = %path.display(),
                version = store_file.version,
                expected = STORE_VERSION,
                "Unsupported record store version, starting empty"
            );
            Ok(HashMap::new())
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Corrupt record store, starting empty");
            Ok(HashMap::new())
        }
    }
}

fn write_store_file(path: &Path, store_file: &StoreFile) -> Result<()> {
    let content = serde_json::to_string_pretty(store_file).map_err(|err| SolveError::Json {
        context: "serializing record store".to_string(),
        source: err,
    })?;

    let parent_dir = path
        .parent()
        .ok_or_else(|| SolveError::Storage("store path has no parent directory".to_string()))?;
    fs_err::create_dir_all(parent_dir).map_err(|err| SolveError::Io {
        context: "creating store directory".to_string(),
        source: err,
    })?;

    let mut temp_file = NamedTempFile::new_in(parent_dir)
        .map_err(|err| io_error("creating temp store file", err))?;
    temp_file
        .write_all(content.as_bytes())
        .map_err(|err| io_error("writing temp store file", err))?;
    temp_file
        .flush()
        .map_err(|err| io_error("flushing temp store file", err))?;
    temp_file
        .persist(path)
        .map_err(|err| io_error("replacing store file", err.error))?;

    Ok(())
}

fn io_error(context: &str, source: std::io::Error) -> SolveError {
    SolveError::Io {
        context: context.to_string(),
        source,
    }
}
