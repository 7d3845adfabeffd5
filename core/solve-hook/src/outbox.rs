//! Outbox collaborator: every outbound push becomes one JSON line in a file.
//!
//! Stands in for the backend and the code host when replaying events
//! offline, so the result of a replay can be inspected or shipped later.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use solve_core::{BackendSyncService, CodeHostService, CodeHostSubmission, SolveError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboxEntry<'a> {
    target: &'a str,
    at: String,
    payload: Value,
}

#[derive(Debug, Clone)]
pub struct Outbox {
    path: PathBuf,
}

impl Outbox {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, target: &str, payload: Value) -> solve_core::Result<()> {
        let entry = OutboxEntry {
            target,
            at: Utc::now().to_rfc3339(),
            payload,
        };
        let mut line = serde_json::to_string(&entry).map_err(|source| SolveError::Json {
            context: "encoding outbox entry".to_string(),
            source,
        })?;
        line.push('\n');

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || append_line(&path, &line))
            .await
            .map_err(|err| SolveError::Storage(format!("outbox writer failed: {err}")))?
    }
}

fn append_line(path: &Path, line: &str) -> solve_core::Result<()> {
    let io_error = |source| SolveError::Io {
        context: format!("appending to outbox {}", path.display()),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs_err::create_dir_all(parent).map_err(io_error)?;
    }
    let mut file = fs_err::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_error)?;
    file.write_all(line.as_bytes()).map_err(io_error)
}

#[async_trait]
impl BackendSyncService for Outbox {
    async fn push(&self, problem_url: &str) -> solve_core::Result<Value> {
        self.append("backend", json!({ "problemUrl": problem_url }))
            .await?;
        Ok(json!({ "queued": true }))
    }
}

#[async_trait]
impl CodeHostService for Outbox {
    async fn push(
        &self,
        submission: &CodeHostSubmission,
        platform_tag: &str,
    ) -> solve_core::Result<()> {
        let payload = json!({
            "platform": platform_tag,
            "submission": submission,
        });
        self.append("code_host", payload).await
    }
}
