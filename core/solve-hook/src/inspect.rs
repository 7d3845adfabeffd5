//! Read-side commands over the record store: show, elapsed, reset.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use solve_core::{
    canonical_problem_url, format_elapsed, resolve_store_path, Clock, JsonFileStore,
    ProblemRecord, Session, SessionTimer, SolveConfig, SystemClock, WriteQueue,
};

use crate::error::HookError;

struct StoredProblem {
    key: String,
    queue: Arc<WriteQueue>,
    record: Value,
}

async fn open(config: &SolveConfig, url: &str) -> Result<StoredProblem, HookError> {
    let key = canonical_problem_url(url).ok_or_else(|| HookError::NotAProblemUrl(url.to_string()))?;
    let store = JsonFileStore::open(&resolve_store_path(config)?)?;
    let queue = Arc::new(WriteQueue::new(Arc::new(store)));
    let record = queue
        .read(&key)
        .await?
        .ok_or_else(|| HookError::NoRecord(key.clone()))?;
    Ok(StoredProblem { key, queue, record })
}

pub async fn show(config: &SolveConfig, url: &str) -> Result<String, HookError> {
    let problem = open(config, url).await?;
    serde_json::to_string_pretty(&problem.record).map_err(|source| {
        HookError::Core(solve_core::SolveError::Json {
            context: format!("encoding record {}", problem.key),
            source,
        })
    })
}

/// Active time recorded for a problem, as `HH:MM:SS`. Read-only: the stored
/// clock is never started or corrected.
pub async fn elapsed(config: &SolveConfig, url: &str) -> Result<String, HookError> {
    let problem = open(config, url).await?;
    let record = ProblemRecord::from_stored(Some(problem.record));
    let session = Session::from_record(&problem.key, &record)
        .ok_or_else(|| HookError::NoTimer(problem.key.clone()))?;
    let active_ms = session.raw_elapsed_ms(SystemClock.now_ms()).max(0);
    Ok(format_elapsed(Duration::from_millis(active_ms as u64)))
}

pub async fn reset(config: &SolveConfig, url: &str) -> Result<String, HookError> {
    let problem = open(config, url).await?;
    let timer = SessionTimer::new(problem.queue, Arc::new(SystemClock));
    timer.start(&problem.key).await;
    timer.reset().await;
    Ok(format!("Timer reset for {}", problem.key))
}
