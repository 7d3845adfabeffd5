//! Replays a file of page events through the engine.
//!
//! One JSON event per line; blank lines and `#` comments are skipped. The
//! problem context comes from the command line, pushes land in the outbox.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use solve_core::{
    resolve_store_path, EventOutcome, JsonFileStore, ProblemExtractor, ProblemSnapshot,
    SolveConfig, SolveEngine, SyncServices, SystemClock, TracingNotifier, WriteQueue,
};
use solvesync_protocol::parse_event_line;

use crate::error::HookError;
use crate::outbox::Outbox;

/// Problem context supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct ProblemArgs {
    pub url: String,
    pub title: Option<String>,
    pub difficulty: Option<String>,
    pub topics: Vec<String>,
}

struct StaticExtractor {
    snapshot: ProblemSnapshot,
}

#[async_trait]
impl ProblemExtractor for StaticExtractor {
    async fn extract(&self) -> ProblemSnapshot {
        self.snapshot.clone()
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySummary {
    pub problem: String,
    pub recorded: usize,
    pub ignored: usize,
    pub rejected: usize,
    /// Terminal stage of each pipeline run, in order.
    pub pipeline_runs: Vec<String>,
}

pub async fn run(
    config: SolveConfig,
    events: &Path,
    problem: ProblemArgs,
    outbox: PathBuf,
) -> Result<ReplaySummary, HookError> {
    let content = fs_err::read_to_string(events).map_err(|source| solve_core::SolveError::Io {
        context: format!("reading events {}", events.display()),
        source,
    })?;

    let store = JsonFileStore::open(&resolve_store_path(&config)?)?;
    let queue = Arc::new(WriteQueue::new(Arc::new(store)));
    let outbox = Arc::new(Outbox::new(outbox));
    let services = SyncServices {
        extractor: Arc::new(StaticExtractor {
            snapshot: ProblemSnapshot {
                url: Some(problem.url.clone()),
                title: problem.title,
                difficulty: problem.difficulty,
                topics: problem.topics,
                ..ProblemSnapshot::default()
            },
        }),
        analysis: None,
        backend: outbox.clone(),
        code_host: outbox,
        notifier: Arc::new(TracingNotifier),
    };
    let mut engine = SolveEngine::new(config, queue, Arc::new(SystemClock), services);

    let key = engine
        .navigate(&problem.url)
        .await
        .ok_or_else(|| HookError::NotAProblemUrl(problem.url.clone()))?;

    let mut summary = ReplaySummary {
        problem: key,
        ..ReplaySummary::default()
    };
    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event = match parse_event_line(trimmed) {
            Ok(event) => event,
            Err(info) => {
                tracing::warn!(line = index + 1, code = %info.code, error = %info, "Skipping event");
                summary.rejected += 1;
                continue;
            }
        };
        match engine.handle_event(event).await {
            EventOutcome::Recorded => summary.recorded += 1,
            EventOutcome::Ignored(reason) => {
                tracing::debug!(line = index + 1, reason = %reason, "Event ignored");
                summary.ignored += 1;
            }
            EventOutcome::Rejected(_) => summary.rejected += 1,
            EventOutcome::Synced(report) => {
                summary.recorded += 1;
                summary
                    .pipeline_runs
                    .push(format!("{:?}", report.terminal()));
            }
        }
    }

    engine.timer().tick().await;
    Ok(summary)
}
