//! Engine facade: one problem context at a time.
//!
//! Owns the session timer, the attempt tracker and the sync pipeline, and
//! routes navigation, page events and visibility changes to them.

use std::sync::Arc;

use solvesync_protocol::{ErrorInfo, EventType, PageEvent};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::SolveConfig;
use crate::pipeline::{PipelineReport, SyncPipeline, SyncServices, SyncSettings};
use crate::record::{canonical_problem_url, ProblemRecord, SubmissionStats};
use crate::store::WriteQueue;
use crate::timer::{spawn_display_refresh, SessionTimer};
use crate::tracker::{AttemptTracker, ResultOutcome};

/// What handling one page event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Recorded,
    /// Valid event that had nothing to act on.
    Ignored(String),
    Rejected(ErrorInfo),
    /// An accepted submission ran the sync pipeline.
    Synced(PipelineReport),
}

pub struct SolveEngine {
    config: SolveConfig,
    clock: Arc<dyn Clock>,
    queue: Arc<WriteQueue>,
    timer: Arc<SessionTimer>,
    tracker: AttemptTracker,
    pipeline: SyncPipeline,
    last_report: Option<PipelineReport>,
}

impl SolveEngine {
    pub fn new(
        config: SolveConfig,
        queue: Arc<WriteQueue>,
        clock: Arc<dyn Clock>,
        services: SyncServices,
    ) -> Self {
        let timer = Arc::new(SessionTimer::new(Arc::clone(&queue), Arc::clone(&clock)));
        Self::with_timer(config, queue, clock, timer, services)
    }

    /// Builds an engine around an existing timer, e.g. one from a
    /// [`crate::timer::SessionRegistry`].
    pub fn with_timer(
        config: SolveConfig,
        queue: Arc<WriteQueue>,
        clock: Arc<dyn Clock>,
        timer: Arc<SessionTimer>,
        services: SyncServices,
    ) -> Self {
        let pipeline = SyncPipeline::new(
            Arc::clone(&queue),
            Arc::clone(&clock),
            services,
            SyncSettings::from_config(&config),
        );
        Self {
            tracker: AttemptTracker::new(config.tracker),
            config,
            clock,
            queue,
            timer,
            pipeline,
            last_report: None,
        }
    }

    pub fn config(&self) -> &SolveConfig {
        &self.config
    }

    pub fn tracker(&self) -> &AttemptTracker {
        &self.tracker
    }

    pub fn timer(&self) -> &Arc<SessionTimer> {
        &self.timer
    }

    pub fn last_report(&self) -> Option<&PipelineReport> {
        self.last_report.as_ref()
    }

    /// Current problem key, if a problem page is active.
    pub fn problem_key(&self) -> Option<&str> {
        self.tracker.problem_id()
    }

    /// Handles a page navigation. A new canonical problem URL replaces the
    /// tracker and switches the timer; non-problem URLs are ignored.
    pub async fn navigate(&mut self, url: &str) -> Option<String> {
        let Some(key) = canonical_problem_url(url) else {
            debug!(url = %url, "Navigation to non-problem page");
            return None;
        };
        if self.tracker.observe_problem(&key) {
            info!(key = %key, "Problem context changed");
            self.last_report = None;
        }
        self.timer.start(&key).await;
        Some(key)
    }

    pub async fn handle_event(&mut self, event: PageEvent) -> EventOutcome {
        if let Err(info) = event.validate() {
            warn!(code = %info.code, message = %info.message, "Rejected page event");
            return EventOutcome::Rejected(info);
        }
        if self.tracker.problem_id().is_none() {
            return EventOutcome::Ignored("no active problem".to_string());
        }

        let payload = &event.payload;
        let code = payload.code.as_deref().unwrap_or_default();
        let language = payload.language.as_deref().unwrap_or_default();
        let now = self.clock.now_ms();

        match event.event_type {
            EventType::RunSubmitted => {
                if self.tracker.on_run_event(code, language, now).is_none() {
                    return EventOutcome::Ignored("code below minimum length".to_string());
                }
                EventOutcome::Recorded
            }
            EventType::SubmitSubmitted => {
                let problem_id = payload.problem_id.as_deref().unwrap_or_default();
                self.tracker
                    .on_submit_event(code, language, problem_id, now);
                EventOutcome::Recorded
            }
            EventType::RunResult => {
                let outcome = self.tracker.on_run_result(event.succeeded());
                self.persist_counters(outcome).await;
                match outcome.resolved {
                    Some(_) => EventOutcome::Recorded,
                    None => EventOutcome::Ignored("no pending run".to_string()),
                }
            }
            EventType::SubmitResult => {
                let success = event.succeeded();
                let outcome = self.tracker.on_submit_result(success);
                self.persist_counters(outcome).await;
                if !success {
                    return EventOutcome::Recorded;
                }
                let stats = SubmissionStats::from_payload(payload);
                let report = self.run_pipeline(stats).await;
                EventOutcome::Synced(report)
            }
        }
    }

    pub fn on_visibility_hidden(&self) {
        self.timer.on_visibility_hidden();
    }

    pub async fn on_visibility_visible(&self) {
        self.timer.on_visibility_visible().await;
    }

    /// Retries the code-host push of the last run that ended awaiting retry.
    pub async fn retry_code_host(&mut self) -> Option<PipelineReport> {
        let key = self.tracker.problem_id()?.to_string();
        let report = self
            .pipeline
            .retry_code_host(&mut self.tracker, &key)
            .await;
        self.last_report = Some(report.clone());
        Some(report)
    }

    /// Starts the periodic elapsed-time display for the current timer.
    pub fn spawn_display_refresh<F>(&self, sink: F) -> JoinHandle<()>
    where
        F: Fn(String) + Send + 'static,
    {
        spawn_display_refresh(
            Arc::clone(&self.timer),
            self.config.timer.refresh_interval(),
            sink,
        )
    }

    async fn run_pipeline(&mut self, stats: Option<SubmissionStats>) -> PipelineReport {
        let report = self
            .pipeline
            .run(&mut self.tracker, &self.timer, stats)
            .await;
        info!(
            terminal = ?report.terminal(),
            key = ?report.record_key,
            "Sync pipeline finished"
        );
        self.last_report = Some(report.clone());
        report
    }

    async fn persist_counters(&self, outcome: ResultOutcome) {
        let Some(key) = self.tracker.problem_id() else {
            return;
        };
        if outcome.latched_now {
            info!(key = %key, "Analysis will run on next accepted submission");
        }
        let counters = self.tracker.counters();
        self.queue
            .update_logged(key, move |current| {
                let mut record = ProblemRecord::from_stored(current);
                record.apply_counters(&counters);
                record.to_value()
            })
            .await;
    }
}
