//! Post-acceptance sync pipeline.
//!
//! ```text
//! Idle → Extracting → Persisted → (Analyzing)? → BackendSyncing
//!      → (CodeHostPushing)? → Reset | AwaitingRetry
//! Extracting ──missing title/code──▶ Aborted
//! ```
//!
//! Stages run one after another. A failing stage is recorded in the
//! [`PipelineReport`] and never unwinds past [`SyncPipeline::run`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::SolveConfig;
use crate::error::SolveError;
use crate::record::{ProblemRecord, SubmissionStats};
use crate::services::{
    AnalysisService, BackendSyncService, CodeHostService, CodeHostSubmission, Notifier,
    ProblemContext, ProblemExtractor,
};
use crate::store::WriteQueue;
use crate::timer::SessionTimer;
use crate::tracker::AttemptTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Extracting,
    Persisted,
    Analyzing,
    BackendSyncing,
    CodeHostPushing,
    Reset,
    AwaitingRetry,
    Aborted,
}

impl PipelineStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Reset | Self::AwaitingRetry | Self::Aborted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StageOutcome {
    #[default]
    NotRun,
    Skipped(String),
    Succeeded,
    Failed(String),
}

impl StageOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Result object for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub stages: Vec<PipelineStage>,
    pub record_key: Option<String>,
    pub analysis: StageOutcome,
    pub backend: StageOutcome,
    pub code_host: StageOutcome,
    /// Why the run aborted, if it did.
    pub error: Option<String>,
}

impl PipelineReport {
    fn new() -> Self {
        Self {
            stages: vec![PipelineStage::Idle],
            record_key: None,
            analysis: StageOutcome::NotRun,
            backend: StageOutcome::NotRun,
            code_host: StageOutcome::NotRun,
            error: None,
        }
    }

    pub fn terminal(&self) -> PipelineStage {
        self.stages.last().copied().unwrap_or(PipelineStage::Idle)
    }

    fn enter(&mut self, stage: PipelineStage) {
        debug!(stage = ?stage, key = ?self.record_key, "Pipeline stage");
        self.stages.push(stage);
    }

    fn abort(mut self, err: &SolveError) -> Self {
        warn!(error = %err, kind = ?err.kind(), "Sync pipeline aborted");
        self.error = Some(err.to_string());
        self.enter(PipelineStage::Aborted);
        self
    }
}

/// Everything outside the crate the pipeline talks to.
#[derive(Clone)]
pub struct SyncServices {
    pub extractor: Arc<dyn ProblemExtractor>,
    /// `None` when no analysis backend is wired in.
    pub analysis: Option<Arc<dyn AnalysisService>>,
    pub backend: Arc<dyn BackendSyncService>,
    pub code_host: Arc<dyn CodeHostService>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub analysis_credential: bool,
    pub code_host_enabled: bool,
    pub platform_tag: String,
}

impl SyncSettings {
    pub fn from_config(config: &SolveConfig) -> Self {
        Self {
            analysis_credential: config.analysis.has_credential(),
            code_host_enabled: config.code_host.enabled,
            platform_tag: config.code_host.platform_tag.clone(),
        }
    }
}

// Code handed to the code host.
struct CapturedCode {
    code: String,
    language: Option<String>,
}

pub struct SyncPipeline {
    queue: Arc<WriteQueue>,
    clock: Arc<dyn Clock>,
    services: SyncServices,
    settings: SyncSettings,
}

impl SyncPipeline {
    pub fn new(
        queue: Arc<WriteQueue>,
        clock: Arc<dyn Clock>,
        services: SyncServices,
        settings: SyncSettings,
    ) -> Self {
        Self {
            queue,
            clock,
            services,
            settings,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Runs every stage for an accepted submission. The tracker is cleared
    /// only when the run ends in [`PipelineStage::Reset`].
    pub async fn run(
        &self,
        tracker: &mut AttemptTracker,
        timer: &SessionTimer,
        stats: Option<SubmissionStats>,
    ) -> PipelineReport {
        let mut report = PipelineReport::new();

        report.enter(PipelineStage::Extracting);
        let session_key = timer.session_id();
        let context = match self
            .services
            .extractor
            .extract()
            .await
            .complete(tracker.submission(), session_key.as_deref())
        {
            Ok(context) => context,
            Err(err) => return report.abort(&err),
        };
        report.record_key = Some(context.url.clone());

        if let Err(err) = self.persist_solved(&context, tracker, timer, stats).await {
            return report.abort(&err);
        }
        report.enter(PipelineStage::Persisted);
        info!(key = %context.url, tries = tracker.tries(), "Solved status persisted");

        report.analysis = self.analyze(&mut report, &context, tracker).await;

        report.enter(PipelineStage::BackendSyncing);
        report.backend = self.push_backend(&context).await;

        let captured = CapturedCode {
            code: context.code.clone(),
            language: context.language.clone(),
        };
        self.finish_code_host(&mut report, &context.url, captured, tracker)
            .await;
        report
    }

    /// Re-runs only the code-host stage for a run that ended in
    /// [`PipelineStage::AwaitingRetry`], using the captured submission.
    pub async fn retry_code_host(
        &self,
        tracker: &mut AttemptTracker,
        problem_url: &str,
    ) -> PipelineReport {
        let mut report = PipelineReport::new();
        report.record_key = Some(problem_url.to_string());
        let Some(submission) = tracker.submission() else {
            let err = SolveError::ExtractionIncomplete {
                missing: vec!["code"],
            };
            return report.abort(&err);
        };
        let captured = CapturedCode {
            code: submission.code.clone(),
            language: Some(submission.language.clone()),
        };
        self.finish_code_host(&mut report, problem_url, captured, tracker)
            .await;
        report
    }

    async fn persist_solved(
        &self,
        context: &ProblemContext,
        tracker: &AttemptTracker,
        timer: &SessionTimer,
        stats: Option<SubmissionStats>,
    ) -> crate::error::Result<()> {
        let now = self.clock.now_ms();
        let tries = tracker.tries();
        let counters = tracker.counters();
        let session = timer
            .session()
            .filter(|session| session.session_id == context.url);
        let platform = self.settings.platform_tag.clone();
        let key = context.url.clone();
        let context = context.clone();

        self.queue
            .update(&key, move |current| {
                let mut record = ProblemRecord::from_stored(current);
                record.name = Some(context.title);
                record.platform = Some(platform);
                if let Some(difficulty) = context.difficulty {
                    record.difficulty = Some(difficulty.as_index());
                }
                if !context.topics.is_empty() {
                    record.topics = context.topics;
                }
                if context.language.is_some() {
                    record.language = context.language;
                }
                record.set_solved(true, tries, now, stats);
                record.apply_counters(&counters);
                if let Some(session) = session.as_ref() {
                    record.apply_timer(session);
                }
                record.to_value()
            })
            .await?;
        Ok(())
    }

    async fn analyze(
        &self,
        report: &mut PipelineReport,
        context: &ProblemContext,
        tracker: &AttemptTracker,
    ) -> StageOutcome {
        if !tracker.analysis_latched() {
            return StageOutcome::Skipped("analysis not latched".to_string());
        }
        let service = match (&self.services.analysis, self.settings.analysis_credential) {
            (Some(service), true) => service,
            _ => {
                let err = SolveError::ConfigurationMissing("analysis credential".to_string());
                info!(error = %err, "Skipping analysis");
                return StageOutcome::Skipped(err.to_string());
            }
        };

        report.enter(PipelineStage::Analyzing);
        let attempts = tracker.analysis_attempts();
        let result = match service.analyze(&attempts, context).await {
            Ok(result) => result,
            Err(err) => {
                // Best-effort enrichment: never surfaced to the user.
                warn!(key = %context.url, error = %err, "Analysis failed");
                return StageOutcome::Failed(err.to_string());
            }
        };

        let written = self
            .queue
            .update(&context.url, move |current| {
                let mut record = ProblemRecord::from_stored(current);
                record.apply_analysis(&result.tags, &result.summary);
                record.to_value()
            })
            .await;
        match written {
            Ok(_) => {
                info!(key = %context.url, attempts = attempts.len(), "Analysis stored");
                StageOutcome::Succeeded
            }
            Err(err) => {
                warn!(key = %context.url, error = %err, "Failed to store analysis");
                StageOutcome::Failed(err.to_string())
            }
        }
    }

    async fn push_backend(&self, context: &ProblemContext) -> StageOutcome {
        match self.services.backend.push(&context.url).await {
            Ok(_) => {
                self.services
                    .notifier
                    .success(&format!("Synced \"{}\"", context.title));
                StageOutcome::Succeeded
            }
            Err(err) => {
                warn!(key = %context.url, error = %err, "Backend sync failed");
                self.services
                    .notifier
                    .error(&format!("Sync failed for \"{}\": {err}", context.title));
                StageOutcome::Failed(err.to_string())
            }
        }
    }

    async fn finish_code_host(
        &self,
        report: &mut PipelineReport,
        problem_url: &str,
        captured: CapturedCode,
        tracker: &mut AttemptTracker,
    ) {
        if !self.settings.code_host_enabled {
            report.code_host = StageOutcome::Skipped("code host disabled".to_string());
            tracker.clear_transient();
            report.enter(PipelineStage::Reset);
            return;
        }

        report.enter(PipelineStage::CodeHostPushing);
        match self.push_code_host(problem_url, captured).await {
            Ok(()) => {
                self.services.notifier.success(&format!(
                    "Pushed solution to {}",
                    self.settings.platform_tag
                ));
                report.code_host = StageOutcome::Succeeded;
                tracker.clear_transient();
                report.enter(PipelineStage::Reset);
            }
            Err(err) => {
                warn!(key = %problem_url, error = %err, "Code host push failed");
                self.services
                    .notifier
                    .error(&format!("Code host push failed: {err}"));
                report.code_host = StageOutcome::Failed(err.to_string());
                report.enter(PipelineStage::AwaitingRetry);
            }
        }
    }

    async fn push_code_host(
        &self,
        problem_url: &str,
        captured: CapturedCode,
    ) -> crate::error::Result<()> {
        let record = ProblemRecord::from_stored(self.queue.read(problem_url).await?);
        let payload = CodeHostSubmission {
            url: problem_url.to_string(),
            language: captured.language.or_else(|| record.language.clone()),
            record,
            code: captured.code,
        };
        self.services
            .code_host
            .push(&payload, &self.settings.platform_tag)
            .await
    }
}
