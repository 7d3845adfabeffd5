//! End-to-end scenarios: page events through the engine into the sync
//! pipeline, with recording fakes standing in for every collaborator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use solve_core::{
    AnalysisResult, AnalysisService, Attempt, AttemptKind, BackendSyncService, CodeHostService,
    CodeHostSubmission, EventOutcome, ManualClock, MemoryStore, Notifier, PersistentStore,
    PipelineStage, ProblemContext, ProblemExtractor, ProblemRecord, ProblemSnapshot, SolveConfig,
    SolveEngine, SolveError, StageOutcome, SyncServices, WriteQueue,
};
use solvesync_protocol::{parse_event, PageEvent};

const URL: &str = "https://leetcode.com/problems/two-sum/";
const FAILING_CODE: &str = "fn two_sum() { unimplemented!() }";
const ACCEPTED_CODE: &str = "fn two_sum(nums: Vec<i32>) -> Vec<i32> { vec![0, 1] }";

struct FakeExtractor {
    snapshot: Mutex<ProblemSnapshot>,
}

#[async_trait]
impl ProblemExtractor for FakeExtractor {
    async fn extract(&self) -> ProblemSnapshot {
        self.snapshot.lock().expect("lock").clone()
    }
}

#[derive(Default)]
struct RecordingAnalysis {
    calls: Mutex<Vec<Vec<Attempt>>>,
    fail: AtomicBool,
}

#[async_trait]
impl AnalysisService for RecordingAnalysis {
    async fn analyze(
        &self,
        attempts: &[Attempt],
        _context: &ProblemContext,
    ) -> solve_core::Result<AnalysisResult> {
        self.calls.lock().expect("lock").push(attempts.to_vec());
        if self.fail.load(Ordering::SeqCst) {
            return Err(SolveError::network("analysis", "quota exceeded"));
        }
        Ok(AnalysisResult {
            tags: ["hash-map".to_string(), "off-by-one".to_string()]
                .into_iter()
                .collect(),
            summary: "Indexing mistakes before switching to a hash map".to_string(),
        })
    }
}

#[derive(Default)]
struct FakeBackend {
    pushes: Mutex<Vec<String>>,
    fail: AtomicBool,
}

#[async_trait]
impl BackendSyncService for FakeBackend {
    async fn push(&self, problem_url: &str) -> solve_core::Result<Value> {
        self.pushes.lock().expect("lock").push(problem_url.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(SolveError::network("backend", "503 Service Unavailable"));
        }
        Ok(json!({"stored": true}))
    }
}

#[derive(Default)]
struct FakeCodeHost {
    pushes: Mutex<Vec<(CodeHostSubmission, String)>>,
    fail: AtomicBool,
}

#[async_trait]
impl CodeHostService for FakeCodeHost {
    async fn push(
        &self,
        submission: &CodeHostSubmission,
        platform_tag: &str,
    ) -> solve_core::Result<()> {
        self.pushes
            .lock()
            .expect("lock")
            .push((submission.clone(), platform_tag.to_string()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(SolveError::network("code_host", "bad credentials"));
        }
        Ok(())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    successes: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn success(&self, message: &str) {
        self.successes.lock().expect("lock").push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.lock().expect("lock").push(message.to_string());
    }
}

struct Harness {
    engine: SolveEngine,
    store: Arc<MemoryStore>,
    clock: ManualClock,
    extractor: Arc<FakeExtractor>,
    analysis: Arc<RecordingAnalysis>,
    backend: Arc<FakeBackend>,
    code_host: Arc<FakeCodeHost>,
    notifier: Arc<RecordingNotifier>,
}

impl Harness {
    async fn stored(&self) -> ProblemRecord {
        let value = self.store.get_value(URL).await.expect("read store");
        ProblemRecord::from_stored(value)
    }

    async fn send(&mut self, event: PageEvent) -> EventOutcome {
        self.engine.handle_event(event).await
    }
}

fn full_snapshot() -> ProblemSnapshot {
    ProblemSnapshot {
        url: Some(format!("{URL}description/")),
        title: Some("1. Two Sum".to_string()),
        description: Some("Return indices of the two numbers.".to_string()),
        difficulty: Some("Easy".to_string()),
        language: Some("rust".to_string()),
        code: Some(ACCEPTED_CODE.to_string()),
        topics: vec!["Array".to_string(), "Hash Table".to_string()],
    }
}

fn credentialed_config() -> SolveConfig {
    let mut config = SolveConfig::default();
    config.analysis.api_key = Some("sk-test".to_string());
    config
}

async fn harness(config: SolveConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(WriteQueue::new(store.clone()));
    let clock = ManualClock::new(1_700_000_000_000);
    let extractor = Arc::new(FakeExtractor {
        snapshot: Mutex::new(full_snapshot()),
    });
    let analysis = Arc::new(RecordingAnalysis::default());
    let backend = Arc::new(FakeBackend::default());
    let code_host = Arc::new(FakeCodeHost::default());
    let notifier = Arc::new(RecordingNotifier::default());

    let services = SyncServices {
        extractor: extractor.clone(),
        analysis: Some(analysis.clone()),
        backend: backend.clone(),
        code_host: code_host.clone(),
        notifier: notifier.clone(),
    };
    let mut engine = SolveEngine::new(config, queue, Arc::new(clock.clone()), services);
    engine.navigate(&format!("{URL}description/")).await;

    Harness {
        engine,
        store,
        clock,
        extractor,
        analysis,
        backend,
        code_host,
        notifier,
    }
}

fn event(value: Value) -> PageEvent {
    parse_event(value).expect("valid event")
}

fn run_submitted(code: &str) -> PageEvent {
    event(json!({"type": "RUN_SUBMITTED", "payload": {"code": code, "language": "rust"}}))
}

fn run_result(success: bool) -> PageEvent {
    event(json!({"type": "RUN_RESULT", "payload": {"success": success}}))
}

fn submit_submitted(code: &str) -> PageEvent {
    event(json!({
        "type": "SUBMIT_SUBMITTED",
        "payload": {"code": code, "language": "rust", "problemId": "1"}
    }))
}

fn accepted() -> PageEvent {
    event(json!({
        "type": "SUBMIT_RESULT",
        "payload": {
            "success": true,
            "status": "Accepted",
            "totalTestCases": 63,
            "passedTestCases": 63,
            "averageTime": "52 ms",
            "averageMemory": "17.1 MB"
        }
    }))
}

async fn fail_two_runs(h: &mut Harness) {
    for _ in 0..2 {
        h.send(run_submitted(FAILING_CODE)).await;
        h.clock.advance_secs(5);
        h.send(run_result(false)).await;
    }
}

fn synced(outcome: EventOutcome) -> solve_core::PipelineReport {
    match outcome {
        EventOutcome::Synced(report) => report,
        other => panic!("expected pipeline run, got {other:?}"),
    }
}

#[tokio::test]
async fn test_latched_run_with_backend_failure_still_resets() {
    let mut h = harness(credentialed_config()).await;
    h.backend.fail.store(true, Ordering::SeqCst);

    fail_two_runs(&mut h).await;
    assert!(h.engine.tracker().analysis_latched());

    h.send(submit_submitted(ACCEPTED_CODE)).await;
    let report = synced(h.send(accepted()).await);

    assert_eq!(report.terminal(), PipelineStage::Reset);
    assert_eq!(
        report.stages,
        vec![
            PipelineStage::Idle,
            PipelineStage::Extracting,
            PipelineStage::Persisted,
            PipelineStage::Analyzing,
            PipelineStage::BackendSyncing,
            PipelineStage::CodeHostPushing,
            PipelineStage::Reset,
        ]
    );
    assert!(report.analysis.succeeded());
    assert!(matches!(report.backend, StageOutcome::Failed(_)));
    assert!(report.code_host.succeeded());

    let record = h.stored().await;
    assert!(record.is_solved());
    assert!(record.tags.contains("hash-map"));
    assert_eq!(record.name.as_deref(), Some("1. Two Sum"));
    assert_eq!(record.difficulty, Some(0));
    assert_eq!(record.platform.as_deref(), Some("leetcode"));
    let solved = record.solved.expect("solved status");
    assert_eq!(solved.tries, 1);
    let stats = solved.stats.expect("stats");
    assert_eq!(stats.failed_test_cases, Some(0));
    assert_eq!(stats.runtime.as_deref(), Some("52 ms"));

    let errors = h.notifier.errors.lock().expect("lock").clone();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Sync failed"));
    let successes = h.notifier.successes.lock().expect("lock").clone();
    assert!(successes.iter().any(|m| m.contains("Pushed solution")));

    let tracker = h.engine.tracker();
    assert!(tracker.attempts().is_empty());
    assert!(!tracker.analysis_latched());
    assert!(tracker.submission().is_none());
    assert_eq!(tracker.problem_id(), Some(URL));
}

#[tokio::test]
async fn test_analysis_receives_every_viable_attempt_in_order() {
    let mut h = harness(credentialed_config()).await;

    h.send(run_submitted("x")).await;
    fail_two_runs(&mut h).await;
    h.send(submit_submitted(ACCEPTED_CODE)).await;
    h.send(accepted()).await;

    let calls = h.analysis.calls.lock().expect("lock").clone();
    assert_eq!(calls.len(), 1);
    let kinds: Vec<_> = calls[0].iter().map(|a| a.kind).collect();
    assert_eq!(
        kinds,
        vec![AttemptKind::Run, AttemptKind::Run, AttemptKind::Submit]
    );
    let sequence: Vec<_> = calls[0].iter().map(|a| a.sequence_number).collect();
    assert_eq!(sequence, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_missing_title_aborts_before_persisting() {
    let mut h = harness(credentialed_config()).await;
    h.extractor.snapshot.lock().expect("lock").title = None;

    fail_two_runs(&mut h).await;
    h.send(submit_submitted(ACCEPTED_CODE)).await;
    let report = synced(h.send(accepted()).await);

    assert_eq!(report.terminal(), PipelineStage::Aborted);
    assert!(report.error.as_deref().unwrap_or_default().contains("title"));
    assert!(!report.stages.contains(&PipelineStage::Persisted));

    let record = h.stored().await;
    assert!(!record.is_solved());
    assert!(h.backend.pushes.lock().expect("lock").is_empty());
    assert!(h.code_host.pushes.lock().expect("lock").is_empty());

    let tracker = h.engine.tracker();
    assert_eq!(tracker.attempts().len(), 3);
    assert!(tracker.analysis_latched());
    assert!(tracker.submission().is_some());

    // A later accepted submission with a complete page goes through.
    h.extractor.snapshot.lock().expect("lock").title = Some("1. Two Sum".to_string());
    h.send(submit_submitted(ACCEPTED_CODE)).await;
    let report = synced(h.send(accepted()).await);
    assert_eq!(report.terminal(), PipelineStage::Reset);
    assert_eq!(h.stored().await.solved.expect("solved").tries, 2);
}

#[tokio::test]
async fn test_code_host_failure_keeps_state_for_retry() {
    let mut h = harness(SolveConfig::default()).await;
    h.code_host.fail.store(true, Ordering::SeqCst);

    h.send(submit_submitted(ACCEPTED_CODE)).await;
    let report = synced(h.send(accepted()).await);

    assert_eq!(report.terminal(), PipelineStage::AwaitingRetry);
    assert!(h.engine.tracker().submission().is_some());
    assert!(h.stored().await.is_solved());
    let errors = h.notifier.errors.lock().expect("lock").clone();
    assert!(errors.iter().any(|e| e.contains("Code host push failed")));

    h.code_host.fail.store(false, Ordering::SeqCst);
    let retry = h.engine.retry_code_host().await.expect("retry report");
    assert_eq!(retry.terminal(), PipelineStage::Reset);
    assert!(h.engine.tracker().submission().is_none());

    let pushes = h.code_host.pushes.lock().expect("lock").clone();
    assert_eq!(pushes.len(), 2);
    let (submission, platform) = &pushes[1];
    assert_eq!(submission.code, ACCEPTED_CODE);
    assert_eq!(submission.url, URL);
    assert!(submission.record.is_solved());
    assert_eq!(platform, "leetcode");
}

#[tokio::test]
async fn test_disabled_code_host_still_resets() {
    let mut config = SolveConfig::default();
    config.code_host.enabled = false;
    let mut h = harness(config).await;

    h.send(submit_submitted(ACCEPTED_CODE)).await;
    let report = synced(h.send(accepted()).await);

    assert_eq!(report.terminal(), PipelineStage::Reset);
    assert!(!report.stages.contains(&PipelineStage::CodeHostPushing));
    assert!(matches!(report.code_host, StageOutcome::Skipped(_)));
    assert!(h.code_host.pushes.lock().expect("lock").is_empty());
    assert!(h.engine.tracker().attempts().is_empty());
}

#[tokio::test]
async fn test_latched_without_credential_skips_analysis() {
    let mut h = harness(SolveConfig::default()).await;

    fail_two_runs(&mut h).await;
    h.send(submit_submitted(ACCEPTED_CODE)).await;
    let report = synced(h.send(accepted()).await);

    assert!(matches!(report.analysis, StageOutcome::Skipped(_)));
    assert!(!report.stages.contains(&PipelineStage::Analyzing));
    assert!(h.analysis.calls.lock().expect("lock").is_empty());
    assert_eq!(report.terminal(), PipelineStage::Reset);
}

#[tokio::test]
async fn test_analysis_failure_is_silent() {
    let mut h = harness(credentialed_config()).await;
    h.analysis.fail.store(true, Ordering::SeqCst);

    fail_two_runs(&mut h).await;
    h.send(submit_submitted(ACCEPTED_CODE)).await;
    let report = synced(h.send(accepted()).await);

    assert!(matches!(report.analysis, StageOutcome::Failed(_)));
    assert!(h.notifier.errors.lock().expect("lock").is_empty());
    assert_eq!(
        h.backend.pushes.lock().expect("lock").clone(),
        vec![URL.to_string()]
    );
    assert_eq!(report.terminal(), PipelineStage::Reset);
    assert!(h.stored().await.tags.is_empty());
}

#[tokio::test]
async fn test_unlatched_submission_skips_analysis() {
    let mut h = harness(credentialed_config()).await;

    h.send(run_submitted(FAILING_CODE)).await;
    h.send(run_result(false)).await;
    h.send(submit_submitted(ACCEPTED_CODE)).await;
    let report = synced(h.send(accepted()).await);

    assert!(matches!(report.analysis, StageOutcome::Skipped(_)));
    assert!(h.analysis.calls.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn test_run_results_persist_counters() {
    let mut h = harness(SolveConfig::default()).await;

    fail_two_runs(&mut h).await;
    // Third failure does not re-latch or double count.
    h.send(run_submitted(FAILING_CODE)).await;
    h.send(run_result(false)).await;
    h.send(run_result(false)).await;

    let record = h.stored().await;
    assert_eq!(record.run_count, 3);
    assert_eq!(record.run_fail_count, 3);
    assert!(record.analysis_latched);
    assert!(!record.is_solved());
}

#[tokio::test]
async fn test_unanswered_run_is_superseded() {
    let mut h = harness(SolveConfig::default()).await;

    h.send(run_submitted(FAILING_CODE)).await;
    h.send(run_submitted(FAILING_CODE)).await;
    assert_eq!(h.send(run_result(false)).await, EventOutcome::Recorded);
    assert_eq!(
        h.send(run_result(false)).await,
        EventOutcome::Ignored("no pending run".to_string())
    );

    let record = h.stored().await;
    assert_eq!(record.run_count, 2);
    assert_eq!(record.run_fail_count, 1);
    assert!(!record.analysis_latched);
    assert!(!h.engine.tracker().analysis_latched());
}

#[tokio::test]
async fn test_failed_submissions_latch_on_third() {
    let mut h = harness(SolveConfig::default()).await;
    let rejected = || event(json!({"type": "SUBMIT_RESULT", "payload": {"success": false}}));

    for expected in [false, false, true] {
        h.send(submit_submitted(FAILING_CODE)).await;
        assert_eq!(h.send(rejected()).await, EventOutcome::Recorded);
        assert_eq!(h.engine.tracker().analysis_latched(), expected);
    }
    assert_eq!(h.stored().await.submit_fail_count, 3);
}

#[tokio::test]
async fn test_navigation_to_new_problem_discards_tracker() {
    let mut h = harness(SolveConfig::default()).await;
    fail_two_runs(&mut h).await;

    let key = h
        .engine
        .navigate("https://leetcode.com/problems/add-two-numbers/")
        .await;
    assert_eq!(
        key.as_deref(),
        Some("https://leetcode.com/problems/add-two-numbers/")
    );
    assert!(h.engine.tracker().attempts().is_empty());
    assert!(!h.engine.tracker().analysis_latched());

    // Same problem through a different sub-path keeps the tracker.
    h.send(run_submitted(FAILING_CODE)).await;
    h.engine
        .navigate("https://leetcode.com/problems/add-two-numbers/submissions/")
        .await;
    assert_eq!(h.engine.tracker().attempts().len(), 1);
}

#[tokio::test]
async fn test_events_without_problem_are_ignored() {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(WriteQueue::new(store.clone()));
    let services = SyncServices {
        extractor: Arc::new(FakeExtractor {
            snapshot: Mutex::new(full_snapshot()),
        }),
        analysis: None,
        backend: Arc::new(FakeBackend::default()),
        code_host: Arc::new(FakeCodeHost::default()),
        notifier: Arc::new(RecordingNotifier::default()),
    };
    let mut engine = SolveEngine::new(
        SolveConfig::default(),
        queue,
        Arc::new(ManualClock::new(0)),
        services,
    );

    assert!(engine.navigate("https://leetcode.com/problemset/").await.is_none());
    let outcome = engine.handle_event(run_submitted(FAILING_CODE)).await;
    assert!(matches!(outcome, EventOutcome::Ignored(_)));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_invalid_event_is_rejected() {
    let mut h = harness(SolveConfig::default()).await;
    let bad: PageEvent = serde_json::from_value(json!({
        "type": "SUBMIT_SUBMITTED",
        "payload": {"code": ACCEPTED_CODE, "language": "rust"}
    }))
    .expect("decodes");

    match h.send(bad).await {
        EventOutcome::Rejected(info) => assert!(info.message.contains("problemId")),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(h.engine.tracker().attempts().is_empty());
}

#[tokio::test]
async fn test_hidden_time_is_excluded_and_survives_solve() {
    let mut h = harness(SolveConfig::default()).await;

    h.clock.advance_secs(10);
    h.engine.on_visibility_hidden();
    h.clock.advance_secs(10);
    h.engine.on_visibility_visible().await;
    h.clock.advance_secs(10);

    let elapsed = h.engine.timer().elapsed_active_time();
    assert!(elapsed >= Duration::from_secs(19) && elapsed <= Duration::from_secs(21));

    h.send(submit_submitted(ACCEPTED_CODE)).await;
    h.send(accepted()).await;
    h.engine.timer().tick().await;

    let record = h.stored().await;
    assert!(record.is_solved());
    assert_eq!(record.paused_time, Some(10_000));
    assert_eq!(record.start_time, Some(1_700_000_000_000));
}

#[tokio::test]
async fn test_solved_is_sticky_across_later_runs() {
    let mut h = harness(SolveConfig::default()).await;
    h.send(submit_submitted(ACCEPTED_CODE)).await;
    h.send(accepted()).await;
    let first_solved_at = h.stored().await.solved.expect("solved").solved_at;

    h.clock.advance_secs(60);
    h.send(submit_submitted(ACCEPTED_CODE)).await;
    h.send(accepted()).await;

    let solved = h.stored().await.solved.expect("solved");
    assert!(solved.value);
    assert_eq!(solved.solved_at, first_solved_at);
}
