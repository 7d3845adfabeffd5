//! Run/submit classification and the analysis latch.
//!
//! ```text
//! per attempt:   Pending ──result──▶ Success | Fail      (exactly once)
//!                 Pending ──next run──▶ Superseded        (runs only)
//! aggregate:     BelowThreshold ──fail count hits threshold──▶ Latched
//! ```
//!
//! Run failures and cumulative submit failures are counted separately and
//! each has its own threshold; whichever is reached first latches analysis.
//! The latch never fires twice for the same problem. A new problem identity
//! replaces the whole tracker.

use serde::Serialize;
use tracing::{debug, info};

use crate::config::TrackerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptKind {
    Run,
    Submit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Pending,
    Success,
    Fail,
    /// A later run was started before this one got a result. Never counts
    /// as a failure.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub code: String,
    pub language: String,
    pub timestamp: i64,
    pub kind: AttemptKind,
    pub sequence_number: u32,
    pub outcome: AttemptOutcome,
}

/// Code, language and problem id captured from the latest submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionContext {
    pub code: String,
    pub language: String,
    pub problem_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerCounters {
    pub run_count: u32,
    pub submit_count: u32,
    pub run_fail_count: u32,
    pub submit_fail_count: u32,
    pub analysis_latched: bool,
}

/// What a classified result did to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultOutcome {
    /// Sequence number of the attempt that was resolved, if one was pending.
    pub resolved: Option<u32>,
    /// True only on the call that flipped the latch.
    pub latched_now: bool,
}

#[derive(Debug, Clone)]
pub struct AttemptTracker {
    config: TrackerConfig,
    problem_id: Option<String>,
    attempts: Vec<Attempt>,
    next_sequence: u32,
    counters: TrackerCounters,
    submission: Option<SubmissionContext>,
}

impl AttemptTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            problem_id: None,
            attempts: Vec::new(),
            next_sequence: 1,
            counters: TrackerCounters::default(),
            submission: None,
        }
    }

    pub fn for_problem(config: TrackerConfig, problem_id: &str) -> Self {
        let mut tracker = Self::new(config);
        tracker.problem_id = Some(problem_id.to_string());
        tracker
    }

    pub fn problem_id(&self) -> Option<&str> {
        self.problem_id.as_deref()
    }

    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    pub fn counters(&self) -> TrackerCounters {
        self.counters
    }

    pub fn analysis_latched(&self) -> bool {
        self.counters.analysis_latched
    }

    pub fn submission(&self) -> Option<&SubmissionContext> {
        self.submission.as_ref()
    }

    /// Number of submissions made for the current problem, counting at least
    /// the one being recorded.
    pub fn tries(&self) -> u32 {
        self.counters.submit_count.max(1)
    }

    /// Switches to `problem_id`, discarding all state if it differs from the
    /// tracked problem. Returns true when the tracker was replaced.
    pub fn observe_problem(&mut self, problem_id: &str) -> bool {
        if self.problem_id.as_deref() == Some(problem_id) {
            return false;
        }
        debug!(
            previous = ?self.problem_id,
            problem_id = %problem_id,
            "Problem identity changed; discarding attempt state"
        );
        *self = Self::for_problem(self.config, problem_id);
        true
    }

    pub fn on_run_event(&mut self, code: &str, language: &str, now_ms: i64) -> Option<u32> {
        self.counters.run_count += 1;
        self.supersede_pending_runs();
        self.record_attempt(AttemptKind::Run, code, language, now_ms)
    }

    pub fn on_run_result(&mut self, success: bool) -> ResultOutcome {
        let resolved = self.resolve_latest(AttemptKind::Run, success);
        let mut latched_now = false;
        match resolved {
            Some(_) if !success => {
                self.counters.run_fail_count += 1;
                latched_now = self.maybe_latch(
                    self.counters.run_fail_count,
                    self.config.run_failure_threshold,
                    "run",
                );
            }
            Some(_) => {}
            None => debug!(success, "Run result with no pending run attempt"),
        }
        ResultOutcome {
            resolved,
            latched_now,
        }
    }

    pub fn on_submit_event(&mut self, code: &str, language: &str, problem_id: &str, now_ms: i64) {
        self.counters.submit_count += 1;
        self.submission = Some(SubmissionContext {
            code: code.to_string(),
            language: language.to_string(),
            problem_id: problem_id.to_string(),
        });
        self.record_attempt(AttemptKind::Submit, code, language, now_ms);
    }

    pub fn on_submit_result(&mut self, success: bool) -> ResultOutcome {
        let resolved = self.resolve_latest(AttemptKind::Submit, success);
        let mut latched_now = false;
        if !success {
            self.counters.submit_fail_count += 1;
            latched_now = self.maybe_latch(
                self.counters.submit_fail_count,
                self.config.submit_failure_threshold,
                "submit",
            );
        }
        ResultOutcome {
            resolved,
            latched_now,
        }
    }

    /// Attempts worth sending for analysis: every attempt above the minimum
    /// code length, in the order they were made, whatever their outcome.
    pub fn analysis_attempts(&self) -> Vec<Attempt> {
        self.attempts
            .iter()
            .filter(|attempt| self.is_viable(&attempt.code))
            .cloned()
            .collect()
    }

    /// Clears transient state (attempts, counters, latch, captured submission)
    /// while keeping the problem identity.
    pub fn clear_transient(&mut self) {
        let problem_id = self.problem_id.take();
        *self = Self::new(self.config);
        self.problem_id = problem_id;
    }

    fn is_viable(&self, code: &str) -> bool {
        code.trim().chars().count() > self.config.min_code_length
    }

    fn record_attempt(
        &mut self,
        kind: AttemptKind,
        code: &str,
        language: &str,
        now_ms: i64,
    ) -> Option<u32> {
        if !self.is_viable(code) {
            debug!(?kind, len = code.len(), "Discarding near-empty code capture");
            return None;
        }
        let sequence_number = self.next_sequence;
        self.next_sequence += 1;
        self.attempts.push(Attempt {
            code: code.to_string(),
            language: language.to_string(),
            timestamp: now_ms,
            kind,
            sequence_number,
            outcome: AttemptOutcome::Pending,
        });
        Some(sequence_number)
    }

    // At most one run is pending; a new run event retires the older one.
    fn supersede_pending_runs(&mut self) {
        for attempt in self.attempts.iter_mut().filter(|attempt| {
            attempt.kind == AttemptKind::Run && attempt.outcome == AttemptOutcome::Pending
        }) {
            attempt.outcome = AttemptOutcome::Superseded;
            debug!(sequence_number = attempt.sequence_number, "Run attempt superseded");
        }
    }

    // Matches by recency: the newest pending attempt of this kind.
    fn resolve_latest(&mut self, kind: AttemptKind, success: bool) -> Option<u32> {
        let attempt = self
            .attempts
            .iter_mut()
            .rev()
            .find(|attempt| attempt.kind == kind && attempt.outcome == AttemptOutcome::Pending)?;
        attempt.outcome = if success {
            AttemptOutcome::Success
        } else {
            AttemptOutcome::Fail
        };
        Some(attempt.sequence_number)
    }

    fn maybe_latch(&mut self, count: u32, threshold: u32, source: &'static str) -> bool {
        if self.counters.analysis_latched || count < threshold {
            return false;
        }
        self.counters.analysis_latched = true;
        info!(
            problem_id = ?self.problem_id,
            source,
            count,
            threshold,
            "Analysis latched"
        );
        true
    }
}
