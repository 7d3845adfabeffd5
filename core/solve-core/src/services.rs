//! Collaborator contracts consumed by the sync pipeline.
//!
//! Page scraping, the analysis API, the backend and the code host all live
//! outside this crate; the pipeline only sees these traits.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::error::{Result, SolveError};
use crate::record::{canonical_problem_url, Difficulty, ProblemRecord};
use crate::tracker::{Attempt, SubmissionContext};

/// Problem context as scraped from the page. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProblemSnapshot {
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub difficulty: Option<String>,
    pub language: Option<String>,
    pub code: Option<String>,
    pub topics: Vec<String>,
}

/// Snapshot with the fields the pipeline cannot do without.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemContext {
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(skip)]
    pub difficulty: Option<Difficulty>,
    pub language: Option<String>,
    pub code: String,
    pub topics: Vec<String>,
}

impl ProblemSnapshot {
    /// Fills gaps from the captured submission and the active session key,
    /// then checks that title, code and a problem URL are present.
    pub fn complete(
        self,
        submission: Option<&SubmissionContext>,
        session_key: Option<&str>,
    ) -> Result<ProblemContext> {
        let url = self
            .url
            .as_deref()
            .and_then(canonical_problem_url)
            .or_else(|| session_key.map(str::to_string));
        let title = non_empty(self.title);
        let code = non_empty(self.code).or_else(|| submission.map(|s| s.code.clone()));
        let code = non_empty(code);
        let language = non_empty(self.language).or_else(|| submission.map(|s| s.language.clone()));

        let mut missing = Vec::new();
        if title.is_none() {
            missing.push("title");
        }
        if code.is_none() {
            missing.push("code");
        }
        if url.is_none() {
            missing.push("url");
        }

        match (url, title, code) {
            (Some(url), Some(title), Some(code)) => Ok(ProblemContext {
                url,
                title,
                description: non_empty(self.description),
                difficulty: self.difficulty.as_deref().and_then(Difficulty::from_label),
                language,
                code,
                topics: self.topics,
            }),
            _ => Err(SolveError::ExtractionIncomplete { missing }),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisResult {
    pub tags: BTreeSet<String>,
    pub summary: String,
}

/// What the code host receives: the stored record plus the accepted code.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeHostSubmission {
    pub url: String,
    pub record: ProblemRecord,
    pub code: String,
    pub language: Option<String>,
}

#[async_trait]
pub trait ProblemExtractor: Send + Sync {
    async fn extract(&self) -> ProblemSnapshot;
}

#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, attempts: &[Attempt], context: &ProblemContext)
        -> Result<AnalysisResult>;
}

#[async_trait]
pub trait BackendSyncService: Send + Sync {
    async fn push(&self, problem_url: &str) -> Result<Value>;
}

#[async_trait]
pub trait CodeHostService: Send + Sync {
    async fn push(&self, submission: &CodeHostSubmission, platform_tag: &str) -> Result<()>;
}

/// User-facing notifications. Fire-and-forget.
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

/// Notifier that writes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn success(&self, message: &str) {
        info!(notification = %message, "Notify success");
    }

    fn error(&self, message: &str) {
        error!(notification = %message, "Notify error");
    }
}
