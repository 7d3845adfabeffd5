//! Persisted problem records.
//!
//! One record per canonical problem URL. Writers never replace a record
//! wholesale: each one loads the stored value, changes its own fields and
//! writes the rest back untouched, including fields this crate does not know
//! about (kept in `extra`).

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use solvesync_protocol::EventPayload;
use tracing::warn;

use crate::timer::Session;
use crate::tracker::TrackerCounters;

static PROBLEM_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i:https?)://([^/?#]+)/problems/([^/?#]+)").expect("problem url pattern")
});

/// Normalizes any URL under a problem page to `https://host/problems/<slug>/`.
/// Returns `None` for URLs that are not problem pages.
pub fn canonical_problem_url(url: &str) -> Option<String> {
    let captures = PROBLEM_URL.captures(url.trim())?;
    let host = captures.get(1)?.as_str().to_ascii_lowercase();
    let slug = captures.get(2)?.as_str();
    Some(format!("https://{}/problems/{}/", host, slug))
}

/// Writes `startTime`/`pausedTime` into a stored value without decoding the
/// rest of it. Non-object values are replaced.
pub fn merge_timer_fields(current: Option<Value>, session: &Session) -> Value {
    let mut fields = match current {
        Some(Value::Object(fields)) => fields,
        _ => Map::new(),
    };
    fields.insert("startTime".to_string(), Value::from(session.start_time));
    fields.insert("pausedTime".to_string(), Value::from(session.paused_time));
    Value::Object(fields)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }

    pub fn as_index(self) -> u8 {
        match self {
            Difficulty::Easy => 0,
            Difficulty::Medium => 1,
            Difficulty::Hard => 2,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Difficulty::Easy),
            1 => Some(Difficulty::Medium),
            2 => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

/// Judge statistics attached to an accepted submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed_test_cases: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_test_cases: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl SubmissionStats {
    pub fn from_payload(payload: &EventPayload) -> Option<Self> {
        let stats = SubmissionStats {
            status: payload.status.clone(),
            passed_test_cases: payload.passed_test_cases,
            failed_test_cases: match (payload.total_test_cases, payload.passed_test_cases) {
                (Some(total), Some(passed)) => Some(total.saturating_sub(passed)),
                _ => None,
            },
            runtime: payload.average_time.as_ref().map(ToString::to_string),
            memory: payload.average_memory.as_ref().map(ToString::to_string),
        };
        if stats == SubmissionStats::default() {
            None
        } else {
            Some(stats)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolvedStatus {
    pub value: bool,
    #[serde(default)]
    pub tries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solved_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<SubmissionStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solved: Option<SolvedStatus>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_time: Option<i64>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub analysis_latched: bool,
    #[serde(default)]
    pub run_count: u32,
    #[serde(default)]
    pub run_fail_count: u32,
    #[serde(default)]
    pub submit_fail_count: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Moves `key` out of `fields` into `slot` if it decodes. An unreadable value
/// is logged and dropped; `slot` keeps its default.
fn take_field<T: DeserializeOwned>(
    fields: &mut Map<String, Value>,
    key: &'static str,
    slot: &mut T,
) {
    let Some(raw) = fields.remove(key) else {
        return;
    };
    match serde_json::from_value(raw) {
        Ok(value) => *slot = value,
        Err(err) => warn!(field = key, error = %err, "Dropping unreadable record field"),
    }
}

impl SolvedStatus {
    fn from_stored(value: Value) -> Option<Self> {
        let Value::Object(mut fields) = value else {
            warn!(field = "solved", "Dropping non-object solved status");
            return None;
        };
        let mut status = SolvedStatus::default();
        take_field(&mut fields, "value", &mut status.value);
        take_field(&mut fields, "tries", &mut status.tries);
        take_field(&mut fields, "solvedAt", &mut status.solved_at);
        take_field(&mut fields, "stats", &mut status.stats);
        Some(status)
    }
}

impl ProblemRecord {
    /// Decodes a stored value field by field. A field of the wrong type is
    /// logged and left at its default; every readable field, known or not,
    /// is kept.
    pub fn from_stored(value: Option<Value>) -> Self {
        let mut fields = match value {
            None | Some(Value::Null) => return ProblemRecord::default(),
            Some(Value::Object(fields)) => fields,
            Some(other) => {
                warn!(value = %other, "Stored problem record is not an object; starting fresh");
                return ProblemRecord::default();
            }
        };

        let mut record = ProblemRecord::default();
        take_field(&mut fields, "name", &mut record.name);
        take_field(&mut fields, "platform", &mut record.platform);
        take_field(&mut fields, "difficulty", &mut record.difficulty);
        record.solved = match fields.remove("solved") {
            None | Some(Value::Null) => None,
            Some(solved) => SolvedStatus::from_stored(solved),
        };
        take_field(&mut fields, "topics", &mut record.topics);
        take_field(&mut fields, "language", &mut record.language);
        take_field(&mut fields, "startTime", &mut record.start_time);
        take_field(&mut fields, "pausedTime", &mut record.paused_time);
        take_field(&mut fields, "tags", &mut record.tags);
        take_field(&mut fields, "summary", &mut record.summary);
        take_field(&mut fields, "analysisLatched", &mut record.analysis_latched);
        take_field(&mut fields, "runCount", &mut record.run_count);
        take_field(&mut fields, "runFailCount", &mut record.run_fail_count);
        take_field(&mut fields, "submitFailCount", &mut record.submit_fail_count);
        record.extra = fields;
        record
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|err| {
            warn!(error = %err, "Failed to encode problem record");
            Value::Object(Map::new())
        })
    }

    pub fn is_solved(&self) -> bool {
        self.solved.as_ref().map(|s| s.value).unwrap_or(false)
    }

    pub fn difficulty(&self) -> Option<Difficulty> {
        self.difficulty.and_then(Difficulty::from_index)
    }

    /// Records a solved/unsolved outcome. `solved.value` is sticky: once true,
    /// a later `false` only refreshes `tries`.
    pub fn set_solved(
        &mut self,
        value: bool,
        tries: u32,
        now_ms: i64,
        stats: Option<SubmissionStats>,
    ) {
        let previous = self.solved.take().unwrap_or_default();
        let keep_solved = previous.value && !value;
        let status = if keep_solved {
            SolvedStatus {
                tries,
                ..previous
            }
        } else if value {
            SolvedStatus {
                value: true,
                tries,
                solved_at: previous.solved_at.or(Some(now_ms)),
                stats: stats.or(previous.stats),
            }
        } else {
            SolvedStatus {
                value: false,
                tries,
                solved_at: None,
                stats: None,
            }
        };
        self.solved = Some(status);
    }

    pub fn apply_timer(&mut self, session: &Session) {
        self.start_time = Some(session.start_time);
        self.paused_time = Some(session.paused_time);
    }

    pub fn apply_counters(&mut self, counters: &TrackerCounters) {
        self.run_count = counters.run_count;
        self.run_fail_count = counters.run_fail_count;
        self.submit_fail_count = counters.submit_fail_count;
        // Mirrors the tracker, so a reset clears the stored latch too.
        self.analysis_latched = counters.analysis_latched;
    }

    pub fn apply_analysis(&mut self, tags: &BTreeSet<String>, summary: &str) {
        self.tags.extend(tags.iter().cloned());
        self.summary = Some(summary.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_url_strips_subpaths_and_query() {
        assert_eq!(
            canonical_problem_url("https://LeetCode.com/problems/two-sum/description/?envType=daily"),
            Some("https://leetcode.com/problems/two-sum/".to_string())
        );
        assert_eq!(
            canonical_problem_url("http://leetcode.com/problems/two-sum"),
            Some("https://leetcode.com/problems/two-sum/".to_string())
        );
        assert_eq!(canonical_problem_url("https://leetcode.com/contest/"), None);
    }

    #[test]
    fn difficulty_labels_map_to_indices() {
        assert_eq!(Difficulty::from_label(" Medium ").map(Difficulty::as_index), Some(1));
        assert_eq!(Difficulty::from_label("HARD"), Some(Difficulty::Hard));
        assert_eq!(Difficulty::from_label("unknown"), None);
        assert_eq!(Difficulty::from_index(0), Some(Difficulty::Easy));
    }

    #[test]
    fn solved_is_sticky() {
        let mut record = ProblemRecord::default();
        record.set_solved(true, 2, 1_000, None);
        record.set_solved(false, 3, 2_000, None);

        let solved = record.solved.as_ref().expect("solved status");
        assert!(solved.value);
        assert_eq!(solved.tries, 3);
        assert_eq!(solved.solved_at, Some(1_000));
    }

    #[test]
    fn resolving_keeps_first_solved_time_and_new_stats() {
        let mut record = ProblemRecord::default();
        record.set_solved(true, 1, 1_000, None);
        let stats = SubmissionStats {
            runtime: Some("4 ms".to_string()),
            ..SubmissionStats::default()
        };
        record.set_solved(true, 2, 5_000, Some(stats.clone()));

        let solved = record.solved.expect("solved status");
        assert_eq!(solved.solved_at, Some(1_000));
        assert_eq!(solved.stats, Some(stats));
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let stored = json!({
            "name": "Two Sum",
            "solved": {"value": true, "tries": 1},
            "notes": "use a hash map",
            "startTime": 10
        });
        let mut record = ProblemRecord::from_stored(Some(stored));
        record.paused_time = Some(5);

        let value = record.to_value();
        assert_eq!(value["notes"], json!("use a hash map"));
        assert_eq!(value["startTime"], json!(10));
        assert_eq!(value["pausedTime"], json!(5));
        assert_eq!(value["solved"]["value"], json!(true));
    }

    #[test]
    fn timer_merge_touches_only_timer_fields() {
        let session = Session {
            session_id: "k".to_string(),
            start_time: 100,
            paused_time: 7,
            hidden_since: None,
        };
        let merged = merge_timer_fields(Some(json!({"tags": 42, "startTime": 1})), &session);
        assert_eq!(merged, json!({"tags": 42, "startTime": 100, "pausedTime": 7}));
        assert_eq!(
            merge_timer_fields(Some(json!("garbage")), &session),
            json!({"startTime": 100, "pausedTime": 7})
        );
    }

    #[test]
    fn wrongly_typed_field_keeps_the_rest_of_the_record() {
        let record = ProblemRecord::from_stored(Some(json!({
            "name": "Two Sum",
            "solved": {"value": true, "tries": "two", "solvedAt": 1_000},
            "topics": null,
            "tags": 42,
            "startTime": 1_000,
            "notes": "keep me"
        })));

        assert_eq!(record.name.as_deref(), Some("Two Sum"));
        assert!(record.is_solved());
        let solved = record.solved.as_ref().expect("solved status");
        assert_eq!(solved.tries, 0);
        assert_eq!(solved.solved_at, Some(1_000));
        assert!(record.topics.is_empty());
        assert!(record.tags.is_empty());
        assert_eq!(record.start_time, Some(1_000));
        assert_eq!(record.extra.get("notes"), Some(&json!("keep me")));
        assert!(!record.extra.contains_key("topics"));

        assert_eq!(ProblemRecord::from_stored(Some(Value::Null)), ProblemRecord::default());
        assert_eq!(ProblemRecord::from_stored(Some(json!("garbage"))), ProblemRecord::default());
    }

    #[tokio::test]
    async fn counter_write_over_bad_field_keeps_solved_and_notes() {
        use crate::store::{MemoryStore, PersistentStore, WriteQueue};
        use std::collections::HashMap;
        use std::sync::Arc;

        const KEY: &str = "https://leetcode.com/problems/two-sum/";
        let store = Arc::new(MemoryStore::new());
        store
            .set(HashMap::from([(
                KEY.to_string(),
                json!({
                    "name": "Two Sum",
                    "solved": {"value": true, "tries": 2},
                    "topics": null,
                    "notes": "keep me"
                }),
            )]))
            .await
            .expect("seed");
        let queue = WriteQueue::new(store.clone());

        let counters = TrackerCounters {
            run_count: 1,
            ..TrackerCounters::default()
        };
        queue
            .update(KEY, |current| {
                let mut record = ProblemRecord::from_stored(current);
                record.apply_counters(&counters);
                record.to_value()
            })
            .await
            .expect("update");

        let stored = store.get_value(KEY).await.expect("get").expect("record");
        assert_eq!(stored["solved"]["value"], json!(true));
        assert_eq!(stored["solved"]["tries"], json!(2));
        assert_eq!(stored["notes"], json!("keep me"));
        assert_eq!(stored["name"], json!("Two Sum"));
        assert_eq!(stored["runCount"], json!(1));
    }

    #[test]
    fn stored_latch_follows_tracker() {
        let mut record = ProblemRecord::from_stored(Some(json!({"analysisLatched": true})));
        record.apply_counters(&TrackerCounters::default());
        assert!(!record.analysis_latched);

        record.apply_counters(&TrackerCounters {
            analysis_latched: true,
            ..TrackerCounters::default()
        });
        assert!(record.analysis_latched);
    }

    #[test]
    fn analysis_merges_tags() {
        let mut record = ProblemRecord::default();
        record.tags.insert("hash-map".to_string());
        let tags = BTreeSet::from(["off-by-one".to_string(), "hash-map".to_string()]);
        record.apply_analysis(&tags, "Check loop bounds");

        assert_eq!(record.tags.len(), 2);
        assert_eq!(record.summary.as_deref(), Some("Check loop bounds"));
    }

    #[test]
    fn submission_stats_from_payload() {
        let payload = EventPayload {
            status: Some("Accepted".to_string()),
            total_test_cases: Some(10),
            passed_test_cases: Some(10),
            average_time: Some(solvesync_protocol::Measurement::Text("3 ms".to_string())),
            ..EventPayload::default()
        };
        let stats = SubmissionStats::from_payload(&payload).expect("stats");
        assert_eq!(stats.failed_test_cases, Some(0));
        assert_eq!(stats.runtime.as_deref(), Some("3 ms"));
        assert!(SubmissionStats::from_payload(&EventPayload::default()).is_none());
    }
}
