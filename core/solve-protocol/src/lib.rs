//! Page event and bridge envelope types for solvesync.
//!
//! This crate is shared by the page-observation layer and the tracker core so
//! both sides agree on the event schema. The core remains the authority on
//! validation, but producers can reuse the same types to build valid events.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_EVENT_BYTES: usize = 512 * 1024;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Page events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    RunSubmitted,
    RunResult,
    SubmitSubmitted,
    SubmitResult,
}

impl EventType {
    pub fn is_result(&self) -> bool {
        matches!(self, EventType::RunResult | EventType::SubmitResult)
    }
}

/// Runtime or memory figure reported by the judge. Pages report these either
/// as display strings ("52 ms") or bare numbers.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Measurement {
    Number(f64),
    Text(String),
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measurement::Number(value) => write!(f, "{}", value),
            Measurement::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub problem_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_test_cases: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed_test_cases: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_time: Option<Measurement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_memory: Option<Measurement>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PageEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub payload: EventPayload,
}

impl PageEvent {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        match self.event_type {
            EventType::RunSubmitted => {
                require_present(&self.payload.code, "code")?;
                require_string(&self.payload.language, "language")?;
            }
            EventType::SubmitSubmitted => {
                require_present(&self.payload.code, "code")?;
                require_string(&self.payload.language, "language")?;
                require_string(&self.payload.problem_id, "problemId")?;
            }
            EventType::RunResult | EventType::SubmitResult => {
                require_bool(&self.payload.success, "success")?;
                if let (Some(total), Some(passed)) = (
                    self.payload.total_test_cases,
                    self.payload.passed_test_cases,
                ) {
                    if passed > total {
                        return Err(ErrorInfo::new(
                            "invalid_counts",
                            "passedTestCases cannot exceed totalTestCases",
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn succeeded(&self) -> bool {
        self.payload.success.unwrap_or(false)
    }
}

pub fn parse_event(value: Value) -> Result<PageEvent, ErrorInfo> {
    let event: PageEvent = serde_json::from_value(value).map_err(|err| {
        ErrorInfo::new(
            "invalid_event",
            format!("event payload is invalid JSON: {}", err),
        )
    })?;
    event.validate()?;
    Ok(event)
}

pub fn parse_event_line(line: &str) -> Result<PageEvent, ErrorInfo> {
    if line.len() > MAX_EVENT_BYTES {
        return Err(ErrorInfo::new(
            "event_too_large",
            "event exceeded maximum size",
        ));
    }
    if line.trim().is_empty() {
        return Err(ErrorInfo::new("empty_event", "event body was empty"));
    }
    let value: Value = serde_json::from_str(line).map_err(|err| {
        ErrorInfo::new("invalid_json", format!("event was not valid JSON: {}", err))
    })?;
    parse_event(value)
}

fn require_present(value: &Option<String>, field: &str) -> Result<(), ErrorInfo> {
    match value {
        Some(_) => Ok(()),
        None => Err(ErrorInfo::new(
            "missing_field",
            format!("{} is required", field),
        )),
    }
}

fn require_string(value: &Option<String>, field: &str) -> Result<(), ErrorInfo> {
    if let Some(candidate) = value {
        if !candidate.trim().is_empty() {
            return Ok(());
        }
    }
    Err(ErrorInfo::new(
        "missing_field",
        format!("{} is required", field),
    ))
}

fn require_bool(value: &Option<bool>, field: &str) -> Result<(), ErrorInfo> {
    match value {
        Some(_) => Ok(()),
        None => Err(ErrorInfo::new(
            "missing_field",
            format!("{} is required", field),
        )),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bridge envelopes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BridgeMethod {
    Handshake,
    PushProblem,
}

/// Request sent across the page bridge. `id` correlates the response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BridgeRequest {
    pub protocol_version: u32,
    pub id: String,
    pub method: BridgeMethod,
    #[serde(default)]
    pub params: Option<Value>,
}

impl BridgeRequest {
    pub fn new(id: impl Into<String>, method: BridgeMethod, params: Option<Value>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            id: id.into(),
            method,
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeResponse {
    pub ok: bool,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl BridgeResponse {
    pub fn ok(id: impl Into<String>, data: Value) -> Self {
        Self {
            ok: true,
            id: id.into(),
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: impl Into<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id: id.into(),
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }
}
