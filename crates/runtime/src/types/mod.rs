//! Core type definitions for the detection pipeline
//!
//! Requests, detections and the report handed back to callers. Errors live in
//! [`error`].

pub mod error;

pub use error::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Category label for a confirmed Social Security Number.
pub const CATEGORY_SSN: &str = "SSN";

/// Category label for a number that looks like an SSN but is something else.
pub const CATEGORY_SSN_LIKE: &str = "not-SSN-but-similar";

/// Unique identifier for a detection request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "http-api", derive(utoipa::ToSchema))]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether the model may emit a reasoning trace before its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "http-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ReasoningMode {
    #[default]
    Think,
    NoThink,
}

impl ReasoningMode {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            Self::Think
        } else {
            Self::NoThink
        }
    }

    pub fn is_enabled(self) -> bool {
        matches!(self, Self::Think)
    }

    /// Qwen3 soft switch appended to the system turn.
    pub fn soft_switch(self) -> &'static str {
        match self {
            Self::Think => "/think",
            Self::NoThink => "/nothink",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Think => "think",
            Self::NoThink => "nothink",
        }
    }
}

impl fmt::Display for ReasoningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReasoningMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "think" | "true" | "on" => Ok(Self::Think),
            "nothink" | "no_think" | "no-think" | "false" | "off" => Ok(Self::NoThink),
            other => Err(format!(
                "unknown reasoning mode '{}', expected 'think' or 'nothink'",
                other
            )),
        }
    }
}

/// Per-request overrides of the configured decoding defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "http-api", derive(utoipa::ToSchema))]
pub struct DecodingOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Extra stop sequences, added to the template's own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

impl DecodingOverrides {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A single submission to the detection pipeline.
///
/// Immutable once built; the coordinator only ever reads it.
#[derive(Debug, Clone)]
pub struct DetectionRequest {
    id: RequestId,
    text: String,
    mode: ReasoningMode,
    overrides: DecodingOverrides,
    submitted_at: DateTime<Utc>,
}

impl DetectionRequest {
    pub fn new(text: impl Into<String>, mode: ReasoningMode) -> Self {
        Self {
            id: RequestId::new(),
            text: text.into(),
            mode,
            overrides: DecodingOverrides::default(),
            submitted_at: Utc::now(),
        }
    }

    pub fn with_overrides(mut self, overrides: DecodingOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn mode(&self) -> ReasoningMode {
        self.mode
    }

    pub fn overrides(&self) -> &DecodingOverrides {
        &self.overrides
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

/// A span of the input believed to be an SSN (or SSN-like number).
///
/// `start` and `end` are UTF-8 byte offsets into the original input and always
/// fall on character boundaries, so `&input[start..end] == text`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "http-api", derive(utoipa::ToSchema))]
pub struct Detection {
    pub text: String,
    pub start: usize,
    pub end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Detection {
    pub fn is_ssn(&self) -> bool {
        self.category.as_deref() == Some(CATEGORY_SSN)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn overlaps(&self, other: &Detection) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Kinds of non-fatal problems found while parsing model output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "http-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Entries that were malformed or did not occur in the input.
    SkippedEntries,
    /// The model reported findings but none of them could be resolved.
    PartialResult,
    /// Entries dropped because their span repeated or overlapped an earlier one.
    DuplicateSpans,
    /// No delimiter; the whole completion was read as the answer.
    MissingDelimiter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "http-api", derive(utoipa::ToSchema))]
pub struct ParseWarning {
    pub kind: WarningKind,
    pub count: usize,
}

impl ParseWarning {
    pub fn new(kind: WarningKind, count: usize) -> Self {
        Self { kind, count }
    }
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            WarningKind::SkippedEntries => write!(f, "{} malformed entries skipped", self.count),
            WarningKind::PartialResult => write!(
                f,
                "model reported {} findings but none matched the input",
                self.count
            ),
            WarningKind::DuplicateSpans => {
                write!(f, "{} duplicate or overlapping spans dropped", self.count)
            }
            WarningKind::MissingDelimiter => f.write_str("answer delimiter missing"),
        }
    }
}

/// Model output kept for auditability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "http-api", derive(utoipa::ToSchema))]
pub struct Transcript {
    /// Output contract the prompt asked for.
    pub contract: String,
    pub raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// The structured answer region the detections were read from.
    pub answer: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "http-api", derive(utoipa::ToSchema))]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "http-api", derive(utoipa::ToSchema))]
pub struct RequestTiming {
    /// Time spent waiting for the model worker.
    pub queued_ms: u64,
    pub generation_ms: u64,
    pub total_ms: u64,
}

/// Lifecycle of a request inside the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Successful outcome of a detection request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "http-api", derive(utoipa::ToSchema))]
pub struct DetectionReport {
    pub request_id: RequestId,
    pub mode: ReasoningMode,
    /// Ordered by start offset.
    pub detections: Vec<Detection>,
    pub warnings: Vec<ParseWarning>,
    pub transcript: Transcript,
    pub usage: TokenUsage,
    pub timing: RequestTiming,
}

impl DetectionReport {
    pub fn has_ssn(&self) -> bool {
        self.detections.iter().any(Detection::is_ssn)
    }
}

/// What the coordinator hands back for every request.
pub type InferenceResult = Result<DetectionReport, DetectionError>;
