//! HTTP API specific data structures
//!
//! Detection results go over the wire as [`DetectionReport`] unmodified; the
//! types here only cover request bodies, the guard verdict, health and errors.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::coordinator::StatsSnapshot;
use crate::models::RuntimeInfo;
use crate::types::{
    DecodingOverrides, Detection, DetectionError, InferenceError, ReasoningMode, RequestId,
};

/// Message returned by the guard endpoint when an SSN is found
pub const BLOCKED_MESSAGE: &str = "Sensitive SSN is detected, and the query is blocked.";

/// Request body for `/api/v1/detect` and `/api/v1/guard`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DetectRequestBody {
    /// Text to examine
    pub text: String,
    /// Reasoning mode; the server default applies when absent
    #[serde(default)]
    pub mode: Option<ReasoningMode>,
    /// Per-request decoding overrides
    #[serde(default)]
    pub decoding: Option<DecodingOverrides>,
}

/// Verdict of the guard endpoint
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GuardResponse {
    pub request_id: RequestId,
    /// True when at least one detection is categorized as an SSN
    pub blocked: bool,
    /// Set only when the query is blocked
    pub message: Option<String>,
    pub detections: Vec<Detection>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Overall system status
    pub status: String,
    /// System uptime in seconds
    pub uptime_seconds: u64,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Version information
    pub version: String,
    pub model: RuntimeInfo,
    pub coordinator: StatsSnapshot,
}

/// Error response structure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    pub code: String,
    /// `inference_error` or `parse_error` for detection failures
    pub kind: Option<String>,
    /// Optional details
    pub details: Option<serde_json::Value>,
}

impl From<&DetectionError> for ErrorResponse {
    fn from(err: &DetectionError) -> Self {
        let details = match err {
            DetectionError::Parse(parse) => Some(serde_json::json!({
                "reason": parse.reason.to_string(),
                "raw_transcript": parse.raw_transcript,
            })),
            DetectionError::Inference(InferenceError::ContextOverflow {
                prompt_tokens,
                context_size,
            }) => Some(serde_json::json!({
                "prompt_tokens": prompt_tokens,
                "context_size": context_size,
            })),
            DetectionError::Inference(InferenceError::Timeout(after)) => Some(serde_json::json!({
                "timeout_ms": after.as_millis() as u64,
            })),
            DetectionError::Inference(_) => None,
        };

        Self {
            error: err.to_string(),
            code: err.code().to_string(),
            kind: Some(err.kind().to_string()),
            details,
        }
    }
}
