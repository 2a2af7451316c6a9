//! Error types for model loading, inference and response parsing

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures while bringing the model up. Fatal: the service cannot start.
#[derive(Error, Debug, Clone)]
pub enum ModelLoadError {
    #[error("Model file not found: {}", path.display())]
    ModelFileNotFound { path: PathBuf },

    #[error("Tokenizer file not found: {}", path.display())]
    TokenizerNotFound { path: PathBuf },

    #[error("Model file {} is corrupt or unsupported: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error(
        "Model file needs {required_bytes} bytes but only {available_bytes} bytes of memory are available"
    )]
    InsufficientMemory {
        required_bytes: u64,
        available_bytes: u64,
    },

    #[error("Invalid model configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Backend failed to initialize: {reason}")]
    Backend { reason: String },

    #[error("No inference backend compiled in (enable the `gguf` feature)")]
    BackendUnavailable,
}

/// Per-request generation failures. Recoverable: the next request is unaffected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("Model ran out of memory: {reason}")]
    OutOfMemory { reason: String },

    #[error("Prompt needs {prompt_tokens} tokens but the context window is {context_size}")]
    ContextOverflow {
        prompt_tokens: usize,
        context_size: usize,
    },

    #[error("Inference backend failed: {reason}")]
    Backend { reason: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request was cancelled")]
    Cancelled,

    #[error("Inference coordinator is shutting down")]
    ShuttingDown,

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },
}

impl InferenceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::OutOfMemory { .. } => "OUT_OF_MEMORY",
            Self::ContextOverflow { .. } => "CONTEXT_OVERFLOW",
            Self::Backend { .. } => "BACKEND_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::InvalidRequest { .. } => "INVALID_REQUEST",
        }
    }

    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }
}

/// Why a completion could not be turned into detections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailure {
    /// Nothing that looks like an answer: no delimiter and no JSON.
    NoRecognizableAnswer,
    /// A delimiter was found but what follows it is not in any accepted form.
    MalformedAnswer,
    /// No delimiter, and every entry the model reported was unusable.
    NoUsableEntries,
    /// A `<think>` block was still open when the completion ended.
    UnfinishedReasoning,
    /// Generation hit its token limit before writing a delimited answer.
    Truncated,
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NoRecognizableAnswer => "no delimiter and no recognizable structured answer",
            Self::MalformedAnswer => "answer after the delimiter is not in a recognized format",
            Self::NoUsableEntries => "no delimiter and no entry matched the input text",
            Self::UnfinishedReasoning => "completion ended inside an unterminated reasoning block",
            Self::Truncated => "generation hit its token limit before a delimited answer",
        };
        f.write_str(s)
    }
}

/// The model answered, but not in the agreed output contract.
///
/// Keeps the full completion so the failure can be diagnosed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Could not parse model output: {reason}")]
pub struct ParseError {
    pub reason: ParseFailure,
    pub raw_transcript: String,
}

impl ParseError {
    pub fn new(reason: ParseFailure, raw_transcript: impl Into<String>) -> Self {
        Self {
            reason,
            raw_transcript: raw_transcript.into(),
        }
    }
}

/// Everything a single detection request can fail with
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl DetectionError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Inference(_) => "inference_error",
            Self::Parse(_) => "parse_error",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Inference(e) => e.code(),
            Self::Parse(_) => "PARSE_ERROR",
        }
    }
}

/// HTTP server lifecycle errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {address}: {reason}")]
    Bind { address: String, reason: String },

    #[error("Server failed: {reason}")]
    Serve { reason: String },
}
