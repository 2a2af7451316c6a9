//! SSN Sentinel Runtime
//!
//! The inference-serving core of SSN Sentinel. It asks a locally loaded
//! reasoning model to find Social Security Numbers (and numbers that merely
//! look like them) in free text, turns the model's answer into structured
//! detections with byte offsets, and serializes access to the single loaded
//! model across any number of concurrent callers.
//!
//! The pieces, bottom-up:
//!
//! - [`types`]: requests, detections, reports and the error taxonomy
//! - [`config`]: layered configuration (defaults, TOML file, environment)
//! - [`models`]: the [`ModelRuntime`](models::ModelRuntime) seam and the GGUF backend
//! - [`detection`]: prompt construction and response parsing
//! - [`coordinator`]: the single-owner request queue in front of the model
//! - `api`: the optional HTTP front end (feature `http-api`)

pub mod config;
pub mod coordinator;
pub mod detection;
pub mod models;
pub mod types;

#[cfg(feature = "http-api")]
pub mod api;

// Re-export commonly used types
pub use config::{ConfigError, SentinelConfig};
pub use coordinator::{DetectionService, InferenceCoordinator, StatsSnapshot};
pub use detection::{Detector, PromptBuilder, ResponseParser};
pub use models::{load_runtime, DecodingConfig, Generation, ModelRuntime, RuntimeInfo};
pub use types::*;

#[cfg(feature = "http-api")]
pub use api::{HttpApiConfig, HttpApiServer};
