//! Model management for SSN Sentinel
//!
//! - [`ModelRuntime`]: the synchronous generation seam the coordinator drives
//! - [`ModelHandle`]: the candle-backed GGUF implementation (feature `gguf`)
//! - [`resources`]: memory checks run before any weights are read

pub mod resources;
pub mod runners;

#[cfg(feature = "gguf")]
pub mod gguf;

#[cfg(feature = "gguf")]
pub use gguf::ModelHandle;
pub use runners::{
    classify_backend_error, find_stop_in_tail, find_stop_sequence, DecodingConfig, FinishReason,
    Generation, ModelRuntime, RuntimeInfo,
};

use crate::config::ModelConfig;
use crate::types::ModelLoadError;

/// Load the configured model with whichever backend was compiled in.
pub fn load_runtime(config: &ModelConfig) -> Result<Box<dyn ModelRuntime>, ModelLoadError> {
    #[cfg(feature = "gguf")]
    {
        let handle = ModelHandle::load(config)?;
        Ok(Box::new(handle))
    }

    #[cfg(not(feature = "gguf"))]
    {
        let _ = config;
        Err(ModelLoadError::BackendUnavailable)
    }
}
