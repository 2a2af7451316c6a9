//! Model runtime abstraction for in-process text generation
//!
//! This module provides the [`ModelRuntime`] trait, the single seam between the
//! inference coordinator and whatever backend actually produces tokens.
//!
//! # Ownership
//!
//! A runtime is driven through `&mut self` and is only required to be `Send`.
//! The coordinator moves it into its worker thread, which becomes the sole
//! owner, so no two generations can ever touch the same weights at once.
//!
//! # Adding New Runtimes
//!
//! 1. Implement [`ModelRuntime`]
//! 2. Poll the cancellation probe between token steps
//! 3. Map backend failures through [`classify_backend_error`]
//! 4. Truncate stop sequences out of the returned text with [`find_stop_sequence`]

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::DecodingDefaults;
use crate::types::{DecodingOverrides, InferenceError, ReasoningMode};

/// Decoding parameters for one generation
#[derive(Debug, Clone, PartialEq)]
pub struct DecodingConfig {
    /// Cap on generated tokens
    pub max_tokens: u32,
    /// 0.0 selects greedy decoding
    pub temperature: f32,
    pub top_p: Option<f64>,
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
    pub seed: u64,
    /// Generation ends as soon as any of these appears; the match is not returned
    pub stop_sequences: Vec<String>,
    /// Whether the model may reason before answering
    pub reasoning_enabled: bool,
}

impl Default for DecodingConfig {
    fn default() -> Self {
        Self::from_defaults(&DecodingDefaults::default(), ReasoningMode::default())
    }
}

impl DecodingConfig {
    pub fn from_defaults(defaults: &DecodingDefaults, mode: ReasoningMode) -> Self {
        Self {
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            top_p: defaults.top_p,
            repeat_penalty: defaults.repeat_penalty,
            repeat_last_n: defaults.repeat_last_n,
            seed: defaults.seed,
            stop_sequences: defaults.stop_sequences.clone(),
            reasoning_enabled: mode.is_enabled(),
        }
    }

    /// Apply a request's overrides, rejecting out-of-range values.
    pub fn with_overrides(mut self, overrides: &DecodingOverrides) -> Result<Self, InferenceError> {
        if let Some(max_tokens) = overrides.max_tokens {
            if max_tokens == 0 {
                return Err(invalid("max_tokens must be > 0"));
            }
            self.max_tokens = max_tokens;
        }

        if let Some(temperature) = overrides.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(invalid("temperature must be within [0, 2]"));
            }
            self.temperature = temperature;
        }

        if let Some(top_p) = overrides.top_p {
            if !(top_p > 0.0 && top_p <= 1.0) {
                return Err(invalid("top_p must be within (0, 1]"));
            }
            self.top_p = Some(top_p);
        }

        if let Some(stops) = &overrides.stop_sequences {
            self.add_stop_sequences(stops.iter().cloned());
        }

        Ok(self)
    }

    /// Append stop sequences, skipping empty and already-present ones.
    pub fn add_stop_sequences<I: IntoIterator<Item = String>>(&mut self, stops: I) {
        for stop in stops {
            if !stop.is_empty() && !self.stop_sequences.contains(&stop) {
                self.stop_sequences.push(stop);
            }
        }
    }

    pub fn is_greedy(&self) -> bool {
        self.temperature <= 0.0
    }
}

fn invalid(reason: &str) -> InferenceError {
    InferenceError::InvalidRequest {
        reason: reason.to_string(),
    }
}

/// Why generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    StopSequence,
    EndOfTurn,
    MaxTokens,
    /// The context window filled up before `max_tokens` was reached
    ContextFull,
}

/// Output of a single generation
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub finish_reason: FinishReason,
    pub duration: Duration,
}

/// Information about a loaded runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "http-api", derive(utoipa::ToSchema))]
pub struct RuntimeInfo {
    /// Backend identifier
    pub backend: String,
    pub model_path: String,
    pub context_size: usize,
    /// Compute device the weights live on
    pub device: String,
}

/// Synchronous text generation against a single loaded model
pub trait ModelRuntime: Send {
    /// Generate a completion for `prompt`.
    ///
    /// `cancelled` is polled between token steps. Once it returns `true` the
    /// runtime abandons the generation with [`InferenceError::Cancelled`].
    ///
    /// # Errors
    ///
    /// [`InferenceError::ContextOverflow`] when the prompt alone does not fit,
    /// [`InferenceError::OutOfMemory`] or [`InferenceError::Backend`] when the
    /// backend fails.
    fn generate(
        &mut self,
        prompt: &str,
        config: &DecodingConfig,
        cancelled: &dyn Fn() -> bool,
    ) -> Result<Generation, InferenceError>;

    /// Get runtime-specific information
    fn info(&self) -> RuntimeInfo;

    fn context_size(&self) -> usize;
}

impl<R: ModelRuntime + ?Sized> ModelRuntime for Box<R> {
    fn generate(
        &mut self,
        prompt: &str,
        config: &DecodingConfig,
        cancelled: &dyn Fn() -> bool,
    ) -> Result<Generation, InferenceError> {
        (**self).generate(prompt, config, cancelled)
    }

    fn info(&self) -> RuntimeInfo {
        (**self).info()
    }

    fn context_size(&self) -> usize {
        (**self).context_size()
    }
}

/// Map a backend error message onto the inference taxonomy.
///
/// Allocation failures become [`InferenceError::OutOfMemory`]; anything else
/// is a generic backend failure.
pub fn classify_backend_error(message: &str) -> InferenceError {
    let lower = message.to_lowercase();
    let oom_markers = [
        "out of memory",
        "outofmemory",
        "cuda_error_out_of_memory",
        "memory allocation",
        "failed to allocate",
        "cannot allocate",
    ];

    if oom_markers.iter().any(|marker| lower.contains(marker)) {
        InferenceError::OutOfMemory {
            reason: message.to_string(),
        }
    } else {
        InferenceError::backend(message)
    }
}

/// Byte position of the earliest stop sequence in `text`, if any.
pub fn find_stop_sequence(text: &str, stops: &[String]) -> Option<usize> {
    stops
        .iter()
        .filter(|stop| !stop.is_empty())
        .filter_map(|stop| text.find(stop.as_str()))
        .min()
}

/// [`find_stop_sequence`] restricted to matches that reach into the last
/// `appended` bytes of `text`. Everything before was already searched.
pub fn find_stop_in_tail(text: &str, appended: usize, stops: &[String]) -> Option<usize> {
    let longest = stops.iter().map(String::len).max().unwrap_or(0);
    let mut from = text.len().saturating_sub(appended + longest);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    find_stop_sequence(&text[from..], stops).map(|pos| from + pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoding_config_from_defaults() {
        let defaults = DecodingDefaults::default();
        let config = DecodingConfig::from_defaults(&defaults, ReasoningMode::NoThink);
        assert_eq!(config.max_tokens, 2048);
        assert!(!config.reasoning_enabled);
        assert!(!config.is_greedy());
    }

    #[test]
    fn test_overrides_applied() {
        let overrides = DecodingOverrides {
            max_tokens: Some(64),
            temperature: Some(0.0),
            top_p: None,
            stop_sequences: Some(vec!["</answer>".to_string(), String::new()]),
        };
        let config = DecodingConfig::default().with_overrides(&overrides).unwrap();
        assert_eq!(config.max_tokens, 64);
        assert!(config.is_greedy());
        assert_eq!(config.stop_sequences, vec!["</answer>".to_string()]);
    }

    #[test]
    fn test_overrides_rejected() {
        let bad = [
            DecodingOverrides {
                max_tokens: Some(0),
                ..Default::default()
            },
            DecodingOverrides {
                temperature: Some(3.0),
                ..Default::default()
            },
            DecodingOverrides {
                top_p: Some(1.5),
                ..Default::default()
            },
        ];
        for overrides in bad {
            assert!(matches!(
                DecodingConfig::default().with_overrides(&overrides),
                Err(InferenceError::InvalidRequest { .. })
            ));
        }
    }

    #[test]
    fn test_classify_backend_error() {
        assert!(matches!(
            classify_backend_error("CUDA_ERROR_OUT_OF_MEMORY while allocating"),
            InferenceError::OutOfMemory { .. }
        ));
        assert!(matches!(
            classify_backend_error("shape mismatch in matmul"),
            InferenceError::Backend { .. }
        ));
    }

    #[test]
    fn test_find_stop_sequence_earliest() {
        let stops = vec!["<|im_end|>".to_string(), "\n\n\n".to_string()];
        assert_eq!(find_stop_sequence("abc\n\n\ndef<|im_end|>", &stops), Some(3));
        assert_eq!(find_stop_sequence("no stop here", &stops), None);
        assert_eq!(find_stop_sequence("x", &[]), None);
    }

    #[test]
    fn test_find_stop_in_tail_spans_pieces() {
        let stops = vec!["<input>".to_string(), "<|im_end|>".to_string()];
        // The stop starts in earlier text and is completed by the new piece.
        assert_eq!(find_stop_in_tail("answer []\n<inp", 4, &stops), None);
        assert_eq!(find_stop_in_tail("answer []\n<input>", 4, &stops), Some(10));
        assert_eq!(find_stop_in_tail("日本語<|im_end|>", 5, &stops), Some(9));
        assert_eq!(find_stop_in_tail("日本語", 3, &stops), None);
        assert_eq!(find_stop_in_tail("", 0, &stops), None);
    }
}
