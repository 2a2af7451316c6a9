//! In-process GGUF inference with candle
//!
//! [`ModelHandle`] owns the quantized Qwen3 weights, the tokenizer and the
//! device they live on. It is not `Clone`: exactly one handle
//! exists per process and the coordinator's worker thread owns it.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::quantized::gguf_file;
use candle_core::{DType, Device, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::quantized_qwen3::ModelWeights;
use tokenizers::Tokenizer;

use super::resources;
use super::runners::{
    classify_backend_error, find_stop_in_tail, DecodingConfig, FinishReason, Generation,
    ModelRuntime, RuntimeInfo,
};
use crate::config::ModelConfig;
use crate::types::{InferenceError, ModelLoadError};

/// Tokens that end the assistant turn
const END_OF_TURN_TOKENS: &[&str] = &["<|im_end|>", "<|endoftext|>"];

/// A loaded model, exclusively owned.
pub struct ModelHandle {
    path: PathBuf,
    weights: ModelWeights,
    tokenizer: Tokenizer,
    device: Device,
    context_size: usize,
    end_of_turn: Vec<u32>,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("path", &self.path)
            .field("device", &device_name(&self.device))
            .field("context_size", &self.context_size)
            .finish_non_exhaustive()
    }
}

impl ModelHandle {
    /// Load weights and tokenizer.
    ///
    /// # Errors
    ///
    /// Fails when either file is missing, the GGUF container cannot be read,
    /// or the weights would not fit in available memory.
    pub fn load(config: &ModelConfig) -> Result<Self, ModelLoadError> {
        let path = config.path.clone();
        let tokenizer_path = config.resolved_tokenizer_path();

        if config.context_size == 0 {
            return Err(ModelLoadError::InvalidConfig {
                reason: "context size must be > 0".to_string(),
            });
        }

        let file_size = resources::model_file_size(&path)?;
        if !tokenizer_path.is_file() {
            return Err(ModelLoadError::TokenizerNotFound {
                path: tokenizer_path,
            });
        }

        if !config.skip_memory_check {
            resources::ensure_fits_in_memory(&path)?;
        }

        let device = select_device()?;
        tracing::info!(
            model = %path.display(),
            size_bytes = file_size,
            device = device_name(&device),
            context_size = config.context_size,
            "Loading GGUF model"
        );
        let started = Instant::now();

        let mut file = File::open(&path).map_err(|e| corrupt(&path, e))?;
        let content = gguf_file::Content::read(&mut file).map_err(|e| corrupt(&path, e))?;
        let weights = ModelWeights::from_gguf(content, &mut file, &device).map_err(|e| {
            let message = e.to_string();
            match classify_backend_error(&message) {
                InferenceError::OutOfMemory { .. } => ModelLoadError::InsufficientMemory {
                    required_bytes: file_size,
                    available_bytes: resources::available_memory_bytes(),
                },
                _ => ModelLoadError::Corrupt {
                    path: path.clone(),
                    reason: message,
                },
            }
        })?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| ModelLoadError::Corrupt {
            path: tokenizer_path.clone(),
            reason: e.to_string(),
        })?;

        let end_of_turn: Vec<u32> = END_OF_TURN_TOKENS
            .iter()
            .filter_map(|token| tokenizer.token_to_id(token))
            .collect();
        if end_of_turn.is_empty() {
            tracing::warn!("Tokenizer has no end-of-turn tokens; generation stops only at limits");
        }

        tracing::info!(
            duration_ms = started.elapsed().as_millis() as u64,
            "Model loaded"
        );

        Ok(Self {
            path,
            weights,
            tokenizer,
            device,
            context_size: config.context_size,
            end_of_turn,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sampler(config: &DecodingConfig) -> LogitsProcessor {
        let sampling = if config.is_greedy() {
            Sampling::ArgMax
        } else {
            let temperature = f64::from(config.temperature);
            match config.top_p {
                Some(p) if p < 1.0 => Sampling::TopP { p, temperature },
                _ => Sampling::All { temperature },
            }
        };
        LogitsProcessor::from_sampling(config.seed, sampling)
    }

    fn next_token(
        &self,
        sampler: &mut LogitsProcessor,
        logits: &Tensor,
        history: &[u32],
        config: &DecodingConfig,
    ) -> candle_core::Result<u32> {
        let logits = logits.to_dtype(DType::F32)?;
        let logits = if config.repeat_penalty == 1.0 {
            logits
        } else {
            let start = history.len().saturating_sub(config.repeat_last_n);
            candle_transformers::utils::apply_repeat_penalty(
                &logits,
                config.repeat_penalty,
                &history[start..],
            )?
        };
        sampler.sample(&logits)
    }

    fn forward(&mut self, tokens: &[u32], offset: usize) -> candle_core::Result<Tensor> {
        let input = Tensor::new(tokens, &self.device)?.unsqueeze(0)?;
        self.weights.forward(&input, offset)?.squeeze(0)
    }
}

/// Incremental detokenizer in the manner of candle's `TokenOutputStream`.
///
/// Each step decodes only the tokens since the last emitted piece, with the
/// piece before them as context so that word boundaries come out right.
#[derive(Debug, Default)]
struct DecodeStream {
    tokens: Vec<u32>,
    prev_index: usize,
    current_index: usize,
}

impl DecodeStream {
    fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Push `token`; returns the text it completes, if any.
    fn next_piece(
        &mut self,
        tokenizer: &Tokenizer,
        token: u32,
    ) -> Result<Option<String>, InferenceError> {
        let prev_text = decode(tokenizer, &self.tokens[self.prev_index..self.current_index])?;
        self.tokens.push(token);
        let text = decode(tokenizer, &self.tokens[self.prev_index..])?;

        match new_piece(&prev_text, &text) {
            Some(piece) => {
                self.prev_index = self.current_index;
                self.current_index = self.tokens.len();
                Ok(Some(piece.to_string()))
            }
            None => Ok(None),
        }
    }

    /// Text still held back when generation stops.
    fn rest(&self, tokenizer: &Tokenizer) -> Result<Option<String>, InferenceError> {
        let prev_text = decode(tokenizer, &self.tokens[self.prev_index..self.current_index])?;
        let text = decode(tokenizer, &self.tokens[self.prev_index..])?;
        Ok(text.get(prev_text.len()..).filter(|rest| !rest.is_empty()).map(str::to_string))
    }
}

/// What `text` adds to `prev_text`, once it no longer ends mid-character.
fn new_piece<'a>(prev_text: &str, text: &'a str) -> Option<&'a str> {
    if text.len() <= prev_text.len() || text.ends_with(char::REPLACEMENT_CHARACTER) {
        return None;
    }
    text.get(prev_text.len()..)
}

fn decode(tokenizer: &Tokenizer, ids: &[u32]) -> Result<String, InferenceError> {
    tokenizer
        .decode(ids, false)
        .map_err(|e| InferenceError::backend(format!("detokenization failed: {}", e)))
}

impl ModelRuntime for ModelHandle {
    fn generate(
        &mut self,
        prompt: &str,
        config: &DecodingConfig,
        cancelled: &dyn Fn() -> bool,
    ) -> Result<Generation, InferenceError> {
        let started = Instant::now();

        let encoding = self
            .tokenizer
            .encode(prompt, false)
            .map_err(|e| InferenceError::backend(format!("tokenization failed: {}", e)))?;
        let prompt_ids = encoding.get_ids().to_vec();

        if prompt_ids.is_empty() {
            return Err(InferenceError::InvalidRequest {
                reason: "prompt encodes to zero tokens".to_string(),
            });
        }
        if prompt_ids.len() >= self.context_size {
            return Err(InferenceError::ContextOverflow {
                prompt_tokens: prompt_ids.len(),
                context_size: self.context_size,
            });
        }

        let room = self.context_size - prompt_ids.len();
        let budget = room.min(config.max_tokens as usize);
        let mut sampler = Self::sampler(config);

        self.weights.clear_kv_cache();
        let mut logits = self.forward(&prompt_ids, 0).map_err(backend)?;

        let mut history = prompt_ids.clone();
        let mut stream = DecodeStream::default();
        let mut text = String::new();
        let mut finish_reason = loop {
            if cancelled() {
                return Err(InferenceError::Cancelled);
            }

            let token = self
                .next_token(&mut sampler, &logits, &history, config)
                .map_err(backend)?;
            if self.end_of_turn.contains(&token) {
                break FinishReason::EndOfTurn;
            }

            history.push(token);
            if let Some(piece) = stream.next_piece(&self.tokenizer, token)? {
                text.push_str(&piece);
                if let Some(pos) = find_stop_in_tail(&text, piece.len(), &config.stop_sequences) {
                    text.truncate(pos);
                    break FinishReason::StopSequence;
                }
            }

            let generated = stream.len();
            if generated >= budget {
                break if budget < config.max_tokens as usize {
                    FinishReason::ContextFull
                } else {
                    FinishReason::MaxTokens
                };
            }

            let offset = prompt_ids.len() + generated - 1;
            logits = self.forward(&[token], offset).map_err(backend)?;
        };

        if finish_reason != FinishReason::StopSequence {
            if let Some(rest) = stream.rest(&self.tokenizer)? {
                text.push_str(&rest);
                if let Some(pos) = find_stop_in_tail(&text, rest.len(), &config.stop_sequences) {
                    text.truncate(pos);
                    finish_reason = FinishReason::StopSequence;
                }
            }
        }

        tracing::trace!(
            prompt_tokens = prompt_ids.len(),
            completion_tokens = stream.len(),
            ?finish_reason,
            "Generation finished"
        );

        Ok(Generation {
            text,
            prompt_tokens: prompt_ids.len() as u32,
            completion_tokens: stream.len() as u32,
            finish_reason,
            duration: started.elapsed(),
        })
    }

    fn info(&self) -> RuntimeInfo {
        RuntimeInfo {
            backend: "candle-gguf".to_string(),
            model_path: self.path.display().to_string(),
            context_size: self.context_size,
            device: device_name(&self.device).to_string(),
        }
    }

    fn context_size(&self) -> usize {
        self.context_size
    }
}

impl Drop for ModelHandle {
    fn drop(&mut self) {
        tracing::info!(model = %self.path.display(), "Releasing model");
    }
}

fn select_device() -> Result<Device, ModelLoadError> {
    let device = Device::cuda_if_available(0).map_err(|e| ModelLoadError::Backend {
        reason: e.to_string(),
    })?;
    if !device.is_cpu() {
        return Ok(device);
    }
    Device::metal_if_available(0).map_err(|e| ModelLoadError::Backend {
        reason: e.to_string(),
    })
}

fn device_name(device: &Device) -> &'static str {
    if device.is_cuda() {
        "cuda"
    } else if device.is_metal() {
        "metal"
    } else {
        "cpu"
    }
}

fn corrupt<E: std::fmt::Display>(path: &Path, e: E) -> ModelLoadError {
    ModelLoadError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

fn backend(e: candle_core::Error) -> InferenceError {
    classify_backend_error(&e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_missing_model() {
        let config = ModelConfig {
            path: PathBuf::from("/nonexistent/Qwen3-8B-Q8_0.gguf"),
            ..Default::default()
        };
        assert!(matches!(
            ModelHandle::load(&config),
            Err(ModelLoadError::ModelFileNotFound { .. })
        ));
    }

    #[test]
    fn test_load_missing_tokenizer() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("model.gguf");
        std::fs::write(&model, b"GGUF").unwrap();
        let config = ModelConfig {
            path: model,
            ..Default::default()
        };
        assert!(matches!(
            ModelHandle::load(&config),
            Err(ModelLoadError::TokenizerNotFound { .. })
        ));
    }

    #[test]
    fn test_load_corrupt_model() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("model.gguf");
        let mut file = File::create(&model).unwrap();
        file.write_all(b"definitely not a gguf container").unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), b"{}").unwrap();

        let config = ModelConfig {
            path: model,
            ..Default::default()
        };
        assert!(matches!(
            ModelHandle::load(&config),
            Err(ModelLoadError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_new_piece_waits_for_whole_characters() {
        assert_eq!(new_piece("Hello", "Hello world"), Some(" world"));
        assert_eq!(new_piece("Hello", "Hello"), None);
        assert_eq!(new_piece("caf", "caf\u{FFFD}"), None);
        assert_eq!(new_piece("caf", "café"), Some("é"));
    }

    #[test]
    fn test_zero_context_rejected() {
        let config = ModelConfig {
            context_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            ModelHandle::load(&config),
            Err(ModelLoadError::InvalidConfig { .. })
        ));
    }
}
