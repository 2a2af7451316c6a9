//! SSN detection pipeline: prompt, generate, parse
//!
//! [`Detector`] runs one request end to end against a borrowed
//! [`ModelRuntime`]. It holds no model state of its own, so the coordinator's
//! worker can own the runtime and lend it out one request at a time.

pub mod parser;
pub mod prompt;

pub use parser::{ParsedResponse, ResponseParser};
pub use prompt::{PromptBuilder, DETECTIONS_DELIMITER, OUTPUT_CONTRACT_VERSION};

use crate::config::{DecodingDefaults, DetectionConfig};
use crate::models::{DecodingConfig, FinishReason, ModelRuntime};
use crate::types::{
    DetectionError, DetectionReport, DetectionRequest, InferenceError, ParseError, ParseFailure,
    RequestTiming, TokenUsage, Transcript, WarningKind,
};

/// Prompt construction plus decoding defaults, applied per request
#[derive(Debug, Clone, Default)]
pub struct Detector {
    prompts: PromptBuilder,
    defaults: DecodingDefaults,
}

impl Detector {
    pub fn new(detection: &DetectionConfig, defaults: DecodingDefaults) -> Self {
        Self {
            prompts: PromptBuilder::new(detection.few_shot),
            defaults,
        }
    }

    /// Effective decoding configuration for `request`
    pub fn decoding_for(&self, request: &DetectionRequest) -> Result<DecodingConfig, InferenceError> {
        let mut config = DecodingConfig::from_defaults(&self.defaults, request.mode())
            .with_overrides(request.overrides())?;
        config.add_stop_sequences(self.prompts.stop_sequences());
        Ok(config)
    }

    /// Run `request` to completion on `runtime`.
    ///
    /// `timing` is filled in with generation time; the caller owns queue time.
    /// Blank text cannot contain an SSN and is answered without generating.
    pub fn run(
        &self,
        runtime: &mut dyn ModelRuntime,
        request: &DetectionRequest,
        cancelled: &dyn Fn() -> bool,
    ) -> Result<DetectionReport, DetectionError> {
        let decoding = self.decoding_for(request)?;
        if request.text().trim().is_empty() {
            tracing::debug!(request_id = %request.id(), "Blank text, skipping generation");
            return Ok(self.empty_report(request));
        }

        let prompt = self.prompts.build(request.text(), request.mode());
        tracing::trace!(request_id = %request.id(), prompt_len = prompt.len(), "Prompt built");

        let generation = runtime.generate(&prompt, &decoding, cancelled)?;
        tracing::debug!(
            request_id = %request.id(),
            completion_tokens = generation.completion_tokens,
            finish_reason = ?generation.finish_reason,
            "Generation complete"
        );

        // Output cut off by a token limit is only trusted after a delimiter.
        let cut_off = matches!(
            generation.finish_reason,
            FinishReason::MaxTokens | FinishReason::ContextFull
        );
        let parsed = match ResponseParser::parse(&generation.text, request.text()) {
            Ok(parsed)
                if cut_off
                    && parsed
                        .warnings
                        .iter()
                        .any(|w| w.kind == WarningKind::MissingDelimiter) =>
            {
                Err(ParseError::new(ParseFailure::Truncated, generation.text.as_str()))
            }
            Err(err) if cut_off => {
                Err(ParseError::new(ParseFailure::Truncated, err.raw_transcript))
            }
            other => other,
        }?;
        if let Some(reasoning) = &parsed.transcript.reasoning {
            tracing::debug!(request_id = %request.id(), "Thinking: {}", reasoning);
        }
        for warning in &parsed.warnings {
            tracing::warn!(request_id = %request.id(), "Parse warning: {}", warning);
        }

        let generation_ms = generation.duration.as_millis() as u64;
        Ok(DetectionReport {
            request_id: request.id(),
            mode: request.mode(),
            detections: parsed.detections,
            warnings: parsed.warnings,
            transcript: parsed.transcript,
            usage: TokenUsage {
                prompt_tokens: generation.prompt_tokens,
                completion_tokens: generation.completion_tokens,
            },
            timing: RequestTiming {
                queued_ms: 0,
                generation_ms,
                total_ms: generation_ms,
            },
        })
    }

    fn empty_report(&self, request: &DetectionRequest) -> DetectionReport {
        DetectionReport {
            request_id: request.id(),
            mode: request.mode(),
            detections: Vec::new(),
            warnings: Vec::new(),
            transcript: Transcript {
                contract: self.prompts.contract_version().to_string(),
                raw: String::new(),
                reasoning: None,
                answer: String::new(),
            },
            usage: TokenUsage::default(),
            timing: RequestTiming::default(),
        }
    }
}
