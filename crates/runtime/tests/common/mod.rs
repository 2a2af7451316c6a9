//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sentinel_runtime::config::CoordinatorConfig;
use sentinel_runtime::models::{DecodingConfig, FinishReason, Generation, ModelRuntime, RuntimeInfo};
use sentinel_runtime::{Detector, InferenceCoordinator, InferenceError, ReasoningMode};

type Responder = Box<dyn FnMut(&str, &dyn Fn() -> bool) -> Result<String, InferenceError> + Send>;

/// What the scripted runtime observed
#[derive(Default)]
pub struct Probe {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
    inputs: Mutex<Vec<String>>,
}

impl Probe {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// User inputs in the order `generate` saw them
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().clone()
    }
}

/// A [`ModelRuntime`] whose replies come from a closure.
///
/// The closure gets the user input pulled back out of the prompt, plus the
/// cancellation probe.
pub struct ScriptedRuntime {
    responder: Responder,
    probe: Arc<Probe>,
}

impl ScriptedRuntime {
    pub fn new<F>(responder: F) -> (Self, Arc<Probe>)
    where
        F: FnMut(&str, &dyn Fn() -> bool) -> Result<String, InferenceError> + Send + 'static,
    {
        let probe = Arc::new(Probe::default());
        let runtime = Self {
            responder: Box::new(responder),
            probe: probe.clone(),
        };
        (runtime, probe)
    }

    /// Always answers `reply`
    pub fn fixed(reply: &str) -> (Self, Arc<Probe>) {
        let reply = reply.to_string();
        Self::new(move |_, _| Ok(reply.clone()))
    }
}

struct InFlight<'a>(&'a Probe);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ModelRuntime for ScriptedRuntime {
    fn generate(
        &mut self,
        prompt: &str,
        _config: &DecodingConfig,
        cancelled: &dyn Fn() -> bool,
    ) -> Result<Generation, InferenceError> {
        let now = self.probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.probe);
        self.probe.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.probe.calls.fetch_add(1, Ordering::SeqCst);

        let input = user_input(prompt).to_string();
        self.probe.inputs.lock().push(input.clone());

        let text = (self.responder)(&input, cancelled)?;
        Ok(Generation {
            completion_tokens: text.split_whitespace().count() as u32,
            text,
            prompt_tokens: prompt.split_whitespace().count() as u32,
            finish_reason: FinishReason::EndOfTurn,
            duration: Duration::from_millis(1),
        })
    }

    fn info(&self) -> RuntimeInfo {
        RuntimeInfo {
            backend: "scripted".to_string(),
            model_path: "memory://scripted".to_string(),
            context_size: 4096,
            device: "cpu".to_string(),
        }
    }

    fn context_size(&self) -> usize {
        4096
    }
}

/// The text between the last `<input>` tags of a prompt
pub fn user_input(prompt: &str) -> &str {
    let start = prompt
        .rfind("<input>\n")
        .map(|i| i + "<input>\n".len())
        .unwrap_or(0);
    let end = prompt[start..]
        .find("\n</input>")
        .map(|i| start + i)
        .unwrap_or(prompt.len());
    &prompt[start..end]
}

/// Coordinator around `runtime`, defaulting to nothink mode
pub fn start(runtime: ScriptedRuntime) -> InferenceCoordinator {
    InferenceCoordinator::start(
        Box::new(runtime),
        Detector::default(),
        &CoordinatorConfig::default(),
        ReasoningMode::NoThink,
    )
    .expect("failed to spawn model worker")
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub const EMPTY_ANSWER: &str = "### DETECTIONS\n[]";

/// A well-formed answer flagging `text` as an SSN
pub fn ssn_answer(text: &str) -> String {
    format!(
        "### DETECTIONS\n[{{\"text\": \"{}\", \"category\": \"SSN\"}}]",
        text
    )
}
