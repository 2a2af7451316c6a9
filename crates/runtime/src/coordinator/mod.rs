//! Inference coordinator
//!
//! Accepts detection requests from any number of tasks and feeds them, in
//! arrival order, to a single worker thread that owns the model. Each request
//! moves through `Queued → Running → {Succeeded, Failed}`; a failure is
//! reported to that request's caller only.

mod worker;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::config::{CoordinatorConfig, SentinelConfig};
use crate::detection::Detector;
use crate::models::{self, ModelRuntime, RuntimeInfo};
use crate::types::{
    DetectionRequest, InferenceError, InferenceResult, ModelLoadError, ReasoningMode,
    RequestState,
};
use worker::Job;

/// What the service front end needs from the inference core
#[async_trait]
pub trait DetectionService: Send + Sync {
    /// Run one detection request to completion
    async fn detect(&self, request: DetectionRequest) -> InferenceResult;

    /// Mode applied when a caller does not choose one
    fn default_mode(&self) -> ReasoningMode;

    fn stats(&self) -> StatsSnapshot;

    fn runtime_info(&self) -> RuntimeInfo;
}

/// Point-in-time view of coordinator activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "http-api", derive(utoipa::ToSchema))]
pub struct StatsSnapshot {
    /// Requests waiting for the model
    pub queue_depth: usize,
    /// Requests currently generating (0 or 1)
    pub running: usize,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub last_completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub(crate) struct Stats {
    queue_depth: AtomicUsize,
    running: AtomicUsize,
    succeeded: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    last_completed_at: Mutex<Option<DateTime<Utc>>>,
}

impl Stats {
    fn enqueued(&self) -> usize {
        self.queue_depth.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the depth left behind
    fn dequeued(&self) -> usize {
        self.queue_depth.fetch_sub(1, Ordering::SeqCst).saturating_sub(1)
    }

    fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
        self.completed();
    }

    fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.completed();
    }

    fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
        self.completed();
    }

    fn completed(&self) {
        *self.last_completed_at.lock() = Some(Utc::now());
    }

    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            queue_depth: self.queue_depth.load(Ordering::SeqCst),
            running: self.running.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            cancelled: self.cancelled.load(Ordering::SeqCst),
            last_completed_at: *self.last_completed_at.lock(),
        }
    }
}

/// State shared between submitters and the worker
#[derive(Debug, Default)]
pub(crate) struct Shared {
    stats: Stats,
    shutting_down: AtomicBool,
}

/// Counts a request as queued until the worker takes it over.
///
/// Dropped without [`QueueSlot::handed_off`] (send failed or the submitting
/// future was cancelled while waiting for room) it gives the slot back.
struct QueueSlot<'a> {
    stats: &'a Stats,
    armed: bool,
}

impl<'a> QueueSlot<'a> {
    fn reserve(stats: &'a Stats) -> (Self, usize) {
        let depth = stats.enqueued();
        (Self { stats, armed: true }, depth)
    }

    fn handed_off(mut self) {
        self.armed = false;
    }
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.stats.dequeued();
        }
    }
}

/// Single-owner gateway to the loaded model
pub struct InferenceCoordinator {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<Shared>,
    runtime_info: RuntimeInfo,
    default_mode: ReasoningMode,
}

impl InferenceCoordinator {
    /// Move `runtime` into a new worker thread and start accepting requests.
    pub fn start(
        runtime: Box<dyn ModelRuntime>,
        detector: Detector,
        config: &CoordinatorConfig,
        default_mode: ReasoningMode,
    ) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let shared = Arc::new(Shared::default());
        let runtime_info = runtime.info();
        let handle = worker::spawn(runtime, detector, receiver, shared.clone())?;

        tracing::info!(
            backend = %runtime_info.backend,
            device = %runtime_info.device,
            queue_capacity = config.queue_capacity,
            "Inference coordinator started"
        );

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(handle)),
            shared,
            runtime_info,
            default_mode,
        })
    }

    /// Load the configured model and start a coordinator around it.
    ///
    /// A load failure is fatal for the service.
    pub fn from_config(config: &SentinelConfig) -> Result<Self, ModelLoadError> {
        let runtime = models::load_runtime(&config.model)?;
        let detector = Detector::new(&config.detection, config.decoding.clone());
        Self::start(
            runtime,
            detector,
            &config.coordinator,
            config.detection.reasoning,
        )
        .map_err(|e| ModelLoadError::Backend {
            reason: format!("failed to spawn model worker: {}", e),
        })
    }

    /// Queue `request` and wait for its result.
    ///
    /// Waits for room when the queue is full. Dropping the returned future
    /// cancels the request: it is skipped if not yet started, and generation
    /// stops at the next token step if it is.
    pub async fn submit(&self, request: DetectionRequest) -> InferenceResult {
        let request_id = request.id();

        if self.shared.shutting_down.load(Ordering::SeqCst) {
            return Err(InferenceError::ShuttingDown.into());
        }
        let sender = self.sender.lock().clone();
        let Some(sender) = sender else {
            return Err(InferenceError::ShuttingDown.into());
        };

        let (reply, receiver) = oneshot::channel();
        let (slot, queue_depth) = QueueSlot::reserve(&self.shared.stats);
        tracing::debug!(%request_id, state = %RequestState::Queued, queue_depth, "Request queued");

        let job = Job {
            request,
            enqueued_at: Instant::now(),
            reply,
        };
        let sent = sender.send(job).await;
        // Only the coordinator's own sender may keep the queue open.
        drop(sender);
        if sent.is_err() {
            return Err(InferenceError::ShuttingDown.into());
        }
        slot.handed_off();

        match receiver.await {
            Ok(result) => result,
            Err(_) => Err(InferenceError::backend("model worker stopped before replying").into()),
        }
    }

    /// [`submit`](Self::submit) bounded by `timeout`, which covers queue wait
    /// and generation.
    pub async fn submit_with_timeout(
        &self,
        request: DetectionRequest,
        timeout: Duration,
    ) -> InferenceResult {
        let request_id = request.id();
        match tokio::time::timeout(timeout, self.submit(request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(%request_id, timeout_ms = timeout.as_millis() as u64, "Request timed out");
                Err(InferenceError::Timeout(timeout).into())
            }
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn runtime_info(&self) -> &RuntimeInfo {
        &self.runtime_info
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutting_down.load(Ordering::SeqCst)
    }

    /// Stop accepting requests, let the running one finish, fail the rest,
    /// and wait for the worker to release the model.
    pub async fn shutdown(&self) {
        self.shared.shutting_down.store(true, Ordering::SeqCst);
        drop(self.sender.lock().take());

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            tracing::info!("Waiting for model worker to stop");
            match tokio::task::spawn_blocking(move || handle.join()).await {
                Ok(Ok(())) => tracing::info!("Inference coordinator stopped"),
                Ok(Err(_)) => tracing::error!("Model worker exited with a panic"),
                Err(e) => tracing::error!("Failed to join model worker: {}", e),
            }
        }
    }
}

impl Drop for InferenceCoordinator {
    fn drop(&mut self) {
        // Queued jobs still in the channel are failed by the worker.
        self.shared.shutting_down.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DetectionService for InferenceCoordinator {
    async fn detect(&self, request: DetectionRequest) -> InferenceResult {
        self.submit(request).await
    }

    fn default_mode(&self) -> ReasoningMode {
        self.default_mode
    }

    fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    fn runtime_info(&self) -> RuntimeInfo {
        self.runtime_info.clone()
    }
}
