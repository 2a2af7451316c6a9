//! The model worker thread
//!
//! Sole owner of the [`ModelRuntime`]. Drains the job queue one request at a
//! time, so generations never overlap and run in arrival order.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use super::Shared;
use crate::detection::Detector;
use crate::models::ModelRuntime;
use crate::types::{
    DetectionError, DetectionRequest, InferenceError, InferenceResult, RequestState,
};

pub(crate) const WORKER_THREAD_NAME: &str = "model-worker";

/// A queued request and the channel its result goes back on
pub(crate) struct Job {
    pub request: DetectionRequest,
    pub enqueued_at: Instant,
    pub reply: oneshot::Sender<InferenceResult>,
}

pub(crate) fn spawn(
    runtime: Box<dyn ModelRuntime>,
    detector: Detector,
    receiver: mpsc::Receiver<Job>,
    shared: Arc<Shared>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || run(runtime, detector, receiver, shared))
}

fn run(
    mut runtime: Box<dyn ModelRuntime>,
    detector: Detector,
    mut receiver: mpsc::Receiver<Job>,
    shared: Arc<Shared>,
) {
    tracing::info!(model = %runtime.info().model_path, "Model worker started");

    while let Some(job) = receiver.blocking_recv() {
        let queue_depth = shared.stats.dequeued();
        let request_id = job.request.id();

        if shared.shutting_down.load(Ordering::SeqCst) {
            shared.stats.record_failure();
            tracing::info!(%request_id, state = %RequestState::Failed, "Rejected queued request during shutdown");
            let _ = job.reply.send(Err(InferenceError::ShuttingDown.into()));
            continue;
        }

        if job.reply.is_closed() {
            shared.stats.record_cancelled();
            tracing::info!(%request_id, "Skipping request whose caller has gone away");
            continue;
        }

        let queued_ms = job.enqueued_at.elapsed().as_millis() as u64;
        shared.stats.running.store(1, Ordering::SeqCst);
        tracing::debug!(
            %request_id,
            state = %RequestState::Running,
            queued_ms,
            queue_depth,
            "Request started"
        );

        let reply = &job.reply;
        let cancelled = || reply.is_closed();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            detector.run(runtime.as_mut(), &job.request, &cancelled)
        }));
        shared.stats.running.store(0, Ordering::SeqCst);

        let mut result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                tracing::error!(%request_id, %reason, "Inference backend panicked");
                Err(InferenceError::backend(format!("backend panicked: {}", reason)).into())
            }
        };

        let total_ms = job.enqueued_at.elapsed().as_millis() as u64;
        match &mut result {
            Ok(report) => {
                report.timing.queued_ms = queued_ms;
                report.timing.total_ms = total_ms;
                shared.stats.record_success();
                tracing::info!(
                    %request_id,
                    state = %RequestState::Succeeded,
                    detections = report.detections.len(),
                    duration_ms = total_ms,
                    "Request succeeded"
                );
            }
            Err(DetectionError::Inference(InferenceError::Cancelled)) => {
                shared.stats.record_cancelled();
                tracing::info!(%request_id, state = %RequestState::Failed, duration_ms = total_ms, "Request cancelled");
            }
            Err(err) => {
                shared.stats.record_failure();
                tracing::warn!(
                    %request_id,
                    state = %RequestState::Failed,
                    code = err.code(),
                    duration_ms = total_ms,
                    "Request failed: {}",
                    err
                );
            }
        }

        if job.reply.send(result).is_err() {
            tracing::debug!(%request_id, "Caller went away before the result was delivered");
        }
    }

    let info = runtime.info();
    drop(runtime);
    tracing::info!(model = %info.model_path, "Model worker stopped; model released");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
