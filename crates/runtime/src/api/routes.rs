//! HTTP API route handlers

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{extract::State, http::StatusCode, response::Json};

use super::types::{
    DetectRequestBody, ErrorResponse, GuardResponse, HealthResponse, BLOCKED_MESSAGE,
};
use crate::coordinator::DetectionService;
use crate::types::{
    DetectionError, DetectionReport, DetectionRequest, InferenceError, InferenceResult,
};

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<dyn DetectionService>,
    pub request_timeout: Duration,
    pub started_at: Instant,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// HTTP status for a failed detection
pub fn status_for(err: &DetectionError) -> StatusCode {
    match err {
        DetectionError::Parse(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DetectionError::Inference(e) => match e {
            InferenceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            InferenceError::ContextOverflow { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            InferenceError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            InferenceError::ShuttingDown | InferenceError::OutOfMemory { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            InferenceError::Backend { .. } | InferenceError::Cancelled => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
    }
}

fn error_response(err: &DetectionError) -> ApiError {
    (status_for(err), Json(ErrorResponse::from(err)))
}

async fn run_detection(state: &AppState, body: DetectRequestBody) -> InferenceResult {
    let mode = body.mode.unwrap_or_else(|| state.service.default_mode());
    let request =
        DetectionRequest::new(body.text, mode).with_overrides(body.decoding.unwrap_or_default());
    let request_id = request.id();
    tracing::debug!(%request_id, %mode, "Detection request received");

    match tokio::time::timeout(state.request_timeout, state.service.detect(request)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(%request_id, "Detection request timed out");
            Err(InferenceError::Timeout(state.request_timeout).into())
        }
    }
}

/// Detect SSNs in a text
///
/// Any UTF-8 text is accepted. Empty or blank text yields an empty list
/// without running the model.
#[utoipa::path(
    post,
    path = "/api/v1/detect",
    request_body = DetectRequestBody,
    responses(
        (status = 200, description = "Detections found in the text", body = DetectionReport),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 413, description = "Text does not fit the context window", body = ErrorResponse),
        (status = 422, description = "Model output could not be parsed", body = ErrorResponse),
        (status = 500, description = "Inference failed", body = ErrorResponse),
        (status = 503, description = "Service unavailable", body = ErrorResponse),
        (status = 504, description = "Request timed out", body = ErrorResponse)
    ),
    tag = "detection"
)]
pub async fn detect(
    State(state): State<AppState>,
    Json(body): Json<DetectRequestBody>,
) -> Result<Json<DetectionReport>, ApiError> {
    run_detection(&state, body)
        .await
        .map(Json)
        .map_err(|e| error_response(&e))
}

/// Block the query if it carries an SSN
#[utoipa::path(
    post,
    path = "/api/v1/guard",
    request_body = DetectRequestBody,
    responses(
        (status = 200, description = "Guard verdict", body = GuardResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 413, description = "Text does not fit the context window", body = ErrorResponse),
        (status = 422, description = "Model output could not be parsed", body = ErrorResponse),
        (status = 500, description = "Inference failed", body = ErrorResponse),
        (status = 503, description = "Service unavailable", body = ErrorResponse),
        (status = 504, description = "Request timed out", body = ErrorResponse)
    ),
    tag = "detection"
)]
pub async fn guard(
    State(state): State<AppState>,
    Json(body): Json<DetectRequestBody>,
) -> Result<Json<GuardResponse>, ApiError> {
    let report = run_detection(&state, body)
        .await
        .map_err(|e| error_response(&e))?;

    let blocked = report.has_ssn();
    if blocked {
        tracing::info!(request_id = %report.request_id, "Query blocked");
    }

    Ok(Json(GuardResponse {
        request_id: report.request_id,
        blocked,
        message: blocked.then(|| BLOCKED_MESSAGE.to_string()),
        detections: report.detections,
    }))
}

/// Health check endpoint handler
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.service.runtime_info(),
        coordinator: state.service.stats(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ParseError, ParseFailure};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                DetectionError::from(ParseError::new(ParseFailure::MalformedAnswer, "x")),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                InferenceError::ContextOverflow {
                    prompt_tokens: 5000,
                    context_size: 4096,
                }
                .into(),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                InferenceError::Timeout(Duration::from_secs(1)).into(),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (InferenceError::ShuttingDown.into(), StatusCode::SERVICE_UNAVAILABLE),
            (
                InferenceError::backend("boom").into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                InferenceError::InvalidRequest {
                    reason: "temperature out of range".into(),
                }
                .into(),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(status_for(&err), expected, "{:?}", err);
        }
    }

    #[test]
    fn test_parse_error_body_keeps_transcript() {
        let err: DetectionError = ParseError::new(ParseFailure::NoRecognizableAnswer, "garbled").into();
        let (status, Json(body)) = error_response(&err);
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.kind.as_deref(), Some("parse_error"));
        assert_eq!(body.details.unwrap()["raw_transcript"], "garbled");
    }
}
