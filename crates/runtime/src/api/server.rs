//! HTTP API server implementation
//!
//! Builds the axum router (UI page, detection API, health, OpenAPI document)
//! and serves it until a shutdown signal arrives.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;

use super::middleware::bearer_auth;
use super::routes::{self, AppState};
use super::types::{DetectRequestBody, ErrorResponse, GuardResponse, HealthResponse};
use super::ui;
use crate::config::ApiConfig;
use crate::coordinator::{DetectionService, StatsSnapshot};
use crate::models::RuntimeInfo;
use crate::types::{
    DecodingOverrides, Detection, DetectionReport, ParseWarning, ReasoningMode, RequestId,
    RequestTiming, ServerError, TokenUsage, Transcript, WarningKind,
};

#[derive(OpenApi)]
#[openapi(
    paths(routes::detect, routes::guard, routes::health_check),
    components(schemas(
        DetectRequestBody,
        DecodingOverrides,
        ReasoningMode,
        DetectionReport,
        Detection,
        ParseWarning,
        WarningKind,
        Transcript,
        TokenUsage,
        RequestTiming,
        RequestId,
        GuardResponse,
        HealthResponse,
        RuntimeInfo,
        StatsSnapshot,
        ErrorResponse
    )),
    tags(
        (name = "detection", description = "SSN detection"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;

/// HTTP API Server configuration
#[derive(Debug, Clone)]
pub struct HttpApiConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Enable request tracing
    pub enable_tracing: bool,
    /// Bearer token required on the detection endpoints
    pub auth_token: Option<String>,
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
}

impl Default for HttpApiConfig {
    fn default() -> Self {
        Self::from(&ApiConfig::default())
    }
}

impl From<&ApiConfig> for HttpApiConfig {
    fn from(api: &ApiConfig) -> Self {
        Self {
            bind_address: api.host.clone(),
            port: api.port,
            enable_cors: api.enable_cors,
            enable_tracing: true,
            auth_token: api.auth_token.clone(),
            request_timeout: Duration::from_secs(api.request_timeout_seconds),
            max_body_bytes: api.max_body_bytes,
        }
    }
}

/// HTTP API Server
pub struct HttpApiServer {
    config: HttpApiConfig,
    service: Arc<dyn DetectionService>,
}

impl HttpApiServer {
    pub fn new(config: HttpApiConfig, service: Arc<dyn DetectionService>) -> Self {
        Self { config, service }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.config.bind_address, self.config.port)
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn serve<F>(&self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                address: addr.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!("HTTP API server starting on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Serve {
                reason: e.to_string(),
            })?;

        tracing::info!("HTTP API server stopped");
        Ok(())
    }

    /// Create the Axum router with all routes and middleware
    pub fn router(&self) -> Router {
        let state = AppState {
            service: self.service.clone(),
            request_timeout: self.config.request_timeout,
            started_at: Instant::now(),
        };

        let mut detection = Router::new()
            .route("/api/v1/detect", post(routes::detect))
            .route("/api/v1/guard", post(routes::guard));

        if let Some(token) = &self.config.auth_token {
            let expected: Arc<str> = Arc::from(token.as_str());
            detection = detection.layer(middleware::from_fn_with_state(expected, bearer_auth));
        } else {
            tracing::debug!("No API token configured; detection endpoints are open");
        }

        let mut router = Router::new()
            .route("/", get(ui::index))
            .route("/api-docs/openapi.json", get(openapi_json))
            .route("/api/v1/health", get(routes::health_check))
            .merge(detection)
            .with_state(state)
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes));

        if self.config.enable_tracing {
            router = router.layer(TraceLayer::new_for_http());
        }

        if self.config.enable_cors {
            router = router.layer(CorsLayer::permissive());
        }

        router
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
