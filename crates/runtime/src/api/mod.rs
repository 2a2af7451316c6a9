//! HTTP API module for SSN Sentinel
//!
//! Optional HTTP front end over the inference coordinator. The entire module
//! is conditionally compiled based on the `http-api` feature flag.

pub mod middleware;
pub mod routes;
pub mod server;
pub mod types;
pub mod ui;

pub use routes::AppState;
pub use server::{ApiDoc, HttpApiConfig, HttpApiServer};
pub use types::{DetectRequestBody, ErrorResponse, GuardResponse, HealthResponse, BLOCKED_MESSAGE};
