//! Health check endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use ensure_engine::{Ensure, LoggingLevel};

use crate::state::GatewayState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Active engine logging level.
    pub logging_level: LoggingLevel,
    /// Whether exhausted entities get a deferred background retry.
    pub background_retry: bool,
}

/// Health check handler.
///
/// ```text
/// GET /health
///
/// Response: 200 OK
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "logging_level": "normal",
///   "background_retry": true
/// }
/// ```
pub async fn health<E>(State(state): State<Arc<GatewayState<E>>>) -> Json<HealthResponse>
where
    E: Ensure + 'static,
{
    let config = state.engine_config.snapshot();

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        logging_level: config.logging_level,
        background_retry: config.background_retry_enabled(),
    })
}
