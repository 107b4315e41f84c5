//! Engine options endpoints.
//!
//! A replaced configuration applies to invocations started afterwards. Runs
//! already in flight keep the snapshot they started with.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use ensure_engine::{EngineConfig, Ensure};

use crate::error::ApiError;
use crate::state::GatewayState;

/// Return the current engine configuration.
pub async fn get_options<E>(State(state): State<Arc<GatewayState<E>>>) -> Json<EngineConfig>
where
    E: Ensure + 'static,
{
    Json(EngineConfig::clone(&state.engine_config.snapshot()))
}

/// Validate and install a new engine configuration.
///
/// Omitted fields take their defaults. An out-of-range value is rejected
/// with `400` naming the field and the current configuration is kept.
///
/// ```text
/// PUT /v1/options
/// {
///   "max_retries": 3,
///   "timing": { "mode": "base_timeout", "base_timeout_ms": 800 },
///   "logging_level": "verbose"
/// }
/// ```
pub async fn put_options<E>(
    State(state): State<Arc<GatewayState<E>>>,
    Json(config): Json<EngineConfig>,
) -> Result<Json<EngineConfig>, ApiError>
where
    E: Ensure + 'static,
{
    let level = config.logging_level;
    let previous = state.engine_config.replace(config)?;

    if previous.logging_level != level {
        match &state.log_reload {
            Some(reload) => reload(level),
            None => tracing::debug!(?level, "Log filter pinned by RUST_LOG; level change ignored"),
        }
    }

    Ok(Json(EngineConfig::clone(&state.engine_config.snapshot())))
}
