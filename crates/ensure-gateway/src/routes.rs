//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use ensure_engine::{escalation::RETRY_ACTION_PATH, Ensure};

use crate::handlers::{ensure, health, options};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// - `GET /health` - Health check
/// - `POST /v1/ensure/turn_on` - Drive a target on
/// - `POST /v1/ensure/turn_off` - Drive a target off
/// - `POST /v1/ensure/toggle` - Flip each entity
/// - `POST /v1/ensure/toggle_group` - Drive all entities to one shared state
/// - `POST /v1/ensure/retry_failed_device` - Retry a failed entity
/// - `GET /api/services/ensure/retry_failed_device` - Retry link from a notification
/// - `GET /v1/options` - Current engine configuration
/// - `PUT /v1/options` - Replace engine configuration
pub fn create_router<E>(state: GatewayState<E>) -> Router
where
    E: Ensure + 'static,
{
    // Extract config values before moving state
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();

    let state = Arc::new(state);

    Router::new()
        .route("/health", get(health::health::<E>))
        // Convergence operations
        .route("/v1/ensure/turn_on", post(ensure::turn_on::<E>))
        .route("/v1/ensure/turn_off", post(ensure::turn_off::<E>))
        .route("/v1/ensure/toggle", post(ensure::toggle::<E>))
        .route("/v1/ensure/toggle_group", post(ensure::toggle_group::<E>))
        .route(
            "/v1/ensure/retry_failed_device",
            post(ensure::retry_failed_device::<E>),
        )
        .route(
            RETRY_ACTION_PATH,
            get(ensure::retry_failed_device_link::<E>),
        )
        // Options
        .route(
            "/v1/options",
            get(options::get_options::<E>).put(options::put_options::<E>),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_any_origin() {
        let _layer = build_cors_layer(&["*".to_string()]);
    }

    #[test]
    fn cors_skips_unparseable_origins() {
        let origins = vec![
            "http://homeassistant.local:8123".to_string(),
            "not a header\nvalue".to_string(),
        ];
        let _layer = build_cors_layer(&origins);
    }
}
