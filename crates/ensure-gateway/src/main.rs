//! Ensure gateway binary.
//!
//! Runs the convergence engine against the Home Assistant hub named by
//! `HASS_URL` / `HASS_TOKEN` and serves the HTTP API on `LISTEN_ADDR`.
//!
//! Log output follows the engine's `logging_level` option and changes when
//! the option is updated, unless `RUST_LOG` is set, in which case `RUST_LOG`
//! wins for the lifetime of the process.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use ensure_engine::{
    EngineConfig, EnsureService, HassClient, HassConfig, LoggingLevel, Platform, SharedConfig,
    TokioExecutor,
};
use ensure_gateway::{create_router, GatewayConfig, GatewayState, LogReload};

fn level_filter(level: LoggingLevel) -> EnvFilter {
    EnvFilter::new(format!(
        "{},ensure_engine={directive},ensure_gateway={directive}",
        if level == LoggingLevel::Minimal { "warn" } else { "info" },
        directive = level.filter_directive(),
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let engine_config = EngineConfig::from_env();

    // Initialize tracing
    let pinned = EnvFilter::try_from_default_env().ok();
    let from_env = pinned.is_some();
    let filter = pinned.unwrap_or_else(|| level_filter(engine_config.logging_level));
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ensure gateway");

    let gateway_config = GatewayConfig::from_env();
    let hass_config = HassConfig::from_env();
    tracing::info!(
        listen_addr = %gateway_config.listen_addr,
        hass_url = %hass_config.base_url,
        has_token = !hass_config.token.is_empty(),
        config = ?engine_config,
        "Gateway configuration loaded"
    );

    let hub = Arc::new(HassClient::new(&hass_config)?);
    let platform = Platform::from_hub(hub, Arc::new(TokioExecutor));
    let engine_config = SharedConfig::new(engine_config)?;
    let service = Arc::new(EnsureService::new(platform, engine_config.clone()));

    let listen_addr = gateway_config.listen_addr.clone();
    let mut state = GatewayState::new(service, engine_config, gateway_config);
    if !from_env {
        let reload: LogReload = Arc::new(move |level| {
            match handle.reload(level_filter(level)) {
                Ok(()) => tracing::info!(?level, "Logging level changed"),
                Err(e) => tracing::error!(error = %e, "Failed to reload log filter"),
            }
        });
        state = state.with_log_reload(reload);
    }

    let app = create_router(state);

    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
