//! HTTP gateway for the ensure convergence engine.
//!
//! This crate exposes the engine's operations and its options update over a
//! small JSON API, and ships the binary that runs the engine against a Home
//! Assistant hub.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Automations / dashboards / operators           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ensure-gateway                        │
//! │  ┌─────────────┐ ┌──────────────────┐ ┌─────────────────┐   │
//! │  │   Router    │ │ Ensure handlers  │ │ Options + log   │   │
//! │  │ + middleware│ │  (202 Accepted)  │ │ level reload    │   │
//! │  └─────────────┘ └──────────────────┘ └─────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                  ┌──────────────────────┐
//!                  │    ensure-engine     │──► Home Assistant
//!                  └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ensure_engine::{
//!     EngineConfig, EnsureService, HassClient, HassConfig, Platform, SharedConfig, TokioExecutor,
//! };
//! use ensure_gateway::{create_router, GatewayConfig, GatewayState};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hub = Arc::new(HassClient::new(&HassConfig::from_env())?);
//! let platform = Platform::from_hub(hub, Arc::new(TokioExecutor));
//! let engine_config = SharedConfig::new(EngineConfig::from_env())?;
//! let service = Arc::new(EnsureService::new(platform, engine_config.clone()));
//!
//! let state = GatewayState::new(service, engine_config, GatewayConfig::default());
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::{GatewayState, LogReload};
