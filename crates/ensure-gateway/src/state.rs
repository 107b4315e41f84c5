//! Gateway application state.
//!
//! This module defines the shared state that is available to all request handlers.

use std::fmt;
use std::sync::Arc;

use ensure_engine::{Ensure, LoggingLevel, SharedConfig};

use crate::config::GatewayConfig;

/// Applies a new logging level to the running subscriber.
pub type LogReload = Arc<dyn Fn(LoggingLevel) + Send + Sync>;

/// Shared application state for the gateway.
///
/// This struct holds references to all services needed by the HTTP handlers.
pub struct GatewayState<E>
where
    E: Ensure,
{
    /// The convergence engine.
    pub ensure: Arc<E>,
    /// Engine configuration, replaced by options updates.
    pub engine_config: SharedConfig,
    /// Gateway configuration.
    pub config: GatewayConfig,
    /// Hook for logging level changes; `None` when `RUST_LOG` pins the filter.
    pub log_reload: Option<LogReload>,
}

impl<E> GatewayState<E>
where
    E: Ensure,
{
    /// Create a new gateway state.
    #[must_use]
    pub fn new(ensure: Arc<E>, engine_config: SharedConfig, config: GatewayConfig) -> Self {
        Self {
            ensure,
            engine_config,
            config,
            log_reload: None,
        }
    }

    /// Install a logging level hook.
    #[must_use]
    pub fn with_log_reload(mut self, reload: LogReload) -> Self {
        self.log_reload = Some(reload);
        self
    }
}

impl<E> Clone for GatewayState<E>
where
    E: Ensure,
{
    fn clone(&self) -> Self {
        Self {
            ensure: Arc::clone(&self.ensure),
            engine_config: self.engine_config.clone(),
            config: self.config.clone(),
            log_reload: self.log_reload.clone(),
        }
    }
}

impl<E> fmt::Debug for GatewayState<E>
where
    E: Ensure,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayState")
            .field("engine_config", &self.engine_config)
            .field("config", &self.config)
            .field("log_reload", &self.log_reload.is_some())
            .finish_non_exhaustive()
    }
}
