//! State-convergence engine.
//!
//! This crate drives hub entities (lights, switches, fans, ...) to a target
//! on/off state and attribute set. It sends a command, polls until the entity
//! reports the target within tolerance, retries with an escalating timeout,
//! and escalates persistent failures through a delayed background retry and
//! an operator notification.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Gateway (HTTP) / automations                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       EnsureService                         │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌───────────────┐   │
//! │  │ Entity   │ │ Conflict │ │ Fast     │ │  Coordinator  │   │
//! │  │ Resolver │ │ Resolver │ │ Path     │ │  (≤3 at once) │   │
//! │  └──────────┘ └──────────┘ └──────────┘ └───────────────┘   │
//! │                                                │            │
//! │              ┌─────────────────────────────────┘            │
//! │              ▼                                              │
//! │  ┌──────────────────────┐   ┌─────────────────────────┐     │
//! │  │  Convergence Driver  │──►│ Escalation / Background │     │
//! │  │  + Tolerance check   │   │ retry / Notification    │     │
//! │  └──────────────────────┘   └─────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!         ┌──────────────┬─────┴────────┬──────────────┐
//!         ▼              ▼              ▼              ▼
//!   ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────────┐
//!   │ Commands │   │  States  │   │Directory │   │Notifications │
//!   └──────────┘   └──────────┘   └──────────┘   └──────────────┘
//! ```
//!
//! The four collaborators are traits in [`platform`]; [`HassClient`]
//! implements all of them against the Home Assistant REST API.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use ensure_engine::{
//!     AttributeSet, EngineConfig, Ensure, EnsureService, HassClient, HassConfig, Platform,
//!     SharedConfig, Target, TokioExecutor,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hub = Arc::new(HassClient::new(&HassConfig::from_env())?);
//! let platform = Platform::from_hub(hub, Arc::new(TokioExecutor));
//! let service = EnsureService::new(platform, SharedConfig::new(EngineConfig::from_env())?);
//!
//! let dispatch = service
//!     .ensure_on(
//!         Target::EntityId("light.porch".parse()?),
//!         AttributeSet::new().with("brightness_pct", 60),
//!     )
//!     .await?;
//!
//! let report = dispatch.wait().await;
//! println!("all converged: {}", report.all_converged());
//! # Ok(())
//! # }
//! ```
//!
//! # Retry tiers
//!
//! - `Immediate`: up to `max_retries` attempts, timeout `base + n * 500ms`.
//! - `Background`: one more bounded loop after `background_retry_delay_s`,
//!   unless that delay is 300s or more. It never schedules another.
//!
//! A notification is raised only when the last tier that runs is exhausted.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod background;
pub mod colors;
pub mod config;
pub mod conflict;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod escalation;
pub mod hass;
pub mod platform;
pub mod resolver;
pub mod service;
pub mod tolerance;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use background::{DeferredExecutor, TokioExecutor};
pub use config::{EngineConfig, LoggingLevel, SharedConfig, TimingConfig};
pub use driver::{RetryOutcome, RetryTier};
pub use error::{EngineError, Result};
pub use escalation::Escalation;
pub use hass::{HassClient, HassConfig};
pub use platform::{Command, CommandDispatch, Directory, Notification, NotificationSink, Platform, StateQuery};
pub use resolver::Target;
pub use service::{Ensure, EnsureService};
pub use types::{BatchReport, Dispatch, EntityOutcome, EntityReport};

// Re-export commonly used types from dependencies for convenience
pub use ensure_core::{AreaId, AttributeSet, DeviceId, EntityId, EntityState, InvocationId, NotificationId, PowerState};
