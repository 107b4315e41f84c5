//! Core types and utilities for ensure.
//!
//! This crate provides the foundational types used throughout the convergence engine:
//!
//! - **Identifiers**: Strongly-typed IDs for entities, areas, devices, and invocations
//! - **State**: Desired and observed power state plus the attribute set carried with it
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use ensure_core::{AttributeSet, EntityId, PowerState};
//!
//! // Parse an entity ID
//! let entity_id: EntityId = "light.kitchen".parse().unwrap();
//! assert_eq!(entity_id.domain(), "light");
//!
//! // Build an attribute set
//! let attrs = AttributeSet::new().with("brightness_pct", 50);
//! assert_eq!(attrs.number("brightness_pct"), Some(50.0));
//!
//! assert_eq!(PowerState::On.opposite(), PowerState::Off);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod attributes;
pub mod error;
pub mod ids;
pub mod state;

pub use attributes::AttributeSet;
pub use error::{CoreError, Result};
pub use ids::{AreaId, DeviceId, EntityId, IdError, InvocationId, NotificationId};
pub use state::{EntityState, PowerState};
