//! Collaborator interfaces consumed by the engine.
//!
//! The engine owns none of the hub's behaviour. It talks to it through four
//! narrow traits, bundled together in [`Platform`] along with the executor
//! used for deferred work.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ensure_core::{AreaId, AttributeSet, DeviceId, EntityId, EntityState, NotificationId, PowerState};
use serde::{Deserialize, Serialize};

use crate::background::DeferredExecutor;
use crate::error::Result;

/// Domain used to command group entities.
pub const GENERIC_DOMAIN: &str = "homeassistant";

/// A single control command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Service domain (`light`, `switch`, `homeassistant`, ...).
    pub domain: String,
    /// Service action (`turn_on`, `turn_off`).
    pub action: String,
    /// Entity the command targets.
    pub entity_id: EntityId,
    /// Attributes forwarded with the command.
    pub attributes: AttributeSet,
}

impl Command {
    /// Build a command driving `entity_id` into `state`.
    ///
    /// Group entities are addressed through the generic domain; every other
    /// entity through its own.
    #[must_use]
    pub fn for_state(entity_id: &EntityId, state: PowerState, attributes: AttributeSet) -> Self {
        let domain = if entity_id.is_group() {
            GENERIC_DOMAIN
        } else {
            entity_id.domain()
        };

        Self {
            domain: domain.to_string(),
            action: state.action().to_string(),
            entity_id: entity_id.clone(),
            attributes,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({})", self.domain, self.action, self.entity_id)
    }
}

/// An operator-facing failure notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Per-entity key; at most one notification per entity is outstanding.
    pub id: NotificationId,
    /// Short title.
    pub title: String,
    /// Body, ending with the manual retry link.
    pub message: String,
    /// Entity that failed to converge.
    pub entity_id: EntityId,
    /// State it was being driven to.
    pub target_state: PowerState,
    /// When the notification was raised.
    pub created_at: DateTime<Utc>,
}

/// Sends control commands to the hub.
#[async_trait]
pub trait CommandDispatch: Send + Sync {
    /// Send a command.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub rejects the command or cannot be reached.
    async fn send(&self, command: &Command) -> Result<()>;
}

/// Reads observed entity state.
#[async_trait]
pub trait StateQuery: Send + Sync {
    /// Get the current state of an entity, or `None` if the hub does not know it.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub cannot be reached.
    async fn get_state(&self, entity_id: &EntityId) -> Result<Option<EntityState>>;
}

/// Expands logical targets into entity ids.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Entities assigned to an area.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    async fn entities_for_area(&self, area_id: &AreaId) -> Result<Vec<EntityId>>;

    /// Entities belonging to a device.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    async fn entities_for_device(&self, device_id: &DeviceId) -> Result<Vec<EntityId>>;

    /// Direct members of a group. A non-group entity returns an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    async fn expand_group(&self, entity_id: &EntityId) -> Result<Vec<EntityId>>;
}

/// Operator notification surface.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Create or replace the notification with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification could not be delivered.
    async fn create(&self, notification: &Notification) -> Result<()>;

    /// Dismiss a notification. Dismissing an unknown id is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub cannot be reached.
    async fn dismiss(&self, id: &NotificationId) -> Result<()>;
}

/// Everything the engine needs from the outside world.
#[derive(Clone)]
pub struct Platform {
    /// Command dispatch.
    pub commands: Arc<dyn CommandDispatch>,
    /// State query.
    pub states: Arc<dyn StateQuery>,
    /// Entity directory.
    pub directory: Arc<dyn Directory>,
    /// Notification sink.
    pub notifications: Arc<dyn NotificationSink>,
    /// Executor for background retries.
    pub executor: Arc<dyn DeferredExecutor>,
}

impl Platform {
    /// Build a platform from a single value implementing every collaborator trait.
    pub fn from_hub<H>(hub: Arc<H>, executor: Arc<dyn DeferredExecutor>) -> Self
    where
        H: CommandDispatch + StateQuery + Directory + NotificationSink + 'static,
    {
        Self {
            commands: hub.clone(),
            states: hub.clone(),
            directory: hub.clone(),
            notifications: hub,
            executor,
        }
    }

    /// Read an entity's state, treating a query failure as absent.
    pub(crate) async fn observe(&self, entity_id: &EntityId) -> Option<EntityState> {
        match self.states.get_state(entity_id).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(entity_id = %entity_id, error = %e, "State query failed");
                None
            }
        }
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_commands_use_generic_domain() {
        let group: EntityId = "group.kitchen".parse().unwrap();
        let command = Command::for_state(&group, PowerState::On, AttributeSet::new());
        assert_eq!(command.domain, "homeassistant");
        assert_eq!(command.action, "turn_on");

        let light: EntityId = "light.desk".parse().unwrap();
        let command = Command::for_state(&light, PowerState::Off, AttributeSet::new());
        assert_eq!(command.domain, "light");
        assert_eq!(command.to_string(), "light.turn_off(light.desk)");
    }
}
