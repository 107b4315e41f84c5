//! In-memory hub for tests.
//!
//! [`InMemoryPlatform`] implements every collaborator trait over plain maps.
//! Each entity has a [`Behaviour`] that decides how it reacts to commands,
//! which is enough to exercise convergence, retries and escalation without a
//! real hub. [`ManualExecutor`] captures background jobs so tests decide when
//! they run.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ensure_core::attributes::keys;
use ensure_core::{AreaId, AttributeSet, DeviceId, EntityId, EntityState, NotificationId};
use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::background::DeferredExecutor;
use crate::colors;
use crate::error::{EngineError, Result};
use crate::platform::{
    Command, CommandDispatch, Directory, Notification, NotificationSink, Platform, StateQuery,
    GENERIC_DOMAIN,
};

/// How a simulated entity reacts to commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Applies every command immediately.
    Responsive,
    /// Accepts commands but never changes state.
    Unresponsive,
    /// Applies the on/off state and brightness but reports no color telemetry.
    NoColorFeedback,
    /// Rejects every command with an error.
    FailCommands,
    /// Ignores the first `n - 1` commands and applies the `n`th onwards.
    ConvergeAfter(u32),
}

#[derive(Debug, Clone)]
struct SimEntity {
    state: EntityState,
    behaviour: Behaviour,
    received: u32,
}

/// A simulated hub.
#[derive(Default)]
pub struct InMemoryPlatform {
    entities: Mutex<HashMap<EntityId, SimEntity>>,
    groups: Mutex<HashMap<EntityId, Vec<EntityId>>>,
    broken_groups: Mutex<HashSet<EntityId>>,
    rejecting_groups: Mutex<HashSet<EntityId>>,
    areas: Mutex<HashMap<String, Vec<EntityId>>>,
    devices: Mutex<HashMap<String, Vec<EntityId>>>,
    commands: Mutex<Vec<Command>>,
    created: Mutex<Vec<Notification>>,
    active: Mutex<HashMap<NotificationId, Notification>>,
    dismissed: Mutex<Vec<NotificationId>>,
    executor: Arc<ManualExecutor>,
}

impl InMemoryPlatform {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty hub behind an `Arc`.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Build a [`Platform`] backed by this hub and its [`ManualExecutor`].
    #[must_use]
    pub fn platform(self: &Arc<Self>) -> Platform {
        Platform::from_hub(self.clone(), self.executor.clone())
    }

    /// Build a [`Platform`] backed by this hub and the given executor.
    #[must_use]
    pub fn platform_with(self: &Arc<Self>, executor: Arc<dyn DeferredExecutor>) -> Platform {
        Platform::from_hub(self.clone(), executor)
    }

    /// The executor that collects background jobs.
    #[must_use]
    pub fn executor(&self) -> Arc<ManualExecutor> {
        self.executor.clone()
    }

    /// Add an entity with no attributes.
    ///
    /// # Panics
    ///
    /// Panics if `entity_id` is malformed.
    pub fn add_entity(&self, entity_id: &str, state: &str, behaviour: Behaviour) {
        self.add_entity_with(entity_id, state, AttributeSet::new(), behaviour);
    }

    /// Add an entity with attributes.
    ///
    /// # Panics
    ///
    /// Panics if `entity_id` is malformed.
    pub fn add_entity_with(
        &self,
        entity_id: &str,
        state: &str,
        attributes: AttributeSet,
        behaviour: Behaviour,
    ) {
        self.entities.lock().insert(
            parse(entity_id),
            SimEntity {
                state: EntityState::with_attributes(state, attributes),
                behaviour,
                received: 0,
            },
        );
    }

    /// Register a group and its direct members.
    ///
    /// # Panics
    ///
    /// Panics if an id is malformed.
    pub fn add_group(&self, group_id: &str, members: &[&str]) {
        self.groups
            .lock()
            .insert(parse(group_id), members.iter().map(|m| parse(m)).collect());
    }

    /// Make expanding `group_id` fail.
    ///
    /// # Panics
    ///
    /// Panics if `group_id` is malformed.
    pub fn fail_group_expansion(&self, group_id: &str) {
        self.broken_groups.lock().insert(parse(group_id));
    }

    /// Make every command addressed to `group_id` itself fail. Members can
    /// still be commanded individually.
    ///
    /// # Panics
    ///
    /// Panics if `group_id` is malformed.
    pub fn fail_group_commands(&self, group_id: &str) {
        self.rejecting_groups.lock().insert(parse(group_id));
    }

    /// Assign entities to an area.
    ///
    /// # Panics
    ///
    /// Panics if an id is malformed.
    pub fn add_area(&self, area_id: &str, entities: &[&str]) {
        self.areas
            .lock()
            .insert(area_id.to_string(), entities.iter().map(|e| parse(e)).collect());
    }

    /// Assign entities to a device.
    ///
    /// # Panics
    ///
    /// Panics if an id is malformed.
    pub fn add_device(&self, device_id: &str, entities: &[&str]) {
        self.devices
            .lock()
            .insert(device_id.to_string(), entities.iter().map(|e| parse(e)).collect());
    }

    /// Change an entity's reported state directly.
    ///
    /// # Panics
    ///
    /// Panics if `entity_id` is malformed.
    pub fn set_state(&self, entity_id: &str, state: &str) {
        if let Some(entity) = self.entities.lock().get_mut(&parse(entity_id)) {
            entity.state.state = state.to_string();
        }
    }

    /// Change an entity's behaviour.
    ///
    /// # Panics
    ///
    /// Panics if `entity_id` is malformed.
    pub fn set_behaviour(&self, entity_id: &str, behaviour: Behaviour) {
        if let Some(entity) = self.entities.lock().get_mut(&parse(entity_id)) {
            entity.behaviour = behaviour;
        }
    }

    /// Current reported state of an entity.
    ///
    /// # Panics
    ///
    /// Panics if `entity_id` is malformed.
    #[must_use]
    pub fn state_of(&self, entity_id: &str) -> Option<EntityState> {
        self.entities
            .lock()
            .get(&parse(entity_id))
            .map(|e| e.state.clone())
    }

    /// Every command received, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().clone()
    }

    /// Commands addressed to `entity_id`.
    #[must_use]
    pub fn commands_for(&self, entity_id: &str) -> Vec<Command> {
        self.commands
            .lock()
            .iter()
            .filter(|c| c.entity_id.as_str() == entity_id)
            .cloned()
            .collect()
    }

    /// Every notification ever created, in order.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.created.lock().clone()
    }

    /// Notifications that have not been dismissed.
    #[must_use]
    pub fn active_notifications(&self) -> Vec<Notification> {
        self.active.lock().values().cloned().collect()
    }

    /// Ids dismissed so far.
    #[must_use]
    pub fn dismissed(&self) -> Vec<NotificationId> {
        self.dismissed.lock().clone()
    }

    fn apply(&self, entity_id: &EntityId, command: &Command) -> Result<()> {
        if self.rejecting_groups.lock().contains(entity_id) {
            return Err(EngineError::Platform(format!("{entity_id} is unavailable")));
        }
        let members = self.groups.lock().get(entity_id).cloned();
        if let Some(members) = members {
            for member in &members {
                // Members of a commanded group ignore individual failures.
                let _ = self.apply(member, command);
            }
            return Ok(());
        }

        let mut entities = self.entities.lock();
        let Some(entity) = entities.get_mut(entity_id) else {
            return Ok(());
        };
        entity.received += 1;

        let applies = match entity.behaviour {
            Behaviour::Responsive | Behaviour::NoColorFeedback => true,
            Behaviour::Unresponsive => false,
            Behaviour::FailCommands => {
                return Err(EngineError::Platform(format!(
                    "{entity_id} rejected {}",
                    command.action
                )));
            }
            Behaviour::ConvergeAfter(n) => entity.received >= n,
        };
        if !applies {
            return Ok(());
        }

        match command.action.as_str() {
            "turn_on" => {
                entity.state.state = "on".to_string();
                merge_reported(&mut entity.state.attributes, &command.attributes);
                if entity.behaviour == Behaviour::NoColorFeedback {
                    for key in [
                        keys::RGB_COLOR,
                        keys::HS_COLOR,
                        keys::XY_COLOR,
                        keys::COLOR_TEMP_KELVIN,
                    ] {
                        entity.state.attributes.remove(key);
                    }
                }
            }
            "turn_off" => entity.state.state = "off".to_string(),
            _ => {}
        }
        Ok(())
    }
}

/// Fold commanded attributes into what the device reports back.
fn merge_reported(reported: &mut AttributeSet, commanded: &AttributeSet) {
    for (key, value) in commanded.iter() {
        match key.as_str() {
            keys::BRIGHTNESS_PCT => {
                if let Some(pct) = value.as_f64() {
                    reported.insert(keys::BRIGHTNESS, (pct * 255.0 / 100.0).round());
                }
            }
            keys::COLOR_NAME => {
                if let Some(rgb) = value.as_str().and_then(colors::rgb_for_name) {
                    reported.insert(keys::RGB_COLOR, rgb.to_vec());
                }
            }
            keys::KELVIN => {
                reported.insert(keys::COLOR_TEMP_KELVIN, value.clone());
            }
            keys::TRANSITION | keys::FLASH | keys::DELAY => {}
            _ => {
                reported.insert(key.clone(), value.clone());
            }
        }
    }
}

fn parse(entity_id: &str) -> EntityId {
    entity_id
        .parse()
        .unwrap_or_else(|e| panic!("invalid test entity id {entity_id:?}: {e}"))
}

impl fmt::Debug for InMemoryPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryPlatform")
            .field("entities", &self.entities.lock().len())
            .field("commands", &self.commands.lock().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CommandDispatch for InMemoryPlatform {
    async fn send(&self, command: &Command) -> Result<()> {
        self.commands.lock().push(command.clone());
        if command.domain == GENERIC_DOMAIN && !command.entity_id.is_group() {
            tracing::debug!(command = %command, "Generic domain used for a non-group entity");
        }
        self.apply(&command.entity_id, command)
    }
}

#[async_trait]
impl StateQuery for InMemoryPlatform {
    async fn get_state(&self, entity_id: &EntityId) -> Result<Option<EntityState>> {
        Ok(self.entities.lock().get(entity_id).map(|e| e.state.clone()))
    }
}

#[async_trait]
impl Directory for InMemoryPlatform {
    async fn entities_for_area(&self, area_id: &AreaId) -> Result<Vec<EntityId>> {
        Ok(self.areas.lock().get(area_id.as_str()).cloned().unwrap_or_default())
    }

    async fn entities_for_device(&self, device_id: &DeviceId) -> Result<Vec<EntityId>> {
        Ok(self
            .devices
            .lock()
            .get(device_id.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn expand_group(&self, entity_id: &EntityId) -> Result<Vec<EntityId>> {
        if self.broken_groups.lock().contains(entity_id) {
            return Err(EngineError::Platform(format!("cannot expand {entity_id}")));
        }
        Ok(self.groups.lock().get(entity_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl NotificationSink for InMemoryPlatform {
    async fn create(&self, notification: &Notification) -> Result<()> {
        self.created.lock().push(notification.clone());
        self.active
            .lock()
            .insert(notification.id.clone(), notification.clone());
        Ok(())
    }

    async fn dismiss(&self, id: &NotificationId) -> Result<()> {
        self.active.lock().remove(id);
        self.dismissed.lock().push(id.clone());
        Ok(())
    }
}

/// A deferred executor that holds jobs until a test runs them.
#[derive(Default)]
pub struct ManualExecutor {
    jobs: Mutex<Vec<(Duration, BoxFuture<'static, ()>)>>,
}

impl ManualExecutor {
    /// Number of jobs waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Delays of the waiting jobs, in scheduling order.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        self.jobs.lock().iter().map(|(delay, _)| *delay).collect()
    }

    /// Run every waiting job in order, sleeping for its delay first.
    ///
    /// Jobs scheduled while this runs are left for the next call.
    pub async fn run_pending(&self) -> usize {
        let jobs = std::mem::take(&mut *self.jobs.lock());
        let count = jobs.len();
        for (delay, job) in jobs {
            tokio::time::sleep(delay).await;
            job.await;
        }
        count
    }
}

impl DeferredExecutor for ManualExecutor {
    fn schedule(&self, delay: Duration, job: BoxFuture<'static, ()>) {
        self.jobs.lock().push((delay, job));
    }
}

impl fmt::Debug for ManualExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualExecutor")
            .field("pending", &self.pending())
            .finish()
    }
}
