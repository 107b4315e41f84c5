//! The `Ensure` service.
//!
//! This module provides the `Ensure` trait and `EnsureService`, which wires the
//! resolvers, fast path, coordinator and escalation together for each
//! invocation.

use std::sync::Arc;

use async_trait::async_trait;
use ensure_core::attributes::keys;
use ensure_core::{AttributeSet, EntityId, InvocationId, NotificationId, PowerState};
use tracing::Instrument;

use crate::config::{EngineConfig, SharedConfig, FAST_PATH_SETTLE, MAX_CONCURRENT_CONVERGENCE};
use crate::conflict;
use crate::coordinator;
use crate::driver::{ConvergenceTask, RetryOutcome, RetryTier};
use crate::error::{EngineError, Result};
use crate::escalation;
use crate::platform::{Command, Platform};
use crate::resolver::{self, Resolution, Target};
use crate::tolerance;
use crate::types::{Dispatch, EntityOutcome, EntityReport};

/// Operations exposed to callers.
///
/// Every operation returns once the fast path has run and the per-entity pass
/// has been launched; use [`Dispatch::wait`] to observe final outcomes. Only
/// validation failures are returned as errors.
#[async_trait]
pub trait Ensure: Send + Sync {
    /// Drive every entity of `target` on, with `attributes`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NoEntities` if the target resolves to nothing, or
    /// a validation error for a malformed `delay` attribute.
    async fn ensure_on(&self, target: Target, attributes: AttributeSet) -> Result<Dispatch>;

    /// Drive every entity of `target` off.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NoEntities` if the target resolves to nothing.
    async fn ensure_off(&self, target: Target) -> Result<Dispatch>;

    /// Flip each entity of `target` independently. Entities that are not
    /// currently on are driven on.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NoEntities` if the target resolves to nothing.
    async fn toggle(&self, target: Target) -> Result<Dispatch>;

    /// Drive all entities off if any is on, otherwise all on.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NoEntities` if the target resolves to nothing.
    async fn toggle_group(&self, target: Target) -> Result<Dispatch>;

    /// Dismiss the entity's failure notification and drive it again.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NoEntities` if the entity resolves to nothing.
    async fn retry_failed(&self, entity_id: EntityId, target_state: PowerState) -> Result<Dispatch>;
}

/// The engine's service implementation.
#[derive(Debug, Clone)]
pub struct EnsureService {
    platform: Platform,
    config: SharedConfig,
}

/// What an invocation drives each entity to.
#[derive(Debug, Clone, Copy)]
enum Desired {
    /// Every entity to the same state, with a fast path.
    All(PowerState),
    /// Each entity to the opposite of its current state, without a fast path.
    Flip,
    /// Every entity off if any is on, otherwise every entity on.
    FlipTogether,
}

impl EnsureService {
    /// Create a new service.
    #[must_use]
    pub const fn new(platform: Platform, config: SharedConfig) -> Self {
        Self { platform, config }
    }

    /// The shared configuration cell.
    #[must_use]
    pub const fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// The collaborators this service drives.
    #[must_use]
    pub const fn platform(&self) -> &Platform {
        &self.platform
    }

    async fn invoke(
        &self,
        operation: &'static str,
        target: Target,
        desired: Desired,
        attributes: AttributeSet,
    ) -> Result<Dispatch> {
        let invocation_id = InvocationId::generate();
        let span = tracing::info_span!("ensure", %invocation_id, operation);

        self.run(invocation_id, target, desired, attributes)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        invocation_id: InvocationId,
        target: Target,
        desired: Desired,
        raw_attributes: AttributeSet,
    ) -> Result<Dispatch> {
        let config = self.config.snapshot();

        let attributes = match desired {
            Desired::All(state) => conflict::resolve(&raw_attributes, state),
            Desired::Flip | Desired::FlipTogether => raw_attributes,
        };
        let delay_override = attributes.delay_override_ms()?;
        let base_timeout_ms = delay_override.unwrap_or_else(|| config.base_timeout_ms());
        if let Some(ms) = delay_override {
            tracing::debug!(base_timeout_ms = ms, "Using delay override");
        }

        let resolution = resolver::resolve(self.platform.directory.as_ref(), &target).await?;
        if resolution.is_empty() {
            tracing::warn!(?target, "No entities resolved");
            return Err(EngineError::NoEntities);
        }

        let (desired_states, fast_path): (Vec<(EntityId, PowerState)>, Option<PowerState>) = match desired {
            Desired::All(state) => (
                resolution.entities.iter().map(|id| (id.clone(), state)).collect(),
                Some(state),
            ),
            Desired::Flip => (self.flipped(&resolution.entities).await, None),
            Desired::FlipTogether => {
                let state = if self.any_on(&resolution.entities).await {
                    PowerState::Off
                } else {
                    PowerState::On
                };
                tracing::info!(state = %state, "Group toggle");
                (
                    resolution.entities.iter().map(|id| (id.clone(), state)).collect(),
                    Some(state),
                )
            }
        };

        tracing::info!(
            entities = resolution.entities.len(),
            base_timeout_ms,
            max_retries = config.max_retries,
            "Dispatching"
        );

        if self.all_converged(&desired_states, &attributes).await {
            tracing::info!("All entities already in target state");
            let reports: Vec<EntityReport> = desired_states
                .iter()
                .map(|(entity_id, _)| EntityReport {
                    entity_id: entity_id.clone(),
                    outcome: EntityOutcome::Converged { attempts: 0 },
                })
                .collect();
            let handle = tokio::spawn(async move { reports });
            return Ok(Dispatch::new(invocation_id, desired_states, handle));
        }

        if let Some(state) = fast_path {
            self.fast_path(&resolution, state, &attributes).await;
            tokio::time::sleep(FAST_PATH_SETTLE).await;
        }

        let group_origin = target.group_origin().cloned();
        let jobs: Vec<_> = desired_states
            .iter()
            .map(|(entity_id, state)| {
                let task = ConvergenceTask {
                    platform: self.platform.clone(),
                    config: Arc::clone(&config),
                    entity_id: entity_id.clone(),
                    target: *state,
                    attributes: attributes.clone(),
                    base_timeout_ms,
                    group_origin: group_origin.clone(),
                };
                (entity_id.clone(), task)
            })
            .collect();

        let handle = tokio::spawn(
            coordinator::drive_all(jobs, MAX_CONCURRENT_CONVERGENCE, drive_entity)
                .in_current_span(),
        );

        Ok(Dispatch::new(invocation_id, desired_states, handle))
    }

    /// Send one optimistic command per direct target id.
    async fn fast_path(&self, resolution: &Resolution, state: PowerState, attributes: &AttributeSet) {
        let forwarded = attributes.without(keys::DELAY);
        for entity_id in &resolution.direct {
            let command = Command::for_state(entity_id, state, forwarded.clone());
            match self.platform.commands.send(&command).await {
                Ok(()) => tracing::debug!(command = %command, "Fast path sent"),
                Err(e) => tracing::warn!(command = %command, error = %e, "Fast path failed"),
            }
        }
    }

    async fn flipped(&self, entities: &[EntityId]) -> Vec<(EntityId, PowerState)> {
        let mut out = Vec::with_capacity(entities.len());
        for entity_id in entities {
            let observed = self.platform.observe(entity_id).await;
            let current = observed.as_ref().and_then(|s| s.power());
            let next = match current {
                Some(PowerState::On) => PowerState::Off,
                Some(PowerState::Off) | None => PowerState::On,
            };
            out.push((entity_id.clone(), next));
        }
        out
    }

    async fn any_on(&self, entities: &[EntityId]) -> bool {
        for entity_id in entities {
            if let Some(state) = self.platform.observe(entity_id).await {
                if state.is(PowerState::On) {
                    return true;
                }
            }
        }
        false
    }

    async fn all_converged(&self, desired: &[(EntityId, PowerState)], attributes: &AttributeSet) -> bool {
        for (entity_id, state) in desired {
            let observed = self.platform.observe(entity_id).await;
            if !tolerance::matches(observed.as_ref(), *state, attributes) {
                return false;
            }
        }
        true
    }

    /// The configuration snapshot the next invocation will use.
    #[must_use]
    pub fn snapshot(&self) -> Arc<EngineConfig> {
        self.config.snapshot()
    }
}

async fn drive_entity(task: ConvergenceTask) -> EntityOutcome {
    match task.run(RetryTier::Immediate).await {
        RetryOutcome::Converged { attempts } => EntityOutcome::Converged { attempts },
        RetryOutcome::ExhaustedImmediate | RetryOutcome::ExhaustedBackground => {
            EntityOutcome::Escalated {
                escalation: escalation::escalate(&task).await,
            }
        }
    }
}

#[async_trait]
impl Ensure for EnsureService {
    async fn ensure_on(&self, target: Target, attributes: AttributeSet) -> Result<Dispatch> {
        self.invoke("ensure_on", target, Desired::All(PowerState::On), attributes)
            .await
    }

    async fn ensure_off(&self, target: Target) -> Result<Dispatch> {
        self.invoke(
            "ensure_off",
            target,
            Desired::All(PowerState::Off),
            AttributeSet::new(),
        )
        .await
    }

    async fn toggle(&self, target: Target) -> Result<Dispatch> {
        self.invoke("toggle", target, Desired::Flip, AttributeSet::new())
            .await
    }

    async fn toggle_group(&self, target: Target) -> Result<Dispatch> {
        self.invoke("toggle_group", target, Desired::FlipTogether, AttributeSet::new())
            .await
    }

    async fn retry_failed(&self, entity_id: EntityId, target_state: PowerState) -> Result<Dispatch> {
        let notification_id = NotificationId::for_entity(&entity_id);
        if let Err(e) = self.platform.notifications.dismiss(&notification_id).await {
            tracing::warn!(notification_id = %notification_id, error = %e, "Failed to dismiss notification");
        }
        tracing::info!(entity_id = %entity_id, target = %target_state, "Manual retry");

        self.invoke(
            "retry_failed",
            Target::EntityId(entity_id),
            Desired::All(target_state),
            AttributeSet::new(),
        )
        .await
    }
}
