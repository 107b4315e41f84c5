//! Convergence driver.
//!
//! Drives one entity towards its target with a bounded retry loop:
//!
//! ```text
//! attempt n:  converged? ──yes──► Converged
//!                 │no
//!                 ▼
//!             send command ──► poll every 100ms until match or
//!                              base + n * 500ms elapses
//!                 │timeout
//!                 ▼
//!             n < max_retries ? attempt n+1 : Exhausted(tier)
//! ```
//!
//! Attempts within one entity are strictly sequential. What happens after
//! exhaustion is decided by [`crate::escalation`].

use std::sync::Arc;

use ensure_core::attributes::keys;
use ensure_core::{AttributeSet, EntityId, PowerState};
use serde::{Deserialize, Serialize};

use crate::config::{attempt_timeout, EngineConfig, POLL_INTERVAL};
use crate::platform::{Command, Platform};
use crate::tolerance;

/// The retry phase a loop runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryTier {
    /// The retries that run as part of the invocation.
    Immediate,
    /// The single deferred loop after immediate exhaustion. Never schedules another.
    Background,
}

/// Result of one bounded retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RetryOutcome {
    /// The entity matched the target.
    Converged {
        /// Commands sent before the match was observed; 0 if it already matched.
        attempts: u32,
    },
    /// Every immediate attempt timed out.
    ExhaustedImmediate,
    /// Every background attempt timed out.
    ExhaustedBackground,
}

impl RetryOutcome {
    const fn exhausted(tier: RetryTier) -> Self {
        match tier {
            RetryTier::Immediate => Self::ExhaustedImmediate,
            RetryTier::Background => Self::ExhaustedBackground,
        }
    }

    /// Returns true if the entity converged.
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }
}

/// Everything needed to converge one entity, immediately or later.
#[derive(Debug, Clone)]
pub struct ConvergenceTask {
    pub(crate) platform: Platform,
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) entity_id: EntityId,
    pub(crate) target: PowerState,
    pub(crate) attributes: AttributeSet,
    pub(crate) base_timeout_ms: u64,
    pub(crate) group_origin: Option<EntityId>,
}

impl ConvergenceTask {
    /// The entity being driven.
    #[must_use]
    pub const fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// The state it is being driven to.
    #[must_use]
    pub const fn target(&self) -> PowerState {
        self.target
    }

    /// Returns true if the entity currently satisfies the target.
    pub async fn is_converged(&self) -> bool {
        let observed = self.platform.observe(&self.entity_id).await;
        tolerance::matches(observed.as_ref(), self.target, &self.attributes)
    }

    /// Run one bounded retry loop in `tier`.
    pub async fn run(&self, tier: RetryTier) -> RetryOutcome {
        let max_retries = self.config.max_retries;
        let command = Command::for_state(
            &self.entity_id,
            self.target,
            self.attributes.without(keys::DELAY),
        );

        for attempt in 1..=max_retries {
            if self.is_converged().await {
                tracing::debug!(entity_id = %self.entity_id, ?tier, attempt, "Already converged");
                return RetryOutcome::Converged {
                    attempts: attempt - 1,
                };
            }

            let timeout = attempt_timeout(self.base_timeout_ms, attempt);
            tracing::debug!(
                entity_id = %self.entity_id,
                ?tier,
                attempt,
                max_retries,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "Sending command"
            );

            if let Err(e) = self.platform.commands.send(&command).await {
                tracing::warn!(
                    entity_id = %self.entity_id,
                    ?tier,
                    attempt,
                    error = %e,
                    "Command failed"
                );
            }

            if tokio::time::timeout(timeout, self.wait_for_match()).await.is_ok() {
                tracing::info!(entity_id = %self.entity_id, ?tier, attempt, "Converged");
                return RetryOutcome::Converged { attempts: attempt };
            }

            tracing::debug!(entity_id = %self.entity_id, ?tier, attempt, "Timed out waiting for state");
        }

        tracing::warn!(
            entity_id = %self.entity_id,
            ?tier,
            max_retries,
            target = %self.target,
            "Retries exhausted"
        );
        RetryOutcome::exhausted(tier)
    }

    async fn wait_for_match(&self) {
        loop {
            if self.is_converged().await {
                return;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
