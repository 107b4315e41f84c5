//! Invocation handles and reports.

use ensure_core::{EntityId, InvocationId, PowerState};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::escalation::Escalation;

/// Final outcome of one entity within an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntityOutcome {
    /// The entity matched the target.
    Converged {
        /// Commands sent by the per-entity loop; 0 if it already matched.
        attempts: u32,
    },
    /// The immediate tier was exhausted and the failure was escalated.
    Escalated {
        /// How the failure was handled.
        #[serde(flatten)]
        escalation: Escalation,
    },
    /// The per-entity task ended abnormally.
    Aborted {
        /// What went wrong.
        reason: String,
    },
}

impl EntityOutcome {
    /// Returns true if the entity converged.
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }
}

/// Outcome for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityReport {
    /// The entity.
    pub entity_id: EntityId,
    /// What happened to it.
    #[serde(flatten)]
    pub outcome: EntityOutcome,
}

/// Per-entity outcomes of an invocation, in resolution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// The invocation these outcomes belong to.
    pub invocation_id: InvocationId,
    /// One report per resolved entity.
    pub entities: Vec<EntityReport>,
}

impl BatchReport {
    /// Returns true if every entity converged.
    #[must_use]
    pub fn all_converged(&self) -> bool {
        self.entities.iter().all(|r| r.outcome.is_converged())
    }

    /// The outcome for `entity_id`, if it was part of the batch.
    #[must_use]
    pub fn outcome(&self, entity_id: &EntityId) -> Option<&EntityOutcome> {
        self.entities
            .iter()
            .find(|r| &r.entity_id == entity_id)
            .map(|r| &r.outcome)
    }
}

/// Handle to a launched invocation.
///
/// Returned once the fast path has run and the per-entity pass has started.
/// Dropping it does not cancel anything.
#[derive(Debug)]
pub struct Dispatch {
    /// Invocation identifier, also recorded on every log line of the run.
    pub invocation_id: InvocationId,
    /// Resolved leaf entities with the state each is driven to.
    pub entities: Vec<(EntityId, PowerState)>,
    handle: JoinHandle<Vec<EntityReport>>,
}

impl Dispatch {
    pub(crate) fn new(
        invocation_id: InvocationId,
        entities: Vec<(EntityId, PowerState)>,
        handle: JoinHandle<Vec<EntityReport>>,
    ) -> Self {
        Self {
            invocation_id,
            entities,
            handle,
        }
    }

    /// Wait for every per-entity loop to reach its terminal outcome.
    ///
    /// Background retries scheduled along the way are not awaited.
    pub async fn wait(self) -> BatchReport {
        let entities = match self.handle.await {
            Ok(reports) => reports,
            Err(e) => {
                tracing::error!(invocation_id = %self.invocation_id, error = %e, "Dispatch task panicked");
                self.entities
                    .into_iter()
                    .map(|(entity_id, _)| EntityReport {
                        entity_id,
                        outcome: EntityOutcome::Aborted {
                            reason: format!("dispatch task failed: {e}"),
                        },
                    })
                    .collect()
            }
        };

        BatchReport {
            invocation_id: self.invocation_id,
            entities,
        }
    }
}
