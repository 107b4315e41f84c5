//! Entity resolution.
//!
//! Turns a logical [`Target`] into the ordered, deduplicated list of leaf
//! entities the convergence loops work on. Groups never reach the loops;
//! they are only addressed by the fast-path command.

use std::collections::HashSet;

use ensure_core::{AreaId, DeviceId, EntityId};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::platform::Directory;

/// The logical target of an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// A single entity (possibly a group).
    EntityId(EntityId),
    /// Several entities (possibly groups).
    EntityIds(Vec<EntityId>),
    /// Every entity in an area.
    AreaId(AreaId),
    /// Every entity of a device.
    DeviceId(DeviceId),
}

impl Target {
    /// The group id when this target is exactly one group entity.
    #[must_use]
    pub fn group_origin(&self) -> Option<&EntityId> {
        match self {
            Self::EntityId(id) if id.is_group() => Some(id),
            _ => None,
        }
    }
}

impl From<EntityId> for Target {
    fn from(id: EntityId) -> Self {
        Self::EntityId(id)
    }
}

impl From<Vec<EntityId>> for Target {
    fn from(ids: Vec<EntityId>) -> Self {
        Self::EntityIds(ids)
    }
}

/// A resolved target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The unexpanded ids that receive the fast-path command.
    pub direct: Vec<EntityId>,
    /// Leaf entities, in first-seen order, without duplicates.
    pub entities: Vec<EntityId>,
}

impl Resolution {
    /// Returns true if no leaf entity was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Resolve a target through the directory.
///
/// # Errors
///
/// Returns an error if an area or device lookup fails. Group expansion
/// failures are not errors: the group id is kept as a leaf.
pub async fn resolve(directory: &dyn Directory, target: &Target) -> Result<Resolution> {
    let direct = match target {
        Target::EntityId(id) => vec![id.clone()],
        Target::EntityIds(ids) => ids.clone(),
        Target::AreaId(area) => directory.entities_for_area(area).await?,
        Target::DeviceId(device) => directory.entities_for_device(device).await?,
    };

    let mut entities = Vec::new();
    let mut seen = HashSet::new();
    for id in &direct {
        expand_into(directory, id, &mut seen, &mut entities).await;
    }

    tracing::debug!(
        direct = direct.len(),
        resolved = entities.len(),
        "Resolved target"
    );

    Ok(Resolution {
        direct: dedup(direct),
        entities,
    })
}

/// Depth-first group expansion. `seen` doubles as the cycle guard.
async fn expand_into(
    directory: &dyn Directory,
    root: &EntityId,
    seen: &mut HashSet<EntityId>,
    out: &mut Vec<EntityId>,
) {
    let mut stack = vec![root.clone()];

    while let Some(id) = stack.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }

        let members = if id.is_group() {
            match directory.expand_group(&id).await {
                Ok(members) => members,
                Err(e) => {
                    tracing::warn!(entity_id = %id, error = %e, "Group expansion failed, keeping group id");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        if members.is_empty() {
            out.push(id);
        } else {
            stack.extend(members.into_iter().rev());
        }
    }
}

fn dedup(ids: Vec<EntityId>) -> Vec<EntityId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
