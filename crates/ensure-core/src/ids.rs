//! Core identifier types for ensure.
//!
//! This module provides strongly-typed identifiers for entities, areas, devices,
//! invocations, and notifications. Entity IDs follow the hub convention of
//! `<domain>.<object_id>`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The domain under which hubs expose old-style groups.
pub const GROUP_DOMAIN: &str = "group";

/// A controllable entity identifier of the form `<domain>.<object_id>`.
///
/// Both halves must be non-empty and contain only lowercase ASCII letters,
/// digits, and underscores.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Parse an `EntityId`, validating its shape.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `<domain>.<object_id>`.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let (domain, object_id) = s
            .split_once('.')
            .ok_or_else(|| IdError::InvalidEntityId(s.to_string()))?;

        let valid_part = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        };

        if valid_part(domain) && valid_part(object_id) {
            Ok(Self(s.to_string()))
        } else {
            Err(IdError::InvalidEntityId(s.to_string()))
        }
    }

    /// Return the domain half (e.g. `light` for `light.kitchen`).
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.split_once('.').map_or(&self.0, |(domain, _)| domain)
    }

    /// Return the object half (e.g. `kitchen` for `light.kitchen`).
    #[must_use]
    pub fn object_id(&self) -> &str {
        self.0.split_once('.').map_or(&self.0, |(_, object)| object)
    }

    /// Returns true if this entity lives in the `group` domain.
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.domain() == GROUP_DOMAIN
    }

    /// Return the string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for EntityId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EntityId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Defines an opaque, non-empty directory reference.
macro_rules! directory_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create a reference, rejecting blank input.
            ///
            /// # Errors
            ///
            /// Returns an error if the value is empty or whitespace.
            pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(IdError::Empty(stringify!($name)));
                }
                Ok(Self(value))
            }

            /// Return the string form.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

directory_id!(
    /// An area registered in the hub's directory (e.g. `living_room`).
    AreaId
);

directory_id!(
    /// A physical device registered in the hub's directory.
    DeviceId
);

/// A UUID v4 identifier for one `ensure_*` invocation.
///
/// Used to correlate the log lines of a fast path, its per-entity loops,
/// and any background retries they schedule.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InvocationId(uuid::Uuid);

impl InvocationId {
    /// Create a new `InvocationId` from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a new random `InvocationId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Return the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl FromStr for InvocationId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
        Ok(Self(uuid))
    }
}

impl fmt::Debug for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InvocationId({})", self.0)
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for InvocationId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InvocationId> for String {
    fn from(id: InvocationId) -> Self {
        id.0.to_string()
    }
}

/// Identifier of the pending failure notification for one entity.
///
/// There is at most one outstanding notification per entity, so the ID is
/// derived from the entity ID alone: `device_fail_<entity with '.' as '_'>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(String);

impl NotificationId {
    /// Derive the failure notification ID for an entity.
    #[must_use]
    pub fn for_entity(entity_id: &EntityId) -> Self {
        Self(format!("device_fail_{}", entity_id.as_str().replace('.', "_")))
    }

    /// Return the string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not of the form `<domain>.<object_id>`.
    #[error("invalid entity id: {0:?}")]
    InvalidEntityId(String),

    /// A directory reference was blank.
    #[error("{0} must not be empty")]
    Empty(&'static str),

    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_parts() {
        let id = EntityId::parse("light.kitchen_ceiling").unwrap();
        assert_eq!(id.domain(), "light");
        assert_eq!(id.object_id(), "kitchen_ceiling");
        assert!(!id.is_group());
        assert!(EntityId::parse("group.downstairs").unwrap().is_group());
    }

    #[test]
    fn entity_id_rejects_malformed() {
        for bad in ["", "light", "light.", ".kitchen", "Light.Kitchen", "light.kit chen"] {
            assert!(
                matches!(EntityId::parse(bad), Err(IdError::InvalidEntityId(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn entity_id_serde_json() {
        let id = EntityId::parse("switch.fan").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"switch.fan\"");
        let parsed: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);

        assert!(serde_json::from_str::<EntityId>("\"not an id\"").is_err());
    }

    #[test]
    fn directory_ids_reject_blank() {
        assert!(AreaId::new("kitchen").is_ok());
        assert_eq!(AreaId::new("  "), Err(IdError::Empty("AreaId")));
        assert_eq!(DeviceId::new(""), Err(IdError::Empty("DeviceId")));
    }

    #[test]
    fn invocation_id_roundtrip() {
        let id = InvocationId::generate();
        let parsed = InvocationId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(matches!(
            InvocationId::from_str("nope"),
            Err(IdError::InvalidUuid)
        ));
    }

    #[test]
    fn notification_id_is_per_entity() {
        let id = EntityId::parse("light.living_room").unwrap();
        assert_eq!(
            NotificationId::for_entity(&id).as_str(),
            "device_fail_light_living_room"
        );
    }
}
