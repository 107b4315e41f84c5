//! Desired and observed entity state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::attributes::AttributeSet;
use crate::error::CoreError;

/// The binary state an entity is driven towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    /// Entity is on.
    On,
    /// Entity is off.
    Off,
}

impl PowerState {
    /// Return the hub's string form (`on` / `off`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }

    /// Return the service action that drives an entity into this state.
    #[must_use]
    pub const fn action(self) -> &'static str {
        match self {
            Self::On => "turn_on",
            Self::Off => "turn_off",
        }
    }

    /// Return the other state.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::On => Self::Off,
            Self::Off => Self::On,
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            other => Err(CoreError::InvalidPowerState(other.to_string())),
        }
    }
}

/// A snapshot of an entity as reported by the hub.
///
/// The primary state is kept as the raw string because hubs report values
/// beyond on/off (`unavailable`, `unknown`, `playing`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// Primary state string.
    pub state: String,
    /// Reported attributes.
    #[serde(default)]
    pub attributes: AttributeSet,
}

impl EntityState {
    /// Create a state with no attributes.
    #[must_use]
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            attributes: AttributeSet::new(),
        }
    }

    /// Create a state with the given attributes.
    #[must_use]
    pub fn with_attributes(state: impl Into<String>, attributes: AttributeSet) -> Self {
        Self {
            state: state.into(),
            attributes,
        }
    }

    /// Parse the primary state as on/off, if it is one of them.
    #[must_use]
    pub fn power(&self) -> Option<PowerState> {
        self.state.parse().ok()
    }

    /// Returns true if the primary state is exactly `power`.
    #[must_use]
    pub fn is(&self, power: PowerState) -> bool {
        self.state == power.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_state_strings() {
        assert_eq!(PowerState::On.to_string(), "on");
        assert_eq!(PowerState::Off.action(), "turn_off");
        assert_eq!("off".parse::<PowerState>().unwrap(), PowerState::Off);
        assert!(matches!(
            "unavailable".parse::<PowerState>(),
            Err(CoreError::InvalidPowerState(_))
        ));
    }

    #[test]
    fn entity_state_power() {
        assert_eq!(EntityState::new("on").power(), Some(PowerState::On));
        assert_eq!(EntityState::new("unavailable").power(), None);
        assert!(EntityState::new("off").is(PowerState::Off));
        assert!(!EntityState::new("unknown").is(PowerState::Off));
    }

    #[test]
    fn entity_state_deserializes_hub_payload() {
        let json = r#"{"state":"on","attributes":{"brightness":128,"friendly_name":"Desk"}}"#;
        let state: EntityState = serde_json::from_str(json).unwrap();
        assert!(state.is(PowerState::On));
        assert_eq!(state.attributes.number("brightness"), Some(128.0));
    }
}
