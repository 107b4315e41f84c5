//! Attribute sets carried by commands and reported by entities.
//!
//! An [`AttributeSet`] is an ordered name → JSON value map. Recognized keys are
//! listed in [`keys`]; anything else is forwarded to the hub untouched.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Recognized attribute names.
pub mod keys {
    /// Absolute brightness, 0-255.
    pub const BRIGHTNESS: &str = "brightness";
    /// Brightness percentage, 0-100.
    pub const BRIGHTNESS_PCT: &str = "brightness_pct";
    /// RGB triple, each channel 0-255.
    pub const RGB_COLOR: &str = "rgb_color";
    /// Hue (degrees) / saturation (percent) pair.
    pub const HS_COLOR: &str = "hs_color";
    /// CIE xy pair.
    pub const XY_COLOR: &str = "xy_color";
    /// Named color from the fixed palette.
    pub const COLOR_NAME: &str = "color_name";
    /// Color temperature in kelvin.
    pub const COLOR_TEMP_KELVIN: &str = "color_temp_kelvin";
    /// Legacy spelling of [`COLOR_TEMP_KELVIN`].
    pub const KELVIN: &str = "kelvin";
    /// Fan speed percentage.
    pub const SPEED_PCT: &str = "speed_pct";
    /// Fan speed, absolute.
    pub const SPEED: &str = "speed";
    /// Light effect name.
    pub const EFFECT: &str = "effect";
    /// Flash mode.
    pub const FLASH: &str = "flash";
    /// Transition time in seconds.
    pub const TRANSITION: &str = "transition";
    /// Per-invocation base timeout override in milliseconds. Never forwarded.
    pub const DELAY: &str = "delay";
    /// Member list reported by group entities.
    pub const ENTITY_ID: &str = "entity_id";
}

/// Accepted `delay` override in milliseconds, the same range as the configured base timeout.
pub const DELAY_OVERRIDE_RANGE_MS: RangeInclusive<u64> = 500..=5000;

/// A mapping from attribute name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSet(Map<String, Value>);

impl AttributeSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert or replace a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Get the raw value for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns true if the key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the set has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the keys.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Iterate over the entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Read a numeric value. `null` and non-numbers read as absent.
    #[must_use]
    pub fn number(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    /// Read a fixed-length numeric array (e.g. an RGB triple).
    ///
    /// Returns `None` if the key is absent, `null`, the wrong length, or
    /// contains a non-number.
    #[must_use]
    pub fn numbers<const N: usize>(&self, key: &str) -> Option<[f64; N]> {
        let items = self.0.get(key)?.as_array()?;
        if items.len() != N {
            return None;
        }
        let mut out = [0.0; N];
        for (slot, item) in out.iter_mut().zip(items) {
            *slot = item.as_f64()?;
        }
        Some(out)
    }

    /// Read a string value.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Read a list of strings. A bare string reads as a one-element list.
    #[must_use]
    pub fn strings(&self, key: &str) -> Vec<String> {
        match self.0.get(key) {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Return a copy without the given key.
    #[must_use]
    pub fn without(&self, key: &str) -> Self {
        let mut copy = self.clone();
        copy.0.remove(key);
        copy
    }

    /// Read the `delay` override in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns an error if `delay` is present but not an integer within
    /// [`DELAY_OVERRIDE_RANGE_MS`].
    pub fn delay_override_ms(&self) -> Result<Option<u64>, CoreError> {
        let Some(value) = self.0.get(keys::DELAY).filter(|v| !v.is_null()) else {
            return Ok(None);
        };
        let ms = value.as_u64().ok_or_else(|| CoreError::InvalidAttribute {
            key: keys::DELAY.to_string(),
            reason: format!("expected milliseconds as a non-negative integer, got {value}"),
        })?;
        if !DELAY_OVERRIDE_RANGE_MS.contains(&ms) {
            return Err(CoreError::InvalidAttribute {
                key: keys::DELAY.to_string(),
                reason: format!(
                    "{ms} is outside {}..={}",
                    DELAY_OVERRIDE_RANGE_MS.start(),
                    DELAY_OVERRIDE_RANGE_MS.end()
                ),
            });
        }
        Ok(Some(ms))
    }

    /// Borrow the underlying JSON map.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume into the underlying JSON map.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for AttributeSet {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
