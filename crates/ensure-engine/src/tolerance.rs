//! Tolerance comparator.
//!
//! Decides whether an observed entity state satisfies a target. The primary
//! on/off state is compared exactly; each attribute dimension is compared
//! with its own tolerance and only when the target names it. Color and
//! temperature checks pass when the device reports no value for them, since
//! many devices never echo color back.

use ensure_core::attributes::keys;
use ensure_core::{AttributeSet, EntityState, PowerState};

use crate::colors;

/// Absolute brightness tolerance (0-255 scale).
pub const BRIGHTNESS_TOLERANCE: f64 = 8.0;
/// Brightness percentage tolerance.
pub const BRIGHTNESS_PCT_TOLERANCE: f64 = 1.0;
/// Per-channel RGB tolerance.
pub const RGB_TOLERANCE: f64 = 5.0;
/// Color temperature tolerance in kelvin.
pub const KELVIN_TOLERANCE: f64 = 50.0;
/// Hue tolerance in degrees.
pub const HUE_TOLERANCE: f64 = 5.0;
/// Saturation tolerance in percentage points.
pub const SATURATION_TOLERANCE: f64 = 5.0;

/// Returns true if `observed` satisfies `target` with `attrs`.
///
/// An entity the hub does not know never matches.
#[must_use]
pub fn matches(observed: Option<&EntityState>, target: PowerState, attrs: &AttributeSet) -> bool {
    let Some(observed) = observed else {
        return false;
    };

    if !observed.is(target) {
        return false;
    }
    if target == PowerState::Off {
        return true;
    }

    let actual = &observed.attributes;
    brightness_matches(actual, attrs)
        && brightness_pct_matches(actual, attrs)
        && rgb_matches(actual, attrs)
        && color_name_matches(actual, attrs)
        && kelvin_matches(actual, attrs)
        && hs_matches(actual, attrs)
}

fn brightness_matches(actual: &AttributeSet, attrs: &AttributeSet) -> bool {
    let Some(target) = attrs.number(keys::BRIGHTNESS) else {
        return true;
    };
    let observed = actual.number(keys::BRIGHTNESS).unwrap_or(0.0);
    (observed - target).abs() <= BRIGHTNESS_TOLERANCE
}

fn brightness_pct_matches(actual: &AttributeSet, attrs: &AttributeSet) -> bool {
    let Some(target) = attrs.number(keys::BRIGHTNESS_PCT) else {
        return true;
    };
    let observed = actual.number(keys::BRIGHTNESS).unwrap_or(0.0);
    let observed_pct = (observed / 255.0 * 100.0).round();
    (observed_pct - target).abs() <= BRIGHTNESS_PCT_TOLERANCE
}

fn rgb_matches(actual: &AttributeSet, attrs: &AttributeSet) -> bool {
    match attrs.numbers::<3>(keys::RGB_COLOR) {
        Some(target) => rgb_within(actual, target),
        None => true,
    }
}

fn color_name_matches(actual: &AttributeSet, attrs: &AttributeSet) -> bool {
    let Some(name) = attrs.text(keys::COLOR_NAME) else {
        return true;
    };
    match colors::rgb_for_name(name) {
        Some(rgb) => rgb_within(actual, rgb.map(f64::from)),
        None => {
            tracing::debug!(color_name = %name, "Unknown color name, skipping color check");
            true
        }
    }
}

fn rgb_within(actual: &AttributeSet, target: [f64; 3]) -> bool {
    actual.numbers::<3>(keys::RGB_COLOR).map_or(true, |observed| {
        observed
            .iter()
            .zip(target)
            .all(|(o, t)| (o - t).abs() <= RGB_TOLERANCE)
    })
}

fn kelvin_matches(actual: &AttributeSet, attrs: &AttributeSet) -> bool {
    let Some(target) = attrs
        .number(keys::COLOR_TEMP_KELVIN)
        .or_else(|| attrs.number(keys::KELVIN))
    else {
        return true;
    };
    actual
        .number(keys::COLOR_TEMP_KELVIN)
        .map_or(true, |observed| (observed - target).abs() <= KELVIN_TOLERANCE)
}

fn hs_matches(actual: &AttributeSet, attrs: &AttributeSet) -> bool {
    let Some([target_hue, target_sat]) = attrs.numbers::<2>(keys::HS_COLOR) else {
        return true;
    };
    actual
        .numbers::<2>(keys::HS_COLOR)
        .map_or(true, |[hue, sat]| {
            hue_distance(hue, target_hue) <= HUE_TOLERANCE
                && (sat - target_sat).abs() <= SATURATION_TOLERANCE
        })
}

/// Distance between two hues on the 360 degree circle.
fn hue_distance(a: f64, b: f64) -> f64 {
    let diff = (a - b).abs() % 360.0;
    diff.min(360.0 - diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn on_with(attrs: AttributeSet) -> EntityState {
        EntityState::with_attributes("on", attrs)
    }

    #[test]
    fn absent_entity_never_matches() {
        assert!(!matches(None, PowerState::Off, &AttributeSet::new()));
    }

    #[test]
    fn primary_state_is_exact() {
        let unavailable = EntityState::new("unavailable");
        assert!(!matches(Some(&unavailable), PowerState::On, &AttributeSet::new()));
        assert!(!matches(Some(&unavailable), PowerState::Off, &AttributeSet::new()));
    }

    #[test]
    fn off_target_ignores_attributes() {
        let observed = EntityState::with_attributes("off", AttributeSet::new().with(keys::BRIGHTNESS, 0));
        let attrs = AttributeSet::new()
            .with(keys::BRIGHTNESS, 255)
            .with(keys::RGB_COLOR, json!([1, 2, 3]));
        assert!(matches(Some(&observed), PowerState::Off, &attrs));
    }

    #[test]
    fn brightness_tolerance() {
        let attrs = AttributeSet::new().with(keys::BRIGHTNESS, 200);
        let close = on_with(AttributeSet::new().with(keys::BRIGHTNESS, 192));
        let far = on_with(AttributeSet::new().with(keys::BRIGHTNESS, 191));
        assert!(matches(Some(&close), PowerState::On, &attrs));
        assert!(!matches(Some(&far), PowerState::On, &attrs));

        // Missing observed brightness reads as zero.
        assert!(!matches(Some(&on_with(AttributeSet::new())), PowerState::On, &attrs));
    }

    #[test]
    fn brightness_pct_converts_observed() {
        let attrs = AttributeSet::new().with(keys::BRIGHTNESS_PCT, 50);
        let at_130 = on_with(AttributeSet::new().with(keys::BRIGHTNESS, 130));
        let at_120 = on_with(AttributeSet::new().with(keys::BRIGHTNESS, 120));
        assert!(matches(Some(&at_130), PowerState::On, &attrs));
        assert!(!matches(Some(&at_120), PowerState::On, &attrs));
    }

    #[test]
    fn rgb_absent_observed_passes() {
        let attrs = AttributeSet::new().with(keys::RGB_COLOR, json!([255, 0, 0]));
        assert!(matches(Some(&on_with(AttributeSet::new())), PowerState::On, &attrs));

        let near = on_with(AttributeSet::new().with(keys::RGB_COLOR, json!([250, 5, 0])));
        let off = on_with(AttributeSet::new().with(keys::RGB_COLOR, json!([249, 0, 0])));
        assert!(matches(Some(&near), PowerState::On, &attrs));
        assert!(!matches(Some(&off), PowerState::On, &attrs));
    }

    #[test]
    fn color_name_compares_as_rgb() {
        let attrs = AttributeSet::new().with(keys::COLOR_NAME, "blue");
        let blue = on_with(AttributeSet::new().with(keys::RGB_COLOR, json!([0, 3, 252])));
        let red = on_with(AttributeSet::new().with(keys::RGB_COLOR, json!([255, 0, 0])));
        assert!(matches(Some(&blue), PowerState::On, &attrs));
        assert!(!matches(Some(&red), PowerState::On, &attrs));

        let unknown = AttributeSet::new().with(keys::COLOR_NAME, "not-a-color");
        assert!(matches(Some(&red), PowerState::On, &unknown));
    }

    #[test]
    fn kelvin_reads_either_key() {
        let observed = on_with(AttributeSet::new().with(keys::COLOR_TEMP_KELVIN, 3000));
        let named = AttributeSet::new().with(keys::COLOR_TEMP_KELVIN, 3040);
        let legacy = AttributeSet::new().with(keys::KELVIN, 2940);
        let far = AttributeSet::new().with(keys::KELVIN, 3100);
        assert!(matches(Some(&observed), PowerState::On, &named));
        assert!(!matches(Some(&observed), PowerState::On, &legacy));
        assert!(!matches(Some(&observed), PowerState::On, &far));
        assert!(matches(Some(&on_with(AttributeSet::new())), PowerState::On, &far));
    }

    #[test]
    fn hue_wraps_around() {
        let attrs = AttributeSet::new().with(keys::HS_COLOR, json!([2, 80]));
        let wrapped = on_with(AttributeSet::new().with(keys::HS_COLOR, json!([359, 78])));
        let desaturated = on_with(AttributeSet::new().with(keys::HS_COLOR, json!([2, 70])));
        assert!(matches(Some(&wrapped), PowerState::On, &attrs));
        assert!(!matches(Some(&desaturated), PowerState::On, &attrs));
        assert!((hue_distance(10.0, 350.0) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unchecked_keys_are_ignored() {
        let attrs = AttributeSet::new()
            .with(keys::XY_COLOR, json!([0.3, 0.3]))
            .with(keys::SPEED_PCT, 40)
            .with(keys::EFFECT, "colorloop");
        assert!(matches(Some(&on_with(AttributeSet::new())), PowerState::On, &attrs));
    }
}
