//! Parameter conflict resolution.
//!
//! Some attributes describe the same property in different ways. Sending more
//! than one of them makes the hub reject the command or pick one arbitrarily,
//! so each conflict group is collapsed to its highest-priority present key.

use ensure_core::attributes::keys;
use ensure_core::{AttributeSet, PowerState};

/// Mutually exclusive attribute groups, each in priority order.
pub const CONFLICT_GROUPS: [(&str, &[&str]); 4] = [
    ("brightness", &[keys::BRIGHTNESS_PCT, keys::BRIGHTNESS]),
    (
        "color",
        &[
            keys::RGB_COLOR,
            keys::HS_COLOR,
            keys::XY_COLOR,
            keys::COLOR_NAME,
        ],
    ),
    ("temperature", &[keys::COLOR_TEMP_KELVIN, keys::KELVIN]),
    ("speed", &[keys::SPEED_PCT, keys::SPEED]),
];

/// Collapse each conflict group to at most one key.
///
/// Off targets are returned unchanged. Applying this twice gives the same
/// result as applying it once.
#[must_use]
pub fn resolve(raw: &AttributeSet, state: PowerState) -> AttributeSet {
    if state == PowerState::Off {
        return raw.clone();
    }

    let mut resolved = raw.clone();
    for (group, names) in CONFLICT_GROUPS {
        let Some(kept) = names.iter().find(|name| raw.contains(name)) else {
            continue;
        };
        for name in names.iter().filter(|name| *name != kept) {
            if resolved.remove(name).is_some() {
                tracing::debug!(group, kept = %kept, dropped = %name, "Dropped conflicting parameter");
            }
        }
    }
    resolved
}
