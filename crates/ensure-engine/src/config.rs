//! Engine configuration.
//!
//! [`EngineConfig`] is the operator-tunable part of the engine. It is loaded at
//! startup (defaults, then `ENSURE_*` environment variables), may be replaced
//! later through an options update, and is read through [`SharedConfig`].
//!
//! Every `ensure_*` invocation takes one [`SharedConfig::snapshot`] when it
//! starts and uses it for its whole lifetime, background retry included.
//! Updates therefore only affect invocations that start afterwards.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Fixed per-attempt timeout increment in milliseconds.
pub const TIMEOUT_INCREMENT_MS: u64 = 500;

/// Interval between convergence polls.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Delay between the fast-path command and the per-entity pass.
pub const FAST_PATH_SETTLE: Duration = Duration::from_secs(1);

/// Maximum number of entity convergence loops in flight at once.
pub const MAX_CONCURRENT_CONVERGENCE: usize = 3;

/// A background retry delay at or above this value disables background retries.
pub const BACKGROUND_RETRY_DISABLED_AT_S: u64 = 300;

/// How much log output the engine produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoggingLevel {
    /// Warnings and errors only.
    Minimal,
    /// Lifecycle events (dispatch, convergence, escalation).
    #[default]
    Normal,
    /// Per-attempt and per-poll detail.
    Verbose,
}

impl LoggingLevel {
    /// Return the `tracing` filter directive for this level.
    #[must_use]
    pub const fn filter_directive(self) -> &'static str {
        match self {
            Self::Minimal => "warn",
            Self::Normal => "info",
            Self::Verbose => "debug",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "minimal" => Some(Self::Minimal),
            "normal" => Some(Self::Normal),
            "verbose" => Some(Self::Verbose),
            _ => None,
        }
    }
}

/// How the per-attempt base timeout is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TimingConfig {
    /// A single base timeout per attempt.
    BaseTimeout {
        /// Base timeout in milliseconds, 500-5000.
        base_timeout_ms: u64,
    },
    /// The older command-delay / retry-delay pair.
    Legacy {
        /// Settle time after a command in milliseconds, 50-1000.
        command_delay_ms: u64,
        /// Extra wait before retrying in milliseconds, 250-2000.
        retry_delay_ms: u64,
    },
}

impl TimingConfig {
    /// The base timeout applied to attempt zero.
    #[must_use]
    pub const fn base_timeout_ms(&self) -> u64 {
        match *self {
            Self::BaseTimeout { base_timeout_ms } => base_timeout_ms,
            Self::Legacy {
                command_delay_ms,
                retry_delay_ms,
            } => command_delay_ms + retry_delay_ms,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self::BaseTimeout {
            base_timeout_ms: 1000,
        }
    }
}

/// Operator-tunable engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Immediate attempts per entity, 1-10.
    #[serde(default = "EngineConfig::default_max_retries")]
    pub max_retries: u32,

    /// Per-attempt timeout base.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Whether failures are reported through the notification sink.
    #[serde(default = "EngineConfig::default_enable_notifications")]
    pub enable_notifications: bool,

    /// Delay before the single background retry, 10-300 seconds.
    /// 300 disables background retries.
    #[serde(default = "EngineConfig::default_background_retry_delay")]
    pub background_retry_delay_s: u64,

    /// Log verbosity.
    #[serde(default)]
    pub logging_level: LoggingLevel,
}

impl EngineConfig {
    const fn default_max_retries() -> u32 {
        5
    }

    const fn default_enable_notifications() -> bool {
        true
    }

    const fn default_background_retry_delay() -> u64 {
        30
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `ENSURE_MAX_RETRIES`
    /// - `ENSURE_BASE_TIMEOUT_MS`
    /// - `ENSURE_COMMAND_DELAY_MS` and `ENSURE_RETRY_DELAY_MS` (legacy timing; both required)
    /// - `ENSURE_ENABLE_NOTIFICATIONS` (`true` / `false`)
    /// - `ENSURE_BACKGROUND_RETRY_DELAY_S`
    /// - `ENSURE_LOGGING_LEVEL` (`minimal`, `normal`, `verbose`)
    ///
    /// Unparseable values are ignored and the default is kept.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(n) = number("ENSURE_MAX_RETRIES").and_then(|n| u32::try_from(n).ok()) {
            config.max_retries = n;
        }
        if let Some(ms) = number("ENSURE_BASE_TIMEOUT_MS") {
            config.timing = TimingConfig::BaseTimeout { base_timeout_ms: ms };
        }
        if let (Some(command_delay_ms), Some(retry_delay_ms)) = (
            number("ENSURE_COMMAND_DELAY_MS"),
            number("ENSURE_RETRY_DELAY_MS"),
        ) {
            config.timing = TimingConfig::Legacy {
                command_delay_ms,
                retry_delay_ms,
            };
        }
        if let Some(val) = lookup("ENSURE_ENABLE_NOTIFICATIONS") {
            if let Ok(flag) = val.trim().to_ascii_lowercase().parse() {
                config.enable_notifications = flag;
            }
        }
        if let Some(s) = number("ENSURE_BACKGROUND_RETRY_DELAY_S") {
            config.background_retry_delay_s = s;
        }
        if let Some(level) = lookup("ENSURE_LOGGING_LEVEL").and_then(|v| LoggingLevel::parse(&v)) {
            config.logging_level = level;
        }

        config
    }

    /// Validate every field against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        check_range("max_retries", u64::from(self.max_retries), 1, 10)?;

        match self.timing {
            TimingConfig::BaseTimeout { base_timeout_ms } => {
                check_range("base_timeout_ms", base_timeout_ms, 500, 5000)?;
            }
            TimingConfig::Legacy {
                command_delay_ms,
                retry_delay_ms,
            } => {
                check_range("command_delay_ms", command_delay_ms, 50, 1000)?;
                check_range("retry_delay_ms", retry_delay_ms, 250, 2000)?;
            }
        }

        check_range(
            "background_retry_delay_s",
            self.background_retry_delay_s,
            10,
            BACKGROUND_RETRY_DISABLED_AT_S,
        )
    }

    /// Base timeout before the per-attempt increment.
    #[must_use]
    pub const fn base_timeout_ms(&self) -> u64 {
        self.timing.base_timeout_ms()
    }

    /// Returns true if exhausted entities get a delayed second tier.
    #[must_use]
    pub const fn background_retry_enabled(&self) -> bool {
        self.background_retry_delay_s < BACKGROUND_RETRY_DISABLED_AT_S
    }

    /// The background retry delay as a `Duration`.
    #[must_use]
    pub const fn background_retry_delay(&self) -> Duration {
        Duration::from_secs(self.background_retry_delay_s)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: Self::default_max_retries(),
            timing: TimingConfig::default(),
            enable_notifications: Self::default_enable_notifications(),
            background_retry_delay_s: Self::default_background_retry_delay(),
            logging_level: LoggingLevel::default(),
        }
    }
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(EngineError::InvalidConfig {
            field,
            reason: format!("{value} is outside {min}..={max}"),
        })
    }
}

/// Timeout for the given 1-based attempt: `base + attempt * 500ms`, saturating.
#[must_use]
pub const fn attempt_timeout(base_timeout_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(
        base_timeout_ms.saturating_add((attempt as u64).saturating_mul(TIMEOUT_INCREMENT_MS)),
    )
}

/// Process-wide configuration cell.
///
/// Readers take cheap `Arc` snapshots; writers swap the whole value. There is
/// no per-field mutation, so a snapshot is always internally consistent.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<Arc<EngineConfig>>>,
}

impl SharedConfig {
    /// Create a cell holding `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        })
    }

    /// Take a snapshot of the current configuration.
    #[must_use]
    pub fn snapshot(&self) -> Arc<EngineConfig> {
        Arc::clone(&self.inner.read())
    }

    /// Validate and install a new configuration, returning the previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation; the current value is kept.
    pub fn replace(&self, config: EngineConfig) -> Result<Arc<EngineConfig>> {
        config.validate()?;
        let previous = std::mem::replace(&mut *self.inner.write(), Arc::new(config));
        tracing::info!(config = ?*self.snapshot(), "Engine configuration updated");
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_timeout_ms(), 1000);
        assert!(config.enable_notifications);
        assert_eq!(config.background_retry_delay_s, 30);
        assert_eq!(config.logging_level, LoggingLevel::Normal);
        config.validate().unwrap();
    }

    #[test]
    fn timeout_strictly_increases() {
        for attempt in 1..10 {
            assert!(attempt_timeout(1000, attempt + 1) > attempt_timeout(1000, attempt));
        }
        assert_eq!(attempt_timeout(1000, 1), Duration::from_millis(1500));
        assert_eq!(attempt_timeout(800, 3), Duration::from_millis(2300));
        assert_eq!(attempt_timeout(u64::MAX, 2), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn validate_ranges() {
        let invalid = [
            EngineConfig {
                max_retries: 0,
                ..Default::default()
            },
            EngineConfig {
                max_retries: 11,
                ..Default::default()
            },
            EngineConfig {
                timing: TimingConfig::BaseTimeout {
                    base_timeout_ms: 499,
                },
                ..Default::default()
            },
            EngineConfig {
                timing: TimingConfig::Legacy {
                    command_delay_ms: 40,
                    retry_delay_ms: 500,
                },
                ..Default::default()
            },
            EngineConfig {
                background_retry_delay_s: 301,
                ..Default::default()
            },
        ];

        for config in invalid {
            assert!(
                matches!(config.validate(), Err(EngineError::InvalidConfig { .. })),
                "{config:?} should be rejected"
            );
        }
    }

    #[test]
    fn validate_names_field() {
        let config = EngineConfig {
            background_retry_delay_s: 5,
            ..Default::default()
        };
        match config.validate() {
            Err(EngineError::InvalidConfig { field, .. }) => {
                assert_eq!(field, "background_retry_delay_s");
            }
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn legacy_timing_sums_delays() {
        let timing = TimingConfig::Legacy {
            command_delay_ms: 200,
            retry_delay_ms: 800,
        };
        assert_eq!(timing.base_timeout_ms(), 1000);
    }

    #[test]
    fn background_threshold() {
        let mut config = EngineConfig::default();
        assert!(config.background_retry_enabled());
        config.background_retry_delay_s = 300;
        assert!(!config.background_retry_enabled());
    }

    #[test]
    fn from_lookup_reads_overrides() {
        let vars: HashMap<&str, &str> = [
            ("ENSURE_MAX_RETRIES", "3"),
            ("ENSURE_COMMAND_DELAY_MS", "100"),
            ("ENSURE_RETRY_DELAY_MS", "400"),
            ("ENSURE_ENABLE_NOTIFICATIONS", "FALSE"),
            ("ENSURE_BACKGROUND_RETRY_DELAY_S", "garbage"),
            ("ENSURE_LOGGING_LEVEL", "Verbose"),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::from_lookup(|k| vars.get(k).map(ToString::to_string));
        assert_eq!(config.max_retries, 3);
        assert_eq!(
            config.timing,
            TimingConfig::Legacy {
                command_delay_ms: 100,
                retry_delay_ms: 400
            }
        );
        assert!(!config.enable_notifications);
        assert_eq!(config.background_retry_delay_s, 30);
        assert_eq!(config.logging_level, LoggingLevel::Verbose);
    }

    #[test]
    fn deserialize_with_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"max_retries":2,"timing":{"mode":"base_timeout","base_timeout_ms":750}}"#)
                .unwrap();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.base_timeout_ms(), 750);
        assert_eq!(config.background_retry_delay_s, 30);
    }

    #[test]
    fn shared_config_snapshot_is_stable() {
        let shared = SharedConfig::new(EngineConfig::default()).unwrap();
        let before = shared.snapshot();

        shared
            .replace(EngineConfig {
                max_retries: 2,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(before.max_retries, 5);
        assert_eq!(shared.snapshot().max_retries, 2);

        let rejected = shared.replace(EngineConfig {
            max_retries: 42,
            ..Default::default()
        });
        assert!(rejected.is_err());
        assert_eq!(shared.snapshot().max_retries, 2);
    }
}
