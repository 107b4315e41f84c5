//! What happens when an entity refuses to converge.
//!
//! After the immediate tier is exhausted the engine either notifies the
//! operator straight away (background retries disabled) or hands the entity
//! to the background scheduler and stays quiet until that also fails.

use std::time::Duration;

use chrono::Utc;
use ensure_core::{EntityId, NotificationId, PowerState};
use serde::{Deserialize, Serialize};

use crate::background;
use crate::config::EngineConfig;
use crate::driver::{ConvergenceTask, RetryTier};
use crate::platform::Notification;

/// Service path of the manual retry action.
pub const RETRY_ACTION_PATH: &str = "/api/services/ensure/retry_failed_device";

/// How an immediate exhaustion was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "escalation", rename_all = "snake_case")]
pub enum Escalation {
    /// A failure notification was raised.
    Notified,
    /// A background retry was scheduled.
    BackgroundScheduled {
        /// Delay before the background loop starts.
        #[serde(with = "secs")]
        delay: Duration,
    },
    /// Notifications are off and background retries are disabled.
    Suppressed,
}

/// Decide how to handle immediate exhaustion under `config`.
#[must_use]
pub fn plan(config: &EngineConfig) -> Escalation {
    if config.background_retry_enabled() {
        Escalation::BackgroundScheduled {
            delay: config.background_retry_delay(),
        }
    } else if config.enable_notifications {
        Escalation::Notified
    } else {
        Escalation::Suppressed
    }
}

/// Apply the escalation plan for a task whose immediate tier was exhausted.
pub(crate) async fn escalate(task: &ConvergenceTask) -> Escalation {
    let escalation = plan(&task.config);
    match escalation {
        Escalation::Notified => {
            tracing::info!(entity_id = %task.entity_id, "Background retry disabled, notifying");
            notify(task, RetryTier::Immediate).await;
        }
        Escalation::BackgroundScheduled { delay } => {
            tracing::info!(
                entity_id = %task.entity_id,
                delay_s = delay.as_secs(),
                "Scheduling background retry"
            );
            background::schedule(task.clone(), delay);
        }
        Escalation::Suppressed => {
            tracing::warn!(entity_id = %task.entity_id, "Convergence failed, notifications disabled");
        }
    }
    escalation
}

/// Raise the failure notification for `task`.
///
/// Delivery failures are logged; the notification is best-effort.
pub(crate) async fn notify(task: &ConvergenceTask, tier: RetryTier) {
    let observed = task.platform.observe(&task.entity_id).await;
    let notification = render(&FailureReport {
        entity_id: &task.entity_id,
        target: task.target,
        attempts: task.config.max_retries,
        current_state: observed.as_ref().map(|s| s.state.as_str()),
        group_origin: task.group_origin.as_ref(),
        tier,
    });

    if let Err(e) = task.platform.notifications.create(&notification).await {
        tracing::error!(
            entity_id = %task.entity_id,
            notification_id = %notification.id,
            error = %e,
            "Failed to create notification"
        );
    } else {
        tracing::info!(
            entity_id = %task.entity_id,
            notification_id = %notification.id,
            ?tier,
            "Failure notification created"
        );
    }
}

/// Inputs to the failure notification text.
#[derive(Debug, Clone, Copy)]
pub struct FailureReport<'a> {
    /// Entity that failed.
    pub entity_id: &'a EntityId,
    /// State it was driven to.
    pub target: PowerState,
    /// Attempts made per tier.
    pub attempts: u32,
    /// Last observed primary state, if the hub knows the entity.
    pub current_state: Option<&'a str>,
    /// The group the entity was resolved from, if any.
    pub group_origin: Option<&'a EntityId>,
    /// The tier that produced the final failure.
    pub tier: RetryTier,
}

/// Render the notification for a failure.
#[must_use]
pub fn render(report: &FailureReport<'_>) -> Notification {
    let entity = report.entity_id;
    let target = report.target.as_str().to_uppercase();
    let current = report.current_state.unwrap_or("unknown");

    let (mut title, mut message) = match report.group_origin.filter(|group| *group != entity) {
        Some(group) => (
            "Ensure Device Control Failed (Group Member)".to_string(),
            format!(
                "Device {entity} (from group {group}) failed to ensure device is {target} after {} attempts. Current state: {current}",
                report.attempts
            ),
        ),
        None => (
            "Ensure Device Control Failed".to_string(),
            format!(
                "{entity} failed to ensure device is {target} after {} attempts. Current state: {current}",
                report.attempts
            ),
        ),
    };

    if report.tier == RetryTier::Background {
        title.push_str(" (Background Retry Also Failed)");
        message = format!(
            "⚠️ {message}\n\nBoth immediate and background retries failed. Manual intervention may be required."
        );
    }

    message.push_str(&format!(
        "\n\n**[Retry Device Now]({RETRY_ACTION_PATH}?entity_id={entity}&target_state={})**",
        report.target
    ));

    Notification {
        id: NotificationId::for_entity(entity),
        title,
        message,
        entity_id: entity.clone(),
        target_state: report.target,
        created_at: Utc::now(),
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(delay.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
