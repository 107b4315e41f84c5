//! Background retry scheduling.
//!
//! A background retry is one more bounded loop, started after a delay, for an
//! entity whose immediate tier was exhausted. It runs in the
//! [`RetryTier::Background`] tier, so it can never schedule another.

use std::time::Duration;

use futures::future::BoxFuture;
use tracing::Instrument;

use crate::driver::{ConvergenceTask, RetryOutcome, RetryTier};
use crate::escalation;

/// Runs a job after a delay.
pub trait DeferredExecutor: Send + Sync {
    /// Schedule `job` to run once `delay` has elapsed. Must not block.
    fn schedule(&self, delay: Duration, job: BoxFuture<'static, ()>);
}

/// Executor backed by the tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioExecutor;

impl DeferredExecutor for TokioExecutor {
    fn schedule(&self, delay: Duration, job: BoxFuture<'static, ()>) {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            job.await;
        });
    }
}

/// Hand `task` to the platform's executor for one background loop.
pub(crate) fn schedule(task: ConvergenceTask, delay: Duration) {
    let executor = task.platform.executor.clone();
    let span = tracing::info_span!("background_retry", entity_id = %task.entity_id);
    let job = async move {
        run(task).await;
    };
    executor.schedule(delay, Box::pin(job.instrument(span)));
}

/// Body of a background retry.
pub async fn run(task: ConvergenceTask) -> RetryOutcome {
    if task.is_converged().await {
        tracing::info!(entity_id = %task.entity_id, "Already converged, skipping background retry");
        return RetryOutcome::Converged { attempts: 0 };
    }

    tracing::info!(entity_id = %task.entity_id, target = %task.target, "Starting background retry");
    let outcome = task.run(RetryTier::Background).await;

    match outcome {
        RetryOutcome::Converged { attempts } => {
            tracing::info!(entity_id = %task.entity_id, attempts, "Background retry succeeded");
        }
        RetryOutcome::ExhaustedBackground | RetryOutcome::ExhaustedImmediate => {
            tracing::error!(entity_id = %task.entity_id, "Background retry failed");
            if task.config.enable_notifications {
                escalation::notify(&task, RetryTier::Background).await;
            }
        }
    }
    outcome
}
