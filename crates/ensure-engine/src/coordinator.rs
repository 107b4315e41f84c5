//! Bounded fan-out of per-entity convergence.
//!
//! Entities enter the pool in resolution order and at most `limit` loops run
//! at once. Each loop runs in its own task, so a panic in one entity is
//! reported as [`EntityOutcome::Aborted`] and never reaches the others.

use std::future::Future;
use std::sync::Arc;

use ensure_core::EntityId;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::Instrument;

use crate::types::{EntityOutcome, EntityReport};

/// Drive every job through `drive`, at most `limit` at a time.
///
/// Returns one report per job in input order.
pub async fn drive_all<T, F, Fut>(jobs: Vec<(EntityId, T)>, limit: usize, drive: F) -> Vec<EntityReport>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = EntityOutcome> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut handles = Vec::with_capacity(jobs.len());
    let mut entities = Vec::with_capacity(jobs.len());

    for (entity_id, input) in jobs {
        // Acquire before spawning so entities start in order.
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                tracing::error!(error = %e, "Convergence pool closed");
                break;
            }
        };

        let span = tracing::info_span!("entity", entity_id = %entity_id);
        let job = drive(input);
        entities.push(entity_id);
        handles.push(tokio::spawn(
            async move {
                let outcome = job.await;
                drop(permit);
                outcome
            }
            .instrument(span),
        ));
    }

    let results = join_all(handles).await;

    entities
        .into_iter()
        .zip(results)
        .map(|(entity_id, result)| {
            let outcome = result.unwrap_or_else(|e| {
                tracing::error!(entity_id = %entity_id, error = %e, "Convergence task panicked");
                EntityOutcome::Aborted {
                    reason: format!("convergence task failed: {e}"),
                }
            });
            EntityReport { entity_id, outcome }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ids(n: usize) -> Vec<EntityId> {
        (0..n).map(|i| format!("light.l{i}").parse().unwrap()).collect()
    }

    fn jobs(n: usize) -> Vec<(EntityId, EntityId)> {
        ids(n).into_iter().map(|id| (id.clone(), id)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn peak_concurrency_is_bounded() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let reports = drive_all(jobs(10), 3, |_| {
            let active = active.clone();
            let peak = peak.clone();
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(250)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                EntityOutcome::Converged { attempts: 1 }
            }
        })
        .await;

        assert_eq!(reports.len(), 10);
        assert!(reports.iter().all(|r| r.outcome.is_converged()));
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn entities_start_in_order() {
        let started = Arc::new(parking_lot::Mutex::new(Vec::new()));

        drive_all(jobs(6), 2, |id| {
            let started = started.clone();
            async move {
                started.lock().push(id);
                tokio::time::sleep(Duration::from_millis(10)).await;
                EntityOutcome::Converged { attempts: 1 }
            }
        })
        .await;

        assert_eq!(*started.lock(), ids(6));
    }

    #[tokio::test]
    async fn panics_are_isolated() {
        let reports = drive_all(jobs(3), 3, |id| async move {
            assert!(id.as_str() != "light.l1", "boom");
            EntityOutcome::Converged { attempts: 2 }
        })
        .await;

        assert!(reports[0].outcome.is_converged());
        assert!(matches!(reports[1].outcome, EntityOutcome::Aborted { .. }));
        assert!(reports[2].outcome.is_converged());
        assert_eq!(reports[1].entity_id.as_str(), "light.l1");
    }
}
