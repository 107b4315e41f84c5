//! Convergence endpoints.
//!
//! Each endpoint returns `202 Accepted` as soon as the fast path has run and
//! the per-entity pass is launched. Final outcomes are logged when the pass
//! completes; persistent failures surface as hub notifications.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use ensure_engine::{
    AttributeSet, Dispatch, Ensure, EntityId, EntityOutcome, InvocationId, PowerState, Target,
};

use crate::error::ApiError;
use crate::state::GatewayState;

/// Request body for `turn_on`.
#[derive(Debug, Deserialize)]
pub struct EnsureOnRequest {
    /// Entities to drive.
    pub target: Target,
    /// Desired attributes, including the optional `delay` override.
    #[serde(default)]
    pub attributes: AttributeSet,
}

/// Request body for `turn_off`, `toggle` and `toggle_group`.
#[derive(Debug, Deserialize)]
pub struct TargetRequest {
    /// Entities to drive.
    pub target: Target,
}

/// Request for `retry_failed_device`, as a JSON body or query string.
#[derive(Debug, Deserialize)]
pub struct RetryRequest {
    /// The entity to retry.
    pub entity_id: EntityId,
    /// The state it failed to reach.
    pub target_state: PowerState,
}

/// A resolved entity and the state it is driven to.
#[derive(Debug, Serialize)]
pub struct EntityTarget {
    /// Leaf entity.
    pub entity_id: EntityId,
    /// Desired state.
    pub target_state: PowerState,
}

/// Response for an accepted invocation.
#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    /// Identifier recorded on every log line of the run.
    pub invocation_id: InvocationId,
    /// Resolved leaf entities.
    pub entities: Vec<EntityTarget>,
}

type Accepted = Result<(StatusCode, Json<DispatchResponse>), ApiError>;

/// Drive a target on.
///
/// ```text
/// POST /v1/ensure/turn_on
/// {
///   "target": { "entity_id": "light.porch" },
///   "attributes": { "brightness_pct": 60 }
/// }
///
/// Response: 202 Accepted
/// {
///   "invocation_id": "…",
///   "entities": [{ "entity_id": "light.porch", "target_state": "on" }]
/// }
/// ```
pub async fn turn_on<E>(
    State(state): State<Arc<GatewayState<E>>>,
    Json(request): Json<EnsureOnRequest>,
) -> Accepted
where
    E: Ensure + 'static,
{
    let dispatch = state
        .ensure
        .ensure_on(request.target, request.attributes)
        .await?;
    Ok(accept("turn_on", dispatch))
}

/// Drive a target off.
pub async fn turn_off<E>(
    State(state): State<Arc<GatewayState<E>>>,
    Json(request): Json<TargetRequest>,
) -> Accepted
where
    E: Ensure + 'static,
{
    let dispatch = state.ensure.ensure_off(request.target).await?;
    Ok(accept("turn_off", dispatch))
}

/// Flip each entity of a target independently.
pub async fn toggle<E>(
    State(state): State<Arc<GatewayState<E>>>,
    Json(request): Json<TargetRequest>,
) -> Accepted
where
    E: Ensure + 'static,
{
    let dispatch = state.ensure.toggle(request.target).await?;
    Ok(accept("toggle", dispatch))
}

/// Drive every entity of a target to one shared state.
pub async fn toggle_group<E>(
    State(state): State<Arc<GatewayState<E>>>,
    Json(request): Json<TargetRequest>,
) -> Accepted
where
    E: Ensure + 'static,
{
    let dispatch = state.ensure.toggle_group(request.target).await?;
    Ok(accept("toggle_group", dispatch))
}

/// Retry a failed entity from a JSON body.
pub async fn retry_failed_device<E>(
    State(state): State<Arc<GatewayState<E>>>,
    Json(request): Json<RetryRequest>,
) -> Accepted
where
    E: Ensure + 'static,
{
    retry(&state, request).await
}

/// Retry a failed entity from the link embedded in a failure notification.
///
/// ```text
/// GET /api/services/ensure/retry_failed_device?entity_id=light.porch&target_state=on
/// ```
pub async fn retry_failed_device_link<E>(
    State(state): State<Arc<GatewayState<E>>>,
    Query(request): Query<RetryRequest>,
) -> Accepted
where
    E: Ensure + 'static,
{
    retry(&state, request).await
}

async fn retry<E>(state: &GatewayState<E>, request: RetryRequest) -> Accepted
where
    E: Ensure + 'static,
{
    tracing::info!(
        entity_id = %request.entity_id,
        target_state = %request.target_state,
        "Manual retry requested"
    );
    let dispatch = state
        .ensure
        .retry_failed(request.entity_id, request.target_state)
        .await?;
    Ok(accept("retry_failed_device", dispatch))
}

/// Build the 202 response and log the final outcome once the pass completes.
fn accept(operation: &'static str, dispatch: Dispatch) -> (StatusCode, Json<DispatchResponse>) {
    let response = DispatchResponse {
        invocation_id: dispatch.invocation_id,
        entities: dispatch
            .entities
            .iter()
            .map(|(entity_id, target_state)| EntityTarget {
                entity_id: entity_id.clone(),
                target_state: *target_state,
            })
            .collect(),
    };

    let span = tracing::info_span!("dispatch", invocation_id = %dispatch.invocation_id, operation);
    tokio::spawn(
        async move {
            let report = dispatch.wait().await;
            let converged = report
                .entities
                .iter()
                .filter(|r| r.outcome.is_converged())
                .count();
            for failed in report.entities.iter().filter(|r| !r.outcome.is_converged()) {
                match &failed.outcome {
                    EntityOutcome::Aborted { reason } => {
                        tracing::error!(entity_id = %failed.entity_id, %reason, "Entity aborted");
                    }
                    outcome => {
                        tracing::warn!(entity_id = %failed.entity_id, ?outcome, "Entity not converged");
                    }
                }
            }
            tracing::info!(
                total = report.entities.len(),
                converged,
                "Invocation complete"
            );
        }
        .instrument(span),
    );

    (StatusCode::ACCEPTED, Json(response))
}
