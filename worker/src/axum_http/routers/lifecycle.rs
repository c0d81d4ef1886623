use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::post,
};
use backend::usecases::lifecycle::LifecycleRunResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::{LifecyclePasses, PlanChangePasses, config::config_model::DotEnvyConfig};

// Run example
//   curl -X POST "http://localhost:$SERVER_PORT_WORKER/internal/v1/lifecycle/trial-expirer" \
//     -H "Authorization: Bearer $INTERNAL_API_TOKEN" \
//     -H "Content-Type: application/json" \
//     -d '{"limit":50}'

#[derive(Clone)]
pub struct LifecycleRouteState {
    config: Arc<DotEnvyConfig>,
    lifecycle_usecase: Arc<LifecyclePasses>,
    tier_change_usecase: Arc<PlanChangePasses>,
}

pub fn routes(
    config: Arc<DotEnvyConfig>,
    lifecycle_usecase: Arc<LifecyclePasses>,
    tier_change_usecase: Arc<PlanChangePasses>,
) -> Router {
    Router::new()
        .route("/trial-expirer", post(run_trial_expirer))
        .route("/grace-expirer", post(run_grace_expirer))
        .route("/past-due-handler", post(run_past_due_handler))
        .route("/apply-due-plan-changes", post(run_apply_due_plan_changes))
        .with_state(LifecycleRouteState {
            config,
            lifecycle_usecase,
            tier_change_usecase,
        })
}

#[derive(Debug, Deserialize)]
pub struct LifecycleTriggerRequest {
    /// Explicit pass instant; defaults to the wall clock. Lets operators
    /// replay a tick deterministically.
    pub now: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LifecyclePassResponse {
    pub pass: &'static str,
    pub now: DateTime<Utc>,
    pub scanned: u64,
    pub transitioned: u64,
    pub conflicts: u64,
    pub invalid: u64,
    pub failed: u64,
    pub transitioned_ids: Vec<Uuid>,
}

pub async fn run_trial_expirer(
    State(state): State<LifecycleRouteState>,
    headers: HeaderMap,
    Json(payload): Json<LifecycleTriggerRequest>,
) -> Response {
    let (now, limit) = match authorize_and_resolve(&state, &headers, &payload) {
        Ok(resolved) => resolved,
        Err(response) => return response,
    };

    match state.lifecycle_usecase.run_trial_expirer(now, limit).await {
        Ok(result) => pass_response("trial_expirer", now, result),
        Err(err) => pass_failure("trial_expirer", err),
    }
}

pub async fn run_grace_expirer(
    State(state): State<LifecycleRouteState>,
    headers: HeaderMap,
    Json(payload): Json<LifecycleTriggerRequest>,
) -> Response {
    let (now, limit) = match authorize_and_resolve(&state, &headers, &payload) {
        Ok(resolved) => resolved,
        Err(response) => return response,
    };

    match state.lifecycle_usecase.run_grace_expirer(now, limit).await {
        Ok(result) => pass_response("grace_expirer", now, result),
        Err(err) => pass_failure("grace_expirer", err),
    }
}

pub async fn run_past_due_handler(
    State(state): State<LifecycleRouteState>,
    headers: HeaderMap,
    Json(payload): Json<LifecycleTriggerRequest>,
) -> Response {
    let (now, limit) = match authorize_and_resolve(&state, &headers, &payload) {
        Ok(resolved) => resolved,
        Err(response) => return response,
    };

    match state.lifecycle_usecase.run_past_due_handler(now, limit).await {
        Ok(result) => pass_response("past_due_handler", now, result),
        Err(err) => pass_failure("past_due_handler", err),
    }
}

pub async fn run_apply_due_plan_changes(
    State(state): State<LifecycleRouteState>,
    headers: HeaderMap,
    Json(payload): Json<LifecycleTriggerRequest>,
) -> Response {
    let (now, limit) = match authorize_and_resolve(&state, &headers, &payload) {
        Ok(resolved) => resolved,
        Err(response) => return response,
    };

    match state
        .tier_change_usecase
        .run_apply_due_plan_changes(now, limit)
        .await
    {
        Ok(result) => pass_response("apply_due_plan_changes", now, result),
        Err(err) => pass_failure("apply_due_plan_changes", err),
    }
}

fn authorize_and_resolve(
    state: &LifecycleRouteState,
    headers: &HeaderMap,
    payload: &LifecycleTriggerRequest,
) -> Result<(DateTime<Utc>, i64), Response> {
    let expected_token = match state.config.scheduler.internal_token.as_deref() {
        Some(token) => token,
        None => {
            return Err((
                StatusCode::SERVICE_UNAVAILABLE,
                "scheduler token is not configured",
            )
                .into_response());
        }
    };

    if let Err(status) = authorize_bearer(headers, expected_token) {
        return Err((status, "unauthorized").into_response());
    }

    let now = payload.now.unwrap_or_else(Utc::now);
    let limit = payload
        .limit
        .unwrap_or(state.config.billing.scheduler_batch_limit);
    if limit <= 0 {
        return Err((StatusCode::BAD_REQUEST, "limit must be a positive number").into_response());
    }

    Ok((now, limit))
}

fn pass_response(pass: &'static str, now: DateTime<Utc>, result: LifecycleRunResult) -> Response {
    Json(LifecyclePassResponse {
        pass,
        now,
        scanned: result.scanned,
        transitioned: result.transitioned,
        conflicts: result.conflicts,
        invalid: result.invalid,
        failed: result.failed,
        transitioned_ids: result.transitioned_ids,
    })
    .into_response()
}

fn pass_failure(pass: &'static str, err: anyhow::Error) -> Response {
    error!(pass, error = ?err, "lifecycle trigger: pass failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "lifecycle pass failed").into_response()
}

fn authorize_bearer(headers: &HeaderMap, expected_token: &str) -> Result<(), StatusCode> {
    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if token == expected_token {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}
