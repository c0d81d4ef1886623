use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use crates::{
    domain::{
        entities::usage_counters::UpsertUsageCounterEntity,
        repositories::{
            plans::PlanCatalogRepository, subscriptions::SubscriptionRepository,
            usage_counters::UsageCounterRepository,
        },
        value_objects::entitlements::{Capability, CapabilityDecision, QuotaDimension},
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{
            plans::PlanCatalogPostgres, subscriptions::SubscriptionPostgres,
            usage_counters::UsageCounterPostgres,
        },
    },
};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::{
    auth::AuthTenant,
    axum_http::{error_responses, routers::require_internal_token},
    config::config_model::DotEnvyConfig,
    usecases::entitlements::EntitlementUseCase,
};

pub struct EntitlementsRouteState<S, P, U>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanCatalogRepository + Send + Sync + 'static,
    U: UsageCounterRepository + Send + Sync + 'static,
{
    config: Arc<DotEnvyConfig>,
    usecase: Arc<EntitlementUseCase<S, P, U>>,
}

impl<S, P, U> Clone for EntitlementsRouteState<S, P, U>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanCatalogRepository + Send + Sync + 'static,
    U: UsageCounterRepository + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            usecase: Arc::clone(&self.usecase),
        }
    }
}

pub fn routes(db_pool: Arc<PgPoolSquad>, config: Arc<DotEnvyConfig>) -> Router {
    let subscription_repository = SubscriptionPostgres::new(Arc::clone(&db_pool));
    let plan_catalog_repository = PlanCatalogPostgres::new(Arc::clone(&db_pool));
    let usage_counter_repository = UsageCounterPostgres::new(Arc::clone(&db_pool));
    let usecase = EntitlementUseCase::new(
        Arc::new(subscription_repository),
        Arc::new(plan_catalog_repository),
        Arc::new(usage_counter_repository),
    );

    Router::new()
        .route("/", get(get_entitlements))
        .route("/gate/:capability", get(gate_check))
        .route("/usage/increment", post(increment_usage))
        .route("/usage/reconcile", post(reconcile_usage))
        .with_state(EntitlementsRouteState {
            config,
            usecase: Arc::new(usecase),
        })
}

/// Mirror of the gate middleware's verdict, readable by the presentation
/// layer without attempting the guarded action.
#[derive(Debug, Serialize)]
pub struct GateCheckResponse {
    pub capability: String,
    pub allowed: bool,
    pub code: Option<&'static str>,
    pub dimension: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IncrementUsageRequest {
    pub tenant_id: Uuid,
    pub dimension: String,
    pub amount: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ReconcileUsageRequest {
    pub tenant_id: Uuid,
    pub period_key: String,
    pub orders: i64,
    pub api_calls: i64,
    pub storage_mb: i64,
    pub plugins: i64,
    pub branches: i64,
    pub admin_users: i64,
}

pub async fn get_entitlements<S, P, U>(
    State(state): State<EntitlementsRouteState<S, P, U>>,
    AuthTenant { tenant_id, .. }: AuthTenant,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanCatalogRepository + Send + Sync + 'static,
    U: UsageCounterRepository + Send + Sync + 'static,
{
    match state.usecase.get_entitlements(tenant_id, Utc::now()).await {
        Ok(entitlements) => Json(entitlements).into_response(),
        Err(err) => {
            error!(%tenant_id, error = ?err, "entitlements: resolution failed");
            error_responses::usecase_error(err.status_code(), err)
        }
    }
}

pub async fn gate_check<S, P, U>(
    State(state): State<EntitlementsRouteState<S, P, U>>,
    AuthTenant { tenant_id, .. }: AuthTenant,
    Path(raw_capability): Path<String>,
) -> Response
where
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanCatalogRepository + Send + Sync + 'static,
    U: UsageCounterRepository + Send + Sync + 'static,
{
    let Some(capability) = Capability::from_str(&raw_capability) else {
        return error_responses::error_response(
            StatusCode::BAD_REQUEST,
            format!("unknown capability: {raw_capability}"),
        );
    };

    match state.usecase.check(tenant_id, capability, Utc::now()).await {
        Ok(decision) => {
            let (allowed, code, dimension) = match decision {
                CapabilityDecision::Allow => (true, None, None),
                CapabilityDecision::Deny { code, dimension } => {
                    (false, Some(code.as_str()), dimension.map(|d| d.to_string()))
                }
            };
            Json(GateCheckResponse {
                capability: capability.to_string(),
                allowed,
                code,
                dimension,
            })
            .into_response()
        }
        Err(err) => {
            error!(%tenant_id, error = ?err, "entitlements: gate check failed");
            error_responses::usecase_error(err.status_code(), err)
        }
    }
}

pub async fn increment_usage<S, P, U>(
    State(state): State<EntitlementsRouteState<S, P, U>>,
    headers: HeaderMap,
    Json(payload): Json<IncrementUsageRequest>,
) -> Response
where
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanCatalogRepository + Send + Sync + 'static,
    U: UsageCounterRepository + Send + Sync + 'static,
{
    if let Err(response) = require_internal_token(&state.config, &headers) {
        return response;
    }

    let Some(dimension) = QuotaDimension::from_str(&payload.dimension) else {
        return error_responses::error_response(
            StatusCode::BAD_REQUEST,
            format!("unknown quota dimension: {}", payload.dimension),
        );
    };
    let amount = payload.amount.unwrap_or(1);

    match state
        .usecase
        .record_usage(payload.tenant_id, dimension, amount)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!(tenant_id = %payload.tenant_id, error = ?err, "entitlements: usage increment failed");
            error_responses::usecase_error(err.status_code(), err)
        }
    }
}

pub async fn reconcile_usage<S, P, U>(
    State(state): State<EntitlementsRouteState<S, P, U>>,
    headers: HeaderMap,
    Json(payload): Json<ReconcileUsageRequest>,
) -> Response
where
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanCatalogRepository + Send + Sync + 'static,
    U: UsageCounterRepository + Send + Sync + 'static,
{
    if let Err(response) = require_internal_token(&state.config, &headers) {
        return response;
    }

    let entity = UpsertUsageCounterEntity {
        tenant_id: payload.tenant_id,
        period_key: payload.period_key,
        orders: payload.orders,
        api_calls: payload.api_calls,
        storage_mb: payload.storage_mb,
        plugins: payload.plugins,
        branches: payload.branches,
        admin_users: payload.admin_users,
    };

    match state.usecase.reconcile_usage(entity).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!(error = ?err, "entitlements: usage reconciliation failed");
            error_responses::usecase_error(err.status_code(), err)
        }
    }
}
