use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use crates::{
    domain::{
        repositories::{
            plans::PlanCatalogRepository, subscriptions::SubscriptionRepository,
            usage_counters::UsageCounterRepository,
        },
        value_objects::enums::tiers::Tier,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{
            plans::PlanCatalogPostgres, subscriptions::SubscriptionPostgres,
            usage_counters::UsageCounterPostgres,
        },
    },
};
use serde::Deserialize;
use tracing::{error, info};

use crate::{
    auth::AuthTenant,
    axum_http::error_responses,
    config::config_model::DotEnvyConfig,
    usecases::tier_changes::TierChangeUseCase,
};

pub fn routes(db_pool: Arc<PgPoolSquad>, config: Arc<DotEnvyConfig>) -> Router {
    let subscription_repository = SubscriptionPostgres::new(Arc::clone(&db_pool));
    let plan_catalog_repository = PlanCatalogPostgres::new(Arc::clone(&db_pool));
    let usage_counter_repository = UsageCounterPostgres::new(Arc::clone(&db_pool));
    let usecase = TierChangeUseCase::new(
        Arc::new(subscription_repository),
        Arc::new(plan_catalog_repository),
        Arc::new(usage_counter_repository),
        config.billing.clone(),
    );

    Router::new()
        .route("/upgrade", post(request_upgrade))
        .route("/downgrade", post(request_downgrade))
        .route("/preview/:target_tier", get(preview_tier_change))
        .with_state(Arc::new(usecase))
}

#[derive(Debug, Deserialize)]
pub struct TierChangeRequest {
    pub target_tier: String,
}

fn parse_tier(raw: &str) -> Result<Tier, Response> {
    Tier::from_str(raw).ok_or_else(|| {
        error_responses::error_response(
            StatusCode::BAD_REQUEST,
            format!("unknown tier: {raw}"),
        )
    })
}

pub async fn request_upgrade<S, P, U>(
    State(usecase): State<Arc<TierChangeUseCase<S, P, U>>>,
    AuthTenant { tenant_id, .. }: AuthTenant,
    Json(payload): Json<TierChangeRequest>,
) -> Response
where
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanCatalogRepository + Send + Sync + 'static,
    U: UsageCounterRepository + Send + Sync + 'static,
{
    let target_tier = match parse_tier(&payload.target_tier) {
        Ok(tier) => tier,
        Err(response) => return response,
    };

    info!(%tenant_id, target = %target_tier, "tier_changes: upgrade request received");
    match usecase.request_upgrade(tenant_id, target_tier, Utc::now()).await {
        Ok(dto) => Json(dto).into_response(),
        Err(err) => {
            error!(%tenant_id, error = ?err, "tier_changes: upgrade failed");
            error_responses::usecase_error(err.status_code(), err)
        }
    }
}

pub async fn request_downgrade<S, P, U>(
    State(usecase): State<Arc<TierChangeUseCase<S, P, U>>>,
    AuthTenant { tenant_id, .. }: AuthTenant,
    Json(payload): Json<TierChangeRequest>,
) -> Response
where
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanCatalogRepository + Send + Sync + 'static,
    U: UsageCounterRepository + Send + Sync + 'static,
{
    let target_tier = match parse_tier(&payload.target_tier) {
        Ok(tier) => tier,
        Err(response) => return response,
    };

    info!(%tenant_id, target = %target_tier, "tier_changes: downgrade request received");
    match usecase
        .request_downgrade(tenant_id, target_tier, Utc::now())
        .await
    {
        Ok(preview) => Json(preview).into_response(),
        Err(err) => {
            error!(%tenant_id, error = ?err, "tier_changes: downgrade failed");
            error_responses::usecase_error(err.status_code(), err)
        }
    }
}

pub async fn preview_tier_change<S, P, U>(
    State(usecase): State<Arc<TierChangeUseCase<S, P, U>>>,
    AuthTenant { tenant_id, .. }: AuthTenant,
    Path(raw_target_tier): Path<String>,
) -> Response
where
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanCatalogRepository + Send + Sync + 'static,
    U: UsageCounterRepository + Send + Sync + 'static,
{
    let target_tier = match parse_tier(&raw_target_tier) {
        Ok(tier) => tier,
        Err(response) => return response,
    };

    match usecase
        .preview_tier_change(tenant_id, target_tier, Utc::now())
        .await
    {
        Ok(preview) => Json(preview).into_response(),
        Err(err) => {
            error!(%tenant_id, error = ?err, "tier_changes: preview failed");
            error_responses::usecase_error(err.status_code(), err)
        }
    }
}
