use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use crates::{
    domain::repositories::subscriptions::SubscriptionRepository,
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::subscriptions::SubscriptionPostgres,
    },
};
use serde::Deserialize;
use tracing::{error, info};

use crate::{
    auth::AuthTenant,
    axum_http::error_responses,
    config::config_model::DotEnvyConfig,
    usecases::subscriptions::SubscriptionUseCase,
};

pub fn routes(db_pool: Arc<PgPoolSquad>, config: Arc<DotEnvyConfig>) -> Router {
    let subscription_repository = SubscriptionPostgres::new(Arc::clone(&db_pool));
    let usecase = SubscriptionUseCase::new(
        Arc::new(subscription_repository),
        config.billing.clone(),
    );

    Router::new()
        .route("/provision", post(provision_trial))
        .route("/current", get(current_subscription))
        .route("/cancel", post(cancel_subscription))
        .with_state(Arc::new(usecase))
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub at_period_end: Option<bool>,
}

pub async fn provision_trial<S>(
    State(usecase): State<Arc<SubscriptionUseCase<S>>>,
    AuthTenant { tenant_id, .. }: AuthTenant,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync + 'static,
{
    info!(%tenant_id, "subscriptions: provision request received");
    match usecase.provision_trial(tenant_id, Utc::now()).await {
        Ok(dto) => (StatusCode::CREATED, Json(dto)).into_response(),
        Err(err) => {
            error!(%tenant_id, error = ?err, "subscriptions: provisioning failed");
            error_responses::usecase_error(err.status_code(), err)
        }
    }
}

pub async fn current_subscription<S>(
    State(usecase): State<Arc<SubscriptionUseCase<S>>>,
    AuthTenant { tenant_id, .. }: AuthTenant,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync + 'static,
{
    match usecase.get_subscription(tenant_id).await {
        Ok(dto) => Json(dto).into_response(),
        Err(err) => {
            error!(%tenant_id, error = ?err, "subscriptions: current lookup failed");
            error_responses::usecase_error(err.status_code(), err)
        }
    }
}

pub async fn cancel_subscription<S>(
    State(usecase): State<Arc<SubscriptionUseCase<S>>>,
    AuthTenant { tenant_id, .. }: AuthTenant,
    Json(payload): Json<CancelRequest>,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync + 'static,
{
    let at_period_end = payload.at_period_end.unwrap_or(false);
    info!(%tenant_id, at_period_end, "subscriptions: cancel request received");
    match usecase.cancel(tenant_id, at_period_end, Utc::now()).await {
        Ok(dto) => Json(dto).into_response(),
        Err(err) => {
            error!(%tenant_id, error = ?err, "subscriptions: cancel failed");
            error_responses::usecase_error(err.status_code(), err)
        }
    }
}
