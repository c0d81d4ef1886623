use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::post,
};
use chrono::{DateTime, Utc};
use crates::{
    domain::repositories::subscriptions::SubscriptionRepository,
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::subscriptions::SubscriptionPostgres,
    },
};
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    axum_http::{error_responses, routers::require_internal_token},
    config::config_model::DotEnvyConfig,
    usecases::subscriptions::SubscriptionUseCase,
};

// Called by the payment-provider webhook collaborator after it has already
// verified authenticity. Amounts are carried for the log only; proration and
// capture retries live with the provider.

pub struct PaymentEventsRouteState<S>
where
    S: SubscriptionRepository + Send + Sync + 'static,
{
    config: Arc<DotEnvyConfig>,
    usecase: Arc<SubscriptionUseCase<S>>,
}

impl<S> Clone for PaymentEventsRouteState<S>
where
    S: SubscriptionRepository + Send + Sync + 'static,
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
    let usecase = SubscriptionUseCase::new(
        Arc::new(subscription_repository),
        config.billing.clone(),
    );

    Router::new()
        .route("/payment-succeeded", post(payment_succeeded))
        .route("/payment-failed", post(payment_failed))
        .with_state(PaymentEventsRouteState {
            config,
            usecase: Arc::new(usecase),
        })
}

#[derive(Debug, Deserialize)]
pub struct PaymentEventRequest {
    pub tenant_id: Uuid,
    pub amount_minor: Option<i64>,
    pub at: Option<DateTime<Utc>>,
}

pub async fn payment_succeeded<S>(
    State(state): State<PaymentEventsRouteState<S>>,
    headers: HeaderMap,
    Json(payload): Json<PaymentEventRequest>,
) -> Response
where
    S: SubscriptionRepository + Send + Sync + 'static,
{
    if let Err(response) = require_internal_token(&state.config, &headers) {
        return response;
    }

    let at = payload.at.unwrap_or_else(Utc::now);
    info!(
        tenant_id = %payload.tenant_id,
        amount_minor = ?payload.amount_minor,
        at = %at,
        "payment_events: payment succeeded signal received"
    );

    match state.usecase.record_payment_succeeded(payload.tenant_id, at).await {
        Ok(dto) => Json(dto).into_response(),
        Err(err) => {
            error!(tenant_id = %payload.tenant_id, error = ?err, "payment_events: succeeded signal failed");
            error_responses::usecase_error(err.status_code(), err)
        }
    }
}

pub async fn payment_failed<S>(
    State(state): State<PaymentEventsRouteState<S>>,
    headers: HeaderMap,
    Json(payload): Json<PaymentEventRequest>,
) -> Response
where
    S: SubscriptionRepository + Send + Sync + 'static,
{
    if let Err(response) = require_internal_token(&state.config, &headers) {
        return response;
    }

    let at = payload.at.unwrap_or_else(Utc::now);
    info!(
        tenant_id = %payload.tenant_id,
        at = %at,
        "payment_events: payment failed signal received"
    );

    match state.usecase.record_payment_failed(payload.tenant_id, at).await {
        Ok(dto) => Json(dto).into_response(),
        Err(err) => {
            error!(tenant_id = %payload.tenant_id, error = ?err, "payment_events: failed signal failed");
            error_responses::usecase_error(err.status_code(), err)
        }
    }
}
