use std::sync::Arc;

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use chrono::Utc;
use crates::{
    domain::repositories::{
        plans::PlanCatalogRepository, subscriptions::SubscriptionRepository,
        usage_counters::UsageCounterRepository,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{
            plans::PlanCatalogPostgres, subscriptions::SubscriptionPostgres,
            usage_counters::UsageCounterPostgres,
        },
    },
};
use tracing::error;

use crate::{auth::AuthTenant, axum_http::error_responses, usecases::entitlements::EntitlementUseCase};

pub fn routes(db_pool: Arc<PgPoolSquad>) -> Router {
    let subscription_repository = SubscriptionPostgres::new(Arc::clone(&db_pool));
    let plan_catalog_repository = PlanCatalogPostgres::new(Arc::clone(&db_pool));
    let usage_counter_repository = UsageCounterPostgres::new(Arc::clone(&db_pool));
    let usecase = EntitlementUseCase::new(
        Arc::new(subscription_repository),
        Arc::new(plan_catalog_repository),
        Arc::new(usage_counter_repository),
    );

    Router::new()
        .route("/", get(list_plans))
        .with_state(Arc::new(usecase))
}

pub async fn list_plans<S, P, U>(
    State(usecase): State<Arc<EntitlementUseCase<S, P, U>>>,
    _auth: AuthTenant,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanCatalogRepository + Send + Sync + 'static,
    U: UsageCounterRepository + Send + Sync + 'static,
{
    match usecase.list_plans(Utc::now()).await {
        Ok(plans) => Json(plans).into_response(),
        Err(err) => {
            error!(error = ?err, "plans: catalog listing failed");
            error_responses::usecase_error(err.status_code(), err)
        }
    }
}
