pub mod axum_http;
pub mod config;
pub mod services;

use std::sync::Arc;

use anyhow::Result;
use backend::usecases::{lifecycle::LifecycleUseCase, tier_changes::TierChangeUseCase};
use crates::infra::db::{
    postgres::postgres_connection,
    repositories::{
        plans::PlanCatalogPostgres, subscriptions::SubscriptionPostgres,
        usage_counters::UsageCounterPostgres,
    },
};
use tracing::info;

/// Concrete wirings of the scheduler use cases against Postgres.
pub type LifecyclePasses = LifecycleUseCase<SubscriptionPostgres>;
pub type PlanChangePasses =
    TierChangeUseCase<SubscriptionPostgres, PlanCatalogPostgres, UsageCounterPostgres>;

pub async fn run() -> Result<()> {
    crates::observability::init_observability("worker")?;

    let dotenvy_env = Arc::new(config::config_loader::load()?);
    info!("ENV has been loaded");

    let postgres_pool = postgres_connection::establish_connection(&dotenvy_env.database.url)?;
    info!("Postgres connection has been established");

    let db_pool_arc = Arc::new(postgres_pool);

    let subscription_repository = Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool_arc)));
    let plan_catalog_repository = Arc::new(PlanCatalogPostgres::new(Arc::clone(&db_pool_arc)));
    let usage_counter_repository = Arc::new(UsageCounterPostgres::new(Arc::clone(&db_pool_arc)));

    let lifecycle_usecase = Arc::new(LifecycleUseCase::new(
        Arc::clone(&subscription_repository),
        dotenvy_env.billing.grace_length(),
    ));
    let tier_change_usecase = Arc::new(TierChangeUseCase::new(
        subscription_repository,
        plan_catalog_repository,
        usage_counter_repository,
        dotenvy_env.billing.clone(),
    ));

    info!("Worker started");

    let scheduler_loop = tokio::spawn(services::scheduler_loop::run(
        Arc::clone(&dotenvy_env),
        Arc::clone(&lifecycle_usecase),
        Arc::clone(&tier_change_usecase),
    ));

    let server_config = Arc::clone(&dotenvy_env);
    let server = tokio::spawn(async move {
        axum_http::http_serve::start(server_config, lifecycle_usecase, tier_change_usecase).await
    });

    tokio::select! {
        result = scheduler_loop => result??,
        result = server => result??,
    };

    Ok(())
}
