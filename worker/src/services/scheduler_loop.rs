use std::{sync::Arc, time::Duration};

use anyhow::Result;
use chrono::Utc;
use tracing::error;

use crate::{LifecyclePasses, PlanChangePasses, config::config_model::DotEnvyConfig};

/// Timer-driven runner for the four lifecycle passes. Each pass is
/// idempotent and guard-revalidating, so an overlapping manual trigger or a
/// restart mid-tick is harmless.
pub async fn run(
    config: Arc<DotEnvyConfig>,
    lifecycle_usecase: Arc<LifecyclePasses>,
    tier_change_usecase: Arc<PlanChangePasses>,
) -> Result<()> {
    loop {
        tick(&config, &lifecycle_usecase, &tier_change_usecase).await;

        tokio::time::sleep(Duration::from_secs(config.scheduler.tick_seconds)).await;
    }
}

async fn tick(
    config: &DotEnvyConfig,
    lifecycle_usecase: &LifecyclePasses,
    tier_change_usecase: &PlanChangePasses,
) {
    let now = Utc::now();
    let limit = config.billing.scheduler_batch_limit;

    if let Err(e) = lifecycle_usecase.run_trial_expirer(now, limit).await {
        error!("scheduler_loop: trial expirer failed: {}", e);
    }
    if let Err(e) = lifecycle_usecase.run_past_due_handler(now, limit).await {
        error!("scheduler_loop: past-due handler failed: {}", e);
    }
    if let Err(e) = lifecycle_usecase.run_grace_expirer(now, limit).await {
        error!("scheduler_loop: grace expirer failed: {}", e);
    }
    if let Err(e) = tier_change_usecase
        .run_apply_due_plan_changes(now, limit)
        .await
    {
        error!("scheduler_loop: apply due plan changes failed: {}", e);
    }
}
