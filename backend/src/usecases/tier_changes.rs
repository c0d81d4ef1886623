use std::sync::Arc;

use chrono::{DateTime, Utc};
use crates::domain::{
    entities::{plans::PlanCatalogEntry, subscriptions::SubscriptionChanges},
    repositories::{
        plans::PlanCatalogRepository, subscriptions::SubscriptionRepository,
        usage_counters::UsageCounterRepository,
    },
    value_objects::{
        entitlements::{QuotaDimension, UsageSnapshot},
        enums::tiers::Tier,
        subscriptions::{
            DOWNGRADE_QUOTA_EXCEEDED_SOFT_LIMIT, DimensionPreviewDto, ExceededDimension,
            SoftLimitSnapshot, SubscriptionDto, SubscriptionPhase, SubscriptionRecord,
            TierChangeDirection, TierChangePreviewDto,
        },
    },
};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::lifecycle::LifecycleRunResult;
use crate::config::config_model::BillingRules;

const MAX_TRANSITION_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum TierChangeError {
    #[error("subscription not found")]
    SubscriptionNotFound,
    #[error("subscription is canceled")]
    SubscriptionCanceled,
    #[error("already on {current}")]
    SameTier { current: Tier },
    #[error("{target} does not rank above {current}")]
    NotAnUpgrade { current: Tier, target: Tier },
    #[error("{target} does not rank below {current}")]
    NotADowngrade { current: Tier, target: Tier },
    #[error("transition lost a concurrent update race")]
    VersionConflict,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl TierChangeError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            TierChangeError::SubscriptionNotFound => StatusCode::NOT_FOUND,
            TierChangeError::SameTier { .. }
            | TierChangeError::NotAnUpgrade { .. }
            | TierChangeError::NotADowngrade { .. } => StatusCode::BAD_REQUEST,
            TierChangeError::SubscriptionCanceled | TierChangeError::VersionConflict => {
                StatusCode::CONFLICT
            }
            TierChangeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, TierChangeError>;

/// Dry-run of current usage against the target tier's quotas.
fn build_preview(
    record: &SubscriptionRecord,
    target_plan: &PlanCatalogEntry,
    usage: &UsageSnapshot,
    now: DateTime<Utc>,
) -> TierChangePreviewDto {
    let direction = if target_plan.tier.rank() > record.current_tier.rank() {
        TierChangeDirection::Upgrade
    } else {
        TierChangeDirection::Downgrade
    };
    let effective_at = match direction {
        TierChangeDirection::Upgrade => now,
        TierChangeDirection::Downgrade => record.current_period_end,
    };

    let dimensions: Vec<DimensionPreviewDto> = QuotaDimension::ALL
        .iter()
        .map(|&dimension| {
            let used = usage.used(dimension);
            let target_limit = target_plan.quotas.limit(dimension);
            DimensionPreviewDto {
                dimension,
                used,
                target_limit,
                would_exceed: used > target_limit,
            }
        })
        .collect();
    let would_soft_limit = direction == TierChangeDirection::Downgrade
        && dimensions.iter().any(|d| d.would_exceed);

    TierChangePreviewDto {
        current_tier: record.current_tier,
        target_tier: target_plan.tier,
        direction,
        effective_at,
        dimensions,
        would_soft_limit,
    }
}

fn exceeded_dimensions(
    usage: &UsageSnapshot,
    target_plan: &PlanCatalogEntry,
) -> Vec<ExceededDimension> {
    QuotaDimension::ALL
        .iter()
        .filter_map(|&dimension| {
            let used = usage.used(dimension);
            let limit = target_plan.quotas.limit(dimension);
            (used > limit).then_some(ExceededDimension {
                dimension,
                used,
                limit,
            })
        })
        .collect()
}

pub struct TierChangeUseCase<S, P, U>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanCatalogRepository + Send + Sync + 'static,
    U: UsageCounterRepository + Send + Sync + 'static,
{
    subscription_repository: Arc<S>,
    plan_catalog_repository: Arc<P>,
    usage_counter_repository: Arc<U>,
    billing_rules: BillingRules,
}

impl<S, P, U> TierChangeUseCase<S, P, U>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanCatalogRepository + Send + Sync + 'static,
    U: UsageCounterRepository + Send + Sync + 'static,
{
    pub fn new(
        subscription_repository: Arc<S>,
        plan_catalog_repository: Arc<P>,
        usage_counter_repository: Arc<U>,
        billing_rules: BillingRules,
    ) -> Self {
        Self {
            subscription_repository,
            plan_catalog_repository,
            usage_counter_repository,
            billing_rules,
        }
    }

    async fn load_record(&self, tenant_id: Uuid) -> UseCaseResult<SubscriptionRecord> {
        let entity = self
            .subscription_repository
            .find_by_tenant_id(tenant_id)
            .await?
            .ok_or(TierChangeError::SubscriptionNotFound)?;

        Ok(entity.to_record()?)
    }

    async fn load_usage(&self, record: &SubscriptionRecord) -> UseCaseResult<UsageSnapshot> {
        let usage = self
            .usage_counter_repository
            .find(record.tenant_id, &record.period_key())
            .await?
            .map(|counter| counter.to_snapshot())
            .unwrap_or_default();

        Ok(usage)
    }

    /// Immediate tier raise. Cancels any pending downgrade and lifts an
    /// active soft limit; billing period and payment timestamps stay put.
    pub async fn request_upgrade(
        &self,
        tenant_id: Uuid,
        target_tier: Tier,
        _now: DateTime<Utc>,
    ) -> UseCaseResult<SubscriptionDto> {
        self.transition(tenant_id, |record| {
            if let SubscriptionPhase::Canceled { .. } = record.phase {
                return Err(TierChangeError::SubscriptionCanceled);
            }
            if target_tier == record.current_tier {
                return Ok(None);
            }
            if target_tier.rank() < record.current_tier.rank() {
                return Err(TierChangeError::NotAnUpgrade {
                    current: record.current_tier,
                    target: target_tier,
                });
            }

            let mut next = record.clone();
            next.current_tier = target_tier;
            next.next_tier = None;
            next.soft_limited = false;
            next.soft_limit_reason = None;
            next.soft_limit_snapshot = None;
            Ok(Some(next))
        })
        .await
    }

    /// Schedules the downgrade for period end and returns the dry-run of
    /// usage against the target quotas.
    pub async fn request_downgrade(
        &self,
        tenant_id: Uuid,
        target_tier: Tier,
        now: DateTime<Utc>,
    ) -> UseCaseResult<TierChangePreviewDto> {
        let record = self.load_record(tenant_id).await?;
        if let SubscriptionPhase::Canceled { .. } = record.phase {
            return Err(TierChangeError::SubscriptionCanceled);
        }
        if target_tier.rank() >= record.current_tier.rank() {
            return Err(TierChangeError::NotADowngrade {
                current: record.current_tier,
                target: target_tier,
            });
        }

        let target_plan = self
            .plan_catalog_repository
            .find_effective_by_tier(target_tier, now)
            .await?;
        let usage = self.load_usage(&record).await?;
        let preview = build_preview(&record, &target_plan, &usage, now);

        self.transition(tenant_id, |record| {
            if let SubscriptionPhase::Canceled { .. } = record.phase {
                return Err(TierChangeError::SubscriptionCanceled);
            }
            if record.next_tier == Some(target_tier) {
                return Ok(None);
            }

            let mut next = record.clone();
            next.next_tier = Some(target_tier);
            Ok(Some(next))
        })
        .await?;

        info!(%tenant_id, target = %target_tier, effective_at = %preview.effective_at, "tier_changes: downgrade scheduled");
        Ok(preview)
    }

    pub async fn preview_tier_change(
        &self,
        tenant_id: Uuid,
        target_tier: Tier,
        now: DateTime<Utc>,
    ) -> UseCaseResult<TierChangePreviewDto> {
        let record = self.load_record(tenant_id).await?;
        if target_tier == record.current_tier {
            return Err(TierChangeError::SameTier {
                current: record.current_tier,
            });
        }

        let target_plan = self
            .plan_catalog_repository
            .find_effective_by_tier(target_tier, now)
            .await?;
        let usage = self.load_usage(&record).await?;

        Ok(build_preview(&record, &target_plan, &usage, now))
    }

    /// Rollover pass: applies scheduled downgrades and pending cancels at
    /// period end. Over-quota usage after a downgrade soft-limits the record
    /// and snapshots the offending usage; tenant data is never trimmed.
    pub async fn run_apply_due_plan_changes(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> anyhow::Result<LifecycleRunResult> {
        let candidates = self
            .subscription_repository
            .list_due_plan_changes(now, limit)
            .await?;
        let mut result = LifecycleRunResult::default();

        for entity in candidates {
            result.scanned += 1;

            let record = match entity.to_record() {
                Ok(record) => record,
                Err(err) => {
                    result.invalid += 1;
                    error!(
                        subscription_id = %entity.id,
                        tenant_id = %entity.tenant_id,
                        error = %err,
                        "tier_changes: invariant violation, record excluded until repaired"
                    );
                    continue;
                }
            };

            if record.current_period_end > now || record.status().is_terminal() {
                continue;
            }

            let next = if record.cancel_at_period_end {
                let mut next = record.clone();
                next.phase = SubscriptionPhase::Canceled { canceled_at: now };
                next.next_tier = None;
                next
            } else if let Some(target_tier) = record.next_tier {
                match self.apply_downgrade(&record, target_tier, now).await {
                    Ok(next) => next,
                    Err(err) => {
                        result.failed += 1;
                        error!(
                            subscription_id = %record.id,
                            error = %err,
                            "tier_changes: rollover failed"
                        );
                        continue;
                    }
                }
            } else {
                continue;
            };

            match self.write_rollover(&record, &next).await {
                Ok(true) => {
                    info!(
                        subscription_id = %record.id,
                        tenant_id = %record.tenant_id,
                        from_tier = %record.current_tier,
                        to_tier = %next.current_tier,
                        to_status = %next.status(),
                        soft_limited = next.soft_limited,
                        "tier_changes: rollover applied"
                    );
                    result.note_transitioned(record.id);
                }
                Ok(false) => {
                    result.conflicts += 1;
                    warn!(
                        subscription_id = %record.id,
                        "tier_changes: version conflict, rollover dropped for this tick"
                    );
                }
                Err(err) => {
                    result.failed += 1;
                    error!(
                        subscription_id = %record.id,
                        error = %err,
                        "tier_changes: rollover write failed"
                    );
                }
            }
        }

        info!(
            scanned = result.scanned,
            transitioned = result.transitioned,
            conflicts = result.conflicts,
            invalid = result.invalid,
            failed = result.failed,
            "tier_changes: apply_due_plan_changes finished"
        );

        Ok(result)
    }

    async fn apply_downgrade(
        &self,
        record: &SubscriptionRecord,
        target_tier: Tier,
        now: DateTime<Utc>,
    ) -> anyhow::Result<SubscriptionRecord> {
        let target_plan = self
            .plan_catalog_repository
            .find_effective_by_tier(target_tier, now)
            .await?;
        let usage = self
            .usage_counter_repository
            .find(record.tenant_id, &record.period_key())
            .await?
            .map(|counter| counter.to_snapshot())
            .unwrap_or_default();
        let exceeded = exceeded_dimensions(&usage, &target_plan);

        let mut next = record.clone();
        next.current_tier = target_tier;
        next.next_tier = None;
        next.current_period_start = record.current_period_end;
        next.current_period_end = record.current_period_end + self.billing_rules.billing_cycle();
        if exceeded.is_empty() {
            next.soft_limited = false;
            next.soft_limit_reason = None;
            next.soft_limit_snapshot = None;
        } else {
            next.soft_limited = true;
            next.soft_limit_reason = Some(DOWNGRADE_QUOTA_EXCEEDED_SOFT_LIMIT.to_string());
            next.soft_limit_snapshot = Some(SoftLimitSnapshot {
                captured_at: now,
                tier: target_tier,
                usage,
                exceeded,
            });
        }

        Ok(next)
    }

    async fn write_rollover(
        &self,
        record: &SubscriptionRecord,
        next: &SubscriptionRecord,
    ) -> anyhow::Result<bool> {
        let changes = SubscriptionChanges::from_record(next)?;
        self.subscription_repository
            .update_guarded(record.id, record.version, changes)
            .await
    }

    async fn transition<F>(&self, tenant_id: Uuid, rule: F) -> UseCaseResult<SubscriptionDto>
    where
        F: Fn(&SubscriptionRecord) -> UseCaseResult<Option<SubscriptionRecord>>,
    {
        for attempt in 1..=MAX_TRANSITION_ATTEMPTS {
            let record = self.load_record(tenant_id).await?;

            let Some(next) = rule(&record)? else {
                return Ok(SubscriptionDto::from(&record));
            };

            let changes =
                SubscriptionChanges::from_record(&next).map_err(TierChangeError::Internal)?;
            let updated = self
                .subscription_repository
                .update_guarded(record.id, record.version, changes)
                .await?;

            if updated {
                info!(
                    %tenant_id,
                    subscription_id = %record.id,
                    tier = %next.current_tier,
                    next_tier = ?next.next_tier,
                    "tier_changes: change applied"
                );
                return Ok(SubscriptionDto::from(&next));
            }

            warn!(%tenant_id, attempt, "tier_changes: version conflict, reloading");
        }

        Err(TierChangeError::VersionConflict)
    }
}
