use std::sync::Arc;

use chrono::{DateTime, Utc};
use crates::domain::{
    entities::{plans::PlanCatalogEntry, usage_counters::UpsertUsageCounterEntity},
    repositories::{
        plans::PlanCatalogRepository, subscriptions::SubscriptionRepository,
        usage_counters::UsageCounterRepository,
    },
    value_objects::{
        entitlements::{
            Capability, CapabilityDecision, DenyCode, Entitlements, QuotaDimension, QuotaUsage,
            UsageSnapshot,
        },
        enums::subscription_statuses::SubscriptionStatus,
        plans::PlanDto,
        subscriptions::SubscriptionRecord,
    },
};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EntitlementError {
    #[error("subscription not found")]
    SubscriptionNotFound,
    #[error("usage increment must be positive, got {0}")]
    InvalidAmount(i64),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EntitlementError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            EntitlementError::SubscriptionNotFound => StatusCode::NOT_FOUND,
            EntitlementError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
            EntitlementError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, EntitlementError>;

/// Resolves the effective quotas for a plan against the period's usage.
/// Pure; safe to call on every request.
pub fn resolve(plan: &PlanCatalogEntry, usage: &UsageSnapshot) -> Entitlements {
    let quota =
        |dimension: QuotaDimension| QuotaUsage::new(plan.quotas.limit(dimension), usage.used(dimension));

    Entitlements {
        tier: plan.tier,
        orders: quota(QuotaDimension::Orders),
        api_calls: quota(QuotaDimension::ApiCalls),
        storage_mb: quota(QuotaDimension::StorageMb),
        plugins: quota(QuotaDimension::Plugins),
        branches: quota(QuotaDimension::Branches),
        admin_users: quota(QuotaDimension::AdminUsers),
    }
}

/// The authorization decision table. Deny is an expected outcome and is
/// returned, never raised.
pub fn check_capability(
    record: &SubscriptionRecord,
    entitlements: &Entitlements,
    capability: Capability,
) -> CapabilityDecision {
    match record.status() {
        SubscriptionStatus::Canceled => {
            if capability.is_mutating() {
                CapabilityDecision::deny(DenyCode::SubscriptionCanceled, None)
            } else {
                CapabilityDecision::Allow
            }
        }
        SubscriptionStatus::Restricted => {
            if record.restricted_mode_variant.allows(capability) {
                CapabilityDecision::Allow
            } else {
                CapabilityDecision::deny(DenyCode::SubscriptionRestricted, None)
            }
        }
        // Delinquency preserves full functionality until restriction kicks in.
        SubscriptionStatus::Grace | SubscriptionStatus::PastDue => CapabilityDecision::Allow,
        SubscriptionStatus::TrialActive | SubscriptionStatus::ActivePaid => {
            match capability.quota_dimension() {
                Some(dimension) => {
                    let quota = entitlements.dimension(dimension);
                    // A soft-limited dimension carries its captured over-limit
                    // usage as the floor, so the fresh period counter alone
                    // cannot reopen it.
                    let used = match record.soft_limit_excess(dimension) {
                        Some(excess) => quota.used.max(excess.used),
                        None => quota.used,
                    };
                    if used >= quota.limit {
                        CapabilityDecision::deny(DenyCode::QuotaExceeded, Some(dimension))
                    } else {
                        CapabilityDecision::Allow
                    }
                }
                None => CapabilityDecision::Allow,
            }
        }
    }
}

pub struct EntitlementUseCase<S, P, U>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanCatalogRepository + Send + Sync + 'static,
    U: UsageCounterRepository + Send + Sync + 'static,
{
    subscription_repository: Arc<S>,
    plan_catalog_repository: Arc<P>,
    usage_counter_repository: Arc<U>,
}

impl<S, P, U> EntitlementUseCase<S, P, U>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanCatalogRepository + Send + Sync + 'static,
    U: UsageCounterRepository + Send + Sync + 'static,
{
    pub fn new(
        subscription_repository: Arc<S>,
        plan_catalog_repository: Arc<P>,
        usage_counter_repository: Arc<U>,
    ) -> Self {
        Self {
            subscription_repository,
            plan_catalog_repository,
            usage_counter_repository,
        }
    }

    async fn load_record(&self, tenant_id: Uuid) -> UseCaseResult<SubscriptionRecord> {
        let entity = self
            .subscription_repository
            .find_by_tenant_id(tenant_id)
            .await?
            .ok_or(EntitlementError::SubscriptionNotFound)?;

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

    pub async fn get_entitlements(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> UseCaseResult<Entitlements> {
        let (_, entitlements) = self.resolve_for_tenant(tenant_id, now).await?;
        Ok(entitlements)
    }

    /// Gate entry point: resolves the tenant's state and runs the decision
    /// table.
    pub async fn check(
        &self,
        tenant_id: Uuid,
        capability: Capability,
        now: DateTime<Utc>,
    ) -> UseCaseResult<CapabilityDecision> {
        let (record, entitlements) = self.resolve_for_tenant(tenant_id, now).await?;
        let decision = check_capability(&record, &entitlements, capability);

        if let CapabilityDecision::Deny { code, .. } = decision {
            info!(%tenant_id, %capability, %code, "entitlements: capability denied");
        }

        Ok(decision)
    }

    async fn resolve_for_tenant(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> UseCaseResult<(SubscriptionRecord, Entitlements)> {
        let record = self.load_record(tenant_id).await?;
        let plan = self
            .plan_catalog_repository
            .find_effective_by_tier(record.current_tier, now)
            .await?;
        let usage = self.load_usage(&record).await?;
        let entitlements = resolve(&plan, &usage);

        Ok((record, entitlements))
    }

    pub async fn list_plans(&self, now: DateTime<Utc>) -> UseCaseResult<Vec<PlanDto>> {
        let plans = self.plan_catalog_repository.list_effective(now).await?;
        Ok(plans.iter().map(PlanDto::from).collect())
    }

    /// Collaborator side-effect path: bumps the period counter after a
    /// successful domain write.
    pub async fn record_usage(
        &self,
        tenant_id: Uuid,
        dimension: QuotaDimension,
        amount: i64,
    ) -> UseCaseResult<()> {
        if amount <= 0 {
            return Err(EntitlementError::InvalidAmount(amount));
        }

        let record = self.load_record(tenant_id).await?;
        self.usage_counter_repository
            .increment(tenant_id, &record.period_key(), dimension, amount)
            .await?;

        Ok(())
    }

    /// Administrative reconciliation. Overwrites the counter row wholesale,
    /// which nothing else is allowed to do.
    pub async fn reconcile_usage(&self, entity: UpsertUsageCounterEntity) -> UseCaseResult<()> {
        warn!(
            tenant_id = %entity.tenant_id,
            period_key = %entity.period_key,
            "entitlements: administrative usage reconciliation"
        );
        self.usage_counter_repository.reconcile(entity).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crates::domain::{
        repositories::{
            plans::MockPlanCatalogRepository, subscriptions::MockSubscriptionRepository,
            usage_counters::MockUsageCounterRepository,
        },
        value_objects::{
            entitlements::QuotaLimits,
            enums::{restricted_mode_variants::RestrictedModeVariant, tiers::Tier},
            subscriptions::{
                DOWNGRADE_QUOTA_EXCEEDED_SOFT_LIMIT, ExceededDimension, SoftLimitSnapshot,
                SubscriptionPhase,
            },
        },
    };

    fn sample_record(phase: SubscriptionPhase) -> SubscriptionRecord {
        let now = Utc::now();
        SubscriptionRecord {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            phase,
            current_tier: Tier::C1,
            next_tier: None,
            current_period_start: now - Duration::days(10),
            current_period_end: now + Duration::days(20),
            last_payment_at: None,
            cancel_at_period_end: false,
            soft_limited: false,
            soft_limit_reason: None,
            soft_limit_snapshot: None,
            restricted_mode_variant: RestrictedModeVariant::CatalogOnly,
            version: 1,
        }
    }

    fn sample_plan(tier: Tier) -> PlanCatalogEntry {
        PlanCatalogEntry {
            id: Uuid::new_v4(),
            tier,
            quotas: QuotaLimits {
                orders_per_month: 100,
                api_calls_per_month: 10_000,
                storage_mb: 512,
                plugins_max: 3,
                branches_max: 1,
                admin_users_max: 2,
            },
            monthly_price_minor: 900,
            currency: "USD".to_string(),
            effective_from: Utc::now() - Duration::days(365),
            effective_to: None,
        }
    }

    fn sample_entitlements(orders_used: i64) -> Entitlements {
        let usage = UsageSnapshot {
            orders: orders_used,
            ..Default::default()
        };
        resolve(&sample_plan(Tier::C1), &usage)
    }

    #[test]
    fn resolve_reports_uncapped_percentage() {
        let usage = UsageSnapshot {
            orders: 120,
            ..Default::default()
        };
        let entitlements = resolve(&sample_plan(Tier::C1), &usage);

        assert_eq!(entitlements.orders.limit, 100);
        assert_eq!(entitlements.orders.used, 120);
        assert!((entitlements.orders.usage_percentage - 120.0).abs() < f64::EPSILON);
    }

    #[test]
    fn active_paid_under_limit_allows() {
        let record = sample_record(SubscriptionPhase::ActivePaid {
            last_payment_at: Utc::now(),
        });
        let decision = check_capability(&record, &sample_entitlements(50), Capability::OrderCreate);

        assert!(decision.is_allowed());
    }

    #[test]
    fn exhausted_quota_denies_only_that_dimension() {
        let record = sample_record(SubscriptionPhase::ActivePaid {
            last_payment_at: Utc::now(),
        });
        let entitlements = sample_entitlements(100);

        let orders = check_capability(&record, &entitlements, Capability::OrderCreate);
        let api = check_capability(&record, &entitlements, Capability::ApiCall);

        assert_eq!(
            orders,
            CapabilityDecision::deny(DenyCode::QuotaExceeded, Some(QuotaDimension::Orders))
        );
        assert!(api.is_allowed());
    }

    #[test]
    fn grace_and_past_due_preserve_full_capability() {
        let entitlements = sample_entitlements(100);
        let grace = sample_record(SubscriptionPhase::Grace {
            grace_end_at: Utc::now(),
        });
        let past_due = sample_record(SubscriptionPhase::PastDue);

        assert!(check_capability(&grace, &entitlements, Capability::OrderCreate).is_allowed());
        assert!(check_capability(&past_due, &entitlements, Capability::PluginInstall).is_allowed());
    }

    #[test]
    fn restricted_catalog_only_denies_order_creation_but_allows_reads() {
        let record = sample_record(SubscriptionPhase::Restricted);
        let entitlements = sample_entitlements(0);

        let write = check_capability(&record, &entitlements, Capability::CatalogWrite);
        let read = check_capability(&record, &entitlements, Capability::CatalogRead);
        let order = check_capability(&record, &entitlements, Capability::OrderCreate);

        assert!(write.is_allowed());
        assert!(read.is_allowed());
        assert_eq!(
            order,
            CapabilityDecision::deny(DenyCode::SubscriptionRestricted, None)
        );
    }

    #[test]
    fn restricted_allow_basic_sales_permits_order_creation() {
        let mut record = sample_record(SubscriptionPhase::Restricted);
        record.restricted_mode_variant = RestrictedModeVariant::AllowBasicSales;
        let entitlements = sample_entitlements(0);

        assert!(check_capability(&record, &entitlements, Capability::OrderCreate).is_allowed());
        assert_eq!(
            check_capability(&record, &entitlements, Capability::PluginInstall),
            CapabilityDecision::deny(DenyCode::SubscriptionRestricted, None)
        );
    }

    #[test]
    fn soft_limited_dimension_denies_despite_fresh_period_counter() {
        let now = Utc::now();
        let mut record = sample_record(SubscriptionPhase::ActivePaid {
            last_payment_at: now,
        });
        record.soft_limited = true;
        record.soft_limit_reason = Some(DOWNGRADE_QUOTA_EXCEEDED_SOFT_LIMIT.to_string());
        record.soft_limit_snapshot = Some(SoftLimitSnapshot {
            captured_at: now,
            tier: Tier::C1,
            usage: UsageSnapshot {
                orders: 150,
                ..Default::default()
            },
            exceeded: vec![ExceededDimension {
                dimension: QuotaDimension::Orders,
                used: 150,
                limit: 100,
            }],
        });
        // The rolled-over period starts with an empty counter.
        let entitlements = sample_entitlements(0);

        let orders = check_capability(&record, &entitlements, Capability::OrderCreate);
        let api = check_capability(&record, &entitlements, Capability::ApiCall);

        assert_eq!(
            orders,
            CapabilityDecision::deny(DenyCode::QuotaExceeded, Some(QuotaDimension::Orders))
        );
        assert!(api.is_allowed());
    }

    #[test]
    fn canceled_denies_mutations_but_keeps_reads() {
        let record = sample_record(SubscriptionPhase::Canceled {
            canceled_at: Utc::now(),
        });
        let entitlements = sample_entitlements(0);

        assert_eq!(
            check_capability(&record, &entitlements, Capability::CatalogWrite),
            CapabilityDecision::deny(DenyCode::SubscriptionCanceled, None)
        );
        assert!(check_capability(&record, &entitlements, Capability::CatalogRead).is_allowed());
    }

    fn entity_for(record: &SubscriptionRecord) -> crates::domain::entities::subscriptions::SubscriptionEntity {
        use crates::domain::entities::subscriptions::SubscriptionEntity;

        let (trial_end_at, grace_end_at, canceled_at, last_payment_at) = match record.phase {
            SubscriptionPhase::TrialActive { trial_end_at } => (Some(trial_end_at), None, None, None),
            SubscriptionPhase::ActivePaid { last_payment_at } => {
                (None, None, None, Some(last_payment_at))
            }
            SubscriptionPhase::Grace { grace_end_at } => (None, Some(grace_end_at), None, None),
            SubscriptionPhase::Canceled { canceled_at } => (None, None, Some(canceled_at), None),
            _ => (None, None, None, None),
        };

        SubscriptionEntity {
            id: record.id,
            tenant_id: record.tenant_id,
            status: record.status().to_string(),
            current_tier: record.current_tier.to_string(),
            next_tier: None,
            current_period_start: record.current_period_start,
            current_period_end: record.current_period_end,
            trial_end_at,
            grace_end_at,
            last_payment_at,
            canceled_at,
            cancel_at_period_end: false,
            soft_limited: false,
            soft_limit_reason: None,
            soft_limit_snapshot: None,
            restricted_mode_variant: record.restricted_mode_variant.to_string(),
            version: record.version,
            created_at: record.current_period_start,
        }
    }

    #[tokio::test]
    async fn get_entitlements_defaults_usage_when_no_counter_row() {
        let record = sample_record(SubscriptionPhase::ActivePaid {
            last_payment_at: Utc::now(),
        });
        let tenant_id = record.tenant_id;
        let entity = entity_for(&record);

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_by_tenant_id()
            .with(mockall::predicate::eq(tenant_id))
            .returning(move |_| {
                let entity = entity.clone();
                Box::pin(async move { Ok(Some(entity)) })
            });

        let mut plan_repo = MockPlanCatalogRepository::new();
        plan_repo
            .expect_find_effective_by_tier()
            .returning(|tier, _| Box::pin(async move { Ok(sample_plan(tier)) }));

        let mut usage_repo = MockUsageCounterRepository::new();
        usage_repo
            .expect_find()
            .returning(|_, _| Box::pin(async { Ok(None) }));

        let use_case = EntitlementUseCase::new(
            Arc::new(subscription_repo),
            Arc::new(plan_repo),
            Arc::new(usage_repo),
        );

        let entitlements = use_case
            .get_entitlements(tenant_id, Utc::now())
            .await
            .unwrap();

        assert_eq!(entitlements.tier, Tier::C1);
        assert_eq!(entitlements.orders.used, 0);
        assert_eq!(entitlements.orders.limit, 100);
    }

    #[tokio::test]
    async fn record_usage_increments_current_period_counter() {
        let record = sample_record(SubscriptionPhase::ActivePaid {
            last_payment_at: Utc::now(),
        });
        let tenant_id = record.tenant_id;
        let period_key = record.period_key();
        let entity = entity_for(&record);

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo.expect_find_by_tenant_id().returning(move |_| {
            let entity = entity.clone();
            Box::pin(async move { Ok(Some(entity)) })
        });

        let mut usage_repo = MockUsageCounterRepository::new();
        usage_repo
            .expect_increment()
            .withf(move |id, key, dimension, amount| {
                *id == tenant_id
                    && key == period_key
                    && *dimension == QuotaDimension::Orders
                    && *amount == 1
            })
            .times(1)
            .returning(|_, _, _, _| Box::pin(async { Ok(()) }));

        let use_case = EntitlementUseCase::new(
            Arc::new(subscription_repo),
            Arc::new(MockPlanCatalogRepository::new()),
            Arc::new(usage_repo),
        );

        use_case
            .record_usage(tenant_id, QuotaDimension::Orders, 1)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn record_usage_rejects_non_positive_amount() {
        let use_case = EntitlementUseCase::new(
            Arc::new(MockSubscriptionRepository::new()),
            Arc::new(MockPlanCatalogRepository::new()),
            Arc::new(MockUsageCounterRepository::new()),
        );

        let err = use_case
            .record_usage(Uuid::new_v4(), QuotaDimension::Orders, 0)
            .await
            .unwrap_err();

        assert!(matches!(err, EntitlementError::InvalidAmount(0)));
    }

    #[tokio::test]
    async fn missing_subscription_maps_to_not_found() {
        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_by_tenant_id()
            .returning(|_| Box::pin(async { Ok(None) }));

        let use_case = EntitlementUseCase::new(
            Arc::new(subscription_repo),
            Arc::new(MockPlanCatalogRepository::new()),
            Arc::new(MockUsageCounterRepository::new()),
        );

        let err = use_case
            .get_entitlements(Uuid::new_v4(), Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, EntitlementError::SubscriptionNotFound));
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
    }
}
