use std::sync::Arc;

use chrono::{DateTime, Utc};
use crates::domain::{
    entities::subscriptions::{InsertSubscriptionEntity, SubscriptionChanges},
    repositories::subscriptions::SubscriptionRepository,
    value_objects::{
        enums::restricted_mode_variants::RestrictedModeVariant,
        subscriptions::{SubscriptionDto, SubscriptionPhase, SubscriptionRecord},
    },
};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::config_model::BillingRules;

/// A writer that keeps losing the version race this many times in a row gives
/// up and reports the conflict.
const MAX_TRANSITION_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("subscription not found")]
    SubscriptionNotFound,
    #[error("subscription is canceled")]
    SubscriptionCanceled,
    #[error("transition lost a concurrent update race")]
    VersionConflict,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SubscriptionError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            SubscriptionError::SubscriptionNotFound => StatusCode::NOT_FOUND,
            SubscriptionError::SubscriptionCanceled | SubscriptionError::VersionConflict => {
                StatusCode::CONFLICT
            }
            SubscriptionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, SubscriptionError>;

pub struct SubscriptionUseCase<S>
where
    S: SubscriptionRepository + Send + Sync + 'static,
{
    subscription_repository: Arc<S>,
    billing_rules: BillingRules,
}

impl<S> SubscriptionUseCase<S>
where
    S: SubscriptionRepository + Send + Sync + 'static,
{
    pub fn new(subscription_repository: Arc<S>, billing_rules: BillingRules) -> Self {
        Self {
            subscription_repository,
            billing_rules,
        }
    }

    async fn load_record(&self, tenant_id: Uuid) -> UseCaseResult<SubscriptionRecord> {
        let entity = self
            .subscription_repository
            .find_by_tenant_id(tenant_id)
            .await?
            .ok_or(SubscriptionError::SubscriptionNotFound)?;

        Ok(entity.to_record()?)
    }

    /// Tenant provisioning hook. Idempotent: a tenant that already has a
    /// subscription gets it back unchanged.
    pub async fn provision_trial(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> UseCaseResult<SubscriptionDto> {
        if let Some(existing) = self
            .subscription_repository
            .find_by_tenant_id(tenant_id)
            .await?
        {
            info!(%tenant_id, "subscriptions: already provisioned");
            return Ok(SubscriptionDto::from(&existing.to_record()?));
        }

        let trial_end_at = now + self.billing_rules.trial_length();
        let insert_entity = InsertSubscriptionEntity {
            tenant_id,
            status: "trial_active".to_string(),
            current_tier: self.billing_rules.default_tier.to_string(),
            current_period_start: now,
            current_period_end: trial_end_at,
            trial_end_at: Some(trial_end_at),
            restricted_mode_variant: RestrictedModeVariant::default().to_string(),
        };
        let id = self.subscription_repository.create(insert_entity).await?;
        info!(%tenant_id, subscription_id = %id, tier = %self.billing_rules.default_tier, "subscriptions: trial provisioned");

        let record = self.load_record(tenant_id).await?;
        Ok(SubscriptionDto::from(&record))
    }

    pub async fn get_subscription(&self, tenant_id: Uuid) -> UseCaseResult<SubscriptionDto> {
        let record = self.load_record(tenant_id).await?;
        Ok(SubscriptionDto::from(&record))
    }

    /// Pre-verified payment signal. Any non-terminal status becomes paid with
    /// a fresh billing period; stale duplicates are a no-op.
    pub async fn record_payment_succeeded(
        &self,
        tenant_id: Uuid,
        at: DateTime<Utc>,
    ) -> UseCaseResult<SubscriptionDto> {
        self.transition(tenant_id, |record| {
            if let SubscriptionPhase::Canceled { .. } = record.phase {
                return Err(SubscriptionError::SubscriptionCanceled);
            }

            // The record-level payment timestamp survives the delinquency
            // phases, so a replayed webhook carrying an already-processed
            // payment cannot re-activate or rewind the period from GRACE or
            // RESTRICTED either.
            if let Some(last_payment_at) = record.last_payment_at {
                if at <= last_payment_at {
                    return Ok(None);
                }
            }

            let mut next = record.clone();
            next.phase = SubscriptionPhase::ActivePaid {
                last_payment_at: at,
            };
            next.last_payment_at = Some(at);
            next.current_period_start = at;
            next.current_period_end = at + self.billing_rules.billing_cycle();
            Ok(Some(next))
        })
        .await
    }

    /// Payment failure only matters for a currently-paid tenant; the past-due
    /// handler then walks the delinquency chain on its own cadence.
    pub async fn record_payment_failed(
        &self,
        tenant_id: Uuid,
        at: DateTime<Utc>,
    ) -> UseCaseResult<SubscriptionDto> {
        self.transition(tenant_id, |record| {
            match record.phase {
                SubscriptionPhase::Canceled { .. } => Err(SubscriptionError::SubscriptionCanceled),
                SubscriptionPhase::ActivePaid { .. } => {
                    let mut next = record.clone();
                    next.phase = SubscriptionPhase::PastDue;
                    Ok(Some(next))
                }
                _ => {
                    info!(%tenant_id, at = %at, status = %record.status(), "subscriptions: payment failure on non-paid status ignored");
                    Ok(None)
                }
            }
        })
        .await
    }

    /// Administrative/tenant cancel. `at_period_end` flags the record for the
    /// rollover pass; otherwise the subscription terminates immediately.
    pub async fn cancel(
        &self,
        tenant_id: Uuid,
        at_period_end: bool,
        now: DateTime<Utc>,
    ) -> UseCaseResult<SubscriptionDto> {
        self.transition(tenant_id, |record| {
            if let SubscriptionPhase::Canceled { .. } = record.phase {
                return Ok(None);
            }

            let mut next = record.clone();
            if at_period_end {
                if record.cancel_at_period_end {
                    return Ok(None);
                }
                next.cancel_at_period_end = true;
            } else {
                next.phase = SubscriptionPhase::Canceled { canceled_at: now };
                next.next_tier = None;
            }
            Ok(Some(next))
        })
        .await
    }

    /// Read-validate-write under the version guard, retried a few times when
    /// a concurrent writer wins. `Ok(None)` from the rule means the record is
    /// already in the requested state.
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
                SubscriptionChanges::from_record(&next).map_err(SubscriptionError::Internal)?;
            let updated = self
                .subscription_repository
                .update_guarded(record.id, record.version, changes)
                .await?;

            if updated {
                info!(
                    %tenant_id,
                    subscription_id = %record.id,
                    from = %record.status(),
                    to = %next.status(),
                    "subscriptions: transition applied"
                );
                return Ok(SubscriptionDto::from(&next));
            }

            warn!(%tenant_id, attempt, "subscriptions: version conflict, reloading");
        }

        Err(SubscriptionError::VersionConflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crates::domain::{
        entities::subscriptions::SubscriptionEntity,
        repositories::subscriptions::MockSubscriptionRepository,
        value_objects::enums::{subscription_statuses::SubscriptionStatus, tiers::Tier},
    };
    use mockall::predicate::eq;

    fn billing_rules() -> BillingRules {
        BillingRules {
            trial_days: 14,
            grace_days: 7,
            billing_cycle_days: 30,
            default_tier: Tier::C1,
            scheduler_batch_limit: 200,
        }
    }

    fn trial_entity(tenant_id: Uuid, now: DateTime<Utc>) -> SubscriptionEntity {
        SubscriptionEntity {
            id: Uuid::new_v4(),
            tenant_id,
            status: "trial_active".to_string(),
            current_tier: "C1".to_string(),
            next_tier: None,
            current_period_start: now,
            current_period_end: now + Duration::days(14),
            trial_end_at: Some(now + Duration::days(14)),
            grace_end_at: None,
            last_payment_at: None,
            canceled_at: None,
            cancel_at_period_end: false,
            soft_limited: false,
            soft_limit_reason: None,
            soft_limit_snapshot: None,
            restricted_mode_variant: "catalog_only".to_string(),
            version: 1,
            created_at: now,
        }
    }

    fn paid_entity(tenant_id: Uuid, now: DateTime<Utc>) -> SubscriptionEntity {
        let mut entity = trial_entity(tenant_id, now);
        entity.status = "active_paid".to_string();
        entity.trial_end_at = None;
        entity.last_payment_at = Some(now - Duration::days(1));
        entity
    }

    #[tokio::test]
    async fn provision_trial_creates_record_with_trial_deadline() {
        let tenant_id = Uuid::new_v4();
        let now = Utc::now();
        let created = trial_entity(tenant_id, now);
        let subscription_id = created.id;

        let mut repo = MockSubscriptionRepository::new();
        let mut seq = mockall::Sequence::new();
        repo.expect_find_by_tenant_id()
            .with(eq(tenant_id))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Box::pin(async { Ok(None) }));
        repo.expect_create()
            .withf(move |insert| {
                insert.tenant_id == tenant_id
                    && insert.status == "trial_active"
                    && insert.current_tier == "C1"
                    && insert.trial_end_at == Some(insert.current_period_end)
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Box::pin(async move { Ok(subscription_id) }));
        repo.expect_find_by_tenant_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| {
                let created = created.clone();
                Box::pin(async move { Ok(Some(created)) })
            });

        let use_case = SubscriptionUseCase::new(Arc::new(repo), billing_rules());
        let dto = use_case.provision_trial(tenant_id, now).await.unwrap();

        assert_eq!(dto.status, SubscriptionStatus::TrialActive);
        assert_eq!(dto.current_tier, Tier::C1);
        assert!(dto.trial_end_at.is_some());
    }

    #[tokio::test]
    async fn provision_trial_is_idempotent() {
        let tenant_id = Uuid::new_v4();
        let now = Utc::now();
        let existing = trial_entity(tenant_id, now);

        let mut repo = MockSubscriptionRepository::new();
        repo.expect_find_by_tenant_id().returning(move |_| {
            let existing = existing.clone();
            Box::pin(async move { Ok(Some(existing)) })
        });
        repo.expect_create().never();

        let use_case = SubscriptionUseCase::new(Arc::new(repo), billing_rules());
        let dto = use_case.provision_trial(tenant_id, now).await.unwrap();

        assert_eq!(dto.status, SubscriptionStatus::TrialActive);
    }

    #[tokio::test]
    async fn payment_succeeded_moves_trial_to_paid_with_new_period() {
        let tenant_id = Uuid::new_v4();
        let now = Utc::now();
        let entity = trial_entity(tenant_id, now - Duration::days(10));

        let mut repo = MockSubscriptionRepository::new();
        repo.expect_find_by_tenant_id().returning(move |_| {
            let entity = entity.clone();
            Box::pin(async move { Ok(Some(entity)) })
        });
        repo.expect_update_guarded()
            .withf(move |_, expected_version, changes| {
                *expected_version == 1
                    && changes.status == "active_paid"
                    && changes.trial_end_at.is_none()
                    && changes.last_payment_at == Some(now)
                    && changes.current_period_start == now
            })
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(true) }));

        let use_case = SubscriptionUseCase::new(Arc::new(repo), billing_rules());
        let dto = use_case
            .record_payment_succeeded(tenant_id, now)
            .await
            .unwrap();

        assert_eq!(dto.status, SubscriptionStatus::ActivePaid);
        assert_eq!(dto.current_period_end, now + Duration::days(30));
        assert!(dto.trial_end_at.is_none());
    }

    #[tokio::test]
    async fn stale_payment_signal_is_a_no_op() {
        let tenant_id = Uuid::new_v4();
        let now = Utc::now();
        let entity = paid_entity(tenant_id, now);

        let mut repo = MockSubscriptionRepository::new();
        repo.expect_find_by_tenant_id().returning(move |_| {
            let entity = entity.clone();
            Box::pin(async move { Ok(Some(entity)) })
        });
        repo.expect_update_guarded().never();

        let use_case = SubscriptionUseCase::new(Arc::new(repo), billing_rules());
        let dto = use_case
            .record_payment_succeeded(tenant_id, now - Duration::days(2))
            .await
            .unwrap();

        assert_eq!(dto.status, SubscriptionStatus::ActivePaid);
    }

    fn grace_entity(tenant_id: Uuid, now: DateTime<Utc>) -> SubscriptionEntity {
        let mut entity = trial_entity(tenant_id, now);
        entity.status = "grace".to_string();
        entity.trial_end_at = None;
        entity.grace_end_at = Some(now + Duration::days(3));
        entity.last_payment_at = Some(now - Duration::days(70));
        entity.current_period_start = now - Duration::days(100);
        entity.current_period_end = now - Duration::days(10);
        entity
    }

    #[tokio::test]
    async fn stale_replay_in_grace_never_rewinds_the_period() {
        let tenant_id = Uuid::new_v4();
        let now = Utc::now();
        let entity = grace_entity(tenant_id, now);
        let period_end = entity.current_period_end;

        let mut repo = MockSubscriptionRepository::new();
        repo.expect_find_by_tenant_id().returning(move |_| {
            let entity = entity.clone();
            Box::pin(async move { Ok(Some(entity)) })
        });
        repo.expect_update_guarded().never();

        let use_case = SubscriptionUseCase::new(Arc::new(repo), billing_rules());
        let dto = use_case
            .record_payment_succeeded(tenant_id, now - Duration::days(80))
            .await
            .unwrap();

        assert_eq!(dto.status, SubscriptionStatus::Grace);
        assert_eq!(dto.current_period_end, period_end);
    }

    #[tokio::test]
    async fn fresh_payment_in_grace_reactivates_with_new_period() {
        let tenant_id = Uuid::new_v4();
        let now = Utc::now();
        let entity = grace_entity(tenant_id, now);

        let mut repo = MockSubscriptionRepository::new();
        repo.expect_find_by_tenant_id().returning(move |_| {
            let entity = entity.clone();
            Box::pin(async move { Ok(Some(entity)) })
        });
        repo.expect_update_guarded()
            .withf(move |_, _, changes| {
                changes.status == "active_paid"
                    && changes.grace_end_at.is_none()
                    && changes.current_period_start == now
            })
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(true) }));

        let use_case = SubscriptionUseCase::new(Arc::new(repo), billing_rules());
        let dto = use_case
            .record_payment_succeeded(tenant_id, now)
            .await
            .unwrap();

        assert_eq!(dto.status, SubscriptionStatus::ActivePaid);
        assert_eq!(dto.current_period_end, now + Duration::days(30));
    }

    #[tokio::test]
    async fn payment_signal_on_canceled_is_a_guard_violation() {
        let tenant_id = Uuid::new_v4();
        let now = Utc::now();
        let mut entity = trial_entity(tenant_id, now);
        entity.status = "canceled".to_string();
        entity.trial_end_at = None;
        entity.canceled_at = Some(now - Duration::days(1));

        let mut repo = MockSubscriptionRepository::new();
        repo.expect_find_by_tenant_id().returning(move |_| {
            let entity = entity.clone();
            Box::pin(async move { Ok(Some(entity)) })
        });

        let use_case = SubscriptionUseCase::new(Arc::new(repo), billing_rules());
        let err = use_case
            .record_payment_succeeded(tenant_id, now)
            .await
            .unwrap_err();

        assert!(matches!(err, SubscriptionError::SubscriptionCanceled));
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn payment_failed_moves_paid_to_past_due() {
        let tenant_id = Uuid::new_v4();
        let now = Utc::now();
        let entity = paid_entity(tenant_id, now);

        let mut repo = MockSubscriptionRepository::new();
        repo.expect_find_by_tenant_id().returning(move |_| {
            let entity = entity.clone();
            Box::pin(async move { Ok(Some(entity)) })
        });
        repo.expect_update_guarded()
            .withf(|_, _, changes| changes.status == "past_due")
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(true) }));

        let use_case = SubscriptionUseCase::new(Arc::new(repo), billing_rules());
        let dto = use_case.record_payment_failed(tenant_id, now).await.unwrap();

        assert_eq!(dto.status, SubscriptionStatus::PastDue);
    }

    #[tokio::test]
    async fn payment_failed_on_trial_is_ignored() {
        let tenant_id = Uuid::new_v4();
        let now = Utc::now();
        let entity = trial_entity(tenant_id, now);

        let mut repo = MockSubscriptionRepository::new();
        repo.expect_find_by_tenant_id().returning(move |_| {
            let entity = entity.clone();
            Box::pin(async move { Ok(Some(entity)) })
        });
        repo.expect_update_guarded().never();

        let use_case = SubscriptionUseCase::new(Arc::new(repo), billing_rules());
        let dto = use_case.record_payment_failed(tenant_id, now).await.unwrap();

        assert_eq!(dto.status, SubscriptionStatus::TrialActive);
    }

    #[tokio::test]
    async fn immediate_cancel_is_terminal_and_clears_pending_change() {
        let tenant_id = Uuid::new_v4();
        let now = Utc::now();
        let mut entity = paid_entity(tenant_id, now);
        entity.next_tier = Some("C1".to_string());
        entity.current_tier = "C2".to_string();

        let mut repo = MockSubscriptionRepository::new();
        repo.expect_find_by_tenant_id().returning(move |_| {
            let entity = entity.clone();
            Box::pin(async move { Ok(Some(entity)) })
        });
        repo.expect_update_guarded()
            .withf(move |_, _, changes| {
                changes.status == "canceled"
                    && changes.canceled_at == Some(now)
                    && changes.next_tier.is_none()
            })
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(true) }));

        let use_case = SubscriptionUseCase::new(Arc::new(repo), billing_rules());
        let dto = use_case.cancel(tenant_id, false, now).await.unwrap();

        assert_eq!(dto.status, SubscriptionStatus::Canceled);
        assert!(dto.next_tier.is_none());
    }

    #[tokio::test]
    async fn cancel_at_period_end_only_flags_the_record() {
        let tenant_id = Uuid::new_v4();
        let now = Utc::now();
        let entity = paid_entity(tenant_id, now);

        let mut repo = MockSubscriptionRepository::new();
        repo.expect_find_by_tenant_id().returning(move |_| {
            let entity = entity.clone();
            Box::pin(async move { Ok(Some(entity)) })
        });
        repo.expect_update_guarded()
            .withf(|_, _, changes| changes.status == "active_paid" && changes.cancel_at_period_end)
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(true) }));

        let use_case = SubscriptionUseCase::new(Arc::new(repo), billing_rules());
        let dto = use_case.cancel(tenant_id, true, now).await.unwrap();

        assert_eq!(dto.status, SubscriptionStatus::ActivePaid);
        assert!(dto.cancel_at_period_end);
    }

    #[tokio::test]
    async fn persistent_version_conflict_surfaces_after_retries() {
        let tenant_id = Uuid::new_v4();
        let now = Utc::now();
        let entity = paid_entity(tenant_id, now);

        let mut repo = MockSubscriptionRepository::new();
        repo.expect_find_by_tenant_id().returning(move |_| {
            let entity = entity.clone();
            Box::pin(async move { Ok(Some(entity)) })
        });
        repo.expect_update_guarded()
            .times(3)
            .returning(|_, _, _| Box::pin(async { Ok(false) }));

        let use_case = SubscriptionUseCase::new(Arc::new(repo), billing_rules());
        let err = use_case.cancel(tenant_id, false, now).await.unwrap_err();

        assert!(matches!(err, SubscriptionError::VersionConflict));
    }
}
