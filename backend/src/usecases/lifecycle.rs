use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use crates::domain::{
    entities::subscriptions::{SubscriptionChanges, SubscriptionEntity},
    repositories::subscriptions::SubscriptionRepository,
    value_objects::subscriptions::{SubscriptionPhase, SubscriptionRecord},
};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Ids are reported for operator convenience; passes over large backlogs cap
/// the list instead of flooding the log.
const MAX_REPORTED_IDS: usize = 20;

/// Aggregate outcome of one scan-and-transition pass. Per-record failures are
/// counted, never propagated, so one bad record cannot stall the backlog.
#[derive(Debug, Default, Clone, Serialize)]
pub struct LifecycleRunResult {
    pub scanned: u64,
    pub transitioned: u64,
    pub conflicts: u64,
    pub invalid: u64,
    pub failed: u64,
    pub transitioned_ids: Vec<Uuid>,
}

impl LifecycleRunResult {
    pub(crate) fn note_transitioned(&mut self, id: Uuid) {
        self.transitioned += 1;
        if self.transitioned_ids.len() < MAX_REPORTED_IDS {
            self.transitioned_ids.push(id);
        }
    }
}

/// Trial deadline passed: the tenant enters grace with a fresh grace window.
pub fn trial_expiry_transition(
    record: &SubscriptionRecord,
    now: DateTime<Utc>,
    grace_length: Duration,
) -> Option<SubscriptionRecord> {
    match record.phase {
        SubscriptionPhase::TrialActive { trial_end_at } if trial_end_at <= now => {
            let mut next = record.clone();
            next.phase = SubscriptionPhase::Grace {
                grace_end_at: now + grace_length,
            };
            Some(next)
        }
        _ => None,
    }
}

/// Grace deadline passed without a payment: the tenant is restricted. Gating
/// flags flip; tenant data is never touched.
pub fn grace_expiry_transition(
    record: &SubscriptionRecord,
    now: DateTime<Utc>,
) -> Option<SubscriptionRecord> {
    match record.phase {
        SubscriptionPhase::Grace { grace_end_at } if grace_end_at <= now => {
            let mut next = record.clone();
            next.phase = SubscriptionPhase::Restricted;
            Some(next)
        }
        _ => None,
    }
}

/// One hop of the delinquency chain: a lapsed paid period becomes past due,
/// and an already past-due record enters grace on the following pass.
pub fn past_due_transition(
    record: &SubscriptionRecord,
    now: DateTime<Utc>,
    grace_length: Duration,
) -> Option<SubscriptionRecord> {
    match record.phase {
        SubscriptionPhase::ActivePaid { .. } if record.current_period_end <= now => {
            let mut next = record.clone();
            next.phase = SubscriptionPhase::PastDue;
            Some(next)
        }
        SubscriptionPhase::PastDue => {
            let mut next = record.clone();
            next.phase = SubscriptionPhase::Grace {
                grace_end_at: now + grace_length,
            };
            Some(next)
        }
        _ => None,
    }
}

pub struct LifecycleUseCase<S>
where
    S: SubscriptionRepository + Send + Sync + 'static,
{
    subscription_repository: Arc<S>,
    grace_length: Duration,
}

impl<S> LifecycleUseCase<S>
where
    S: SubscriptionRepository + Send + Sync + 'static,
{
    pub fn new(subscription_repository: Arc<S>, grace_length: Duration) -> Self {
        Self {
            subscription_repository,
            grace_length,
        }
    }

    pub async fn run_trial_expirer(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> anyhow::Result<LifecycleRunResult> {
        let candidates = self
            .subscription_repository
            .list_trial_expired(now, limit)
            .await?;
        let grace_length = self.grace_length;
        let result = self
            .run_pass("trial_expirer", candidates, |record| {
                trial_expiry_transition(record, now, grace_length)
            })
            .await;

        Ok(result)
    }

    pub async fn run_grace_expirer(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> anyhow::Result<LifecycleRunResult> {
        let candidates = self
            .subscription_repository
            .list_grace_expired(now, limit)
            .await?;
        let result = self
            .run_pass("grace_expirer", candidates, |record| {
                grace_expiry_transition(record, now)
            })
            .await;

        Ok(result)
    }

    pub async fn run_past_due_handler(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> anyhow::Result<LifecycleRunResult> {
        let candidates = self
            .subscription_repository
            .list_past_due_candidates(now, limit)
            .await?;
        let grace_length = self.grace_length;
        let result = self
            .run_pass("past_due_handler", candidates, |record| {
                past_due_transition(record, now, grace_length)
            })
            .await;

        Ok(result)
    }

    /// Thin runner over a pure transition rule: load, re-validate the guard,
    /// write under the version check, count the outcome.
    async fn run_pass<F>(
        &self,
        pass: &str,
        candidates: Vec<SubscriptionEntity>,
        transition: F,
    ) -> LifecycleRunResult
    where
        F: Fn(&SubscriptionRecord) -> Option<SubscriptionRecord>,
    {
        let mut result = LifecycleRunResult::default();

        for entity in candidates {
            result.scanned += 1;

            let record = match entity.to_record() {
                Ok(record) => record,
                Err(err) => {
                    result.invalid += 1;
                    error!(
                        pass,
                        subscription_id = %entity.id,
                        tenant_id = %entity.tenant_id,
                        error = %err,
                        "lifecycle: invariant violation, record excluded until repaired"
                    );
                    continue;
                }
            };

            // Guard re-validation: a record transitioned by a concurrent
            // invocation since the scan simply no longer matches.
            let Some(next) = transition(&record) else {
                continue;
            };

            let changes = match SubscriptionChanges::from_record(&next) {
                Ok(changes) => changes,
                Err(err) => {
                    result.failed += 1;
                    error!(
                        pass,
                        subscription_id = %record.id,
                        error = %err,
                        "lifecycle: failed to build transition write set"
                    );
                    continue;
                }
            };

            match self
                .subscription_repository
                .update_guarded(record.id, record.version, changes)
                .await
            {
                Ok(true) => {
                    info!(
                        pass,
                        subscription_id = %record.id,
                        tenant_id = %record.tenant_id,
                        from = %record.status(),
                        to = %next.status(),
                        "lifecycle: transitioned"
                    );
                    result.note_transitioned(record.id);
                }
                Ok(false) => {
                    result.conflicts += 1;
                    warn!(
                        pass,
                        subscription_id = %record.id,
                        "lifecycle: version conflict, transition dropped for this tick"
                    );
                }
                Err(err) => {
                    result.failed += 1;
                    error!(
                        pass,
                        subscription_id = %record.id,
                        error = %err,
                        "lifecycle: transition write failed"
                    );
                }
            }
        }

        info!(
            pass,
            scanned = result.scanned,
            transitioned = result.transitioned,
            conflicts = result.conflicts,
            invalid = result.invalid,
            failed = result.failed,
            "lifecycle: pass finished"
        );

        result
    }
}
