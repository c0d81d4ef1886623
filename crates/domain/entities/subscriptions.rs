use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::{
        enums::{
            restricted_mode_variants::RestrictedModeVariant,
            subscription_statuses::SubscriptionStatus, tiers::Tier,
        },
        subscriptions::{SubscriptionPhase, SubscriptionRecord},
    },
    infra::db::postgres::schema::subscriptions,
};

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = subscriptions)]
pub struct SubscriptionEntity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub status: String,
    pub current_tier: String,
    pub next_tier: Option<String>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub trial_end_at: Option<DateTime<Utc>>,
    pub grace_end_at: Option<DateTime<Utc>>,
    pub last_payment_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub soft_limited: bool,
    pub soft_limit_reason: Option<String>,
    pub soft_limit_snapshot: Option<serde_json::Value>,
    pub restricted_mode_variant: String,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = subscriptions)]
pub struct InsertSubscriptionEntity {
    pub tenant_id: Uuid,
    pub status: String,
    pub current_tier: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub trial_end_at: Option<DateTime<Utc>>,
    pub restricted_mode_variant: String,
}

/// Full write set for a guarded transition. Every transition rewrites the
/// whole mutable state of the row, so `None` means NULL, not "leave as is".
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = subscriptions, treat_none_as_null = true)]
pub struct SubscriptionChanges {
    pub status: String,
    pub current_tier: String,
    pub next_tier: Option<String>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub trial_end_at: Option<DateTime<Utc>>,
    pub grace_end_at: Option<DateTime<Utc>>,
    pub last_payment_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub soft_limited: bool,
    pub soft_limit_reason: Option<String>,
    pub soft_limit_snapshot: Option<serde_json::Value>,
}

impl SubscriptionEntity {
    /// Validates the row into a `SubscriptionRecord`. A row whose nullable
    /// deadline columns contradict its status is an invariant violation:
    /// the error is surfaced and the row is left for manual repair, never
    /// auto-fixed by guessing.
    pub fn to_record(&self) -> Result<SubscriptionRecord> {
        let status = SubscriptionStatus::from_str(&self.status)
            .ok_or_else(|| anyhow!("unknown subscription status: {}", self.status))?;

        let phase = match status {
            SubscriptionStatus::TrialActive => SubscriptionPhase::TrialActive {
                trial_end_at: self
                    .trial_end_at
                    .ok_or_else(|| anyhow!("trial_active with null trial_end_at"))?,
            },
            SubscriptionStatus::ActivePaid => SubscriptionPhase::ActivePaid {
                last_payment_at: self
                    .last_payment_at
                    .ok_or_else(|| anyhow!("active_paid with null last_payment_at"))?,
            },
            SubscriptionStatus::PastDue => SubscriptionPhase::PastDue,
            SubscriptionStatus::Grace => SubscriptionPhase::Grace {
                grace_end_at: self
                    .grace_end_at
                    .ok_or_else(|| anyhow!("grace with null grace_end_at"))?,
            },
            SubscriptionStatus::Restricted => SubscriptionPhase::Restricted,
            SubscriptionStatus::Canceled => SubscriptionPhase::Canceled {
                canceled_at: self
                    .canceled_at
                    .ok_or_else(|| anyhow!("canceled with null canceled_at"))?,
            },
        };

        if !matches!(status, SubscriptionStatus::TrialActive) && self.trial_end_at.is_some() {
            bail!("trial_end_at set outside trial_active");
        }
        if !matches!(status, SubscriptionStatus::Grace) && self.grace_end_at.is_some() {
            bail!("grace_end_at set outside grace");
        }

        let current_tier = Tier::from_str(&self.current_tier)
            .ok_or_else(|| anyhow!("unknown tier: {}", self.current_tier))?;
        let next_tier = self
            .next_tier
            .as_deref()
            .map(|raw| Tier::from_str(raw).ok_or_else(|| anyhow!("unknown next tier: {}", raw)))
            .transpose()?;
        let restricted_mode_variant = RestrictedModeVariant::from_str(&self.restricted_mode_variant)
            .ok_or_else(|| {
                anyhow!(
                    "unknown restricted mode variant: {}",
                    self.restricted_mode_variant
                )
            })?;
        let soft_limit_snapshot = self
            .soft_limit_snapshot
            .clone()
            .map(serde_json::from_value)
            .transpose()?;

        Ok(SubscriptionRecord {
            id: self.id,
            tenant_id: self.tenant_id,
            phase,
            current_tier,
            next_tier,
            current_period_start: self.current_period_start,
            current_period_end: self.current_period_end,
            last_payment_at: self.last_payment_at,
            cancel_at_period_end: self.cancel_at_period_end,
            soft_limited: self.soft_limited,
            soft_limit_reason: self.soft_limit_reason.clone(),
            soft_limit_snapshot,
            restricted_mode_variant,
            version: self.version,
        })
    }
}

impl SubscriptionChanges {
    /// Flattens a validated record back into the column write set used by
    /// the version-guarded update.
    pub fn from_record(record: &SubscriptionRecord) -> Result<Self> {
        let (trial_end_at, grace_end_at, canceled_at) = match record.phase {
            SubscriptionPhase::TrialActive { trial_end_at } => (Some(trial_end_at), None, None),
            SubscriptionPhase::Grace { grace_end_at } => (None, Some(grace_end_at), None),
            SubscriptionPhase::Canceled { canceled_at } => (None, None, Some(canceled_at)),
            _ => (None, None, None),
        };

        let last_payment_at = match record.phase {
            SubscriptionPhase::ActivePaid { last_payment_at } => Some(last_payment_at),
            _ => record.last_payment_at,
        };

        let soft_limit_snapshot = record
            .soft_limit_snapshot
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        Ok(Self {
            status: record.status().to_string(),
            current_tier: record.current_tier.to_string(),
            next_tier: record.next_tier.map(|tier| tier.to_string()),
            current_period_start: record.current_period_start,
            current_period_end: record.current_period_end,
            trial_end_at,
            grace_end_at,
            last_payment_at,
            canceled_at,
            cancel_at_period_end: record.cancel_at_period_end,
            soft_limited: record.soft_limited,
            soft_limit_reason: record.soft_limit_reason.clone(),
            soft_limit_snapshot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_entity() -> SubscriptionEntity {
        let now = Utc::now();
        SubscriptionEntity {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
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

    #[test]
    fn trial_row_converts_to_trial_phase() {
        let entity = sample_entity();
        let record = entity.to_record().unwrap();

        assert!(matches!(record.phase, SubscriptionPhase::TrialActive { .. }));
        assert_eq!(record.current_tier, Tier::C1);
        assert_eq!(record.version, 1);
    }

    #[test]
    fn grace_without_deadline_is_rejected() {
        let mut entity = sample_entity();
        entity.status = "grace".to_string();
        entity.trial_end_at = None;
        entity.grace_end_at = None;

        let err = entity.to_record().unwrap_err();
        assert!(err.to_string().contains("grace with null grace_end_at"));
    }

    #[test]
    fn stray_trial_deadline_outside_trial_is_rejected() {
        let mut entity = sample_entity();
        entity.status = "restricted".to_string();

        let err = entity.to_record().unwrap_err();
        assert!(err.to_string().contains("trial_end_at set outside"));
    }

    #[test]
    fn changes_round_trip_preserves_deadlines() {
        let entity = sample_entity();
        let record = entity.to_record().unwrap();
        let changes = SubscriptionChanges::from_record(&record).unwrap();

        assert_eq!(changes.status, "trial_active");
        assert_eq!(changes.trial_end_at, entity.trial_end_at);
        assert_eq!(changes.grace_end_at, None);
    }
}
