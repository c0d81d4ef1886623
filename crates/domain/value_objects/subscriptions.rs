use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::{
    entitlements::{QuotaDimension, UsageSnapshot},
    enums::{
        restricted_mode_variants::RestrictedModeVariant,
        subscription_statuses::SubscriptionStatus, tiers::Tier,
    },
};

/// Status-specific state, carried structurally so a deadline can never be
/// missing for the status that needs it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum SubscriptionPhase {
    TrialActive { trial_end_at: DateTime<Utc> },
    ActivePaid { last_payment_at: DateTime<Utc> },
    PastDue,
    Grace { grace_end_at: DateTime<Utc> },
    Restricted,
    Canceled { canceled_at: DateTime<Utc> },
}

impl SubscriptionPhase {
    pub fn status(&self) -> SubscriptionStatus {
        match self {
            SubscriptionPhase::TrialActive { .. } => SubscriptionStatus::TrialActive,
            SubscriptionPhase::ActivePaid { .. } => SubscriptionStatus::ActivePaid,
            SubscriptionPhase::PastDue => SubscriptionStatus::PastDue,
            SubscriptionPhase::Grace { .. } => SubscriptionStatus::Grace,
            SubscriptionPhase::Restricted => SubscriptionStatus::Restricted,
            SubscriptionPhase::Canceled { .. } => SubscriptionStatus::Canceled,
        }
    }
}

/// Validated in-memory model of one tenant's subscription row. Constructed
/// from the raw row; rows that violate the state invariants never become a
/// record and are excluded from automated transitions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub phase: SubscriptionPhase,
    pub current_tier: Tier,
    pub next_tier: Option<Tier>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub last_payment_at: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub soft_limited: bool,
    pub soft_limit_reason: Option<String>,
    pub soft_limit_snapshot: Option<SoftLimitSnapshot>,
    pub restricted_mode_variant: RestrictedModeVariant,
    pub version: i32,
}

impl SubscriptionRecord {
    pub fn status(&self) -> SubscriptionStatus {
        self.phase.status()
    }

    /// Usage counter key for the running billing period.
    pub fn period_key(&self) -> String {
        self.current_period_start.format("%Y-%m-%d").to_string()
    }

    /// Snapshot entry for `dimension` while the record is soft limited. The
    /// captured over-limit usage keeps gating the dimension even though the
    /// rolled-over period's counter starts fresh.
    pub fn soft_limit_excess(&self, dimension: QuotaDimension) -> Option<&ExceededDimension> {
        if !self.soft_limited {
            return None;
        }
        self.soft_limit_snapshot
            .as_ref()
            .and_then(|snapshot| snapshot.exceeded.iter().find(|e| e.dimension == dimension))
    }
}

/// Usage captured when a downgrade rollover lands a tenant over the new
/// tier's quota. Stored as JSONB for audit; never used to trim data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SoftLimitSnapshot {
    pub captured_at: DateTime<Utc>,
    pub tier: Tier,
    pub usage: UsageSnapshot,
    pub exceeded: Vec<ExceededDimension>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExceededDimension {
    pub dimension: QuotaDimension,
    pub used: i64,
    pub limit: i64,
}

pub const DOWNGRADE_QUOTA_EXCEEDED_SOFT_LIMIT: &str = "DOWNGRADE_QUOTA_EXCEEDED_SOFT_LIMIT";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionDto {
    pub tenant_id: Uuid,
    pub status: SubscriptionStatus,
    pub current_tier: Tier,
    pub next_tier: Option<Tier>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub trial_end_at: Option<DateTime<Utc>>,
    pub grace_end_at: Option<DateTime<Utc>>,
    pub last_payment_at: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub soft_limited: bool,
    pub soft_limit_reason: Option<String>,
    pub restricted_mode_variant: RestrictedModeVariant,
}

impl From<&SubscriptionRecord> for SubscriptionDto {
    fn from(record: &SubscriptionRecord) -> Self {
        let (trial_end_at, grace_end_at) = match record.phase {
            SubscriptionPhase::TrialActive { trial_end_at } => (Some(trial_end_at), None),
            SubscriptionPhase::Grace { grace_end_at } => (None, Some(grace_end_at)),
            _ => (None, None),
        };

        Self {
            tenant_id: record.tenant_id,
            status: record.status(),
            current_tier: record.current_tier,
            next_tier: record.next_tier,
            current_period_start: record.current_period_start,
            current_period_end: record.current_period_end,
            trial_end_at,
            grace_end_at,
            last_payment_at: record.last_payment_at,
            cancel_at_period_end: record.cancel_at_period_end,
            soft_limited: record.soft_limited,
            soft_limit_reason: record.soft_limit_reason.clone(),
            restricted_mode_variant: record.restricted_mode_variant,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TierChangeDirection {
    Upgrade,
    Downgrade,
}

/// Dry-run of a tier change: current usage measured against the target
/// tier's quotas, without committing anything.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierChangePreviewDto {
    pub current_tier: Tier,
    pub target_tier: Tier,
    pub direction: TierChangeDirection,
    /// Upgrades apply immediately; downgrades at the current period end.
    pub effective_at: DateTime<Utc>,
    pub dimensions: Vec<DimensionPreviewDto>,
    pub would_soft_limit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DimensionPreviewDto {
    pub dimension: QuotaDimension,
    pub used: i64,
    pub target_limit: i64,
    pub would_exceed: bool,
}
