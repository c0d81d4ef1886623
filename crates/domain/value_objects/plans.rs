use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{entitlements::QuotaLimits, enums::tiers::Tier};

/// Presentation view of one catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanDto {
    pub tier: Tier,
    pub quotas: QuotaLimits,
    pub monthly_price_minor: i32,
    pub currency: String,
}
