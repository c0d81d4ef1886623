use anyhow::anyhow;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::{entitlements::QuotaLimits, enums::tiers::Tier, plans::PlanDto},
    infra::db::postgres::schema::plan_catalog,
};

/// One versioned catalog entry: the quotas and price a tier resolves to for
/// a given effective-date range. Immutable once referenced by a period.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanCatalogEntry {
    pub id: Uuid,
    pub tier: Tier,
    pub quotas: QuotaLimits,
    pub monthly_price_minor: i32,
    pub currency: String,
    pub effective_from: DateTime<Utc>,
    pub effective_to: Option<DateTime<Utc>>,
}

/// Raw row used for Diesel queries. Quotas stay as JSON and are parsed into
/// `QuotaLimits`.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = plan_catalog)]
pub struct PlanCatalogRow {
    pub id: Uuid,
    pub tier: String,
    pub quotas: serde_json::Value,
    pub monthly_price_minor: i32,
    pub currency: String,
    pub effective_from: DateTime<Utc>,
    pub effective_to: Option<DateTime<Utc>>,
}

impl From<&PlanCatalogEntry> for PlanDto {
    fn from(entry: &PlanCatalogEntry) -> Self {
        Self {
            tier: entry.tier,
            quotas: entry.quotas.clone(),
            monthly_price_minor: entry.monthly_price_minor,
            currency: entry.currency.clone(),
        }
    }
}

impl TryFrom<PlanCatalogRow> for PlanCatalogEntry {
    type Error = anyhow::Error;

    fn try_from(row: PlanCatalogRow) -> Result<Self, Self::Error> {
        let tier = Tier::from_str(&row.tier)
            .ok_or_else(|| anyhow!("unknown tier in plan catalog: {}", row.tier))?;
        let quotas = serde_json::from_value(row.quotas)?;

        Ok(Self {
            id: row.id,
            tier,
            quotas,
            monthly_price_minor: row.monthly_price_minor,
            currency: row.currency,
            effective_from: row.effective_from,
            effective_to: row.effective_to,
        })
    }
}
