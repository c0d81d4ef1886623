use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{RunQueryDsl, prelude::*};
use std::sync::Arc;

use crate::{
    domain::{
        entities::plans::{PlanCatalogEntry, PlanCatalogRow},
        repositories::plans::PlanCatalogRepository,
        value_objects::enums::tiers::Tier,
    },
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::plan_catalog},
};

pub struct PlanCatalogPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PlanCatalogPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PlanCatalogRepository for PlanCatalogPostgres {
    async fn find_effective_by_tier(
        &self,
        tier: Tier,
        at: DateTime<Utc>,
    ) -> Result<PlanCatalogEntry> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let row = plan_catalog::table
            .filter(plan_catalog::tier.eq(tier.to_string()))
            .filter(plan_catalog::effective_from.le(at))
            .filter(
                plan_catalog::effective_to
                    .is_null()
                    .or(plan_catalog::effective_to.gt(at)),
            )
            .order(plan_catalog::effective_from.desc())
            .select(PlanCatalogRow::as_select())
            .first::<PlanCatalogRow>(&mut conn)
            .optional()?
            .ok_or_else(|| anyhow!("no effective plan catalog entry for tier {}", tier))?;

        row.try_into()
    }

    async fn list_effective(&self, at: DateTime<Utc>) -> Result<Vec<PlanCatalogEntry>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let rows = plan_catalog::table
            .filter(plan_catalog::effective_from.le(at))
            .filter(
                plan_catalog::effective_to
                    .is_null()
                    .or(plan_catalog::effective_to.gt(at)),
            )
            .order(plan_catalog::tier.asc())
            .select(PlanCatalogRow::as_select())
            .load::<PlanCatalogRow>(&mut conn)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
