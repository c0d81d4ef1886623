use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;

use crate::domain::{entities::plans::PlanCatalogEntry, value_objects::enums::tiers::Tier};

#[async_trait]
#[automock]
pub trait PlanCatalogRepository {
    /// Catalog entry effective for `tier` at the given instant.
    async fn find_effective_by_tier(
        &self,
        tier: Tier,
        at: DateTime<Utc>,
    ) -> Result<PlanCatalogEntry>;

    async fn list_effective(&self, at: DateTime<Utc>) -> Result<Vec<PlanCatalogEntry>>;
}
