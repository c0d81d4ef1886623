use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::usage_counters::{UpsertUsageCounterEntity, UsageCounterEntity},
    value_objects::entitlements::QuotaDimension,
};

#[async_trait]
#[automock]
pub trait UsageCounterRepository {
    async fn find(
        &self,
        tenant_id: Uuid,
        period_key: &str,
    ) -> Result<Option<UsageCounterEntity>>;

    /// Atomic upsert-increment; creates the period row lazily on first use.
    /// Increments are commutative, so concurrent callers need no locking.
    async fn increment(
        &self,
        tenant_id: Uuid,
        period_key: &str,
        dimension: QuotaDimension,
        amount: i64,
    ) -> Result<()>;

    /// Administrative reconciliation: the only path allowed to overwrite a
    /// counter row wholesale.
    async fn reconcile(&self, entity: UpsertUsageCounterEntity) -> Result<()>;
}
