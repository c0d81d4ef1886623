use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::{RunQueryDsl, insert_into, prelude::*};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{
        entities::usage_counters::{UpsertUsageCounterEntity, UsageCounterEntity},
        repositories::usage_counters::UsageCounterRepository,
        value_objects::entitlements::QuotaDimension,
    },
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::usage_counters},
};

pub struct UsageCounterPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl UsageCounterPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }

    fn seed_row(tenant_id: Uuid, period_key: &str) -> UpsertUsageCounterEntity {
        UpsertUsageCounterEntity {
            tenant_id,
            period_key: period_key.to_string(),
            orders: 0,
            api_calls: 0,
            storage_mb: 0,
            plugins: 0,
            branches: 0,
            admin_users: 0,
        }
    }
}

#[async_trait]
impl UsageCounterRepository for UsageCounterPostgres {
    async fn find(
        &self,
        tenant_id: Uuid,
        period_key: &str,
    ) -> Result<Option<UsageCounterEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = usage_counters::table
            .filter(usage_counters::tenant_id.eq(tenant_id))
            .filter(usage_counters::period_key.eq(period_key))
            .select(UsageCounterEntity::as_select())
            .first::<UsageCounterEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn increment(
        &self,
        tenant_id: Uuid,
        period_key: &str,
        dimension: QuotaDimension,
        amount: i64,
    ) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let now = Utc::now();

        let mut seed = Self::seed_row(tenant_id, period_key);
        match dimension {
            QuotaDimension::Orders => seed.orders = amount,
            QuotaDimension::ApiCalls => seed.api_calls = amount,
            QuotaDimension::StorageMb => seed.storage_mb = amount,
            QuotaDimension::Plugins => seed.plugins = amount,
            QuotaDimension::Branches => seed.branches = amount,
            QuotaDimension::AdminUsers => seed.admin_users = amount,
        }

        let insert = insert_into(usage_counters::table).values((
            &seed,
            usage_counters::created_at.eq(now),
            usage_counters::updated_at.eq(now),
        ));

        // Pure additions commute, so the row-level atomic increment is the
        // only synchronization needed.
        match dimension {
            QuotaDimension::Orders => {
                insert
                    .on_conflict((usage_counters::tenant_id, usage_counters::period_key))
                    .do_update()
                    .set((
                        usage_counters::orders.eq(usage_counters::orders + amount),
                        usage_counters::updated_at.eq(now),
                    ))
                    .execute(&mut conn)?;
            }
            QuotaDimension::ApiCalls => {
                insert
                    .on_conflict((usage_counters::tenant_id, usage_counters::period_key))
                    .do_update()
                    .set((
                        usage_counters::api_calls.eq(usage_counters::api_calls + amount),
                        usage_counters::updated_at.eq(now),
                    ))
                    .execute(&mut conn)?;
            }
            QuotaDimension::StorageMb => {
                insert
                    .on_conflict((usage_counters::tenant_id, usage_counters::period_key))
                    .do_update()
                    .set((
                        usage_counters::storage_mb.eq(usage_counters::storage_mb + amount),
                        usage_counters::updated_at.eq(now),
                    ))
                    .execute(&mut conn)?;
            }
            QuotaDimension::Plugins => {
                insert
                    .on_conflict((usage_counters::tenant_id, usage_counters::period_key))
                    .do_update()
                    .set((
                        usage_counters::plugins.eq(usage_counters::plugins + amount),
                        usage_counters::updated_at.eq(now),
                    ))
                    .execute(&mut conn)?;
            }
            QuotaDimension::Branches => {
                insert
                    .on_conflict((usage_counters::tenant_id, usage_counters::period_key))
                    .do_update()
                    .set((
                        usage_counters::branches.eq(usage_counters::branches + amount),
                        usage_counters::updated_at.eq(now),
                    ))
                    .execute(&mut conn)?;
            }
            QuotaDimension::AdminUsers => {
                insert
                    .on_conflict((usage_counters::tenant_id, usage_counters::period_key))
                    .do_update()
                    .set((
                        usage_counters::admin_users.eq(usage_counters::admin_users + amount),
                        usage_counters::updated_at.eq(now),
                    ))
                    .execute(&mut conn)?;
            }
        }

        Ok(())
    }

    async fn reconcile(&self, entity: UpsertUsageCounterEntity) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let now = Utc::now();

        insert_into(usage_counters::table)
            .values((
                &entity,
                usage_counters::created_at.eq(now),
                usage_counters::updated_at.eq(now),
            ))
            .on_conflict((usage_counters::tenant_id, usage_counters::period_key))
            .do_update()
            .set((
                usage_counters::orders.eq(entity.orders),
                usage_counters::api_calls.eq(entity.api_calls),
                usage_counters::storage_mb.eq(entity.storage_mb),
                usage_counters::plugins.eq(entity.plugins),
                usage_counters::branches.eq(entity.branches),
                usage_counters::admin_users.eq(entity.admin_users),
                usage_counters::updated_at.eq(now),
            ))
            .execute(&mut conn)?;

        Ok(())
    }
}
