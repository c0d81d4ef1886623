use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{
        entities::subscriptions::{
            InsertSubscriptionEntity, SubscriptionChanges, SubscriptionEntity,
        },
        repositories::subscriptions::SubscriptionRepository,
        value_objects::enums::subscription_statuses::SubscriptionStatus,
    },
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::subscriptions},
};

pub struct SubscriptionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriptionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl SubscriptionRepository for SubscriptionPostgres {
    async fn find_by_tenant_id(&self, tenant_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = subscriptions::table
            .filter(subscriptions::tenant_id.eq(tenant_id))
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn create(&self, insert_entity: InsertSubscriptionEntity) -> Result<Uuid> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = insert_into(subscriptions::table)
            .values(&insert_entity)
            .returning(subscriptions::id)
            .get_result::<Uuid>(&mut conn)?;

        Ok(result)
    }

    async fn update_guarded(
        &self,
        id: Uuid,
        expected_version: i32,
        changes: SubscriptionChanges,
    ) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        // The version predicate makes the read-validate-write sequence atomic:
        // zero affected rows means a concurrent writer got there first.
        let affected = update(subscriptions::table)
            .filter(subscriptions::id.eq(id))
            .filter(subscriptions::version.eq(expected_version))
            .set((&changes, subscriptions::version.eq(expected_version + 1)))
            .execute(&mut conn)?;

        Ok(affected == 1)
    }

    async fn list_trial_expired(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = subscriptions::table
            .filter(subscriptions::status.eq(SubscriptionStatus::TrialActive.to_string()))
            .filter(subscriptions::trial_end_at.le(now))
            .order(subscriptions::trial_end_at.asc())
            .limit(limit)
            .select(SubscriptionEntity::as_select())
            .load::<SubscriptionEntity>(&mut conn)?;

        Ok(results)
    }

    async fn list_grace_expired(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = subscriptions::table
            .filter(subscriptions::status.eq(SubscriptionStatus::Grace.to_string()))
            .filter(subscriptions::grace_end_at.le(now))
            .order(subscriptions::grace_end_at.asc())
            .limit(limit)
            .select(SubscriptionEntity::as_select())
            .load::<SubscriptionEntity>(&mut conn)?;

        Ok(results)
    }

    async fn list_past_due_candidates(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = subscriptions::table
            .filter(
                subscriptions::status
                    .eq(SubscriptionStatus::PastDue.to_string())
                    .or(subscriptions::status
                        .eq(SubscriptionStatus::ActivePaid.to_string())
                        .and(subscriptions::current_period_end.le(now))),
            )
            .order(subscriptions::current_period_end.asc())
            .limit(limit)
            .select(SubscriptionEntity::as_select())
            .load::<SubscriptionEntity>(&mut conn)?;

        Ok(results)
    }

    async fn list_due_plan_changes(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = subscriptions::table
            .filter(subscriptions::current_period_end.le(now))
            .filter(
                subscriptions::next_tier
                    .is_not_null()
                    .or(subscriptions::cancel_at_period_end.eq(true)),
            )
            .filter(subscriptions::status.ne(SubscriptionStatus::Canceled.to_string()))
            .order(subscriptions::current_period_end.asc())
            .limit(limit)
            .select(SubscriptionEntity::as_select())
            .load::<SubscriptionEntity>(&mut conn)?;

        Ok(results)
    }
}
