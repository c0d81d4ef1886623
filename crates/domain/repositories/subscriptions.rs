use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::subscriptions::{
    InsertSubscriptionEntity, SubscriptionChanges, SubscriptionEntity,
};

#[async_trait]
#[automock]
pub trait SubscriptionRepository {
    async fn find_by_tenant_id(&self, tenant_id: Uuid) -> Result<Option<SubscriptionEntity>>;

    async fn create(&self, insert_entity: InsertSubscriptionEntity) -> Result<Uuid>;

    /// Atomic transition write: applies `changes` only if the row still
    /// carries `expected_version`, bumping the version. Returns false when a
    /// concurrent writer won, in which case the caller drops the transition
    /// and re-validates on its next tick.
    async fn update_guarded(
        &self,
        id: Uuid,
        expected_version: i32,
        changes: SubscriptionChanges,
    ) -> Result<bool>;

    /// Trial subscriptions whose trial deadline has passed.
    async fn list_trial_expired(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SubscriptionEntity>>;

    /// Grace subscriptions whose grace deadline has passed.
    async fn list_grace_expired(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SubscriptionEntity>>;

    /// Paid subscriptions whose period lapsed without a new payment, plus
    /// records already past due (the handler advances them one more hop).
    async fn list_past_due_candidates(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SubscriptionEntity>>;

    /// Subscriptions at/past period end with a scheduled tier change or a
    /// pending cancel-at-period-end.
    async fn list_due_plan_changes(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SubscriptionEntity>>;
}
