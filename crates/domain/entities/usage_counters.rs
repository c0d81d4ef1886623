use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::entitlements::UsageSnapshot,
    infra::db::postgres::schema::usage_counters,
};

/// Per-(tenant, period) counter row. Mutated only by atomic increments,
/// except for the administrative reconciliation path which overwrites the
/// row wholesale.
#[derive(Debug, Clone, Selectable, Queryable)]
#[diesel(table_name = usage_counters)]
pub struct UsageCounterEntity {
    pub tenant_id: Uuid,
    pub period_key: String,
    pub orders: i64,
    pub api_calls: i64,
    pub storage_mb: i64,
    pub plugins: i64,
    pub branches: i64,
    pub admin_users: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = usage_counters)]
pub struct UpsertUsageCounterEntity {
    pub tenant_id: Uuid,
    pub period_key: String,
    pub orders: i64,
    pub api_calls: i64,
    pub storage_mb: i64,
    pub plugins: i64,
    pub branches: i64,
    pub admin_users: i64,
}

impl UsageCounterEntity {
    pub fn to_snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            orders: self.orders,
            api_calls: self.api_calls,
            storage_mb: self.storage_mb,
            plugins: self.plugins,
            branches: self.branches,
            admin_users: self.admin_users,
        }
    }
}
