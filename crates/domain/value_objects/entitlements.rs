use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::enums::tiers::Tier;

/// The six capability dimensions a plan puts a quota on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QuotaDimension {
    Orders,
    ApiCalls,
    StorageMb,
    Plugins,
    Branches,
    AdminUsers,
}

impl Display for QuotaDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dimension = match self {
            QuotaDimension::Orders => "orders",
            QuotaDimension::ApiCalls => "api_calls",
            QuotaDimension::StorageMb => "storage_mb",
            QuotaDimension::Plugins => "plugins",
            QuotaDimension::Branches => "branches",
            QuotaDimension::AdminUsers => "admin_users",
        };
        write!(f, "{}", dimension)
    }
}

impl QuotaDimension {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "orders" => Some(QuotaDimension::Orders),
            "api_calls" => Some(QuotaDimension::ApiCalls),
            "storage_mb" => Some(QuotaDimension::StorageMb),
            "plugins" => Some(QuotaDimension::Plugins),
            "branches" => Some(QuotaDimension::Branches),
            "admin_users" => Some(QuotaDimension::AdminUsers),
            _ => None,
        }
    }

    pub const ALL: [QuotaDimension; 6] = [
        QuotaDimension::Orders,
        QuotaDimension::ApiCalls,
        QuotaDimension::StorageMb,
        QuotaDimension::Plugins,
        QuotaDimension::Branches,
        QuotaDimension::AdminUsers,
    ];
}

/// Tenant actions the request gate can be asked about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Capability {
    CatalogRead,
    CatalogWrite,
    OrderCreate,
    ApiCall,
    StorageUpload,
    PluginInstall,
    BranchCreate,
    AdminUserInvite,
}

impl Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let capability = match self {
            Capability::CatalogRead => "catalog_read",
            Capability::CatalogWrite => "catalog_write",
            Capability::OrderCreate => "order_create",
            Capability::ApiCall => "api_call",
            Capability::StorageUpload => "storage_upload",
            Capability::PluginInstall => "plugin_install",
            Capability::BranchCreate => "branch_create",
            Capability::AdminUserInvite => "admin_user_invite",
        };
        write!(f, "{}", capability)
    }
}

impl Capability {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "catalog_read" => Some(Capability::CatalogRead),
            "catalog_write" => Some(Capability::CatalogWrite),
            "order_create" => Some(Capability::OrderCreate),
            "api_call" => Some(Capability::ApiCall),
            "storage_upload" => Some(Capability::StorageUpload),
            "plugin_install" => Some(Capability::PluginInstall),
            "branch_create" => Some(Capability::BranchCreate),
            "admin_user_invite" => Some(Capability::AdminUserInvite),
            _ => None,
        }
    }

    pub fn is_mutating(&self) -> bool {
        !matches!(self, Capability::CatalogRead)
    }

    /// Quota dimension the capability consumes, if any. Catalog maintenance
    /// is gated by status only, never by quota.
    pub fn quota_dimension(&self) -> Option<QuotaDimension> {
        match self {
            Capability::CatalogRead | Capability::CatalogWrite => None,
            Capability::OrderCreate => Some(QuotaDimension::Orders),
            Capability::ApiCall => Some(QuotaDimension::ApiCalls),
            Capability::StorageUpload => Some(QuotaDimension::StorageMb),
            Capability::PluginInstall => Some(QuotaDimension::Plugins),
            Capability::BranchCreate => Some(QuotaDimension::Branches),
            Capability::AdminUserInvite => Some(QuotaDimension::AdminUsers),
        }
    }
}

/// Per-tier quota limits. Stored as JSONB on the plan catalog row.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct QuotaLimits {
    #[serde(default)]
    pub orders_per_month: i64,

    #[serde(default)]
    pub api_calls_per_month: i64,

    #[serde(default)]
    pub storage_mb: i64,

    #[serde(default)]
    pub plugins_max: i64,

    #[serde(default)]
    pub branches_max: i64,

    #[serde(default)]
    pub admin_users_max: i64,
}

impl QuotaLimits {
    pub fn limit(&self, dimension: QuotaDimension) -> i64 {
        match dimension {
            QuotaDimension::Orders => self.orders_per_month,
            QuotaDimension::ApiCalls => self.api_calls_per_month,
            QuotaDimension::StorageMb => self.storage_mb,
            QuotaDimension::Plugins => self.plugins_max,
            QuotaDimension::Branches => self.branches_max,
            QuotaDimension::AdminUsers => self.admin_users_max,
        }
    }
}

/// Point-in-time usage across the six dimensions for one billing period.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub orders: i64,
    pub api_calls: i64,
    pub storage_mb: i64,
    pub plugins: i64,
    pub branches: i64,
    pub admin_users: i64,
}

impl UsageSnapshot {
    pub fn used(&self, dimension: QuotaDimension) -> i64 {
        match dimension {
            QuotaDimension::Orders => self.orders,
            QuotaDimension::ApiCalls => self.api_calls,
            QuotaDimension::StorageMb => self.storage_mb,
            QuotaDimension::Plugins => self.plugins,
            QuotaDimension::Branches => self.branches,
            QuotaDimension::AdminUsers => self.admin_users,
        }
    }
}

/// Resolved limit/usage pair for one dimension. The percentage is reported
/// uncapped so callers can show "120% of quota".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct QuotaUsage {
    pub limit: i64,
    pub used: i64,
    pub usage_percentage: f64,
}

impl QuotaUsage {
    pub fn new(limit: i64, used: i64) -> Self {
        let usage_percentage = if limit > 0 {
            (used as f64 / limit as f64) * 100.0
        } else if used > 0 {
            100.0
        } else {
            0.0
        };
        Self {
            limit,
            used,
            usage_percentage,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.limit
    }
}

/// The currently-effective quotas for a tenant, one entry per dimension.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entitlements {
    pub tier: Tier,
    pub orders: QuotaUsage,
    pub api_calls: QuotaUsage,
    pub storage_mb: QuotaUsage,
    pub plugins: QuotaUsage,
    pub branches: QuotaUsage,
    pub admin_users: QuotaUsage,
}

impl Entitlements {
    pub fn dimension(&self, dimension: QuotaDimension) -> &QuotaUsage {
        match dimension {
            QuotaDimension::Orders => &self.orders,
            QuotaDimension::ApiCalls => &self.api_calls,
            QuotaDimension::StorageMb => &self.storage_mb,
            QuotaDimension::Plugins => &self.plugins,
            QuotaDimension::Branches => &self.branches,
            QuotaDimension::AdminUsers => &self.admin_users,
        }
    }
}

/// Machine-readable denial codes surfaced to the presentation layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DenyCode {
    QuotaExceeded,
    SubscriptionRestricted,
    SubscriptionCanceled,
}

impl DenyCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyCode::QuotaExceeded => "QUOTA_EXCEEDED",
            DenyCode::SubscriptionRestricted => "SUBSCRIPTION_RESTRICTED",
            DenyCode::SubscriptionCanceled => "SUBSCRIPTION_CANCELED",
        }
    }
}

impl Display for DenyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a capability check. Deny is an expected decision, not an error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum CapabilityDecision {
    Allow,
    Deny {
        code: DenyCode,
        dimension: Option<QuotaDimension>,
    },
}

impl CapabilityDecision {
    pub fn deny(code: DenyCode, dimension: Option<QuotaDimension>) -> Self {
        CapabilityDecision::Deny { code, dimension }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, CapabilityDecision::Allow)
    }
}
