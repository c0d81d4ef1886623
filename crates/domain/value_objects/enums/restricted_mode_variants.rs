use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::entitlements::Capability;

/// Tenant-configurable allow-list applied while the subscription is restricted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum RestrictedModeVariant {
    #[default]
    CatalogOnly,
    AllowBasicSales,
}

impl Display for RestrictedModeVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self {
            RestrictedModeVariant::CatalogOnly => "catalog_only",
            RestrictedModeVariant::AllowBasicSales => "allow_basic_sales",
        };
        write!(f, "{}", variant)
    }
}

impl RestrictedModeVariant {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "catalog_only" => Some(RestrictedModeVariant::CatalogOnly),
            "allow_basic_sales" => Some(RestrictedModeVariant::AllowBasicSales),
            _ => None,
        }
    }

    /// Capabilities that stay available in restricted mode. `CatalogOnly`
    /// keeps browsing and catalog maintenance; `AllowBasicSales` additionally
    /// keeps order creation.
    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::CatalogRead | Capability::CatalogWrite => true,
            Capability::OrderCreate => matches!(self, RestrictedModeVariant::AllowBasicSales),
            _ => false,
        }
    }
}
