pub mod restricted_mode_variants;
pub mod subscription_statuses;
pub mod tiers;
