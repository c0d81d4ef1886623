pub mod entitlements;
pub mod lifecycle;
pub mod subscriptions;
pub mod tier_changes;
