use chrono::Duration;
use crates::domain::value_objects::enums::tiers::Tier;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub backend_server: BackendServer,
    pub database: Database,
    pub auth: Auth,
    pub billing: BillingRules,
}

#[derive(Debug, Clone)]
pub struct BackendServer {
    pub port: u16,
    pub body_limit: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Auth {
    pub jwt_secret: String,
    /// Bearer token guarding collaborator-only endpoints (payment events,
    /// usage increments). Unset means those endpoints refuse to serve.
    pub internal_api_token: Option<String>,
}

/// Time-based rules driving the lifecycle state machine. All durations come
/// from the environment so staging can run with short deadlines.
#[derive(Debug, Clone)]
pub struct BillingRules {
    pub trial_days: i64,
    pub grace_days: i64,
    pub billing_cycle_days: i64,
    pub default_tier: Tier,
    pub scheduler_batch_limit: i64,
}

impl BillingRules {
    pub fn trial_length(&self) -> Duration {
        Duration::days(self.trial_days)
    }

    pub fn grace_length(&self) -> Duration {
        Duration::days(self.grace_days)
    }

    pub fn billing_cycle(&self) -> Duration {
        Duration::days(self.billing_cycle_days)
    }
}
