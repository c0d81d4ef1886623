use anyhow::{Context, Result};
use crates::domain::value_objects::enums::tiers::Tier;

use super::config_model::{Auth, BackendServer, BillingRules, Database, DotEnvyConfig};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let backend_server = BackendServer {
        port: std::env::var("SERVER_PORT_BACKEND")
            .context("SERVER_PORT_BACKEND is invalid")?
            .parse()?,
        body_limit: std::env::var("SERVER_BODY_LIMIT")
            .context("SERVER_BODY_LIMIT is invalid")?
            .parse()?,
        timeout: std::env::var("SERVER_TIMEOUT")
            .context("SERVER_TIMEOUT is invalid")?
            .parse()?,
    };

    let database = Database {
        url: std::env::var("DATABASE_URL").context("DATABASE_URL is invalid")?,
    };

    let auth = Auth {
        jwt_secret: std::env::var("BILLING_JWT_SECRET").context("BILLING_JWT_SECRET is invalid")?,
        internal_api_token: std::env::var("INTERNAL_API_TOKEN")
            .ok()
            .filter(|v| !v.is_empty()),
    };

    let billing = load_billing_rules()?;

    Ok(DotEnvyConfig {
        backend_server,
        database,
        auth,
        billing,
    })
}

pub fn load_billing_rules() -> Result<BillingRules> {
    dotenvy::dotenv().ok();

    let default_tier_raw =
        std::env::var("BILLING_DEFAULT_TIER").unwrap_or_else(|_| "C1".to_string());
    let default_tier = Tier::from_str(&default_tier_raw)
        .with_context(|| format!("BILLING_DEFAULT_TIER is invalid: {default_tier_raw}"))?;

    Ok(BillingRules {
        trial_days: env_i64_or("BILLING_TRIAL_DAYS", 14)?,
        grace_days: env_i64_or("BILLING_GRACE_DAYS", 7)?,
        billing_cycle_days: env_i64_or("BILLING_CYCLE_DAYS", 30)?,
        default_tier,
        scheduler_batch_limit: env_i64_or("SCHEDULER_BATCH_LIMIT", 200)?,
    })
}

pub fn get_auth_secret() -> Result<String> {
    dotenvy::dotenv().ok();

    std::env::var("BILLING_JWT_SECRET").context("BILLING_JWT_SECRET is invalid")
}

fn env_i64_or(key: &str, default: i64) -> Result<i64> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("{key} is invalid")),
        Err(_) => Ok(default),
    }
}
