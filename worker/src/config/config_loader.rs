use anyhow::{Context, Result};

use super::config_model::{Database, DotEnvyConfig, Scheduler, WorkerServer};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let worker_server = WorkerServer {
        port: std::env::var("SERVER_PORT_WORKER")
            .context("SERVER_PORT_WORKER is invalid")?
            .parse()?,
        timeout: std::env::var("SERVER_TIMEOUT")
            .context("SERVER_TIMEOUT is invalid")?
            .parse()?,
        body_limit: std::env::var("SERVER_BODY_LIMIT")
            .context("SERVER_BODY_LIMIT is invalid")?
            .parse()?,
    };

    let database = Database {
        url: std::env::var("DATABASE_URL").context("DATABASE_URL is invalid")?,
    };

    let scheduler = Scheduler {
        tick_seconds: match std::env::var("SCHEDULER_TICK_SECONDS") {
            Ok(raw) => raw.parse().context("SCHEDULER_TICK_SECONDS is invalid")?,
            Err(_) => 300,
        },
        internal_token: std::env::var("INTERNAL_API_TOKEN")
            .ok()
            .filter(|v| !v.is_empty()),
    };

    let billing = backend::config::config_loader::load_billing_rules()?;

    Ok(DotEnvyConfig {
        worker_server,
        database,
        scheduler,
        billing,
    })
}
