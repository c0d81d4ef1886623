use backend::config::config_model::BillingRules;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub worker_server: WorkerServer,
    pub database: Database,
    pub scheduler: Scheduler,
    pub billing: BillingRules,
}

#[derive(Debug, Clone)]
pub struct WorkerServer {
    pub port: u16,
    pub timeout: u64,
    pub body_limit: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    /// Seconds between timer-driven passes over the four lifecycle jobs.
    pub tick_seconds: u64,
    /// Bearer token guarding the manual trigger endpoints. Unset means the
    /// endpoints refuse to serve.
    pub internal_token: Option<String>,
}
