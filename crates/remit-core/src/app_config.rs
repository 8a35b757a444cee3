#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl Environment {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Production => "production",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credentials and tuning for the custodial transfer API.
///
/// Only present when `CUSTODIAL_API_KEY` is set.
#[derive(Clone)]
pub struct CustodialApiConfig {
    pub api_key: String,
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl std::fmt::Debug for CustodialApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustodialApiConfig")
            .field("api_key", &"[redacted]")
            .field("base_url", &self.base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .finish()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub submitter_database_url: String,
    pub host_distribution_account: String,
    pub env: Environment,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub scheduler_workers: usize,
    pub min_job_interval_secs: u64,
    pub payment_job_interval_secs: u64,
    pub payment_batch_size: usize,
    pub pool_health_job_interval_secs: u64,
    pub shutdown_grace_secs: u64,
    pub custodial: Option<CustodialApiConfig>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("submitter_database_url", &"[redacted]")
            .field("host_distribution_account", &self.host_distribution_account)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("scheduler_workers", &self.scheduler_workers)
            .field("min_job_interval_secs", &self.min_job_interval_secs)
            .field("payment_job_interval_secs", &self.payment_job_interval_secs)
            .field("payment_batch_size", &self.payment_batch_size)
            .field(
                "pool_health_job_interval_secs",
                &self.pool_health_job_interval_secs,
            )
            .field("shutdown_grace_secs", &self.shutdown_grace_secs)
            .field("custodial", &self.custodial)
            .finish()
    }
}
