use crate::app_config::{AppConfig, CustodialApiConfig, Environment};
use crate::ConfigError;

/// Reads `.env` (when present) and then the process environment.
///
/// # Errors
///
/// [`ConfigError`] names the first variable that is missing or malformed.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Same as [`load_app_config`] without touching `.env`.
///
/// # Errors
///
/// [`ConfigError`] names the first variable that is missing or malformed.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|var| std::env::var(var))
}

/// Typed access to one env-var source.
struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    fn required(&self, var: &str) -> Result<String, ConfigError> {
        (self.lookup)(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    }

    fn text(&self, var: &str, default: &str) -> String {
        (self.lookup)(var).unwrap_or_else(|_| default.to_string())
    }

    fn number<T>(&self, var: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match (self.lookup)(var) {
            Ok(raw) => raw.trim().parse::<T>().map_err(|e| invalid(var, e.to_string())),
            Err(_) => Ok(default),
        }
    }

    fn positive(&self, var: &str, default: u64) -> Result<u64, ConfigError> {
        match self.number(var, default)? {
            0 => Err(invalid(var, "must be greater than zero".to_string())),
            n => Ok(n),
        }
    }
}

fn invalid(var: &str, reason: String) -> ConfigError {
    ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    }
}

fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let vars = Vars { lookup };

    let database_url = vars.required("DATABASE_URL")?;
    let submitter_database_url = vars.text("SUBMITTER_DATABASE_URL", &database_url);

    let host_distribution_account = vars.required("REMIT_HOST_DISTRIBUTION_ACCOUNT")?;
    if !is_ledger_public_key(&host_distribution_account) {
        return Err(invalid(
            "REMIT_HOST_DISTRIBUTION_ACCOUNT",
            "expected a 56-character ledger public key starting with 'G'".to_string(),
        ));
    }

    let scheduler_workers: usize = vars.number("REMIT_SCHEDULER_WORKERS", 5)?;
    if scheduler_workers == 0 {
        return Err(invalid(
            "REMIT_SCHEDULER_WORKERS",
            "at least one worker is required".to_string(),
        ));
    }

    let custodial = match (vars.lookup)("CUSTODIAL_API_KEY") {
        Ok(api_key) if !api_key.trim().is_empty() => Some(CustodialApiConfig {
            api_key,
            base_url: vars.text("CUSTODIAL_API_URL", "https://api-sandbox.circle.com"),
            request_timeout_secs: vars.number("REMIT_CUSTODIAL_REQUEST_TIMEOUT_SECS", 30)?,
            max_retries: vars.number("REMIT_CUSTODIAL_MAX_RETRIES", 3)?,
            retry_backoff_ms: vars.number("REMIT_CUSTODIAL_RETRY_BACKOFF_MS", 100)?,
        }),
        _ => None,
    };

    Ok(AppConfig {
        database_url,
        submitter_database_url,
        host_distribution_account,
        env: parse_environment(&vars.text("REMIT_ENV", "development")),
        log_level: vars.text("REMIT_LOG_LEVEL", "info"),
        db_max_connections: vars.number("REMIT_DB_MAX_CONNECTIONS", 10)?,
        db_min_connections: vars.number("REMIT_DB_MIN_CONNECTIONS", 1)?,
        db_acquire_timeout_secs: vars.number("REMIT_DB_ACQUIRE_TIMEOUT_SECS", 10)?,
        scheduler_workers,
        min_job_interval_secs: vars.positive("REMIT_MIN_JOB_INTERVAL_SECS", 5)?,
        payment_job_interval_secs: vars.positive("REMIT_PAYMENT_JOB_INTERVAL_SECS", 30)?,
        payment_batch_size: vars.number("REMIT_PAYMENT_BATCH_SIZE", 100)?,
        pool_health_job_interval_secs: vars.positive("REMIT_POOL_HEALTH_JOB_INTERVAL_SECS", 60)?,
        shutdown_grace_secs: vars.number("REMIT_SHUTDOWN_GRACE_SECS", 10)?,
        custodial,
    })
}

/// Anything unrecognised runs as development.
fn parse_environment(raw: &str) -> Environment {
    [Environment::Production, Environment::Test]
        .into_iter()
        .find(|env| env.as_str().eq_ignore_ascii_case(raw.trim()))
        .unwrap_or(Environment::Development)
}

/// Shape check for an ed25519 account strkey: `G` prefix, 56 chars, base32
/// alphabet. The checksum is not verified.
#[must_use]
pub fn is_ledger_public_key(s: &str) -> bool {
    s.len() == 56
        && s.starts_with('G')
        && s.bytes().all(|b| matches!(b, b'A'..=b'Z' | b'2'..=b'7'))
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
