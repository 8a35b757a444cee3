//! Postgres pool construction shared by the admin, submitter and tenant pools.

use std::time::Duration;

use remit_core::AppConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Sizing applied to every pool the process opens, tenant pools included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 10,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }

    fn options(self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections.min(self.max_connections))
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
    }
}

/// Opens a pool against `database_url`.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if no connection can be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    config.options().connect(database_url).await
}

/// Round-trips `SELECT 1` on one pooled connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    let one: i32 = sqlx::query_scalar("SELECT 1").fetch_one(pool).await?;
    debug_assert_eq!(one, 1);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        assert_eq!(
            PoolConfig::default(),
            PoolConfig {
                max_connections: 10,
                min_connections: 1,
                acquire_timeout_secs: 10,
            }
        );
    }

    #[test]
    fn min_connections_never_exceed_max() {
        let options = PoolConfig {
            max_connections: 2,
            min_connections: 5,
            acquire_timeout_secs: 1,
        }
        .options();
        assert_eq!(options.get_min_connections(), 2);
        assert_eq!(options.get_max_connections(), 2);
    }
}
