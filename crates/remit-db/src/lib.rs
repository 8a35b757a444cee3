//! Postgres access for the disbursement runtime: pool helpers, the tenant
//! directory, and the per-tenant data-source router.

use thiserror::Error;

pub mod dsn;
mod pool;
pub mod router;
pub mod tenants;

pub use dsn::tenant_dsn;
pub use pool::{connect_pool, ping, PoolConfig};
pub use router::{DataSourceRouter, PgPoolOpener, PoolOpener, RouterError, TenantPoolRouter};
pub use tenants::{InMemoryTenantDirectory, PgTenantDirectory, TenantDirectory, TenantError};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error("empty connection string")]
    EmptyDsn,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
