//! Tenant directory: the registry of tenant records every other component
//! reads from.

mod memory;
mod pg;

pub use memory::InMemoryTenantDirectory;
pub use pg::PgTenantDirectory;

use async_trait::async_trait;
use remit_core::{CoreError, Tenant, TenantId};
use thiserror::Error;

use crate::DbError;

#[derive(Debug, Error)]
pub enum TenantError {
    /// Unknown, deactivated or soft-deleted tenant.
    #[error("tenant not found: {0}")]
    NotFound(String),
    #[error("more than one tenant is marked as default")]
    TooManyDefaultTenants,
    #[error("invalid tenant record {id}: {source}")]
    InvalidRecord {
        id: String,
        #[source]
        source: CoreError,
    },
    #[error("tenant directory unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<sqlx::Error> for TenantError {
    fn from(value: sqlx::Error) -> Self {
        Self::Db(DbError::Sqlx(value))
    }
}

/// Read access to tenant records.
///
/// Implementations never cache: status and backend configuration can change
/// between two calls.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// All tenants that are neither deactivated nor soft-deleted.
    async fn list_active_tenants(&self) -> Result<Vec<Tenant>, TenantError>;

    /// # Errors
    ///
    /// [`TenantError::NotFound`] when the tenant is unknown or inactive.
    async fn get_tenant_by_id(&self, id: TenantId) -> Result<Tenant, TenantError>;

    async fn get_tenant_by_name(&self, name: &str) -> Result<Tenant, TenantError>;

    /// The single tenant flagged as default.
    ///
    /// # Errors
    ///
    /// [`TenantError::TooManyDefaultTenants`] when more than one tenant carries
    /// the flag, [`TenantError::NotFound`] when none does or the default is
    /// inactive.
    async fn get_default(&self) -> Result<Tenant, TenantError>;

    /// Physical connection string for the tenant's storage partition.
    async fn connection_string_for(&self, tenant: &Tenant) -> Result<String, TenantError>;
}

/// Picks the default tenant out of every row flagged as default.
pub(crate) fn single_default(mut defaults: Vec<Tenant>) -> Result<Tenant, TenantError> {
    match defaults.len() {
        0 => Err(TenantError::NotFound("default tenant".to_string())),
        1 => {
            let tenant = defaults.remove(0);
            if tenant.is_active() {
                Ok(tenant)
            } else {
                Err(TenantError::NotFound(format!(
                    "default tenant {} is not active",
                    tenant.name
                )))
            }
        }
        _ => Err(TenantError::TooManyDefaultTenants),
    }
}
