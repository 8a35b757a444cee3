use std::time::Duration;

use async_trait::async_trait;
use remit_core::JobContext;
use remit_db::{RouterError, TenantError};
use remit_dispatch::{DispatchError, ResolveError};
use thiserror::Error;

/// A recurring unit of work.
///
/// The scheduler calls [`Job::execute`] once per trigger for host-level jobs
/// and once per active tenant for tenant-scoped jobs. Two executions of the
/// same job may overlap when one outlives its interval; jobs that touch shared
/// rows must claim them.
#[async_trait]
pub trait Job: Send + Sync {
    /// Registry key. Unique per process.
    fn name(&self) -> &str;

    fn interval(&self) -> Duration;

    fn is_tenant_scoped(&self) -> bool;

    /// # Errors
    ///
    /// Any [`JobError`]; it is reported and the next trigger tries again.
    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;
}

/// Failure of a single execution.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Tenant(#[from] TenantError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
