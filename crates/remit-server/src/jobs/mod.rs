//! Jobs registered by the server process.

mod maintenance;
mod payments;

use std::sync::Arc;
use std::time::Duration;

use remit_core::AppConfig;
use remit_db::{DataSourceRouter, PoolOpener};
use remit_dispatch::{DispatchSelector, DistributionBackendResolver};
use remit_scheduler::{JobRegistry, RegistrationError};

pub use maintenance::PoolHealthJob;
pub use payments::PaymentSubmissionJob;

/// Builds the registry with every recurring job.
///
/// # Errors
///
/// Returns [`RegistrationError`] when a configured interval is below
/// `REMIT_MIN_JOB_INTERVAL_SECS`.
pub fn build_registry<O: PoolOpener>(
    config: &AppConfig,
    router: Arc<DataSourceRouter<O>>,
    resolver: &Arc<dyn DistributionBackendResolver>,
    selector: &Arc<DispatchSelector>,
) -> Result<JobRegistry, RegistrationError> {
    let mut registry = JobRegistry::new(Duration::from_secs(config.min_job_interval_secs));
    let payment_interval = Duration::from_secs(config.payment_job_interval_secs);

    registry.register(Arc::new(PaymentSubmissionJob::ledger(
        Arc::clone(resolver),
        Arc::clone(selector),
        payment_interval,
        config.payment_batch_size,
    )))?;
    registry.register(Arc::new(PaymentSubmissionJob::custodial(
        Arc::clone(resolver),
        Arc::clone(selector),
        payment_interval,
        config.payment_batch_size,
    )))?;
    registry.register(Arc::new(PoolHealthJob::new(
        router,
        Arc::clone(resolver),
        Duration::from_secs(config.pool_health_job_interval_secs),
    )))?;

    Ok(registry)
}
