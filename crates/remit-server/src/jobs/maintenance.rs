use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use remit_core::JobContext;
use remit_db::{DataSourceRouter, PoolOpener};
use remit_dispatch::DistributionBackendResolver;
use remit_scheduler::{Job, JobError};

/// Host-level house-keeping: pings every tenant pool the router holds.
pub struct PoolHealthJob<O: PoolOpener> {
    router: Arc<DataSourceRouter<O>>,
    resolver: Arc<dyn DistributionBackendResolver>,
    interval: Duration,
}

impl<O: PoolOpener> PoolHealthJob<O> {
    pub fn new(
        router: Arc<DataSourceRouter<O>>,
        resolver: Arc<dyn DistributionBackendResolver>,
        interval: Duration,
    ) -> Self {
        Self {
            router,
            resolver,
            interval,
        }
    }
}

#[async_trait]
impl<O: PoolOpener> Job for PoolHealthJob<O> {
    fn name(&self) -> &str {
        "pool_health_job"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn is_tenant_scoped(&self) -> bool {
        false
    }

    async fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
        let host = self.resolver.resolve_host_level();
        let total = self.router.len();
        let failures = self.router.ping_all().await;

        if failures.is_empty() {
            tracing::debug!(
                pools = total,
                host_backend = %host.kind,
                host_account = %host.address,
                "router: all tenant pools healthy"
            );
            return Ok(());
        }

        for (tenant_id, e) in &failures {
            tracing::warn!(tenant_id = %tenant_id, error = %e, "router: tenant pool failed ping");
        }
        let tenants: Vec<String> = failures.iter().map(|(id, _)| id.to_string()).collect();
        Err(anyhow::anyhow!(
            "{} of {total} tenant pools failed health check: {}",
            failures.len(),
            tenants.join(", ")
        )
        .into())
    }
}
