use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use remit_core::JobContext;
use remit_dispatch::{BackendKind, DispatchSelector, DistributionBackendResolver};
use remit_scheduler::{Job, JobError};

/// Submits a batch of ready payments for one tenant through the strategy its
/// backend requires.
///
/// Each instance serves one backend family. Tenants on the other family are
/// skipped, which is the normal outcome with mixed tenants.
pub struct PaymentSubmissionJob {
    name: &'static str,
    backend: BackendKind,
    interval: Duration,
    batch_size: usize,
    resolver: Arc<dyn DistributionBackendResolver>,
    selector: Arc<DispatchSelector>,
}

impl PaymentSubmissionJob {
    pub fn ledger(
        resolver: Arc<dyn DistributionBackendResolver>,
        selector: Arc<DispatchSelector>,
        interval: Duration,
        batch_size: usize,
    ) -> Self {
        Self {
            name: "ledger_payment_to_submitter_job",
            backend: BackendKind::LedgerDirect,
            interval,
            batch_size,
            resolver,
            selector,
        }
    }

    pub fn custodial(
        resolver: Arc<dyn DistributionBackendResolver>,
        selector: Arc<DispatchSelector>,
        interval: Duration,
        batch_size: usize,
    ) -> Self {
        Self {
            name: "custodial_payment_to_submitter_job",
            backend: BackendKind::CustodialApi,
            interval,
            batch_size,
            resolver,
            selector,
        }
    }
}

#[async_trait]
impl Job for PaymentSubmissionJob {
    fn name(&self) -> &str {
        self.name
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn is_tenant_scoped(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        // Resolved and selected on every run: an admin may switch the backend.
        let selection = self.resolver.resolve_for_tenant(ctx).await?;
        if selection.kind != self.backend {
            tracing::debug!(
                job = self.name,
                tenant_id = ?ctx.tenant().map(|t| t.id),
                backend = %selection.kind,
                "dispatch: tenant uses another backend; skipping"
            );
            return Ok(());
        }

        let dispatcher = self.selector.select(selection.kind)?;
        dispatcher
            .submit_batch(ctx, &selection, self.batch_size)
            .await?;
        Ok(())
    }
}
