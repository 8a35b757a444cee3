//! Expansion of one trigger into executions.

use std::any::Any;
use std::sync::Arc;

use remit_core::{JobContext, TenantId};
use remit_db::TenantDirectory;
use tokio_util::sync::CancellationToken;

use crate::job::Job;
use crate::reporter::{FailureReport, FailureReporter};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FanOutSummary {
    pub attempted: usize,
    pub failed: usize,
}

/// Runs one trigger of `job`.
///
/// Host-level jobs execute once with no tenant. Tenant-scoped jobs execute
/// once per active tenant, one after another; a failure for one tenant is
/// reported and the rest still run. If the directory cannot be listed the
/// whole trigger counts as a single failure.
pub(crate) async fn run_trigger(
    job: &Arc<dyn Job>,
    tenants: &dyn TenantDirectory,
    reporter: &dyn FailureReporter,
    worker_id: usize,
    cancel: &CancellationToken,
) -> FanOutSummary {
    if !job.is_tenant_scoped() {
        let ctx = JobContext::host(cancel.child_token());
        let ok = execute_isolated(job, ctx, reporter, worker_id).await;
        return FanOutSummary {
            attempted: 1,
            failed: usize::from(!ok),
        };
    }

    let active = match tenants.list_active_tenants().await {
        Ok(active) => active,
        Err(e) => {
            reporter.report(FailureReport::error(
                job.name(),
                None,
                worker_id,
                "failed to list active tenants; trigger skipped",
                &e,
            ));
            return FanOutSummary {
                attempted: 0,
                failed: 1,
            };
        }
    };

    if active.is_empty() {
        tracing::debug!(job = job.name(), "scheduler: no active tenants; nothing to run");
        return FanOutSummary::default();
    }

    let mut summary = FanOutSummary::default();
    for tenant in active {
        if cancel.is_cancelled() {
            tracing::info!(
                job = job.name(),
                worker_id,
                "scheduler: shutdown observed; remaining tenants skipped"
            );
            break;
        }
        summary.attempted += 1;
        let ctx = JobContext::for_tenant(tenant, cancel.child_token());
        if !execute_isolated(job, ctx, reporter, worker_id).await {
            summary.failed += 1;
        }
    }
    summary
}

/// Executes on a separate task so a panic is caught at the join boundary.
/// Returns `true` on success.
async fn execute_isolated(
    job: &Arc<dyn Job>,
    ctx: JobContext,
    reporter: &dyn FailureReporter,
    worker_id: usize,
) -> bool {
    let tenant_id: Option<TenantId> = ctx.tenant().map(|t| t.id);
    let task_job = Arc::clone(job);
    let handle = tokio::spawn(async move { task_job.execute(&ctx).await });

    match handle.await {
        Ok(Ok(())) => {
            tracing::debug!(
                job = job.name(),
                tenant_id = ?tenant_id,
                worker_id,
                "scheduler: execution complete"
            );
            true
        }
        Ok(Err(e)) => {
            reporter.report(FailureReport::error(
                job.name(),
                tenant_id,
                worker_id,
                "job execution failed",
                &e,
            ));
            false
        }
        Err(join_err) => {
            let payload = if join_err.is_panic() {
                panic_message(join_err.into_panic().as_ref())
            } else {
                "execution task was cancelled".to_owned()
            };
            reporter.report(FailureReport::panic(job.name(), tenant_id, worker_id, payload));
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
