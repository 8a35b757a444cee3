//! Ledger-direct strategy: hand ready payments to the transaction-submission
//! store, which signs and submits them to the network.

use std::sync::Arc;

use async_trait::async_trait;
use remit_core::{JobContext, TenantId};
use rust_decimal::Decimal;

use crate::backend::{BackendKind, BackendSelection};
use crate::error::DispatchError;
use crate::payments::{partition_valid, BatchOutcome, PaymentStore, StatusUpdate};

/// One row for the transaction-submission store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub tenant_id: TenantId,
    pub payment_id: String,
    pub source_account: String,
    pub destination: String,
    pub asset_code: String,
    pub asset_issuer: String,
    pub amount: Decimal,
}

#[async_trait]
pub trait SubmissionQueue: Send + Sync {
    /// Enqueues the whole batch or nothing.
    async fn enqueue(&self, batch: &[SubmissionRequest]) -> Result<(), DispatchError>;
}

pub struct LedgerDispatcher {
    payments: Arc<dyn PaymentStore>,
    queue: Arc<dyn SubmissionQueue>,
}

impl LedgerDispatcher {
    #[must_use]
    pub fn new(payments: Arc<dyn PaymentStore>, queue: Arc<dyn SubmissionQueue>) -> Self {
        Self { payments, queue }
    }

    /// Submits up to `limit` ready payments for the tenant in `ctx`.
    ///
    /// # Errors
    ///
    /// Store failures and enqueue failures are returned as is. The claim is
    /// then dropped uncommitted, so no payment changes status.
    pub async fn submit_batch(
        &self,
        ctx: &JobContext,
        selection: &BackendSelection,
        limit: usize,
    ) -> Result<BatchOutcome, DispatchError> {
        if selection.kind != BackendKind::LedgerDirect {
            return Err(DispatchError::BackendMismatch {
                selected: selection.kind,
                strategy: BackendKind::LedgerDirect,
            });
        }
        let tenant = ctx.tenant().ok_or(DispatchError::NoTenantInContext)?;

        let mut claim = self.payments.claim_ready(ctx, limit).await?;
        if claim.payments().is_empty() {
            tracing::debug!(tenant_id = %tenant.id, "dispatch: no ready payments");
            return Ok(BatchOutcome::default());
        }
        let claimed_count = claim.payments().len();

        let (valid, rejected) = partition_valid(claim.payments().to_vec());
        if !rejected.is_empty() {
            claim.update_statuses(&rejected).await?;
        }

        let requests: Vec<SubmissionRequest> = valid
            .into_iter()
            .map(|p| SubmissionRequest {
                tenant_id: tenant.id,
                payment_id: p.id,
                source_account: selection.address.clone(),
                destination: p.destination,
                asset_code: p.asset_code,
                asset_issuer: p.asset_issuer,
                amount: p.amount,
            })
            .collect();

        if !requests.is_empty() {
            self.queue.enqueue(&requests).await?;
            let pending: Vec<StatusUpdate> = requests
                .iter()
                .map(|r| StatusUpdate::pending(r.payment_id.clone()))
                .collect();
            claim.update_statuses(&pending).await?;
        }
        claim.commit().await?;

        let outcome = BatchOutcome {
            claimed: claimed_count,
            submitted: requests.len(),
            failed: rejected.len(),
        };
        tracing::info!(
            tenant_id = %tenant.id,
            claimed = outcome.claimed,
            submitted = outcome.submitted,
            failed = outcome.failed,
            "dispatch: ledger batch enqueued"
        );
        Ok(outcome)
    }
}
