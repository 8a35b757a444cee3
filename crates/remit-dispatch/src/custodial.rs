//! Custodial-API strategy: one transfer per payment out of the tenant's
//! custodial wallet.

use std::sync::Arc;

use async_trait::async_trait;
use remit_core::{JobContext, TenantId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::backend::{BackendKind, BackendSelection};
use crate::error::DispatchError;
use crate::payments::{
    partition_valid, BatchOutcome, PaymentStatus, PaymentStore, ReadyPayment, StatusUpdate,
};

/// Chain code the custodial API uses for the ledger network.
pub const LEDGER_CHAIN_CODE: &str = "XLM";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferRequest {
    pub idempotency_key: String,
    pub source_wallet_id: String,
    pub destination_address: String,
    pub chain: String,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Complete,
    Failed,
}

impl TransferStatus {
    #[must_use]
    pub fn payment_status(self) -> PaymentStatus {
        match self {
            Self::Pending => PaymentStatus::Pending,
            Self::Complete => PaymentStatus::Success,
            Self::Failed => PaymentStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub id: String,
    pub status: TransferStatus,
    pub transaction_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("custodial api rejected the transfer (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("custodial api unreachable: {0}")]
    Transport(String),
    #[error("unexpected custodial api response: {0}")]
    Decode(String),
}

/// Seam to the custodial transfer API. Retries live inside the client.
#[async_trait]
pub trait TransferClient: Send + Sync {
    async fn create_transfer(&self, request: &TransferRequest) -> Result<Transfer, TransferError>;
}

/// Deterministic key so a payment retried in a later execution never creates
/// a second transfer.
#[must_use]
pub fn idempotency_key(tenant_id: TenantId, payment_id: &str) -> String {
    format!(
        "{:x}",
        Sha256::digest(format!("{tenant_id}:{payment_id}").as_bytes())
    )
}

fn custodial_currency(asset_code: &str) -> Option<&'static str> {
    match asset_code {
        "USDC" => Some("USD"),
        "EURC" => Some("EUR"),
        _ => None,
    }
}

pub struct CustodialDispatcher {
    payments: Arc<dyn PaymentStore>,
    client: Arc<dyn TransferClient>,
}

impl CustodialDispatcher {
    #[must_use]
    pub fn new(payments: Arc<dyn PaymentStore>, client: Arc<dyn TransferClient>) -> Self {
        Self { payments, client }
    }

    /// Submits up to `limit` ready payments for the tenant in `ctx`.
    ///
    /// A payment whose transfer fails is marked `FAILED` and the rest of the
    /// batch continues.
    ///
    /// # Errors
    ///
    /// Only store failures abort the batch. Transfers already created are
    /// safe to replay on the next run because their idempotency keys are
    /// deterministic.
    pub async fn submit_batch(
        &self,
        ctx: &JobContext,
        selection: &BackendSelection,
        limit: usize,
    ) -> Result<BatchOutcome, DispatchError> {
        if selection.kind != BackendKind::CustodialApi {
            return Err(DispatchError::BackendMismatch {
                selected: selection.kind,
                strategy: BackendKind::CustodialApi,
            });
        }
        let tenant_id = ctx.tenant().ok_or(DispatchError::NoTenantInContext)?.id;

        let mut claim = self.payments.claim_ready(ctx, limit).await?;
        if claim.payments().is_empty() {
            tracing::debug!(tenant_id = %tenant_id, "dispatch: no ready payments");
            return Ok(BatchOutcome::default());
        }

        let mut outcome = BatchOutcome {
            claimed: claim.payments().len(),
            ..BatchOutcome::default()
        };

        let (valid, rejected) = partition_valid(claim.payments().to_vec());
        outcome.failed = rejected.len();
        if !rejected.is_empty() {
            claim.update_statuses(&rejected).await?;
        }

        // Payments left unsent on shutdown are released as READY by the commit.
        for payment in valid {
            if ctx.is_cancelled() {
                tracing::info!(tenant_id = %tenant_id, "dispatch: batch interrupted by shutdown");
                break;
            }
            let update = self.transfer(tenant_id, &selection.address, &payment).await;
            if update.status == PaymentStatus::Failed {
                outcome.failed += 1;
            } else {
                outcome.submitted += 1;
            }
            claim.update_statuses(std::slice::from_ref(&update)).await?;
        }
        claim.commit().await?;

        tracing::info!(
            tenant_id = %tenant_id,
            claimed = outcome.claimed,
            submitted = outcome.submitted,
            failed = outcome.failed,
            "dispatch: custodial batch submitted"
        );
        Ok(outcome)
    }

    async fn transfer(
        &self,
        tenant_id: TenantId,
        wallet_id: &str,
        payment: &ReadyPayment,
    ) -> StatusUpdate {
        let Some(currency) = custodial_currency(&payment.asset_code) else {
            return StatusUpdate::failed(
                payment.id.clone(),
                format!("asset {} is not supported by the custodial api", payment.asset_code),
            );
        };

        let request = TransferRequest {
            idempotency_key: idempotency_key(tenant_id, &payment.id),
            source_wallet_id: wallet_id.to_string(),
            destination_address: payment.destination.clone(),
            chain: LEDGER_CHAIN_CODE.to_string(),
            amount: payment.amount,
            currency: currency.to_string(),
        };

        match self.client.create_transfer(&request).await {
            Ok(transfer) => StatusUpdate {
                payment_id: payment.id.clone(),
                status: transfer.status.payment_status(),
                message: Some(format!(
                    "transfer {} has status {:?}",
                    transfer.id, transfer.status
                )),
                external_id: Some(transfer.id),
            },
            Err(e) => {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    payment_id = %payment.id,
                    error = %e,
                    "dispatch: custodial transfer failed"
                );
                StatusUpdate::failed(payment.id.clone(), e.to_string())
            }
        }
    }
}
