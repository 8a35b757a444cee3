//! Ready payments and the store that hands them out.

use async_trait::async_trait;
use remit_core::JobContext;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::DispatchError;

const NATIVE_ASSET_CODE: &str = "XLM";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Draft,
    Ready,
    Pending,
    Paused,
    Success,
    Failed,
    Canceled,
}

impl PaymentStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Ready => "READY",
            Self::Pending => "PENDING",
            Self::Paused => "PAUSED",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "READY" => Ok(Self::Ready),
            "PENDING" => Ok(Self::Pending),
            "PAUSED" => Ok(Self::Paused),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            "CANCELED" => Ok(Self::Canceled),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

/// A payment claimed for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyPayment {
    pub id: String,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub asset_code: String,
    pub asset_issuer: String,
    /// Receiver's ledger address.
    pub destination: String,
}

/// Status change written back after a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub message: Option<String>,
    /// Identifier assigned by the settlement backend, when there is one.
    pub external_id: Option<String>,
}

impl StatusUpdate {
    #[must_use]
    pub fn pending(payment_id: impl Into<String>) -> Self {
        Self {
            payment_id: payment_id.into(),
            status: PaymentStatus::Pending,
            message: None,
            external_id: None,
        }
    }

    #[must_use]
    pub fn failed(payment_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            payment_id: payment_id.into(),
            status: PaymentStatus::Failed,
            message: Some(message.into()),
            external_id: None,
        }
    }
}

/// Counts from one `submit_batch` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub claimed: usize,
    pub submitted: usize,
    pub failed: usize,
}

/// Tenant-scoped payment storage.
///
/// Implementations resolve the tenant's own data source from `ctx`.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Locks up to `limit` payments in `READY` status for this execution.
    ///
    /// Rows held by another open claim are skipped, so overlapping executions
    /// for one tenant never see the same payment.
    async fn claim_ready(
        &self,
        ctx: &JobContext,
        limit: usize,
    ) -> Result<Box<dyn PaymentClaim>, DispatchError>;
}

/// Payments locked by one [`PaymentStore::claim_ready`] call.
///
/// Status writes are staged on the claim and become visible together on
/// [`PaymentClaim::commit`]. Dropping an uncommitted claim releases the rows
/// unchanged.
#[async_trait]
pub trait PaymentClaim: Send {
    fn payments(&self) -> &[ReadyPayment];

    async fn update_statuses(&mut self, updates: &[StatusUpdate]) -> Result<(), DispatchError>;

    async fn commit(self: Box<Self>) -> Result<(), DispatchError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidPayment {
    #[error("payment status is {0}, expected READY")]
    NotReady(PaymentStatus),
    #[error("payment id is empty")]
    MissingId,
    #[error("asset code is empty")]
    MissingAssetCode,
    #[error("asset issuer is empty")]
    MissingAssetIssuer,
    #[error("amount {0} is not positive")]
    NonPositiveAmount(Decimal),
    #[error("destination address is empty")]
    MissingDestination,
}

/// Checks a claimed payment can be submitted.
///
/// # Errors
///
/// Returns the first rule the payment breaks.
pub fn validate_ready(payment: &ReadyPayment) -> Result<(), InvalidPayment> {
    if payment.status != PaymentStatus::Ready {
        return Err(InvalidPayment::NotReady(payment.status));
    }
    if payment.id.trim().is_empty() {
        return Err(InvalidPayment::MissingId);
    }
    if payment.asset_code.trim().is_empty() {
        return Err(InvalidPayment::MissingAssetCode);
    }
    if payment.asset_issuer.trim().is_empty()
        && !payment.asset_code.eq_ignore_ascii_case(NATIVE_ASSET_CODE)
    {
        return Err(InvalidPayment::MissingAssetIssuer);
    }
    if payment.amount <= Decimal::ZERO {
        return Err(InvalidPayment::NonPositiveAmount(payment.amount));
    }
    if payment.destination.trim().is_empty() {
        return Err(InvalidPayment::MissingDestination);
    }
    Ok(())
}

/// Splits a claimed batch into submittable payments and `FAILED` updates for
/// the rest.
pub(crate) fn partition_valid(
    payments: Vec<ReadyPayment>,
) -> (Vec<ReadyPayment>, Vec<StatusUpdate>) {
    let mut valid = Vec::with_capacity(payments.len());
    let mut rejected = Vec::new();
    for payment in payments {
        match validate_ready(&payment) {
            Ok(()) => valid.push(payment),
            Err(reason) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    reason = %reason,
                    "dispatch: payment failed validation"
                );
                rejected.push(StatusUpdate::failed(payment.id, reason.to_string()));
            }
        }
    }
    (valid, rejected)
}
