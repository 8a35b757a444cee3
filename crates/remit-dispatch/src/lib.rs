//! Distribution backend resolution and batch dispatch.
//!
//! A job resolves the tenant's [`BackendSelection`] with a
//! [`DistributionBackendResolver`], asks the [`DispatchSelector`] for the
//! matching strategy, and submits a bounded batch of ready payments through
//! it. Both steps run fresh on every execution.

pub mod backend;
pub mod custodial;
pub mod error;
pub mod ledger;
pub mod payments;
pub mod resolver;
pub mod selector;

pub use backend::{BackendKind, BackendSelection};
pub use custodial::{
    idempotency_key, CustodialDispatcher, Transfer, TransferClient, TransferError,
    TransferRequest, TransferStatus,
};
pub use error::DispatchError;
pub use ledger::{LedgerDispatcher, SubmissionQueue, SubmissionRequest};
pub use payments::{
    validate_ready, BatchOutcome, InvalidPayment, PaymentClaim, PaymentStatus, PaymentStore,
    ReadyPayment, StatusUpdate,
};
pub use resolver::{DistributionBackendResolver, ResolveError, TenantBackendResolver};
pub use selector::{DispatchSelector, Dispatcher};
