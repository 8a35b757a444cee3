use remit_core::JobContext;

use crate::backend::{BackendKind, BackendSelection};
use crate::custodial::CustodialDispatcher;
use crate::error::DispatchError;
use crate::ledger::LedgerDispatcher;
use crate::payments::BatchOutcome;

/// Maps a resolved backend kind to its batch strategy.
///
/// The custodial strategy is optional: a process without custodial
/// credentials still runs, and selecting it reports
/// [`DispatchError::BackendUnavailable`].
pub struct DispatchSelector {
    ledger: LedgerDispatcher,
    custodial: Option<CustodialDispatcher>,
}

/// Strategy picked for one execution. Borrowed from the selector, so it
/// cannot outlive the execution that selected it.
#[derive(Clone, Copy)]
pub enum Dispatcher<'a> {
    Ledger(&'a LedgerDispatcher),
    Custodial(&'a CustodialDispatcher),
}

impl DispatchSelector {
    #[must_use]
    pub fn new(ledger: LedgerDispatcher, custodial: Option<CustodialDispatcher>) -> Self {
        Self { ledger, custodial }
    }

    /// # Errors
    ///
    /// [`DispatchError::BackendUnavailable`] when the strategy for `kind` was
    /// not configured.
    pub fn select(&self, kind: BackendKind) -> Result<Dispatcher<'_>, DispatchError> {
        match kind {
            BackendKind::LedgerDirect => Ok(Dispatcher::Ledger(&self.ledger)),
            BackendKind::CustodialApi => self
                .custodial
                .as_ref()
                .map(Dispatcher::Custodial)
                .ok_or(DispatchError::BackendUnavailable(kind)),
        }
    }

    #[must_use]
    pub fn has_custodial(&self) -> bool {
        self.custodial.is_some()
    }
}

impl Dispatcher<'_> {
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Ledger(_) => BackendKind::LedgerDirect,
            Self::Custodial(_) => BackendKind::CustodialApi,
        }
    }

    /// Submits up to `limit` ready items for the tenant in `ctx`.
    ///
    /// # Errors
    ///
    /// Whatever the underlying strategy returns.
    pub async fn submit_batch(
        &self,
        ctx: &JobContext,
        selection: &BackendSelection,
        limit: usize,
    ) -> Result<BatchOutcome, DispatchError> {
        match self {
            Self::Ledger(d) => d.submit_batch(ctx, selection, limit).await,
            Self::Custodial(d) => d.submit_batch(ctx, selection, limit).await,
        }
    }
}
