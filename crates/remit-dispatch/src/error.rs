use remit_db::{DbError, RouterError};
use thiserror::Error;

use crate::backend::BackendKind;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no tenant in context")]
    NoTenantInContext,
    #[error("backend {0} is not configured in this process")]
    BackendUnavailable(BackendKind),
    #[error("selection for {selected} handed to the {strategy} dispatcher")]
    BackendMismatch {
        selected: BackendKind,
        strategy: BackendKind,
    },
    #[error("enqueueing {count} payments for submission: {source}")]
    Enqueue {
        count: usize,
        #[source]
        source: DbError,
    },
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error(transparent)]
    Db(#[from] DbError),
}
