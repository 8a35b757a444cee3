//! Per-execution scoped context.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::tenant::Tenant;

/// Carrier handed to one job execution.
///
/// Holds at most one tenant, a cancellation token derived from the scheduler's
/// root token, and an optional deadline. A fresh value is built for every
/// execution and is never shared between executions.
#[derive(Debug, Clone)]
pub struct JobContext {
    tenant: Option<Tenant>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl JobContext {
    /// Context for a host-level execution: no tenant identity.
    #[must_use]
    pub fn host(cancel: CancellationToken) -> Self {
        Self {
            tenant: None,
            cancel,
            deadline: None,
        }
    }

    #[must_use]
    pub fn for_tenant(tenant: Tenant, cancel: CancellationToken) -> Self {
        Self {
            tenant: Some(tenant),
            cancel,
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    #[must_use]
    pub fn tenant(&self) -> Option<&Tenant> {
        self.tenant.as_ref()
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when no deadline is set.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}
