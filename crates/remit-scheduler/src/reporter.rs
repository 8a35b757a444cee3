//! Failure reporting for job executions.
//!
//! Workers never surface errors to a caller; every failed execution becomes a
//! [`FailureReport`] handed to a [`FailureReporter`]. Each worker owns its own
//! forked reporter, so reporting never contends across workers.

use std::collections::BTreeMap;
use std::error::Error as StdError;

use chrono::{DateTime, Utc};
use remit_core::TenantId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The job returned an error.
    Error,
    /// The job panicked.
    Panic,
}

impl FailureKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Panic => "panic",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FailureReport {
    pub kind: FailureKind,
    pub job: String,
    /// `None` for host-level executions and for fan-out failures that happen
    /// before any tenant is known.
    pub tenant_id: Option<TenantId>,
    pub worker_id: usize,
    pub message: String,
    /// Display chain of the error, or the panic payload.
    pub cause: String,
    pub at: DateTime<Utc>,
}

impl FailureReport {
    pub fn error(
        job: &str,
        tenant_id: Option<TenantId>,
        worker_id: usize,
        message: impl Into<String>,
        err: &(dyn StdError + 'static),
    ) -> Self {
        Self {
            kind: FailureKind::Error,
            job: job.to_owned(),
            tenant_id,
            worker_id,
            message: message.into(),
            cause: error_chain(err),
            at: Utc::now(),
        }
    }

    pub fn panic(
        job: &str,
        tenant_id: Option<TenantId>,
        worker_id: usize,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            kind: FailureKind::Panic,
            job: job.to_owned(),
            tenant_id,
            worker_id,
            message: "job execution panicked".to_owned(),
            cause: payload.into(),
            at: Utc::now(),
        }
    }
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        chain.push_str(": ");
        chain.push_str(&inner.to_string());
        source = inner.source();
    }
    chain
}

/// Sink for failed executions.
///
/// `report` must return promptly and must not panic.
pub trait FailureReporter: Send + Sync {
    fn report(&self, report: FailureReport);

    /// An independent instance for one worker.
    fn fork(&self) -> Box<dyn FailureReporter>;
}

fn log_report(report: &FailureReport) {
    let tenant = report
        .tenant_id
        .map_or_else(|| "host".to_owned(), |id| id.to_string());
    match report.kind {
        FailureKind::Error => tracing::error!(
            job = %report.job,
            tenant_id = %tenant,
            worker_id = report.worker_id,
            cause = %report.cause,
            "scheduler: {}",
            report.message
        ),
        FailureKind::Panic => tracing::error!(
            kind = "panic",
            job = %report.job,
            tenant_id = %tenant,
            worker_id = report.worker_id,
            cause = %report.cause,
            "scheduler: {}",
            report.message
        ),
    }
}

/// Logs each report and keeps nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl FailureReporter for LogReporter {
    fn report(&self, report: FailureReport) {
        log_report(&report);
    }

    fn fork(&self) -> Box<dyn FailureReporter> {
        Box::new(*self)
    }
}

/// Running totals kept by the [`ChannelReporter`] sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportTotals {
    pub errors: u64,
    pub panics: u64,
    pub by_job: BTreeMap<String, u64>,
}

impl ReportTotals {
    fn record(&mut self, report: &FailureReport) {
        match report.kind {
            FailureKind::Error => self.errors += 1,
            FailureKind::Panic => self.panics += 1,
        }
        *self.by_job.entry(report.job.clone()).or_default() += 1;
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.errors + self.panics
    }
}

/// Sends reports over an unbounded channel.
///
/// Every fork holds its own sender; the receiving side sees reports from all
/// of them.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<FailureReport>,
}

impl ChannelReporter {
    /// Reporter plus the raw receiving end.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<FailureReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Reporter plus a spawned sink task that logs every report and returns
    /// the totals once every sender has been dropped.
    #[must_use]
    pub fn spawn_sink() -> (Self, JoinHandle<ReportTotals>) {
        let (reporter, mut rx) = Self::channel();
        let sink = tokio::spawn(async move {
            let mut totals = ReportTotals::default();
            while let Some(report) = rx.recv().await {
                log_report(&report);
                totals.record(&report);
            }
            totals
        });
        (reporter, sink)
    }
}

impl FailureReporter for ChannelReporter {
    fn report(&self, report: FailureReport) {
        if let Err(mpsc::error::SendError(report)) = self.tx.send(report) {
            // Sink already gone; keep the failure visible.
            log_report(&report);
        }
    }

    fn fork(&self) -> Box<dyn FailureReporter> {
        Box::new(self.clone())
    }
}
