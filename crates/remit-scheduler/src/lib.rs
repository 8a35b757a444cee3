//! Recurring job runtime.
//!
//! Jobs are registered in a [`JobRegistry`] before start-up. The
//! [`Scheduler`] then runs one interval trigger per job and a fixed pool of
//! workers that drain the shared trigger queue. Tenant-scoped jobs fan out to
//! every active tenant; each execution is isolated so that an error or a panic
//! is reported through a [`FailureReporter`] and never takes a worker down.

mod fanout;
pub mod job;
pub mod registry;
pub mod reporter;
pub mod scheduler;

pub use job::{Job, JobError};
pub use registry::{JobRegistry, RegistrationError};
pub use reporter::{
    ChannelReporter, FailureKind, FailureReport, FailureReporter, LogReporter, ReportTotals,
};
pub use scheduler::{Scheduler, SchedulerConfig};
