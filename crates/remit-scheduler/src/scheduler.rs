//! Interval triggers and the worker pool.

use std::sync::Arc;
use std::time::Duration;

use remit_core::AppConfig;
use remit_db::TenantDirectory;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::fanout;
use crate::job::Job;
use crate::registry::{JobRegistry, RegistrationError};
use crate::reporter::FailureReporter;

const DEFAULT_WORKER_COUNT: usize = 5;

type WorkQueue = Arc<Mutex<mpsc::UnboundedReceiver<Arc<dyn Job>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub worker_count: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            worker_count: config.scheduler_workers,
        }
    }
}

/// Owns the registry and, once started, the trigger and worker tasks.
///
/// Triggers push a job onto one shared unbounded queue every interval;
/// workers pull from it and run the fan-out. A busy pool makes tokens queue
/// up; they are never dropped.
pub struct Scheduler {
    registry: JobRegistry,
    tenants: Arc<dyn TenantDirectory>,
    reporter: Box<dyn FailureReporter>,
    config: SchedulerConfig,
    cancel: Option<CancellationToken>,
    workers: Vec<JoinHandle<()>>,
    triggers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("workers", &self.workers.len())
            .field("triggers", &self.triggers.len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// # Errors
    ///
    /// [`RegistrationError::NoWorkers`] when `config.worker_count` is zero.
    pub fn new(
        registry: JobRegistry,
        tenants: Arc<dyn TenantDirectory>,
        reporter: Box<dyn FailureReporter>,
        config: SchedulerConfig,
    ) -> Result<Self, RegistrationError> {
        if config.worker_count == 0 {
            return Err(RegistrationError::NoWorkers);
        }
        Ok(Self {
            registry,
            tenants,
            reporter,
            config,
            cancel: None,
            workers: Vec::new(),
            triggers: Vec::new(),
        })
    }

    /// Spawns the worker pool and one trigger per registered job.
    ///
    /// With an empty registry nothing is spawned. Calling `start` a second
    /// time is a no-op. Must be called from within a Tokio runtime.
    pub fn start(&mut self, root: &CancellationToken) {
        if self.cancel.is_some() {
            tracing::warn!("scheduler: start called twice; ignoring");
            return;
        }
        if self.registry.is_empty() {
            tracing::info!("scheduler: no jobs registered; not starting");
            return;
        }

        let cancel = root.child_token();
        let (tx, rx) = mpsc::unbounded_channel::<Arc<dyn Job>>();
        let queue: WorkQueue = Arc::new(Mutex::new(rx));

        for worker_id in 0..self.config.worker_count {
            self.workers.push(tokio::spawn(run_worker(
                worker_id,
                Arc::clone(&queue),
                Arc::clone(&self.tenants),
                self.reporter.fork(),
                cancel.clone(),
            )));
        }

        for job in self.registry.jobs() {
            self.triggers.push(tokio::spawn(run_trigger(
                Arc::clone(job),
                tx.clone(),
                cancel.clone(),
            )));
        }

        tracing::info!(
            workers = self.workers.len(),
            jobs = ?self.registry.names(),
            "scheduler: started"
        );
        self.cancel = Some(cancel);
    }

    /// Signals every trigger and worker to exit. Does not wait for
    /// in-flight executions.
    pub fn stop(&self) {
        if let Some(cancel) = &self.cancel {
            if !cancel.is_cancelled() {
                tracing::info!("scheduler: stopping");
                cancel.cancel();
            }
        }
    }

    /// Waits up to `grace` for all tasks to exit after [`Scheduler::stop`].
    ///
    /// Returns `true` when every task finished in time. Tasks still running
    /// after the grace period are left detached.
    pub async fn wait(&mut self, grace: Duration) -> bool {
        let handles: Vec<JoinHandle<()>> =
            self.workers.drain(..).chain(self.triggers.drain(..)).collect();
        if handles.is_empty() {
            return true;
        }
        let count = handles.len();
        if let Ok(results) = tokio::time::timeout(grace, futures::future::join_all(handles)).await {
            for result in results {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "scheduler: task ended abnormally");
                }
            }
            tracing::info!(tasks = count, "scheduler: all tasks exited");
            true
        } else {
            tracing::warn!(
                tasks = count,
                grace_secs = grace.as_secs(),
                "scheduler: tasks still running after grace period"
            );
            false
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| !c.is_cancelled())
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub fn trigger_count(&self) -> usize {
        self.triggers.len()
    }

    #[must_use]
    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }
}

async fn run_trigger(
    job: Arc<dyn Job>,
    tx: mpsc::UnboundedSender<Arc<dyn Job>>,
    cancel: CancellationToken,
) {
    let period = job.interval();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                tracing::trace!(job = job.name(), "scheduler: trigger fired");
                if tx.send(Arc::clone(&job)).is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!(job = job.name(), "scheduler: trigger stopped");
}

async fn run_worker(
    worker_id: usize,
    queue: WorkQueue,
    tenants: Arc<dyn TenantDirectory>,
    reporter: Box<dyn FailureReporter>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            job = async { queue.lock().await.recv().await } => job,
        };
        let Some(job) = next else {
            break;
        };

        let summary =
            fanout::run_trigger(&job, tenants.as_ref(), reporter.as_ref(), worker_id, &cancel)
                .await;
        tracing::debug!(
            job = job.name(),
            worker_id,
            attempted = summary.attempted,
            failed = summary.failed,
            "scheduler: trigger processed"
        );
    }
    tracing::debug!(worker_id, "scheduler: worker stopped");
}
