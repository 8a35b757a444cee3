//! Explicit job registry built at start-up and handed to the scheduler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::job::Job;

/// Start-up misconfiguration. The process must not start when one of these
/// is returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("job '{job}' interval {interval:?} is below the minimum of {minimum:?}")]
    IntervalTooShort {
        job: String,
        interval: Duration,
        minimum: Duration,
    },

    #[error("job '{job}' has a zero interval")]
    ZeroInterval { job: String },

    #[error("job name must not be empty")]
    EmptyName,

    #[error("scheduler needs at least one worker")]
    NoWorkers,
}

pub struct JobRegistry {
    jobs: HashMap<String, Arc<dyn Job>>,
    min_interval: Duration,
}

impl JobRegistry {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            jobs: HashMap::new(),
            min_interval,
        }
    }

    /// Adds `job` under its name.
    ///
    /// A second job with the same name replaces the first and a warning is
    /// logged.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::ZeroInterval`] for a zero interval whatever the
    /// minimum, [`RegistrationError::IntervalTooShort`] when the interval is
    /// below the registry minimum, [`RegistrationError::EmptyName`] for a
    /// blank name.
    pub fn register(&mut self, job: Arc<dyn Job>) -> Result<(), RegistrationError> {
        let name = job.name().trim().to_owned();
        if name.is_empty() {
            return Err(RegistrationError::EmptyName);
        }
        let interval = job.interval();
        if interval.is_zero() {
            return Err(RegistrationError::ZeroInterval { job: name });
        }
        if interval < self.min_interval {
            return Err(RegistrationError::IntervalTooShort {
                job: name,
                interval,
                minimum: self.min_interval,
            });
        }

        if self.jobs.insert(name.clone(), job).is_some() {
            tracing::warn!(job = %name, "scheduler: job registered twice; previous registration replaced");
        } else {
            tracing::debug!(job = %name, ?interval, "scheduler: job registered");
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Job>> {
        self.jobs.get(name).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn jobs(&self) -> impl Iterator<Item = &Arc<dyn Job>> {
        self.jobs.values()
    }

    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.names())
            .field("min_interval", &self.min_interval)
            .finish()
    }
}
