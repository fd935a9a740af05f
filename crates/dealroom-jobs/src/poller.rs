//! Client-side job polling with a bounded wait.
//!
//! Polls the job read surface on a fixed interval until a terminal status,
//! with an upper bound on total duration and a budget for consecutive
//! transient failures. A poller timeout is distinct from a job error: the
//! job may still be running server-side when the poller stops watching.

use std::sync::Arc;

use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use dealroom_core::{defaults, Error, Result, SummaryJob, SummaryJobRepository};

/// Configuration for the job poller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Interval between polls in milliseconds.
    pub interval_ms: u64,
    /// Upper bound on total polling duration in seconds.
    pub timeout_secs: u64,
    /// Consecutive poll failures tolerated before giving up.
    pub max_consecutive_failures: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: defaults::POLL_INTERVAL_MS,
            timeout_secs: defaults::POLL_TIMEOUT_SECS,
            max_consecutive_failures: defaults::POLL_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

impl PollerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_POLL_INTERVAL_MS` | `3000` | Interval between polls |
    /// | `JOB_POLL_TIMEOUT_SECS` | `300` | Total polling bound |
    /// | `JOB_POLL_MAX_FAILURES` | `3` | Consecutive failure budget |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interval_ms: std::env::var("JOB_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.interval_ms),
            timeout_secs: std::env::var("JOB_POLL_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            max_consecutive_failures: std::env::var("JOB_POLL_MAX_FAILURES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_consecutive_failures),
        }
    }

    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max.max(1);
        self
    }
}

/// Polls a job until it reaches a terminal status.
///
/// Each poller instance owns its own timing state; create one per watched
/// job and drop it when done.
pub struct JobPoller {
    jobs: Arc<dyn SummaryJobRepository>,
    config: PollerConfig,
}

impl JobPoller {
    pub fn new(jobs: Arc<dyn SummaryJobRepository>, config: PollerConfig) -> Self {
        Self { jobs, config }
    }

    /// Poll until terminal, returning the final job record.
    pub async fn wait_for_terminal(&self, job_id: Uuid) -> Result<SummaryJob> {
        self.wait_for_terminal_with(job_id, |_| {}).await
    }

    /// Poll until terminal, surfacing every observed snapshot to `on_poll`.
    pub async fn wait_for_terminal_with(
        &self,
        job_id: Uuid,
        mut on_poll: impl FnMut(&SummaryJob),
    ) -> Result<SummaryJob> {
        let interval = Duration::from_millis(self.config.interval_ms);
        let deadline = Instant::now() + Duration::from_secs(self.config.timeout_secs);
        let mut consecutive_failures = 0u32;

        loop {
            match self.jobs.get(job_id).await {
                Ok(job) => {
                    consecutive_failures = 0;
                    on_poll(&job);
                    if job.status.is_terminal() {
                        debug!(job_id = %job_id, status = ?job.status, "Poller observed terminal status");
                        return Ok(job);
                    }
                }
                // A missing job will not appear by polling harder
                Err(e @ Error::JobNotFound(_)) => return Err(e),
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(
                        job_id = %job_id,
                        consecutive_failures,
                        error = %e,
                        "Transient poll failure"
                    );
                    if consecutive_failures >= self.config.max_consecutive_failures {
                        return Err(Error::PollerFailed {
                            attempts: consecutive_failures,
                            last_error: e.to_string(),
                        });
                    }
                }
            }

            if Instant::now() + interval > deadline {
                // Distinct from job error: we stopped watching, the job may
                // still be running.
                return Err(Error::PollerTimeout {
                    waited_secs: self.config.timeout_secs,
                });
            }
            sleep(interval).await;
        }
    }
}
