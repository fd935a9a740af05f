//! In-memory summary-job repository.
//!
//! The dedupe rule and the monotonic status transitions are both enforced
//! here, under a single lock, so concurrent duplicate starts cannot race a
//! check-then-act window and pollers can never observe a backward
//! transition.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use dealroom_core::{
    new_v7, Error, JobCreation, JobOutcome, JobStatus, Result, SummaryJob, SummaryJobRepository,
};

#[derive(Default)]
struct JobStoreInner {
    jobs: HashMap<Uuid, SummaryJob>,
    /// Latest job per (document, template); older jobs stay in `jobs` as the
    /// audit trail.
    latest: HashMap<(Uuid, String), Uuid>,
}

/// In-memory [`SummaryJobRepository`] implementation.
#[derive(Default)]
pub struct InMemoryJobStore {
    inner: Mutex<JobStoreInner>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of job records ever created (test observability).
    pub async fn len(&self) -> usize {
        self.inner.lock().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.jobs.is_empty()
    }

    fn fresh_job(document_id: Uuid, template_key: &str) -> SummaryJob {
        let now = Utc::now();
        SummaryJob {
            id: new_v7(),
            document_id,
            template_key: template_key.to_string(),
            status: JobStatus::Queued,
            coverage: 0.0,
            avg_confidence: 0.0,
            quality_pass: false,
            fields: Vec::new(),
            issues: Vec::new(),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl SummaryJobRepository for InMemoryJobStore {
    async fn create_deduplicated(
        &self,
        document_id: Uuid,
        template_key: &str,
        force: bool,
        stall_threshold: Duration,
    ) -> Result<JobCreation> {
        let mut inner = self.inner.lock().await;
        let dedupe_key = (document_id, template_key.to_string());

        if !force {
            if let Some(&existing_id) = inner.latest.get(&dedupe_key) {
                let existing = inner
                    .jobs
                    .get(&existing_id)
                    .ok_or_else(|| Error::Internal("dangling dedupe index entry".to_string()))?;

                let stalled = existing.status == JobStatus::Running
                    && chrono::Duration::from_std(stall_threshold)
                        .map(|t| Utc::now() - existing.updated_at > t)
                        .unwrap_or(false);

                if stalled {
                    warn!(job_id = %existing_id, "Replacing stalled running job");
                    let job = inner.jobs.get_mut(&existing_id).expect("checked above");
                    job.status = JobStatus::Error;
                    job.error_message = Some("stalled: no progress within threshold".to_string());
                    job.updated_at = Utc::now();
                } else if existing.status != JobStatus::Error {
                    debug!(job_id = %existing_id, "Dedupe hit, reusing existing job");
                    return Ok(JobCreation {
                        job_id: existing_id,
                        created: false,
                    });
                }
            }
        }

        let job = Self::fresh_job(document_id, template_key);
        let job_id = job.id;
        inner.jobs.insert(job_id, job);
        inner.latest.insert(dedupe_key, job_id);
        Ok(JobCreation {
            job_id,
            created: true,
        })
    }

    async fn claim(&self, job_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let job = inner.jobs.get_mut(&job_id).ok_or(Error::JobNotFound(job_id))?;

        if job.status != JobStatus::Queued {
            return Err(Error::Conflict(format!(
                "job {} is {:?}, expected queued",
                job_id, job.status
            )));
        }
        job.status = JobStatus::Running;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn complete(&self, job_id: Uuid, outcome: JobOutcome) -> Result<()> {
        if !outcome.status.is_terminal() {
            return Err(Error::Job(format!(
                "outcome status {:?} is not terminal",
                outcome.status
            )));
        }

        let mut inner = self.inner.lock().await;
        let job = inner.jobs.get_mut(&job_id).ok_or(Error::JobNotFound(job_id))?;

        if !job.status.can_transition_to(outcome.status) {
            return Err(Error::Conflict(format!(
                "job {} cannot transition {:?} -> {:?}",
                job_id, job.status, outcome.status
            )));
        }

        job.status = outcome.status;
        job.coverage = outcome.coverage;
        job.avg_confidence = outcome.avg_confidence;
        job.quality_pass = outcome.quality_pass;
        job.fields = outcome.fields;
        job.issues = outcome.issues;
        job.error_message = outcome.error_message;
        job.updated_at = Utc::now();
        debug!(job_id = %job_id, status = ?job.status, "Job reached terminal state");
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<SummaryJob> {
        self.inner
            .lock()
            .await
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or(Error::JobNotFound(job_id))
    }

    async fn list_for_document(&self, document_id: Uuid) -> Result<Vec<SummaryJob>> {
        let inner = self.inner.lock().await;
        let mut jobs: Vec<SummaryJob> = inner
            .jobs
            .values()
            .filter(|j| j.document_id == document_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(jobs)
    }
}
