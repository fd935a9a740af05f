//! Summary-job orchestration: idempotent start, background extraction,
//! quality gating, and the exactly-once terminal transition.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use dealroom_core::{
    defaults, Error, EventBus, ExtractionModel, FieldValue, IssueSeverity, JobOutcome, JobStatus,
    QualityIssue, Result, ServerEvent, SummaryJob, SummaryJobRepository, SummaryTemplate,
};

use crate::quality;
use crate::templates::TemplateRegistry;

/// Configuration for the job orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Age beyond which a running job is considered stalled and replaced
    /// on the next non-forced start (seconds).
    pub stall_threshold_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            stall_threshold_secs: defaults::JOB_STALL_THRESHOLD_SECS,
        }
    }
}

impl OrchestratorConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_STALL_THRESHOLD_SECS` | `600` | Running-job stall threshold |
    pub fn from_env() -> Self {
        Self {
            stall_threshold_secs: std::env::var("JOB_STALL_THRESHOLD_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults::JOB_STALL_THRESHOLD_SECS),
        }
    }

    pub fn with_stall_threshold_secs(mut self, secs: u64) -> Self {
        self.stall_threshold_secs = secs;
        self
    }
}

/// Orchestrates asynchronous structured-summary extraction jobs.
///
/// Jobs run as independent background tasks; the orchestrator is the only
/// writer of job records. Once running, a job is not user-cancellable and
/// always reaches a terminal state.
pub struct SummaryJobOrchestrator {
    jobs: Arc<dyn SummaryJobRepository>,
    model: Arc<dyn ExtractionModel>,
    templates: Arc<TemplateRegistry>,
    events: EventBus,
    config: OrchestratorConfig,
}

impl SummaryJobOrchestrator {
    pub fn new(
        jobs: Arc<dyn SummaryJobRepository>,
        model: Arc<dyn ExtractionModel>,
        templates: Arc<TemplateRegistry>,
        events: EventBus,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            jobs,
            model,
            templates,
            events,
            config,
        }
    }

    /// Start an extraction job, or return the existing one per the dedupe
    /// rule: a non-forced request reuses any prior job for the same
    /// (document, template) whose status is not `error`.
    #[instrument(skip(self), fields(document_id = %document_id, template_key))]
    pub async fn start(&self, document_id: Uuid, template_key: &str, force: bool) -> Result<Uuid> {
        let template = self
            .templates
            .get(template_key)
            .ok_or_else(|| Error::Validation(format!("unknown template \"{}\"", template_key)))?
            .clone();

        let creation = self
            .jobs
            .create_deduplicated(
                document_id,
                template_key,
                force,
                Duration::from_secs(self.config.stall_threshold_secs),
            )
            .await?;

        if !creation.created {
            info!(job_id = %creation.job_id, "Reusing existing job (dedupe hit)");
            return Ok(creation.job_id);
        }

        self.events.emit(ServerEvent::JobQueued {
            job_id: creation.job_id,
            document_id,
            template_key: template_key.to_string(),
        });

        let run = ExtractionRun {
            jobs: self.jobs.clone(),
            model: self.model.clone(),
            events: self.events.clone(),
            template,
            job_id: creation.job_id,
            document_id,
        };
        tokio::spawn(run.run());

        Ok(creation.job_id)
    }

    /// Read a job's current state (the polling surface).
    pub async fn get(&self, job_id: Uuid) -> Result<SummaryJob> {
        self.jobs.get(job_id).await
    }

    /// All jobs ever run for a document, newest first.
    pub async fn list_for_document(&self, document_id: Uuid) -> Result<Vec<SummaryJob>> {
        self.jobs.list_for_document(document_id).await
    }
}

/// State for one spawned extraction run.
struct ExtractionRun {
    jobs: Arc<dyn SummaryJobRepository>,
    model: Arc<dyn ExtractionModel>,
    events: EventBus,
    template: SummaryTemplate,
    job_id: Uuid,
    document_id: Uuid,
}

impl ExtractionRun {
    #[instrument(skip(self), fields(job_id = %self.job_id, template_key = %self.template.key))]
    async fn run(self) {
        let started = Instant::now();

        if let Err(e) = self.jobs.claim(self.job_id).await {
            warn!(job_id = %self.job_id, error = %e, "Failed to claim job");
            return;
        }
        self.events.emit(ServerEvent::JobStarted {
            job_id: self.job_id,
            document_id: self.document_id,
        });

        // Fields are independent: each extracts concurrently, a failure in
        // one never aborts the others.
        let extractions = self.template.fields.iter().map(|spec| {
            let model = self.model.clone();
            let document_id = self.document_id;
            let spec = spec.clone();
            async move {
                match model.extract_field(document_id, &spec).await {
                    Ok(ext) => {
                        let field = match ext.raw {
                            Some(raw) => FieldValue::extracted(
                                &spec.key,
                                spec.field_type,
                                raw,
                                ext.confidence,
                                ext.source_page,
                                ext.evidence,
                            ),
                            None => FieldValue::missing(&spec.key, spec.field_type),
                        };
                        (field, None)
                    }
                    Err(e) => {
                        warn!(field_key = %spec.key, error = %e, "Field extraction failed");
                        let issue = QualityIssue {
                            severity: IssueSeverity::Medium,
                            field_key: Some(spec.key.clone()),
                            message: format!("extraction failed: {}", e),
                            remediation: Some("re-run with force once resolved".to_string()),
                        };
                        (FieldValue::missing(&spec.key, spec.field_type), Some(issue))
                    }
                }
            }
        });

        let mut fields = Vec::with_capacity(self.template.fields.len());
        let mut issues = Vec::new();
        let mut extraction_failures = 0usize;
        for (field, issue) in join_all(extractions).await {
            if let Some(issue) = issue {
                extraction_failures += 1;
                issues.push(issue);
            }
            fields.push(field);
        }

        let duration_ms = started.elapsed().as_millis() as i64;
        let usable = fields.iter().any(|f| !f.is_null());

        let outcome = if !usable {
            // No usable output at all: document unreadable or every field
            // failed.
            issues.push(QualityIssue {
                severity: IssueSeverity::High,
                field_key: None,
                message: "no field could be extracted from the document".to_string(),
                remediation: Some("check that the document is readable".to_string()),
            });
            JobOutcome {
                status: JobStatus::Error,
                coverage: 0.0,
                avg_confidence: 0.0,
                quality_pass: false,
                fields,
                issues,
                error_message: Some("no usable output produced".to_string()),
            }
        } else {
            // Quality gates are computed only here, at the terminal
            // transition.
            let report = quality::evaluate(&fields, &self.template);
            issues.extend(report.issues);
            let status = if report.quality_pass && extraction_failures == 0 {
                JobStatus::Success
            } else {
                JobStatus::Partial
            };
            JobOutcome {
                status,
                coverage: report.coverage,
                avg_confidence: report.avg_confidence,
                quality_pass: report.quality_pass,
                fields,
                issues,
                error_message: None,
            }
        };

        let status = outcome.status;
        let quality_pass = outcome.quality_pass;
        let error_message = outcome.error_message.clone();

        if let Err(e) = self.jobs.complete(self.job_id, outcome).await {
            warn!(job_id = %self.job_id, error = %e, "Failed to persist terminal transition");
            return;
        }

        info!(
            job_id = %self.job_id,
            ?status,
            quality_pass,
            duration_ms,
            "Summary job reached terminal state"
        );
        match status {
            JobStatus::Error => self.events.emit(ServerEvent::JobFailed {
                job_id: self.job_id,
                document_id: self.document_id,
                error: error_message.unwrap_or_else(|| "extraction failed".to_string()),
            }),
            _ => self.events.emit(ServerEvent::JobCompleted {
                job_id: self.job_id,
                document_id: self.document_id,
                status,
                quality_pass,
                duration_ms: Some(duration_ms),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orchestrator_config_default() {
        let config = OrchestratorConfig::default();
        assert_eq!(
            config.stall_threshold_secs,
            defaults::JOB_STALL_THRESHOLD_SECS
        );
    }

    #[test]
    fn test_orchestrator_config_builder() {
        let config = OrchestratorConfig::default().with_stall_threshold_secs(60);
        assert_eq!(config.stall_threshold_secs, 60);
    }
}
