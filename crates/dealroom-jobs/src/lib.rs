//! # dealroom-jobs
//!
//! Asynchronous structured-summary extraction for dealroom.
//!
//! This crate provides:
//! - [`SummaryJobOrchestrator`]: idempotent job creation with atomic
//!   dedupe, background field-by-field extraction, and exactly-once
//!   terminal transitions.
//! - [`quality::evaluate`]: the pure quality gate combining coverage and
//!   confidence thresholds per template.
//! - [`JobPoller`]: the client-side bounded polling loop.
//! - [`TemplateRegistry`]: built-in and custom extraction templates.
//!
//! ## Example
//!
//! ```ignore
//! use dealroom_jobs::{SummaryJobOrchestrator, JobPoller, PollerConfig, TemplateRegistry};
//!
//! let orchestrator = SummaryJobOrchestrator::new(jobs, model, templates, events, config);
//! let job_id = orchestrator.start(document_id, "financial_v1", false).await?;
//!
//! let poller = JobPoller::new(jobs, PollerConfig::default());
//! let finished = poller.wait_for_terminal(job_id).await?;
//! ```

pub mod orchestrator;
pub mod poller;
pub mod quality;
pub mod templates;

pub use orchestrator::{OrchestratorConfig, SummaryJobOrchestrator};
pub use poller::{JobPoller, PollerConfig};
pub use quality::{evaluate, QualityReport};
pub use templates::{financial_v1, legal_v1, TemplateRegistry};
