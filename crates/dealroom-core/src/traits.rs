//! Trait definitions for external collaborators and repositories.
//!
//! The corpus index, answer model, and extraction model are external
//! services consumed through these seams; repositories own all mutable
//! state in the subsystem. Each record type is written by exactly one
//! component (queries by the executor, jobs by the orchestrator, feedback
//! by the recorder).

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::models::{
    Feedback, FieldExtraction, FieldSpec, JobCreation, JobOutcome, NewQuery, Passage, Query,
    QueryOutcome, QueryPage, RoomScope, SummaryJob,
};
use crate::Result;

/// Stream of generation tokens.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Ranked-passage retrieval over a document corpus. External collaborator.
#[async_trait]
pub trait CorpusIndex: Send + Sync {
    /// Return up to `top_k` passages ranked by relevance for the query,
    /// restricted to the given scope.
    async fn search(&self, query: &str, scope: &RoomScope, top_k: usize) -> Result<Vec<Passage>>;
}

/// Incremental answer generation. External collaborator.
#[async_trait]
pub trait AnswerModel: Send + Sync {
    /// Generate an answer token stream grounded in the given passages.
    ///
    /// Implementations must support mid-generation cancellation: the token
    /// is checked between delivery steps, and backends should abort the
    /// underlying call when it fires.
    async fn generate(
        &self,
        question: &str,
        passages: &[Passage],
        cancel: CancelToken,
    ) -> Result<TokenStream>;
}

/// Per-field structured extraction. External collaborator.
#[async_trait]
pub trait ExtractionModel: Send + Sync {
    /// Extract one template field from a document.
    async fn extract_field(&self, document_id: Uuid, spec: &FieldSpec) -> Result<FieldExtraction>;
}

/// Repository for query exchanges and their feedback.
#[async_trait]
pub trait QueryRepository: Send + Sync {
    /// Record a newly submitted question, attributed but unanswered.
    async fn insert_question(&self, req: NewQuery) -> Result<()>;

    /// Apply the terminal outcome to a query. Rejects a second finalization
    /// with `Error::Conflict` — answer_type is set exactly once.
    async fn finalize(&self, id: Uuid, outcome: QueryOutcome) -> Result<()>;

    /// Fetch a single query.
    async fn get(&self, id: Uuid) -> Result<Query>;

    /// List queries for a room, newest first, cursor-paginated by creation
    /// time.
    async fn list(
        &self,
        room_id: Uuid,
        cursor: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<QueryPage>;

    /// Delete a single query.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Delete many queries; returns how many existed and were removed.
    async fn delete_bulk(&self, ids: &[Uuid]) -> Result<u64>;

    /// Overwrite the feedback record for a query.
    async fn set_feedback(&self, id: Uuid, feedback: Feedback) -> Result<()>;

    /// Remove any feedback record for a query.
    async fn clear_feedback(&self, id: Uuid) -> Result<()>;
}

/// Repository for summary-extraction jobs.
#[async_trait]
pub trait SummaryJobRepository: Send + Sync {
    /// Atomically create a job for (document, template), or return the
    /// existing one per the dedupe rule.
    ///
    /// Non-forced requests reuse any existing job whose status is not
    /// `error`; a `running` job older than `stall_threshold` is treated as
    /// stalled, failed in place, and replaced. The check-and-insert happens
    /// under a single lock so concurrent duplicate starts yield one job.
    async fn create_deduplicated(
        &self,
        document_id: Uuid,
        template_key: &str,
        force: bool,
        stall_threshold: Duration,
    ) -> Result<JobCreation>;

    /// Transition a job from `queued` to `running`.
    async fn claim(&self, job_id: Uuid) -> Result<()>;

    /// Apply the terminal outcome. Rejects non-forward transitions with
    /// `Error::Conflict`; the record is append-only afterwards.
    async fn complete(&self, job_id: Uuid, outcome: JobOutcome) -> Result<()>;

    /// Fetch a single job.
    async fn get(&self, job_id: Uuid) -> Result<SummaryJob>;

    /// All jobs ever run for a document, newest first (audit trail).
    async fn list_for_document(&self, document_id: Uuid) -> Result<Vec<SummaryJob>>;
}
