//! # dealroom-store
//!
//! In-memory repository implementations and export serializers for
//! dealroom.
//!
//! Persistence schema design is out of scope for this core; the
//! repositories here back the [`dealroom_core::QueryRepository`] and
//! [`dealroom_core::SummaryJobRepository`] seams with process-local state
//! while enforcing the same invariants a durable implementation must hold:
//! finalize-exactly-once for queries, atomic dedupe and forward-only
//! status transitions for jobs.

pub mod export;
pub mod jobs;
pub mod queries;

pub use export::{
    export_history_csv, export_history_json, export_summary_csv, export_summary_json,
};
pub use jobs::InMemoryJobStore;
pub use queries::InMemoryQueryStore;
