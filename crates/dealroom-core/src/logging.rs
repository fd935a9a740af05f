//! Structured logging field name constants for dealroom.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized field names across
//! every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data (passages, tokens) |

// Identity fields

/// Correlation ID propagated across request, stream, and job sub-calls.
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "qa", "jobs", "inference", "store"
pub const SUBSYSTEM: &str = "subsystem";

/// Logical operation name.
/// Examples: "execute", "search", "extract_field", "poll"
pub const OPERATION: &str = "op";

// Entity fields

/// Query UUID being streamed.
pub const QUERY_ID: &str = "query_id";

/// Data-room scope UUID.
pub const ROOM_ID: &str = "room_id";

/// Summary job UUID.
pub const JOB_ID: &str = "job_id";

/// Source document UUID.
pub const DOCUMENT_ID: &str = "document_id";

/// Extraction template key.
pub const TEMPLATE_KEY: &str = "template_key";

/// Template field key being extracted.
pub const FIELD_KEY: &str = "field_key";

// Measurement fields

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Passages above the relevance floor for a query.
pub const PASSAGE_COUNT: &str = "passage_count";

/// Chunk events emitted on a stream.
pub const CHUNK_COUNT: &str = "chunk_count";

/// Coverage computed by the quality gate.
pub const COVERAGE: &str = "coverage";

/// Average confidence computed by the quality gate.
pub const AVG_CONFIDENCE: &str = "avg_confidence";

// Outcome fields

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
