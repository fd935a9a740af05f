//! Domain types for the dealroom Q&A and summary-extraction core.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults;

// =============================================================================
// QUERY & STREAMING TYPES
// =============================================================================

/// Terminal classification of a completed answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    /// Answer backed by at least one corpus citation.
    Grounded,
    /// The corpus had no adequate grounding; not a failure.
    InsufficientEvidence,
    /// The stream terminated with an error before an answer was produced.
    Error,
}

/// Error classification carried on a terminal `error` stream event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamErrorKind {
    Validation,
    Retrieval,
    Model,
    RateLimited,
    TransportInterrupted,
}

/// Timing metrics captured for one query exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub retrieval_ms: u64,
    pub generation_ms: u64,
    pub total_ms: u64,
    /// Passages above the relevance floor handed to the model.
    pub passage_count: usize,
}

/// Location of cited evidence inside a source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CitationSpan {
    /// Character range within the page text.
    CharRange { start: usize, end: usize },
    /// Opaque chunk identifier from the corpus index.
    Chunk { chunk_id: String },
}

/// Evidence reference inside an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub document_id: Uuid,
    pub document_title: String,
    pub page: u32,
    pub span: CitationSpan,
    /// Text preview, truncated to [`defaults::PREVIEW_MAX_CHARS`].
    pub preview: String,
    /// Relevance score in [0,1].
    pub relevance: f64,
    /// 1-based rank; relevance is non-increasing in rank order.
    pub rank: u32,
}

/// Truncate a preview string to `max` characters on a char boundary.
pub fn truncate_preview(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

/// Order passages into ranked citations.
///
/// Sorts by descending relevance, ties broken by document id then page so
/// the ordering is deterministic, and assigns 1-based ranks in that order.
pub fn rank_citations(passages: &[Passage]) -> Vec<Citation> {
    let mut sorted: Vec<&Passage> = passages.iter().collect();
    sorted.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document_id.cmp(&b.document_id))
            .then_with(|| a.page.cmp(&b.page))
    });

    sorted
        .into_iter()
        .enumerate()
        .map(|(i, p)| Citation {
            document_id: p.document_id,
            document_title: p.document_title.clone(),
            page: p.page,
            span: match &p.chunk_id {
                Some(id) => CitationSpan::Chunk {
                    chunk_id: id.clone(),
                },
                None => CitationSpan::CharRange {
                    start: 0,
                    end: p.text.len(),
                },
            },
            preview: truncate_preview(&p.text, defaults::PREVIEW_MAX_CHARS),
            relevance: p.relevance,
            rank: (i + 1) as u32,
        })
        .collect()
}

/// Atomic unit delivered over the stream transport.
///
/// Serialized with a `type` tag, e.g. `{"type":"chunk","text":"..."}`.
/// Exactly one `complete` or `error` event terminates a stream; no events
/// follow termination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental answer text in generation order.
    Chunk { text: String },
    /// One citation, emitted in descending relevance order.
    Citation { citation: Citation },
    /// Successful terminal event.
    Complete {
        query_id: Uuid,
        answer_type: AnswerType,
        metrics: QueryMetrics,
    },
    /// Failure terminal event.
    Error {
        kind: StreamErrorKind,
        message: String,
        retry_allowed: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_seconds: Option<u64>,
    },
}

impl StreamEvent {
    /// Wire-level event name used in framing.
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamEvent::Chunk { .. } => "chunk",
            StreamEvent::Citation { .. } => "citation",
            StreamEvent::Complete { .. } => "complete",
            StreamEvent::Error { .. } => "error",
        }
    }

    /// Whether this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Complete { .. } | StreamEvent::Error { .. }
        )
    }
}

/// One question/answer exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub id: Uuid,
    /// Data-room scope the question was asked against.
    pub room_id: Uuid,
    pub question: String,
    /// None until the stream completes.
    pub answer: Option<String>,
    /// Set exactly once, at stream completion.
    pub answer_type: Option<AnswerType>,
    /// Append-only during streaming, immutable afterwards.
    pub citations: Vec<Citation>,
    pub metrics: Option<QueryMetrics>,
    pub feedback: Option<Feedback>,
    pub created_at: DateTime<Utc>,
}

impl Query {
    /// Whether the exchange reached a terminal state.
    pub fn is_final(&self) -> bool {
        self.answer_type.is_some()
    }
}

/// Request to record a newly submitted question (attributed, no answer yet).
#[derive(Debug, Clone)]
pub struct NewQuery {
    pub id: Uuid,
    pub room_id: Uuid,
    pub question: String,
}

/// Terminal outcome applied to a query exactly once.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub answer: Option<String>,
    pub answer_type: AnswerType,
    pub citations: Vec<Citation>,
    pub metrics: QueryMetrics,
}

/// One page of query history, newest first.
#[derive(Debug, Clone)]
pub struct QueryPage {
    pub queries: Vec<Query>,
    /// Cursor for the next page; None when exhausted.
    pub next_cursor: Option<DateTime<Utc>>,
}

/// Validate and trim a question, enforcing the length bounds.
pub fn validate_question(question: &str) -> crate::Result<&str> {
    let trimmed = question.trim();
    let len = trimmed.chars().count();
    if len < defaults::QUESTION_MIN_CHARS {
        return Err(crate::Error::Validation(format!(
            "question must be at least {} characters, got {}",
            defaults::QUESTION_MIN_CHARS,
            len
        )));
    }
    if len > defaults::QUESTION_MAX_CHARS {
        return Err(crate::Error::Validation(format!(
            "question must be at most {} characters, got {}",
            defaults::QUESTION_MAX_CHARS,
            len
        )));
    }
    Ok(trimmed)
}

// =============================================================================
// FEEDBACK TYPES
// =============================================================================

/// Helpful/not-helpful rating on a finished query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackRating {
    Helpful,
    NotHelpful,
}

/// Feedback attached to a query. One record per query; resubmission overwrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub rating: FeedbackRating,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// CORPUS & SCOPE TYPES
// =============================================================================

/// Document scope handed to corpus retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomScope {
    pub room_id: Uuid,
    /// Documents visible to this query. Empty means the whole room.
    pub document_ids: Vec<Uuid>,
}

impl RoomScope {
    pub fn whole_room(room_id: Uuid) -> Self {
        Self {
            room_id,
            document_ids: Vec::new(),
        }
    }
}

/// Ranked passage returned by the corpus index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub document_id: Uuid,
    pub document_title: String,
    pub page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    pub text: String,
    /// Relevance score in [0,1].
    pub relevance: f64,
}

// =============================================================================
// SUMMARY JOB TYPES
// =============================================================================

/// Status of a summary-extraction job.
///
/// Transitions are monotonic forward only:
/// `queued -> running -> {success | partial | error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Success,
    Partial,
    Error,
}

impl JobStatus {
    /// Whether no further automatic transition occurs from this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Partial | JobStatus::Error)
    }

    /// Whether a transition to `next` moves strictly forward.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            JobStatus::Queued => next == JobStatus::Running || next.is_terminal(),
            JobStatus::Running => next.is_terminal(),
            _ => false,
        }
    }
}

/// One asynchronous extraction run. Never deleted; superseded by re-runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryJob {
    pub id: Uuid,
    pub document_id: Uuid,
    pub template_key: String,
    pub status: JobStatus,
    /// Fraction of required fields extracted with a non-null value.
    pub coverage: f64,
    /// Mean confidence over non-null fields.
    pub avg_confidence: f64,
    /// Computed only on reaching success or partial.
    pub quality_pass: bool,
    pub fields: Vec<FieldValue>,
    pub issues: Vec<QualityIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of an idempotent job-creation request.
#[derive(Debug, Clone, Copy)]
pub struct JobCreation {
    pub job_id: Uuid,
    /// False when an existing job was reused (dedupe hit).
    pub created: bool,
}

/// Terminal outcome applied to a job exactly once.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    /// Must be terminal (`success`, `partial`, or `error`).
    pub status: JobStatus,
    pub coverage: f64,
    pub avg_confidence: f64,
    pub quality_pass: bool,
    pub fields: Vec<FieldValue>,
    pub issues: Vec<QualityIssue>,
    pub error_message: Option<String>,
}

// =============================================================================
// FIELD EXTRACTION TYPES
// =============================================================================

/// Semantic type of a template field; discriminates the typed value shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Date,
    Currency,
    Boolean,
    Duration,
    Number,
}

/// Typed value of an extracted field, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TypedValue {
    Text(String),
    Date(NaiveDate),
    Currency { amount: f64, currency: String },
    Boolean(bool),
    DurationDays(i64),
    Number(f64),
    Null,
}

impl TypedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, TypedValue::Null)
    }

    /// Coerce raw extracted text into a typed value for the given field type.
    ///
    /// Returns `Null` when the raw text cannot be coerced; the quality gate
    /// flags the mismatch separately.
    pub fn coerce(field_type: FieldType, raw: &str) -> TypedValue {
        let raw = raw.trim();
        if raw.is_empty() {
            return TypedValue::Null;
        }
        match field_type {
            FieldType::Text => TypedValue::Text(raw.to_string()),
            FieldType::Date => parse_date(raw)
                .map(TypedValue::Date)
                .unwrap_or(TypedValue::Null),
            FieldType::Currency => parse_currency(raw)
                .map(|(amount, currency)| TypedValue::Currency { amount, currency })
                .unwrap_or(TypedValue::Null),
            FieldType::Boolean => parse_boolean(raw)
                .map(TypedValue::Boolean)
                .unwrap_or(TypedValue::Null),
            FieldType::Duration => parse_duration_days(raw)
                .map(TypedValue::DurationDays)
                .unwrap_or(TypedValue::Null),
            FieldType::Number => parse_number(raw)
                .map(TypedValue::Number)
                .unwrap_or(TypedValue::Null),
        }
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    for fmt in ["%Y-%m-%d", "%m/%d/%Y", "%d %B %Y", "%B %d, %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d);
        }
    }
    None
}

fn parse_currency(raw: &str) -> Option<(f64, String)> {
    let currency = if raw.contains('€') {
        "EUR"
    } else if raw.contains('£') {
        "GBP"
    } else {
        // Trailing ISO code wins over the default
        let upper = raw.to_uppercase();
        if upper.ends_with("EUR") {
            "EUR"
        } else if upper.ends_with("GBP") {
            "GBP"
        } else {
            "USD"
        }
    };

    let amount = parse_number(raw)?;
    let multiplier = match raw.to_lowercase() {
        s if s.contains('b') && s.contains("illion") || s.trim_end().ends_with('b') => 1e9,
        s if s.contains("million") || s.trim_end().ends_with('m') => 1e6,
        s if s.trim_end().ends_with('k') => 1e3,
        _ => 1.0,
    };
    Some((amount * multiplier, currency.to_string()))
}

fn parse_boolean(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "yes" | "y" => Some(true),
        "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn parse_duration_days(raw: &str) -> Option<i64> {
    let value = parse_number(raw)?;
    let lower = raw.to_lowercase();
    let days = if lower.contains("year") {
        value * 365.0
    } else if lower.contains("month") {
        value * 30.0
    } else if lower.contains("week") {
        value * 7.0
    } else {
        value
    };
    Some(days.round() as i64)
}

fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// How a field value was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Manual,
    AiExtracted,
}

/// One extracted field's result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldValue {
    pub key: String,
    pub field_type: FieldType,
    /// Raw extracted text, before type coercion.
    pub raw: Option<String>,
    pub value: TypedValue,
    /// Confidence in [0,1]; always 0 when value is null.
    pub confidence: f64,
    pub method: ExtractionMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

impl FieldValue {
    /// A successfully extracted value. Forces confidence to 0 if the coerced
    /// value turned out null.
    pub fn extracted(
        key: impl Into<String>,
        field_type: FieldType,
        raw: impl Into<String>,
        confidence: f64,
        source_page: Option<u32>,
        evidence: Option<String>,
    ) -> Self {
        let raw = raw.into();
        let value = TypedValue::coerce(field_type, &raw);
        let confidence = if value.is_null() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            key: key.into(),
            field_type,
            raw: Some(raw),
            value,
            confidence,
            method: ExtractionMethod::AiExtracted,
            source_page,
            evidence,
        }
    }

    /// A field that could not be extracted. Null value, zero confidence.
    pub fn missing(key: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            key: key.into(),
            field_type,
            raw: None,
            value: TypedValue::Null,
            confidence: 0.0,
            method: ExtractionMethod::AiExtracted,
            source_page: None,
            evidence: None,
        }
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }
}

/// Raw per-field output of the extraction model.
#[derive(Debug, Clone)]
pub struct FieldExtraction {
    pub raw: Option<String>,
    pub confidence: f64,
    pub source_page: Option<u32>,
    pub evidence: Option<String>,
}

// =============================================================================
// QUALITY TYPES
// =============================================================================

/// Severity of a quality issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
}

/// A defect found during extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: IssueSeverity,
    /// None for job-level issues.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_key: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

// =============================================================================
// TEMPLATE TYPES
// =============================================================================

/// One field an extraction template asks for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub key: String,
    pub label: String,
    pub field_type: FieldType,
    /// Required fields count against coverage when missing.
    pub required: bool,
    /// Optional hint passed to the extraction model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// A structured-summary extraction template with its quality thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryTemplate {
    pub key: String,
    pub name: String,
    pub fields: Vec<FieldSpec>,
    /// Minimum coverage for quality_pass, in [0,1].
    pub required_coverage: f64,
    /// Minimum average confidence for quality_pass, in [0,1].
    pub min_confidence: f64,
}

impl SummaryTemplate {
    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }

    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }
}

/// Options controlling export serialization.
#[derive(Debug, Clone, Copy)]
pub struct ExportOptions {
    pub include_confidence: bool,
    pub include_evidence: bool,
    pub include_issues: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_confidence: true,
            include_evidence: true,
            include_issues: true,
        }
    }
}
