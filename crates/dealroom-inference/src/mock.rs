//! Mock collaborators for deterministic testing.
//!
//! Provides mock implementations of the corpus index, answer model, and
//! extraction model with call logging, so tests can assert call counts
//! (e.g. "the model is never invoked on empty evidence") and script
//! failures without touching the network.
//!
//! ## Usage
//!
//! ```ignore
//! let model = MockAnswerModel::new().with_script(["ARR ", "grew ", "45%"]);
//! let index = MockCorpusIndex::new().with_passage(passage);
//!
//! // ... run a query through the executor ...
//! assert_eq!(model.generate_call_count(), 1);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use uuid::Uuid;

use dealroom_core::{
    AnswerModel, CancelToken, CorpusIndex, Error, ExtractionModel, FieldExtraction, FieldSpec,
    Passage, Result, RoomScope, TokenStream,
};

// =============================================================================
// MOCK CORPUS INDEX
// =============================================================================

/// Mock corpus index returning configured passages.
#[derive(Clone, Default)]
pub struct MockCorpusIndex {
    passages: Arc<Mutex<Vec<Passage>>>,
    fail_with: Arc<Mutex<Option<String>>>,
    call_log: Arc<Mutex<Vec<String>>>,
}

impl MockCorpusIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one passage to the index.
    pub fn with_passage(self, passage: Passage) -> Self {
        self.passages.lock().unwrap().push(passage);
        self
    }

    /// Add several passages to the index.
    pub fn with_passages(self, passages: impl IntoIterator<Item = Passage>) -> Self {
        self.passages.lock().unwrap().extend(passages);
        self
    }

    /// Make every search fail with a retrieval error.
    pub fn failing(self, message: impl Into<String>) -> Self {
        *self.fail_with.lock().unwrap() = Some(message.into());
        self
    }

    /// Number of search calls observed.
    pub fn search_call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }

    /// Queries observed, in call order.
    pub fn searched_queries(&self) -> Vec<String> {
        self.call_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl CorpusIndex for MockCorpusIndex {
    async fn search(&self, query: &str, scope: &RoomScope, top_k: usize) -> Result<Vec<Passage>> {
        self.call_log.lock().unwrap().push(query.to_string());

        if let Some(msg) = self.fail_with.lock().unwrap().clone() {
            return Err(Error::Retrieval(msg));
        }

        let mut hits: Vec<Passage> = self
            .passages
            .lock()
            .unwrap()
            .iter()
            .filter(|p| {
                scope.document_ids.is_empty() || scope.document_ids.contains(&p.document_id)
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

// =============================================================================
// MOCK ANSWER MODEL
// =============================================================================

#[derive(Debug, Clone)]
enum AnswerFailure {
    None,
    /// Fail before any token is produced.
    Immediate(String),
    /// Fail with a rate limit carrying a retry-after.
    RateLimited(u64),
    /// Yield `after` tokens, then fail mid-stream.
    MidStream { after: usize, message: String },
}

/// Mock answer model streaming a scripted token sequence.
#[derive(Clone)]
pub struct MockAnswerModel {
    script: Arc<Mutex<Vec<String>>>,
    failure: Arc<Mutex<AnswerFailure>>,
    token_delay_ms: u64,
    failure_rate: f64,
    call_log: Arc<Mutex<Vec<String>>>,
}

impl Default for MockAnswerModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAnswerModel {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(vec!["Mock ".to_string(), "answer".to_string()])),
            failure: Arc::new(Mutex::new(AnswerFailure::None)),
            token_delay_ms: 0,
            failure_rate: 0.0,
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the token sequence the model streams.
    pub fn with_script(self, tokens: impl IntoIterator<Item = impl Into<String>>) -> Self {
        *self.script.lock().unwrap() = tokens.into_iter().map(Into::into).collect();
        self
    }

    /// Delay between tokens, to exercise backpressure and cancellation.
    pub fn with_token_delay_ms(mut self, delay_ms: u64) -> Self {
        self.token_delay_ms = delay_ms;
        self
    }

    /// Fail every generation before the first token.
    pub fn failing(self, message: impl Into<String>) -> Self {
        *self.failure.lock().unwrap() = AnswerFailure::Immediate(message.into());
        self
    }

    /// Fail every generation with a rate limit.
    pub fn rate_limited(self, retry_after_secs: u64) -> Self {
        *self.failure.lock().unwrap() = AnswerFailure::RateLimited(retry_after_secs);
        self
    }

    /// Yield `after` tokens, then fail mid-stream.
    pub fn failing_after(self, after: usize, message: impl Into<String>) -> Self {
        *self.failure.lock().unwrap() = AnswerFailure::MidStream {
            after,
            message: message.into(),
        };
        self
    }

    /// Random failure rate (0.0 - 1.0) for resilience testing.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Clear any scripted failure, so subsequent calls succeed (used to
    /// test retry flows).
    pub fn clear_failure(&self) {
        *self.failure.lock().unwrap() = AnswerFailure::None;
    }

    /// Number of generate calls observed.
    pub fn generate_call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }

    fn should_fail_randomly(&self) -> bool {
        use rand::Rng;
        self.failure_rate > 0.0 && rand::thread_rng().gen::<f64>() < self.failure_rate
    }
}

#[async_trait]
impl AnswerModel for MockAnswerModel {
    async fn generate(
        &self,
        question: &str,
        _passages: &[Passage],
        cancel: CancelToken,
    ) -> Result<TokenStream> {
        self.call_log.lock().unwrap().push(question.to_string());

        if self.should_fail_randomly() {
            return Err(Error::Model("Simulated random failure".to_string()));
        }

        let failure = self.failure.lock().unwrap().clone();
        let script = self.script.lock().unwrap().clone();

        let items: Vec<Result<String>> = match failure {
            AnswerFailure::Immediate(msg) => return Err(Error::Model(msg)),
            AnswerFailure::RateLimited(retry_after_secs) => {
                return Err(Error::RateLimited { retry_after_secs })
            }
            AnswerFailure::MidStream { after, message } => {
                let mut items: Vec<Result<String>> =
                    script.into_iter().take(after).map(Ok).collect();
                items.push(Err(Error::Model(message)));
                items
            }
            AnswerFailure::None => script.into_iter().map(Ok).collect(),
        };

        let delay_ms = self.token_delay_ms;
        let mut cancel = cancel;
        let stream = futures::stream::iter(items)
            .then(move |item| async move {
                if delay_ms > 0 {
                    tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                }
                item
            })
            .take_until(Box::pin(async move { cancel.cancelled().await }));

        Ok(Box::pin(stream))
    }
}

// =============================================================================
// MOCK EXTRACTION MODEL
// =============================================================================

#[derive(Debug, Clone)]
enum FieldScript {
    Found {
        raw: String,
        confidence: f64,
        page: Option<u32>,
        evidence: Option<String>,
    },
    Missing,
    Fail(String),
}

/// Mock extraction model with per-field scripted results.
#[derive(Clone, Default)]
pub struct MockExtractionModel {
    fields: Arc<Mutex<HashMap<String, FieldScript>>>,
    latency_ms: u64,
    call_log: Arc<Mutex<Vec<String>>>,
}

impl MockExtractionModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful extraction for a field key.
    pub fn with_field(
        self,
        key: impl Into<String>,
        raw: impl Into<String>,
        confidence: f64,
        page: Option<u32>,
    ) -> Self {
        let raw = raw.into();
        let evidence = Some(format!("...{}...", raw));
        self.fields.lock().unwrap().insert(
            key.into(),
            FieldScript::Found {
                raw,
                confidence,
                page,
                evidence,
            },
        );
        self
    }

    /// Script a field the model cannot find (null value, zero confidence).
    pub fn with_missing_field(self, key: impl Into<String>) -> Self {
        self.fields
            .lock()
            .unwrap()
            .insert(key.into(), FieldScript::Missing);
        self
    }

    /// Script a hard extraction failure for a field key.
    pub fn with_failing_field(self, key: impl Into<String>, message: impl Into<String>) -> Self {
        self.fields
            .lock()
            .unwrap()
            .insert(key.into(), FieldScript::Fail(message.into()));
        self
    }

    /// Simulated latency per extraction call.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Number of extract calls observed.
    pub fn extract_call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }

    /// Field keys observed, in call order.
    pub fn extracted_keys(&self) -> Vec<String> {
        self.call_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtractionModel for MockExtractionModel {
    async fn extract_field(&self, _document_id: Uuid, spec: &FieldSpec) -> Result<FieldExtraction> {
        self.call_log.lock().unwrap().push(spec.key.clone());

        if self.latency_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.latency_ms)).await;
        }

        let script = self.fields.lock().unwrap().get(&spec.key).cloned();
        match script {
            Some(FieldScript::Found {
                raw,
                confidence,
                page,
                evidence,
            }) => Ok(FieldExtraction {
                raw: Some(raw),
                confidence,
                source_page: page,
                evidence,
            }),
            Some(FieldScript::Fail(msg)) => Err(Error::Extraction(msg)),
            Some(FieldScript::Missing) | None => Ok(FieldExtraction {
                raw: None,
                confidence: 0.0,
                source_page: None,
                evidence: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealroom_core::FieldType;

    fn passage(relevance: f64) -> Passage {
        Passage {
            document_id: Uuid::new_v4(),
            document_title: "doc".to_string(),
            page: 1,
            chunk_id: None,
            text: "text".to_string(),
            relevance,
        }
    }

    fn spec(key: &str) -> FieldSpec {
        FieldSpec {
            key: key.to_string(),
            label: key.to_string(),
            field_type: FieldType::Text,
            required: true,
            hint: None,
        }
    }

    #[tokio::test]
    async fn test_mock_index_returns_top_k_sorted() {
        let index = MockCorpusIndex::new()
            .with_passage(passage(0.2))
            .with_passage(passage(0.9))
            .with_passage(passage(0.5));

        let scope = RoomScope::whole_room(Uuid::new_v4());
        let hits = index.search("q", &scope, 2).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].relevance, 0.9);
        assert_eq!(hits[1].relevance, 0.5);
        assert_eq!(index.search_call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_index_scope_filter() {
        let keep = passage(0.9);
        let keep_id = keep.document_id;
        let index = MockCorpusIndex::new()
            .with_passage(keep)
            .with_passage(passage(0.8));

        let scope = RoomScope {
            room_id: Uuid::new_v4(),
            document_ids: vec![keep_id],
        };
        let hits = index.search("q", &scope, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, keep_id);
    }

    #[tokio::test]
    async fn test_mock_index_failing() {
        let index = MockCorpusIndex::new().failing("index offline");
        let scope = RoomScope::whole_room(Uuid::new_v4());
        let err = index.search("q", &scope, 5).await.unwrap_err();
        assert!(matches!(err, Error::Retrieval(_)));
    }

    #[tokio::test]
    async fn test_mock_answer_model_streams_script() {
        let model = MockAnswerModel::new().with_script(["a", "b", "c"]);
        let (_handle, token) = dealroom_core::cancel_pair();

        let mut stream = model.generate("question?", &[], token).await.unwrap();
        let mut tokens = Vec::new();
        while let Some(item) = stream.next().await {
            tokens.push(item.unwrap());
        }
        assert_eq!(tokens, vec!["a", "b", "c"]);
        assert_eq!(model.generate_call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_answer_model_failing() {
        let model = MockAnswerModel::new().failing("boom");
        let (_handle, token) = dealroom_core::cancel_pair();
        let err = match model.generate("question?", &[], token).await {
            Ok(_) => panic!("expected generate to fail"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::Model(_)));
    }

    #[tokio::test]
    async fn test_mock_answer_model_failing_after() {
        let model = MockAnswerModel::new()
            .with_script(["a", "b", "c"])
            .failing_after(2, "mid-stream failure");
        let (_handle, token) = dealroom_core::cancel_pair();

        let mut stream = model.generate("question?", &[], token).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        assert_eq!(stream.next().await.unwrap().unwrap(), "b");
        assert!(stream.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_mock_answer_model_cancellation_stops_stream() {
        let model = MockAnswerModel::new()
            .with_script(["a", "b", "c", "d"])
            .with_token_delay_ms(10);
        let (handle, token) = dealroom_core::cancel_pair();

        let mut stream = model.generate("question?", &[], token).await.unwrap();
        assert!(stream.next().await.is_some());
        handle.cancel();
        // Remaining tokens are dropped once cancellation fires
        let mut remaining = 0;
        while stream.next().await.is_some() {
            remaining += 1;
        }
        assert!(remaining < 3);
    }

    #[tokio::test]
    async fn test_mock_extraction_model_scripts() {
        let model = MockExtractionModel::new()
            .with_field("arr", "$4.2M", 0.92, Some(12))
            .with_failing_field("ebitda", "page unreadable");

        let doc = Uuid::new_v4();
        let found = model.extract_field(doc, &spec("arr")).await.unwrap();
        assert_eq!(found.raw.as_deref(), Some("$4.2M"));
        assert_eq!(found.source_page, Some(12));

        let err = model.extract_field(doc, &spec("ebitda")).await.unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));

        let missing = model.extract_field(doc, &spec("unknown")).await.unwrap();
        assert!(missing.raw.is_none());
        assert_eq!(missing.confidence, 0.0);

        assert_eq!(model.extract_call_count(), 3);
        assert_eq!(model.extracted_keys(), vec!["arr", "ebitda", "unknown"]);
    }
}
