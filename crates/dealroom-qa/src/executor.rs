//! Query execution: retrieval, grounded streaming generation, and
//! exactly-once persistence of the finished exchange.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use dealroom_core::{
    cancel_pair, defaults, new_v7, rank_citations, validate_question, AnswerModel, AnswerType,
    CancelHandle, CancelToken, CorpusIndex, Error, EventBus, NewQuery, Passage, QueryMetrics,
    QueryOutcome, QueryRepository, Result, RoomScope, ServerEvent, StreamErrorKind, StreamEvent,
};

/// Configuration for the query executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Passages requested from the corpus index.
    pub top_k: usize,
    /// Minimum relevance for a passage to count as evidence.
    pub relevance_floor: f64,
    /// Outbound event buffer; the producer suspends when it is full.
    pub channel_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            top_k: defaults::RETRIEVAL_TOP_K,
            relevance_floor: defaults::RELEVANCE_FLOOR,
            channel_capacity: defaults::STREAM_CHANNEL_CAPACITY,
        }
    }
}

impl ExecutorConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `QA_RETRIEVAL_TOP_K` | `8` | Passages requested per query |
    /// | `QA_RELEVANCE_FLOOR` | `0.35` | Minimum passage relevance |
    /// | `QA_STREAM_CAPACITY` | `64` | Outbound event buffer size |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            top_k: std::env::var("QA_RETRIEVAL_TOP_K")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.top_k),
            relevance_floor: std::env::var("QA_RELEVANCE_FLOOR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.relevance_floor),
            channel_capacity: std::env::var("QA_STREAM_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.channel_capacity),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_relevance_floor(mut self, floor: f64) -> Self {
        self.relevance_floor = floor;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

/// Consumer handle for one in-flight query stream.
///
/// Events arrive in emission order. Dropping the handle (or calling
/// [`QueryStream::cancel`]) propagates cancellation to the executor task,
/// which aborts the underlying model call between token steps.
#[derive(Debug)]
pub struct QueryStream {
    query_id: Uuid,
    rx: mpsc::Receiver<StreamEvent>,
    cancel: CancelHandle,
}

impl QueryStream {
    /// Id of the query record this stream is producing.
    pub fn query_id(&self) -> Uuid {
        self.query_id
    }

    /// Receive the next event; `None` once the producer is gone.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Abandon the stream. In-flight retrieval/generation is cancelled.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for QueryStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Streaming question-answering executor.
///
/// One dedicated task per active stream; concurrent streams are
/// independent. The executor is the only writer of query and citation
/// records.
pub struct QueryExecutor {
    index: Arc<dyn CorpusIndex>,
    model: Arc<dyn AnswerModel>,
    queries: Arc<dyn QueryRepository>,
    events: EventBus,
    config: ExecutorConfig,
}

impl QueryExecutor {
    pub fn new(
        index: Arc<dyn CorpusIndex>,
        model: Arc<dyn AnswerModel>,
        queries: Arc<dyn QueryRepository>,
        events: EventBus,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            index,
            model,
            queries,
            events,
            config,
        }
    }

    /// Submit a question against a room scope and open an event stream.
    ///
    /// Out-of-range questions are rejected here with a validation error and
    /// no stream is opened; the corpus index and model are never called.
    #[instrument(skip(self, scope), fields(room_id = %scope.room_id))]
    pub async fn execute(&self, scope: &RoomScope, question: &str) -> Result<QueryStream> {
        let question = validate_question(question)?.to_string();
        let query_id = new_v7();

        // The question is attributed immediately, for audit; the answer is
        // applied exactly once at stream completion.
        self.queries
            .insert_question(NewQuery {
                id: query_id,
                room_id: scope.room_id,
                question: question.clone(),
            })
            .await?;

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let (cancel_handle, cancel_token) = cancel_pair();

        let task = StreamTask {
            index: self.index.clone(),
            model: self.model.clone(),
            queries: self.queries.clone(),
            events: self.events.clone(),
            config: self.config.clone(),
            scope: scope.clone(),
            question,
            query_id,
            tx,
            cancel: cancel_token,
        };
        tokio::spawn(task.run());

        Ok(QueryStream {
            query_id,
            rx,
            cancel: cancel_handle,
        })
    }
}

/// State for one spawned stream task.
struct StreamTask {
    index: Arc<dyn CorpusIndex>,
    model: Arc<dyn AnswerModel>,
    queries: Arc<dyn QueryRepository>,
    events: EventBus,
    config: ExecutorConfig,
    scope: RoomScope,
    question: String,
    query_id: Uuid,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancelToken,
}

impl StreamTask {
    #[instrument(skip(self), fields(query_id = %self.query_id))]
    async fn run(self) {
        let started = Instant::now();

        // Retrieval
        let retrieval_started = Instant::now();
        let passages = match self
            .index
            .search(&self.question, &self.scope, self.config.top_k)
            .await
        {
            Ok(passages) => passages,
            Err(e) => {
                self.terminate_with_error(e).await;
                return;
            }
        };
        let retrieval_ms = retrieval_started.elapsed().as_millis() as u64;

        let passages: Vec<Passage> = passages
            .into_iter()
            .filter(|p| p.relevance >= self.config.relevance_floor)
            .collect();

        // The model is never invoked on empty evidence.
        if passages.is_empty() {
            debug!(query_id = %self.query_id, "No passages above relevance floor");
            let metrics = QueryMetrics {
                retrieval_ms,
                generation_ms: 0,
                total_ms: started.elapsed().as_millis() as u64,
                passage_count: 0,
            };
            self.terminate_complete(AnswerType::InsufficientEvidence, None, Vec::new(), metrics)
                .await;
            return;
        }

        // Generation
        let generation_started = Instant::now();
        let mut tokens = match self
            .model
            .generate(&self.question, &passages, self.cancel.clone())
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                self.terminate_with_error(e).await;
                return;
            }
        };

        let mut answer = String::new();
        let mut chunk_count = 0u64;
        while let Some(item) = tokens.next().await {
            // Cooperative cancellation, checked between token steps
            if self.cancel.is_cancelled() {
                self.abandon("cancelled by consumer").await;
                return;
            }
            match item {
                Ok(token) => {
                    answer.push_str(&token);
                    chunk_count += 1;
                    // The only producer-side blocking point: backpressure
                    if self.tx.send(StreamEvent::Chunk { text: token }).await.is_err() {
                        self.abandon("consumer disconnected mid-stream").await;
                        return;
                    }
                }
                Err(e) => {
                    self.terminate_with_error(e).await;
                    return;
                }
            }
        }
        if self.cancel.is_cancelled() {
            self.abandon("cancelled by consumer").await;
            return;
        }
        let generation_ms = generation_started.elapsed().as_millis() as u64;

        // Citations: one per passage used, descending relevance, ranked in
        // that order.
        let citations = rank_citations(&passages);
        for citation in &citations {
            let event = StreamEvent::Citation {
                citation: citation.clone(),
            };
            if self.tx.send(event).await.is_err() {
                self.abandon("consumer disconnected during citations").await;
                return;
            }
        }

        let metrics = QueryMetrics {
            retrieval_ms,
            generation_ms,
            total_ms: started.elapsed().as_millis() as u64,
            passage_count: passages.len(),
        };
        info!(
            query_id = %self.query_id,
            chunk_count,
            passage_count = passages.len(),
            duration_ms = metrics.total_ms,
            "Query stream completed"
        );
        self.terminate_complete(AnswerType::Grounded, Some(answer), citations, metrics)
            .await;
    }

    /// Deliver the terminal `complete` event, then persist exactly once.
    async fn terminate_complete(
        &self,
        answer_type: AnswerType,
        answer: Option<String>,
        citations: Vec<dealroom_core::Citation>,
        metrics: QueryMetrics,
    ) {
        let event = StreamEvent::Complete {
            query_id: self.query_id,
            answer_type,
            metrics,
        };
        if self.tx.send(event).await.is_err() {
            // The consumer vanished before the terminal event: not a
            // completed exchange.
            self.abandon("consumer disconnected before complete").await;
            return;
        }

        let outcome = QueryOutcome {
            answer,
            answer_type,
            citations,
            metrics,
        };
        if let Err(e) = self.queries.finalize(self.query_id, outcome).await {
            warn!(query_id = %self.query_id, error = %e, "Failed to persist completed query");
        }
        self.events.emit(ServerEvent::QueryCompleted {
            query_id: self.query_id,
            room_id: self.scope.room_id,
            answer_type,
        });
    }

    /// Deliver a single terminal `error` event and record the failed
    /// attempt (question stays attributed, no answer).
    async fn terminate_with_error(&self, error: Error) {
        let (kind, retry_after_seconds) = classify_stream_error(&error);
        let retry_allowed = error.retry_allowed();
        warn!(
            query_id = %self.query_id,
            error = %error,
            ?kind,
            retry_allowed,
            "Query stream failed"
        );

        let event = StreamEvent::Error {
            kind,
            message: error.to_string(),
            retry_allowed,
            retry_after_seconds,
        };
        let _ = self.tx.send(event).await;
        self.record_failed_attempt().await;
    }

    /// Persist an aborted/failed attempt: attributed question, no answer.
    async fn abandon(&self, reason: &str) {
        debug!(query_id = %self.query_id, reason, "Stream abandoned");
        self.record_failed_attempt().await;
    }

    async fn record_failed_attempt(&self) {
        let outcome = QueryOutcome {
            answer: None,
            answer_type: AnswerType::Error,
            citations: Vec::new(),
            metrics: QueryMetrics::default(),
        };
        if let Err(e) = self.queries.finalize(self.query_id, outcome).await {
            warn!(query_id = %self.query_id, error = %e, "Failed to record failed attempt");
        }
        self.events.emit(ServerEvent::QueryCompleted {
            query_id: self.query_id,
            room_id: self.scope.room_id,
            answer_type: AnswerType::Error,
        });
    }
}

/// Map an internal error to its wire classification.
fn classify_stream_error(error: &Error) -> (StreamErrorKind, Option<u64>) {
    match error {
        Error::Validation(_) => (StreamErrorKind::Validation, None),
        Error::RateLimited { retry_after_secs } => {
            (StreamErrorKind::RateLimited, Some(*retry_after_secs))
        }
        Error::Retrieval(_) => (StreamErrorKind::Retrieval, None),
        Error::TransportInterrupted(_) => (StreamErrorKind::TransportInterrupted, None),
        _ => (StreamErrorKind::Model, None),
    }
}
