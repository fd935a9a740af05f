//! Client-side query session: accumulates a streamed answer, enforces
//! one in-flight question, and manages retry, cancellation, and the
//! rate-limit countdown.
//!
//! State machine: `idle -> submitting -> streaming -> {completed | errored}`.
//! `errored` transitions back to `submitting` only via [`QuerySession::retry`],
//! and only when the terminating error allowed it. All timers and
//! accumulators are instance-owned; tearing the session down drops them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

use dealroom_core::{
    AnswerType, Citation, Error, QueryMetrics, Result, RoomScope, StreamErrorKind, StreamEvent,
};

use crate::executor::{QueryExecutor, QueryStream};

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Submitting,
    Streaming,
    Completed,
    Errored,
}

/// The terminating error of the last failed attempt.
#[derive(Debug, Clone)]
pub struct SessionError {
    pub kind: StreamErrorKind,
    pub message: String,
    pub retry_allowed: bool,
    /// Deadline before which resubmission is blocked (rate-limit case).
    pub retry_at: Option<Instant>,
}

/// A fully materialized exchange returned once the stream completes.
#[derive(Debug, Clone)]
pub struct CompletedExchange {
    pub query_id: Uuid,
    pub answer: String,
    pub answer_type: AnswerType,
    pub citations: Vec<Citation>,
    pub metrics: QueryMetrics,
}

/// Handle for abandoning an in-flight question from another task.
#[derive(Debug, Clone)]
pub struct SessionAbort {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl SessionAbort {
    /// Abandon the current stream. No effect when nothing is in flight.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

/// One user's streaming Q&A session against a room.
pub struct QuerySession {
    executor: Arc<QueryExecutor>,
    scope: RoomScope,
    state: SessionState,
    answer_buf: String,
    citations: Vec<Citation>,
    last_question: Option<String>,
    last_error: Option<SessionError>,
    abort_flag: Arc<AtomicBool>,
    abort_notify: Arc<Notify>,
}

impl QuerySession {
    pub fn new(executor: Arc<QueryExecutor>, scope: RoomScope) -> Self {
        Self {
            executor,
            scope,
            state: SessionState::Idle,
            answer_buf: String::new(),
            citations: Vec::new(),
            last_question: None,
            last_error: None,
            abort_flag: Arc::new(AtomicBool::new(false)),
            abort_notify: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The question of the most recent attempt, preserved for retry.
    pub fn last_question(&self) -> Option<&str> {
        self.last_question.as_deref()
    }

    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    /// Remaining rate-limit countdown, if one is active.
    pub fn retry_after_remaining(&self) -> Option<Duration> {
        let retry_at = self.last_error.as_ref()?.retry_at?;
        let now = Instant::now();
        (retry_at > now).then(|| retry_at - now)
    }

    /// Handle for cancelling the in-flight question from another task.
    pub fn abort_handle(&self) -> SessionAbort {
        SessionAbort {
            flag: self.abort_flag.clone(),
            notify: self.abort_notify.clone(),
        }
    }

    /// Submit a question and drive the stream to its terminal event.
    pub async fn ask(&mut self, question: &str) -> Result<CompletedExchange> {
        self.ask_with(question, |_| {}).await
    }

    /// Submit a question, invoking `on_event` for every stream event as it
    /// arrives (chunks, citations, and the terminal event).
    pub async fn ask_with(
        &mut self,
        question: &str,
        on_event: impl FnMut(&StreamEvent),
    ) -> Result<CompletedExchange> {
        // One in-flight question per session, enforced here, not by the
        // transport.
        if matches!(self.state, SessionState::Submitting | SessionState::Streaming) {
            return Err(Error::Conflict(
                "a question is already streaming in this session".to_string(),
            ));
        }
        if let Some(remaining) = self.retry_after_remaining() {
            return Err(Error::RateLimited {
                retry_after_secs: remaining.as_secs().max(1),
            });
        }

        self.abort_flag.store(false, Ordering::SeqCst);
        self.state = SessionState::Submitting;

        let stream = match self.executor.execute(&self.scope, question).await {
            Ok(stream) => stream,
            Err(e) => {
                // Validation failures create no state; the session stays
                // usable immediately.
                self.state = SessionState::Idle;
                return Err(e);
            }
        };

        self.last_question = Some(question.trim().to_string());
        self.state = SessionState::Streaming;
        self.answer_buf.clear();
        self.citations.clear();

        self.pump(stream, on_event).await
    }

    /// Resubmit the exact original question after a retryable failure.
    ///
    /// The prior failed attempt remains in history untouched.
    pub async fn retry(&mut self) -> Result<CompletedExchange> {
        if self.state != SessionState::Errored {
            return Err(Error::Conflict("nothing to retry".to_string()));
        }
        let last_error = self
            .last_error
            .as_ref()
            .ok_or_else(|| Error::Internal("errored state without an error".to_string()))?;
        if !last_error.retry_allowed {
            return Err(Error::Conflict(
                "the last error does not permit retry".to_string(),
            ));
        }
        if let Some(remaining) = self.retry_after_remaining() {
            return Err(Error::RateLimited {
                retry_after_secs: remaining.as_secs().max(1),
            });
        }
        let question = self
            .last_question
            .clone()
            .ok_or_else(|| Error::Internal("errored state without a question".to_string()))?;

        self.state = SessionState::Idle;
        self.ask(&question).await
    }

    async fn pump(
        &mut self,
        mut stream: QueryStream,
        mut on_event: impl FnMut(&StreamEvent),
    ) -> Result<CompletedExchange> {
        loop {
            if self.abort_flag.load(Ordering::SeqCst) {
                return self.abandon(stream);
            }

            enum Step {
                Event(Option<StreamEvent>),
                Aborted,
            }
            let step = tokio::select! {
                event = stream.next_event() => Step::Event(event),
                _ = self.abort_notify.notified() => Step::Aborted,
            };
            let event = match step {
                Step::Event(event) => event,
                Step::Aborted => {
                    if self.abort_flag.load(Ordering::SeqCst) {
                        return self.abandon(stream);
                    }
                    continue;
                }
            };

            let Some(event) = event else {
                // Channel closed with no terminal event
                self.state = SessionState::Errored;
                self.last_error = Some(SessionError {
                    kind: StreamErrorKind::TransportInterrupted,
                    message: "stream closed before a terminal event".to_string(),
                    retry_allowed: true,
                    retry_at: None,
                });
                self.answer_buf.clear();
                self.citations.clear();
                return Err(Error::TransportInterrupted(
                    "stream closed before a terminal event".to_string(),
                ));
            };

            on_event(&event);
            match event {
                StreamEvent::Chunk { text } => self.answer_buf.push_str(&text),
                StreamEvent::Citation { citation } => self.citations.push(citation),
                StreamEvent::Complete {
                    query_id,
                    answer_type,
                    metrics,
                } => {
                    let exchange = CompletedExchange {
                        query_id,
                        answer: std::mem::take(&mut self.answer_buf),
                        answer_type,
                        citations: std::mem::take(&mut self.citations),
                        metrics,
                    };
                    self.last_error = None;
                    // Terminal for this exchange; the next ask is allowed
                    self.state = SessionState::Completed;
                    return Ok(exchange);
                }
                StreamEvent::Error {
                    kind,
                    message,
                    retry_allowed,
                    retry_after_seconds,
                } => {
                    self.state = SessionState::Errored;
                    self.last_error = Some(SessionError {
                        kind,
                        message: message.clone(),
                        retry_allowed,
                        retry_at: retry_after_seconds
                            .map(|secs| Instant::now() + Duration::from_secs(secs)),
                    });
                    self.answer_buf.clear();
                    self.citations.clear();
                    return Err(match kind {
                        StreamErrorKind::RateLimited => Error::RateLimited {
                            retry_after_secs: retry_after_seconds.unwrap_or(0),
                        },
                        StreamErrorKind::Retrieval => Error::Retrieval(message),
                        StreamErrorKind::TransportInterrupted => {
                            Error::TransportInterrupted(message)
                        }
                        StreamErrorKind::Validation => Error::Validation(message),
                        StreamErrorKind::Model => Error::Model(message),
                    });
                }
            }
        }
    }

    /// User-initiated abandonment: close the transport (which propagates
    /// cancellation to the executor) and return to idle. The question is
    /// preserved for resubmission.
    fn abandon(&mut self, stream: QueryStream) -> Result<CompletedExchange> {
        debug!("Session abandoned in-flight stream");
        stream.cancel();
        drop(stream);
        self.answer_buf.clear();
        self.citations.clear();
        self.state = SessionState::Idle;
        Err(Error::TransportInterrupted(
            "cancelled by the user".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_is_copy_eq() {
        let state = SessionState::Idle;
        let copied = state;
        assert_eq!(state, copied);
        assert_ne!(SessionState::Streaming, SessionState::Errored);
    }
}
