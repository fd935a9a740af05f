//! # dealroom-qa
//!
//! Streaming question answering over a document corpus.
//!
//! This crate provides:
//! - [`QueryExecutor`]: validates a question, retrieves evidence, streams
//!   model tokens and citations, and persists the finished exchange
//!   exactly once.
//! - Stream framing ([`transport`]): discrete, independently parseable
//!   frames with incremental decoding and forward-compatible skipping.
//! - [`QuerySession`]: the client-side protocol handler with retry,
//!   cancellation, and rate-limit countdown.
//! - [`FeedbackRecorder`]: ratings attached to finished queries.

pub mod executor;
pub mod feedback;
pub mod session;
pub mod transport;

pub use executor::{ExecutorConfig, QueryExecutor, QueryStream};
pub use feedback::FeedbackRecorder;
pub use session::{CompletedExchange, QuerySession, SessionAbort, SessionError, SessionState};
pub use transport::{encode_frame, FrameDecoder};
