//! # dealroom-inference
//!
//! Model backends for dealroom: answer generation (streaming) and
//! structured field extraction.
//!
//! The trait seams live in `dealroom-core` ([`dealroom_core::AnswerModel`],
//! [`dealroom_core::ExtractionModel`], [`dealroom_core::CorpusIndex`]);
//! this crate provides:
//! - An OpenAI-compatible HTTP backend with SSE token streaming and
//!   mid-generation cancellation.
//! - Deterministic mock collaborators with call logging for tests.

pub mod mock;
pub mod openai;

pub use mock::{MockAnswerModel, MockCorpusIndex, MockExtractionModel};
pub use openai::{OpenAIBackend, OpenAIConfig};
