//! OpenAI-compatible backend: HTTP client, streaming parser, wire types.

pub mod backend;
pub mod streaming;
pub mod types;

pub use backend::{OpenAIBackend, OpenAIConfig};
pub use streaming::parse_sse_stream;
