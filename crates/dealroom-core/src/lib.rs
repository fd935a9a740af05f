//! # dealroom-core
//!
//! Core types, traits, and abstractions for the dealroom document Q&A and
//! structured-summary extraction subsystem.
//!
//! This crate provides the foundational data structures and trait
//! definitions that the other dealroom crates depend on.

pub mod cancel;
pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use error::{Error, Result};
pub use events::{EventBus, EventEnvelope, ServerEvent};
pub use models::*;
pub use traits::*;
pub use uuid_utils::{is_v7, new_v7};
