//! Default values for tunable parameters.
//!
//! Every constant here is overridable through the corresponding `*Config`
//! struct (and its `from_env()` constructor) in the owning crate.

/// Minimum question length after trimming (characters).
pub const QUESTION_MIN_CHARS: usize = 5;

/// Maximum question length after trimming (characters).
pub const QUESTION_MAX_CHARS: usize = 2000;

/// Maximum citation preview length (characters).
pub const PREVIEW_MAX_CHARS: usize = 240;

/// Maximum feedback comment length (characters).
pub const COMMENT_MAX_CHARS: usize = 2000;

/// Passages requested from the corpus index per query.
pub const RETRIEVAL_TOP_K: usize = 8;

/// Minimum passage relevance to count as evidence.
pub const RELEVANCE_FLOOR: f64 = 0.35;

/// Outbound stream buffer capacity; the producer suspends when full.
pub const STREAM_CHANNEL_CAPACITY: usize = 64;

/// Job poller interval (milliseconds).
pub const POLL_INTERVAL_MS: u64 = 3000;

/// Upper bound on total polling duration (seconds).
pub const POLL_TIMEOUT_SECS: u64 = 300;

/// Consecutive poll failures tolerated before the poller gives up.
pub const POLL_MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Age beyond which a running job is considered stalled (seconds).
pub const JOB_STALL_THRESHOLD_SECS: u64 = 600;

/// Broadcast event bus capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Default history page size.
pub const HISTORY_PAGE_SIZE: usize = 50;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_bounds_sane() {
        assert!(QUESTION_MIN_CHARS < QUESTION_MAX_CHARS);
    }

    #[test]
    fn test_relevance_floor_in_unit_interval() {
        assert!((0.0..=1.0).contains(&RELEVANCE_FLOOR));
    }
}
