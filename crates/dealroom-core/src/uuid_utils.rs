//! UUID helpers for time-ordered identifiers.

use uuid::Uuid;

/// Generate a UUIDv7 (time-ordered). Used for query, job, and event ids so
/// creation order is recoverable from the id alone.
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

/// Whether the given UUID is version 7.
pub fn is_v7(id: &Uuid) -> bool {
    id.get_version_num() == 7
}
