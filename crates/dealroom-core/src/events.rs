//! Server event types, envelope schema, and event bus for notifications.
//!
//! Job lifecycle and query completion events are published on a single
//! broadcast channel; downstream consumers (notification delivery,
//! telemetry) subscribe independently. Delivery mechanics are out of scope
//! for this core — the bus is the boundary.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{AnswerType, JobStatus};

/// Versioned event envelope wrapping a domain event.
///
/// The `event_type` field uses dot-namespaced names (e.g. `"job.completed"`).
/// Consumers should ignore unknown fields (forward compatibility).
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// Unique event identifier (UUIDv7 for temporal ordering).
    pub event_id: Uuid,
    /// Namespaced event type (e.g. `"job.started"`, `"query.completed"`).
    pub event_type: String,
    /// When the event occurred (UTC).
    pub occurred_at: DateTime<Utc>,
    /// Type of entity this event relates to (`"job"` or `"query"`).
    pub entity_type: &'static str,
    /// ID of the entity this event relates to.
    pub entity_id: Uuid,
    /// Payload schema version.
    pub payload_version: u32,
    /// Domain-specific event data.
    pub payload: ServerEvent,
}

impl EventEnvelope {
    pub fn new(event: ServerEvent) -> Self {
        Self {
            event_id: crate::uuid_utils::new_v7(),
            event_type: event.namespaced_event_type().to_string(),
            occurred_at: Utc::now(),
            entity_type: event.entity_type(),
            entity_id: event.entity_id(),
            payload_version: 1,
            payload: event,
        }
    }
}

/// Domain events emitted by the Q&A and job subsystems.
///
/// Serialized as JSON with a `type` tag field, e.g.
/// `{"type":"JobCompleted","job_id":"...","status":"success"}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// An extraction job was accepted into the queue.
    JobQueued {
        job_id: Uuid,
        document_id: Uuid,
        template_key: String,
    },
    /// An extraction job started running.
    JobStarted { job_id: Uuid, document_id: Uuid },
    /// An extraction job reached a terminal state.
    JobCompleted {
        job_id: Uuid,
        document_id: Uuid,
        status: JobStatus,
        quality_pass: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<i64>,
    },
    /// An extraction job failed with no usable output.
    JobFailed {
        job_id: Uuid,
        document_id: Uuid,
        error: String,
    },
    /// A query stream completed (any terminal answer type).
    QueryCompleted {
        query_id: Uuid,
        room_id: Uuid,
        answer_type: AnswerType,
    },
}

impl ServerEvent {
    /// Dot-namespaced event type for the envelope.
    pub fn namespaced_event_type(&self) -> &'static str {
        match self {
            ServerEvent::JobQueued { .. } => "job.queued",
            ServerEvent::JobStarted { .. } => "job.started",
            ServerEvent::JobCompleted { .. } => "job.completed",
            ServerEvent::JobFailed { .. } => "job.failed",
            ServerEvent::QueryCompleted { .. } => "query.completed",
        }
    }

    pub fn entity_type(&self) -> &'static str {
        match self {
            ServerEvent::QueryCompleted { .. } => "query",
            _ => "job",
        }
    }

    pub fn entity_id(&self) -> Uuid {
        match self {
            ServerEvent::JobQueued { job_id, .. }
            | ServerEvent::JobStarted { job_id, .. }
            | ServerEvent::JobCompleted { job_id, .. }
            | ServerEvent::JobFailed { job_id, .. } => *job_id,
            ServerEvent::QueryCompleted { query_id, .. } => *query_id,
        }
    }
}

/// Broadcast bus aggregating events for downstream consumers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Lagging or absent subscribers never block emission.
    pub fn emit(&self, event: ServerEvent) {
        let _ = self.tx.send(EventEnvelope::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}
