//! Notifications emitted by the queue to an [`EventSink`](crate::ports::EventSink).

use serde::{Deserialize, Serialize};

use super::Event;

/// A noteworthy transition of a queued event.
///
/// Terminal variants carry the final state of an event that has left the
/// queue for good; this is the only place a dropped event is still visible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    /// Handler succeeded; the event was dropped.
    Completed(Event),

    /// Retries exhausted or no processor registered; the event was dropped.
    Failed(Event),

    /// The event went back into its queue with a future `next_retry_at`.
    RetryScheduled(Event),

    /// Dropped by the capacity policy before it was ever processed.
    Evicted(Event),
}

impl QueueEvent {
    pub fn event(&self) -> &Event {
        match self {
            QueueEvent::Completed(e)
            | QueueEvent::Failed(e)
            | QueueEvent::RetryScheduled(e)
            | QueueEvent::Evicted(e) => e,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, QueueEvent::RetryScheduled(_))
    }
}
