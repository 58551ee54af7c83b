//! Event lifecycle state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an event.
///
/// State transitions:
/// - Pending -> Completed | Retrying | Failed
/// - Retrying -> Completed | Retrying | Failed (until max_retries is exhausted)
///
/// Completed and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// Enqueued, never attempted.
    #[default]
    Pending,

    /// Waiting for `next_retry_at` after a failure or a connectivity deferral.
    Retrying,

    /// Failed permanently (retries exhausted or no processor).
    Failed,

    /// Handler succeeded.
    Completed,
}

impl EventStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, EventStatus::Completed | EventStatus::Failed)
    }

    /// Can the state machine move from `self` to `next`?
    pub fn can_transition_to(self, next: EventStatus) -> bool {
        match self {
            EventStatus::Pending | EventStatus::Retrying => matches!(
                next,
                EventStatus::Completed | EventStatus::Retrying | EventStatus::Failed
            ),
            EventStatus::Completed | EventStatus::Failed => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Retrying => "retrying",
            EventStatus::Failed => "failed",
            EventStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
