use thiserror::Error;

use crate::domain::EventId;

/// Errors surfaced to producers.
///
/// The queue never reports its own state (full, offline, ...) as an error;
/// only structurally invalid input is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("event_type must not be empty")]
    EmptyEventType,

    #[error("event {0} is already completed or failed")]
    TerminalEvent(EventId),
}

/// Failure reported by an event handler. Always treated as transient.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(format!("json decode: {e}"))
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
