//! EventSink port - キュー内の遷移を外部へ通知
//!
//! Dropped events (completed, failed, evicted) leave the queue for good. A
//! sink is the hook for collaborators that want to keep them: a dead-letter
//! store, a persistence layer, a metrics exporter.

use std::sync::Mutex;

use crate::domain::QueueEvent;

/// EventSink はキューのイベントを記録
///
/// Called synchronously from the dispatcher, outside the queue lock. Keep it
/// cheap; hand work off to another task if it needs I/O.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: QueueEvent);
}

/// 何もしない
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: QueueEvent) {}
}

/// Keeps every notification in memory. Handy for tests and inspection.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<QueueEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything emitted so far, oldest first.
    pub fn events(&self) -> Vec<QueueEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Terminal notifications only.
    pub fn terminal(&self) -> Vec<QueueEvent> {
        self.events()
            .into_iter()
            .filter(QueueEvent::is_terminal)
            .collect()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: QueueEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}
