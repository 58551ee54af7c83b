//! OfflineQueue - producer-facing surface of the queue.

use std::sync::{Arc, Weak};

use tracing::info;

use crate::connectivity::{CallbackId, ConnectivityMonitor};
use crate::domain::{Event, EventId, Payload, Priority};
use crate::error::QueueError;
use crate::observability::QueueStats;
use crate::queue::EventQueue;
use crate::runtime::{EventHandler, HandlerRegistry};
use crate::worker::{DispatchWorker, Dispatcher};

struct Inner {
    queue: Arc<EventQueue>,
    registry: Arc<HandlerRegistry>,
    connectivity: Arc<ConnectivityMonitor>,
    worker: DispatchWorker,
    auto_start: bool,
    reconnect_callback: CallbackId,
}

impl Drop for Inner {
    // The loop only holds the dispatcher, so it would outlive the last handle.
    // The monitor may be shared and outlive us too.
    fn drop(&mut self) {
        self.worker.stop();
        self.connectivity.remove_callback(self.reconnect_callback);
    }
}

/// An offline-aware event queue with its dispatcher.
///
/// Cheap to clone; clones share the same queue. Build one with
/// [`QueueBuilder`](crate::app::QueueBuilder) and pass it to whoever
/// produces events.
#[derive(Clone)]
pub struct OfflineQueue {
    inner: Arc<Inner>,
}

impl OfflineQueue {
    pub(crate) fn assemble(
        queue: Arc<EventQueue>,
        registry: Arc<HandlerRegistry>,
        connectivity: Arc<ConnectivityMonitor>,
        worker: DispatchWorker,
        auto_start: bool,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let weak = weak.clone();
            let reconnect_callback = connectivity.add_callback(move |online| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if online {
                    info!("network connectivity restored - resuming event processing");
                    if inner.auto_start && !inner.worker.is_running() {
                        inner.worker.start();
                    }
                } else {
                    info!("network connectivity lost - events will be queued");
                }
            });
            Inner {
                queue,
                registry,
                connectivity,
                worker,
                auto_start,
                reconnect_callback,
            }
        });

        Self { inner }
    }

    /// Register the processor for an event type, replacing any previous one.
    pub fn register_processor<H: EventHandler + 'static>(
        &self,
        event_type: impl Into<String>,
        handler: H,
    ) {
        self.inner.registry.register(event_type, Arc::new(handler));
    }

    /// Queue an event. Never blocks and never fails because the queue is
    /// full or offline.
    pub fn queue_event(
        &self,
        event_type: &str,
        payload: Payload,
        priority: Priority,
    ) -> Result<EventId, QueueError> {
        let id = self.inner.queue.enqueue(event_type, payload, priority)?;
        self.ensure_started();
        Ok(id)
    }

    /// Queue a pre-built event, e.g. one restored from outside storage.
    pub fn enqueue_event(&self, event: Event) -> Result<EventId, QueueError> {
        let id = self.inner.queue.enqueue_event(event)?;
        self.ensure_started();
        Ok(id)
    }

    /// Feed a connectivity signal. Going online restarts a stopped dispatcher
    /// when `auto_start` is on.
    pub fn set_online_status(&self, online: bool) {
        self.inner.connectivity.set_online(online);
    }

    pub fn is_online(&self) -> bool {
        self.inner.connectivity.is_online()
    }

    pub fn get_queue_stats(&self) -> QueueStats {
        self.inner.queue.stats(
            self.inner.connectivity.is_online(),
            self.inner.registry.registered_types(),
        )
    }

    /// Clones of every queued event, in drain order.
    pub fn queued_events(&self) -> Vec<Event> {
        self.inner.queue.queued_events()
    }

    /// Start the dispatcher loop. Returns `false` if it was already running.
    pub fn start_processing(&self) -> bool {
        self.inner.worker.start()
    }

    /// Ask the dispatcher loop to exit at its next polling point.
    pub fn stop_processing(&self) -> bool {
        self.inner.worker.stop()
    }

    /// Stop and wait for the dispatcher loop to exit.
    pub async fn shutdown(&self) {
        self.inner.worker.shutdown().await;
    }

    pub fn is_processing(&self) -> bool {
        self.inner.worker.is_running()
    }

    pub fn strategy_name(&self) -> &'static str {
        self.inner.worker.strategy_name()
    }

    /// The dispatcher, for driving iterations by hand.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        self.inner.worker.dispatcher()
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.inner.connectivity
    }

    fn ensure_started(&self) {
        if self.inner.auto_start && !self.inner.worker.is_running() {
            self.inner.worker.start();
        }
    }
}
