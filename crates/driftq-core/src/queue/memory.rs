//! In-memory priority queue with capacity-bound eviction.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::domain::{DEFAULT_MAX_RETRIES, Event, EventId, Payload, Priority, QueueEvent};
use crate::error::QueueError;
use crate::observability::{PriorityCounts, QueueStats};
use crate::ports::{Clock, EventSink, NoopEventSink, SystemClock};

/// Default bound on the number of queued events.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 10_000;

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    queued: u64,
    processed: u64,
    failed: u64,
    retried: u64,
    evicted: u64,
    deferred: u64,
}

/// Everything behind the queue lock.
///
/// The four priority queues, the counters and the processing flag are one
/// unit: every operation locks once and sees them consistently.
struct QueueState {
    /// Indexed by `Priority::index()`.
    queues: [VecDeque<Event>; 4],
    counters: Counters,
    last_processed_at: Option<DateTime<Utc>>,
    processing_active: bool,
    /// Bumped on every activation; a dispatcher loop exits when its
    /// generation is no longer current.
    generation: u64,
}

impl QueueState {
    fn new() -> Self {
        Self {
            queues: Default::default(),
            counters: Counters::default(),
            last_processed_at: None,
            processing_active: false,
            generation: 0,
        }
    }

    fn len(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    fn queue_mut(&mut self, priority: Priority) -> &mut VecDeque<Event> {
        &mut self.queues[priority.index()]
    }

    /// Drop the oldest event of the lowest non-empty evictable class.
    fn evict_one(&mut self) -> Option<Event> {
        for priority in Priority::EVICTION_ORDER {
            if let Some(evicted) = self.queue_mut(priority).pop_front() {
                self.counters.evicted += 1;
                return Some(evicted);
            }
        }
        None
    }

    fn take_next_eligible(&mut self, now: DateTime<Utc>) -> Option<Event> {
        for priority in Priority::DRAIN_ORDER {
            let queue = self.queue_mut(priority);
            if let Some(pos) = queue.iter().position(|e| e.is_eligible(now)) {
                return queue.remove(pos);
            }
        }
        None
    }
}

/// The queue orchestrator.
///
/// Owns the priority queues and statistics. Producers call [`enqueue`]
/// concurrently; the dispatcher takes events with [`next_eligible`] and hands
/// them back through [`complete`], [`fail`] or [`requeue`]. Handlers never run
/// under the lock.
///
/// [`enqueue`]: EventQueue::enqueue
/// [`next_eligible`]: EventQueue::next_eligible
/// [`complete`]: EventQueue::complete
/// [`fail`]: EventQueue::fail
/// [`requeue`]: EventQueue::requeue
pub struct EventQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    max_queue_size: usize,
    default_max_retries: u32,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
}

impl EventQueue {
    pub fn new(max_queue_size: usize) -> Self {
        Self::with_parts(
            max_queue_size,
            DEFAULT_MAX_RETRIES,
            Arc::new(SystemClock),
            Arc::new(NoopEventSink),
        )
    }

    pub fn with_parts(
        max_queue_size: usize,
        default_max_retries: u32,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            state: Mutex::new(QueueState::new()),
            notify: Notify::new(),
            max_queue_size,
            default_max_retries,
            clock,
            sink,
        }
    }

    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Create a pending event and append it to its priority queue.
    pub fn enqueue(
        &self,
        event_type: &str,
        payload: Payload,
        priority: Priority,
    ) -> Result<EventId, QueueError> {
        let event = Event::new_at(event_type, payload, priority, self.clock.now())
            .with_max_retries(self.default_max_retries);
        self.enqueue_event(event)
    }

    /// Append a pre-built event (e.g. one rebuilt with [`Event::from_map`]).
    ///
    /// If the queue is full, one LOW, NORMAL or HIGH event is evicted first.
    /// CRITICAL events are exempt from the bound: when nothing is evictable the
    /// event is accepted anyway.
    pub fn enqueue_event(&self, event: Event) -> Result<EventId, QueueError> {
        if event.event_type().is_empty() {
            return Err(QueueError::EmptyEventType);
        }
        if event.status().is_terminal() {
            return Err(QueueError::TerminalEvent(event.id()));
        }

        let id = event.id();
        let priority = event.priority();
        let evicted = {
            let mut state = self.lock();
            let evicted = if state.len() >= self.max_queue_size {
                state.evict_one()
            } else {
                None
            };
            state.queue_mut(priority).push_back(event);
            state.counters.queued += 1;
            evicted
        };

        debug!(event_id = %id, %priority, "event queued");
        if let Some(evicted) = evicted {
            warn!(
                event_id = %evicted.id(),
                event_type = evicted.event_type(),
                priority = %evicted.priority(),
                "evicted event due to queue size limit"
            );
            self.sink.emit(QueueEvent::Evicted(evicted));
        }
        self.notify.notify_one();
        Ok(id)
    }

    /// Remove and return the first eligible event, scanning CRITICAL to LOW.
    ///
    /// An event is eligible when PENDING, or RETRYING with `next_retry_at <= now`.
    pub fn next_eligible(&self) -> Option<Event> {
        let now = self.clock.now();
        self.lock().take_next_eligible(now)
    }

    /// Record a successful dispatch. The event is dropped.
    pub(crate) fn complete(&self, event: Event) {
        {
            let mut state = self.lock();
            state.counters.processed += 1;
            state.last_processed_at = Some(self.clock.now());
        }
        self.sink.emit(QueueEvent::Completed(event));
    }

    /// Record a permanent failure. The event is dropped.
    pub(crate) fn fail(&self, event: Event) {
        self.lock().counters.failed += 1;
        self.sink.emit(QueueEvent::Failed(event));
    }

    /// Put a RETRYING event back at the tail of its priority queue.
    ///
    /// Re-entry does not count against the capacity bound: the event already
    /// held a slot before it was taken out.
    pub(crate) fn requeue(&self, event: Event, deferred: bool) {
        {
            let mut state = self.lock();
            state.counters.retried += 1;
            if deferred {
                state.counters.deferred += 1;
            }
            state.queue_mut(event.priority()).push_back(event.clone());
        }
        self.sink.emit(QueueEvent::RetryScheduled(event));
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len_of(&self, priority: Priority) -> usize {
        self.lock().queues[priority.index()].len()
    }

    /// Clones of every queued event, in drain order.
    pub fn queued_events(&self) -> Vec<Event> {
        let state = self.lock();
        state.queues.iter().flatten().cloned().collect()
    }

    /// Statistics snapshot. Connectivity and registry details come from the caller.
    pub fn stats(&self, is_online: bool, registered_processors: Vec<String>) -> QueueStats {
        let now = self.clock.now();
        let state = self.lock();

        let mut queued_by_priority = PriorityCounts::default();
        for priority in Priority::DRAIN_ORDER {
            queued_by_priority.set(priority, state.queues[priority.index()].len());
        }
        let oldest_event_age = state
            .queues
            .iter()
            .flatten()
            .map(Event::created_at)
            .min()
            .map(|created_at| (now - created_at).to_std().unwrap_or_default());

        QueueStats {
            queue_size: queued_by_priority.total(),
            queued_by_priority,
            events_queued_total: state.counters.queued,
            events_processed_total: state.counters.processed,
            events_failed_total: state.counters.failed,
            events_retried_total: state.counters.retried,
            events_evicted_total: state.counters.evicted,
            events_deferred_total: state.counters.deferred,
            oldest_event_age,
            last_processed_at: state.last_processed_at,
            is_online,
            processing_active: state.processing_active,
            registered_processors,
        }
    }

    pub fn is_processing_active(&self) -> bool {
        self.lock().processing_active
    }

    /// Turn processing on. Returns the new loop generation, or `None` if a
    /// loop is already active.
    pub(crate) fn activate(&self) -> Option<u64> {
        let mut state = self.lock();
        if state.processing_active {
            return None;
        }
        state.processing_active = true;
        state.generation += 1;
        Some(state.generation)
    }

    /// Turn processing off. Returns whether it was on.
    pub(crate) fn deactivate(&self) -> bool {
        let was_active = {
            let mut state = self.lock();
            std::mem::replace(&mut state.processing_active, false)
        };
        // Wake an idle loop so it notices promptly.
        self.notify.notify_waiters();
        was_active
    }

    /// Should the loop of `generation` keep running?
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        let state = self.lock();
        state.processing_active && state.generation == generation
    }

    pub(crate) fn notifier(&self) -> &Notify {
        &self.notify
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_QUEUE_SIZE)
    }
}
