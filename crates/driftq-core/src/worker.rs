//! Dispatcher loop and its two execution strategies.
//!
//! [`Dispatcher::process_next`] is one iteration: take the next eligible
//! event, run its handler, apply the outcome. A [`DispatchWorker`] runs that
//! iteration in a loop, either as a tokio task ([`Cooperative`]) or on its own
//! OS thread ([`Dedicated`]). Both loops stop at the next polling point after
//! [`DispatchWorker::stop`]; an in-flight event still gets its outcome applied.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::domain::Event;
use crate::queue::{EventQueue, RetryPolicy};
use crate::runtime::{HandlerRegistry, invoke};

/// Event types that need the network and are deferred while offline.
pub const DEFAULT_NETWORK_DEPENDENT_TYPES: [&str; 5] = [
    "metrics_submission",
    "api_call",
    "data_sync",
    "remote_log",
    "analytics_event",
];

/// How long an idle loop waits before polling again.
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(100);

const OFFLINE_ERROR: &str = "Network offline";

/// Why an event ended up FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// No handler for the event type. Never retried.
    NoProcessor,
    /// `max_retries` used up by handler failures and/or offline deferrals.
    RetriesExhausted,
}

/// What one dispatch did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Completed,
    /// Back in the queue as RETRYING. `deferred` is set when the handler was
    /// skipped because the network is down.
    RetryScheduled { deferred: bool },
    Failed(FailureReason),
    /// The event was already COMPLETED or FAILED; nothing was done.
    AlreadyTerminal,
}

/// An event after dispatch, with the outcome applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub event: Event,
    pub outcome: DispatchOutcome,
}

/// Resolves handlers and applies outcomes for one event at a time.
pub struct Dispatcher {
    queue: Arc<EventQueue>,
    registry: Arc<HandlerRegistry>,
    connectivity: Arc<ConnectivityMonitor>,
    retry_policy: RetryPolicy,
    network_dependent: HashSet<String>,
    idle_interval: Duration,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<EventQueue>,
        registry: Arc<HandlerRegistry>,
        connectivity: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self {
            queue,
            registry,
            connectivity,
            retry_policy: RetryPolicy::default(),
            network_dependent: DEFAULT_NETWORK_DEPENDENT_TYPES
                .iter()
                .map(|t| t.to_string())
                .collect(),
            idle_interval: DEFAULT_IDLE_INTERVAL,
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_network_dependent_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.network_dependent = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_idle_interval(mut self, idle_interval: Duration) -> Self {
        self.idle_interval = idle_interval;
        self
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn is_network_dependent(&self, event_type: &str) -> bool {
        self.network_dependent.contains(event_type)
    }

    /// One loop iteration. `None` when nothing is eligible right now.
    pub async fn process_next(&self) -> Option<Dispatched> {
        let event = self.queue.next_eligible()?;
        Some(self.dispatch(event).await)
    }

    /// Dispatch until no event is eligible. Returns how many were handled.
    ///
    /// RETRYING events whose time has not come are left in the queue.
    pub async fn run_until_idle(&self) -> usize {
        let mut handled = 0;
        while self.process_next().await.is_some() {
            handled += 1;
        }
        handled
    }

    /// Run the handler for an event already taken out of the queue and apply
    /// the outcome.
    ///
    /// A COMPLETED or FAILED event is handed back untouched.
    pub async fn dispatch(&self, mut event: Event) -> Dispatched {
        if event.status().is_terminal() {
            warn!(
                event_id = %event.id(),
                status = %event.status(),
                "ignoring dispatch of a finished event"
            );
            return Dispatched {
                event,
                outcome: DispatchOutcome::AlreadyTerminal,
            };
        }

        let Some(handler) = self.registry.get(event.event_type()) else {
            let message = format!(
                "No processor registered for event type: {}",
                event.event_type()
            );
            warn!(event_id = %event.id(), event_type = event.event_type(), "{message}");
            event.mark_failed(message);
            self.queue.fail(event.clone());
            return Dispatched {
                event,
                outcome: DispatchOutcome::Failed(FailureReason::NoProcessor),
            };
        };

        if self.is_network_dependent(event.event_type()) && !self.connectivity.is_online() {
            return self.retry_or_fail(event, OFFLINE_ERROR.to_string(), true);
        }

        match invoke(handler.as_ref(), &event).await {
            Ok(()) => {
                event.mark_completed();
                debug!(
                    event_id = %event.id(),
                    event_type = event.event_type(),
                    "event processed successfully"
                );
                self.queue.complete(event.clone());
                Dispatched {
                    event,
                    outcome: DispatchOutcome::Completed,
                }
            }
            Err(e) => {
                error!(
                    event_id = %event.id(),
                    event_type = event.event_type(),
                    error = %e,
                    "error processing event"
                );
                self.retry_or_fail(event, e.to_string(), false)
            }
        }
    }

    fn retry_or_fail(&self, mut event: Event, error: String, deferred: bool) -> Dispatched {
        if event.is_last_attempt() {
            event.mark_exhausted(error);
            error!(
                event_id = %event.id(),
                event_type = event.event_type(),
                retries = event.retry_count(),
                "event failed permanently"
            );
            self.queue.fail(event.clone());
            return Dispatched {
                event,
                outcome: DispatchOutcome::Failed(FailureReason::RetriesExhausted),
            };
        }

        // First retry uses attempt 1.
        let attempt = event.retry_count().saturating_add(1);
        let delay = self
            .retry_policy
            .delay(i32::try_from(attempt).unwrap_or(i32::MAX));
        let now = self.queue.clock().now();
        let next_retry_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC);

        event.schedule_retry(next_retry_at, error);
        info!(
            event_id = %event.id(),
            event_type = event.event_type(),
            attempt = event.retry_count(),
            max_retries = event.max_retries(),
            delay_secs = delay.as_secs_f64(),
            deferred,
            "event scheduled for retry"
        );
        self.queue.requeue(event.clone(), deferred);
        Dispatched {
            event,
            outcome: DispatchOutcome::RetryScheduled { deferred },
        }
    }
}

/// Join handle of a running loop.
pub enum LoopHandle {
    Task(JoinHandle<()>),
    Thread(std::thread::JoinHandle<()>),
}

/// Where the dispatcher loop runs.
pub trait ExecutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start a loop for `generation`. It must exit once the generation is
    /// no longer current.
    fn spawn(&self, dispatcher: Arc<Dispatcher>, generation: u64) -> std::io::Result<LoopHandle>;
}

/// Runs the loop as a task on a tokio runtime, yielding between events.
#[derive(Debug, Clone)]
pub struct Cooperative {
    handle: Handle,
}

impl Cooperative {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime of the calling context, if there is one.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl ExecutionStrategy for Cooperative {
    fn name(&self) -> &'static str {
        "cooperative"
    }

    fn spawn(&self, dispatcher: Arc<Dispatcher>, generation: u64) -> std::io::Result<LoopHandle> {
        let join = self
            .handle
            .spawn(async move { run_cooperative(dispatcher, generation).await });
        Ok(LoopHandle::Task(join))
    }
}

/// Runs the loop on its own OS thread, sleeping between polls.
///
/// Handlers are async, so the thread drives them on a private
/// current-thread runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dedicated;

impl ExecutionStrategy for Dedicated {
    fn name(&self) -> &'static str {
        "dedicated"
    }

    fn spawn(&self, dispatcher: Arc<Dispatcher>, generation: u64) -> std::io::Result<LoopHandle> {
        let join = std::thread::Builder::new()
            .name(format!("driftq-dispatcher-{generation}"))
            .spawn(move || run_dedicated(dispatcher, generation))?;
        Ok(LoopHandle::Thread(join))
    }
}

async fn run_cooperative(dispatcher: Arc<Dispatcher>, generation: u64) {
    info!(generation, "starting event queue processing (cooperative)");
    let queue = Arc::clone(&dispatcher.queue);
    while queue.is_current(generation) {
        if dispatcher.process_next().await.is_some() {
            tokio::task::yield_now().await;
            continue;
        }
        tokio::select! {
            _ = queue.notifier().notified() => {},
            _ = tokio::time::sleep(dispatcher.idle_interval) => {},
        }
    }
    info!(generation, "event queue processing stopped");
}

fn run_dedicated(dispatcher: Arc<Dispatcher>, generation: u64) {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(generation, error = %e, "failed to build dispatcher runtime");
            if dispatcher.queue.is_current(generation) {
                dispatcher.queue.deactivate();
            }
            return;
        }
    };

    info!(generation, "starting event queue processing (dedicated)");
    while dispatcher.queue.is_current(generation) {
        if rt.block_on(dispatcher.process_next()).is_some() {
            std::thread::yield_now();
        } else {
            std::thread::sleep(dispatcher.idle_interval);
        }
    }
    info!(generation, "event queue processing stopped");
}

/// Owns the lifecycle (`start`/`stop`) of the dispatcher loop.
pub struct DispatchWorker {
    dispatcher: Arc<Dispatcher>,
    strategy: Box<dyn ExecutionStrategy>,
    handles: Mutex<Vec<LoopHandle>>,
}

impl DispatchWorker {
    pub fn new(dispatcher: Arc<Dispatcher>, strategy: Box<dyn ExecutionStrategy>) -> Self {
        Self {
            dispatcher,
            strategy,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn is_running(&self) -> bool {
        self.dispatcher.queue.is_processing_active()
    }

    /// Start the loop unless one is active. Returns whether a loop was started.
    pub fn start(&self) -> bool {
        let Some(generation) = self.dispatcher.queue.activate() else {
            return false;
        };
        match self.strategy.spawn(Arc::clone(&self.dispatcher), generation) {
            Ok(handle) => {
                let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
                handles.retain(|h| !is_finished(h));
                handles.push(handle);
                true
            }
            Err(e) => {
                error!(strategy = self.strategy.name(), error = %e, "failed to start dispatcher");
                self.dispatcher.queue.deactivate();
                false
            }
        }
    }

    /// Ask the loop to exit at its next polling point. Does not interrupt a
    /// running handler. Returns whether processing was active.
    pub fn stop(&self) -> bool {
        self.dispatcher.queue.deactivate()
    }

    /// Stop and wait for every loop started so far to exit.
    pub async fn shutdown(&self) {
        self.stop();
        let handles = std::mem::take(&mut *self.handles.lock().unwrap_or_else(|e| e.into_inner()));
        for handle in handles {
            match handle {
                LoopHandle::Task(join) => {
                    let _ = join.await;
                }
                LoopHandle::Thread(join) => {
                    let _ = tokio::task::spawn_blocking(move || join.join()).await;
                }
            }
        }
    }
}

fn is_finished(handle: &LoopHandle) -> bool {
    match handle {
        LoopHandle::Task(join) => join.is_finished(),
        LoopHandle::Thread(join) => join.is_finished(),
    }
}
