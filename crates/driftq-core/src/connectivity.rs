//! Connectivity monitor: a single online/offline flag with change callbacks.
//!
//! The monitor does not probe the network. Something else (an OS hook, a
//! health check, a manual override) calls [`ConnectivityMonitor::set_online`]
//! and the monitor fans the change out to its subscribers.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::error::panic_message;
use crate::ports::{Clock, SystemClock};

/// Subscriber invoked with the new flag value.
pub type ConnectivityCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Handle returned by [`ConnectivityMonitor::add_callback`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

struct MonitorState {
    last_check: DateTime<Utc>,
    next_callback_id: u64,
    callbacks: Vec<(CallbackId, ConnectivityCallback)>,
}

/// Tracks whether the network is reachable and tells subscribers when that changes.
pub struct ConnectivityMonitor {
    online: AtomicBool,
    state: Mutex<MonitorState>,
    clock: Arc<dyn Clock>,
}

impl ConnectivityMonitor {
    /// Starts online, on the wall clock.
    pub fn new() -> Self {
        Self::with_clock(true, Arc::new(SystemClock))
    }

    pub fn with_clock(online: bool, clock: Arc<dyn Clock>) -> Self {
        let last_check = clock.now();
        Self {
            online: AtomicBool::new(online),
            state: Mutex::new(MonitorState {
                last_check,
                next_callback_id: 0,
                callbacks: Vec::new(),
            }),
            clock,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Time of the last actual transition (or construction).
    pub fn last_check(&self) -> DateTime<Utc> {
        self.lock_state().last_check
    }

    /// Subscribe to changes. Callbacks run in registration order.
    pub fn add_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let mut state = self.lock_state();
        let id = CallbackId(state.next_callback_id);
        state.next_callback_id += 1;
        state.callbacks.push((id, Arc::new(callback)));
        id
    }

    /// Unsubscribe. Returns whether the callback was still registered.
    ///
    /// A change already being delivered may still reach it once.
    pub fn remove_callback(&self, id: CallbackId) -> bool {
        let mut state = self.lock_state();
        let before = state.callbacks.len();
        state.callbacks.retain(|(cb_id, _)| *cb_id != id);
        state.callbacks.len() != before
    }

    pub fn callback_count(&self) -> usize {
        self.lock_state().callbacks.len()
    }

    /// Update the flag. Returns whether it actually changed.
    ///
    /// Callbacks are invoked synchronously after the state lock is released,
    /// so a callback may read the monitor. A panicking callback is logged and
    /// skipped.
    pub fn set_online(&self, online: bool) -> bool {
        let callbacks = {
            let mut state = self.lock_state();
            if self.online.load(Ordering::Acquire) == online {
                return false;
            }
            self.online.store(online, Ordering::Release);
            let now = self.clock.now();
            if now > state.last_check {
                state.last_check = now;
            }
            state
                .callbacks
                .iter()
                .map(|(_, cb)| Arc::clone(cb))
                .collect::<Vec<_>>()
        };

        info!(
            online,
            "network connectivity changed: {}",
            if online { "online" } else { "offline" }
        );

        for (index, callback) in callbacks.iter().enumerate() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(online))) {
                error!(
                    callback = index,
                    error = %panic_message(payload.as_ref()),
                    "connectivity callback panicked"
                );
            }
        }
        true
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("online", &self.is_online())
            .field("callbacks", &self.callback_count())
            .finish()
    }
}
