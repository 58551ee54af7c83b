use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::FutureExt;
use tracing::info;

use crate::domain::Event;
use crate::error::{HandlerError, panic_message};

/// A processor for one event type.
///
/// Handlers may await network I/O. Any `Err` is treated as transient and
/// retried by the dispatcher; a panic is caught and treated the same way.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError>;
}

/// Adapter turning a synchronous closure into an [`EventHandler`].
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync,
{
    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        (self.f)(event)
    }
}

/// Wrap a closure as a handler.
///
/// ```ignore
/// queue.register_processor("remote_log", handler_fn(|event| {
///     println!("{:?}", event.payload());
///     Ok(())
/// }));
/// ```
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync,
{
    FnHandler { f }
}

/// Registry of handlers (event_type -> handler).
///
/// Registration may happen while the dispatcher runs, so the map sits behind
/// an `RwLock`. Lookups clone the `Arc` and release the lock before the
/// handler is invoked.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an event type ("last wins").
    ///
    /// Returns the handler that was replaced, if any.
    pub fn register(
        &self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Option<Arc<dyn EventHandler>> {
        let event_type = event_type.into();
        info!(event_type = %event_type, "registered processor");
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(event_type, handler)
    }

    pub fn get(&self, event_type: &str) -> Option<Arc<dyn EventHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(event_type)
            .cloned()
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(event_type)
    }

    /// Registered event types, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run a handler, turning a panic into a [`HandlerError`].
pub(crate) async fn invoke(handler: &dyn EventHandler, event: &Event) -> Result<(), HandlerError> {
    match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(HandlerError::new(format!(
            "handler panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}
