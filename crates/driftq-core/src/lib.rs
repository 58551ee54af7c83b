//! driftq-core
//!
//! An in-memory, offline-aware event queue with priority classes and
//! exponential-backoff retries.
//!
//! # モジュール構成
//! - **domain**: Event, Priority, EventStatus, EventId, QueueEvent
//! - **queue**: EventQueue (priority storage + eviction) and RetryPolicy
//! - **connectivity**: online/offline flag with change callbacks
//! - **runtime**: EventHandler trait and HandlerRegistry
//! - **worker**: Dispatcher and its cooperative / dedicated execution strategies
//! - **ports**: Clock and EventSink seams
//! - **app**: QueueBuilder and the OfflineQueue facade
//! - **config**: TOML configuration
//! - **observability**: QueueStats and logging setup

pub mod app;
pub mod config;
pub mod connectivity;
pub mod domain;
pub mod error;
pub mod observability;
pub mod ports;
pub mod queue;
pub mod runtime;
pub mod worker;

pub use app::{BuildError, OfflineQueue, QueueBuilder};
pub use config::{ExecutionMode, QueueConfig};
pub use connectivity::ConnectivityMonitor;
pub use domain::{Event, EventId, EventStatus, Payload, Priority, QueueEvent};
pub use error::{HandlerError, QueueError};
pub use observability::QueueStats;
pub use runtime::{EventHandler, HandlerRegistry, handler_fn};
