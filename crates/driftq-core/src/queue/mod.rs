//! Queue module: priority storage, eviction, and the retry policy.

mod memory;
mod retry;

pub use memory::{DEFAULT_MAX_QUEUE_SIZE, EventQueue};
pub use retry::RetryPolicy;
