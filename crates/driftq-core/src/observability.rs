//! Status views and logging setup.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::domain::Priority;

/// Number of queued events per priority class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityCounts {
    pub critical: usize,
    pub high: usize,
    pub normal: usize,
    pub low: usize,
}

impl PriorityCounts {
    pub fn get(&self, priority: Priority) -> usize {
        match priority {
            Priority::Critical => self.critical,
            Priority::High => self.high,
            Priority::Normal => self.normal,
            Priority::Low => self.low,
        }
    }

    pub(crate) fn set(&mut self, priority: Priority, n: usize) {
        match priority {
            Priority::Critical => self.critical = n,
            Priority::High => self.high = n,
            Priority::Normal => self.normal = n,
            Priority::Low => self.low = n,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.normal + self.low
    }
}

/// Point-in-time snapshot of the queue, meant for an external metrics or
/// logging collaborator. Counters are totals since construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queued_by_priority: PriorityCounts,
    pub queue_size: usize,
    pub events_queued_total: u64,
    pub events_processed_total: u64,
    pub events_failed_total: u64,
    pub events_retried_total: u64,
    pub events_evicted_total: u64,
    /// Retries caused by being offline (a subset of `events_retried_total`).
    pub events_deferred_total: u64,
    pub oldest_event_age: Option<Duration>,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub is_online: bool,
    pub processing_active: bool,
    pub registered_processors: Vec<String>,
}

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_counts_index_by_class() {
        let mut counts = PriorityCounts::default();
        counts.set(Priority::Low, 3);
        counts.set(Priority::Critical, 1);

        assert_eq!(counts.get(Priority::Low), 3);
        assert_eq!(counts.get(Priority::High), 0);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }
}
