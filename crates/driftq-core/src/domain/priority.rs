//! Priority classes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority class of an event.
///
/// Determines drain order (strict, `Critical` first) and eviction order
/// (`Low` first, `Critical` never).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Order in which the dispatcher scans the priority queues.
    pub const DRAIN_ORDER: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// Order in which the capacity policy looks for a victim.
    pub const EVICTION_ORDER: [Priority; 3] = [Priority::Low, Priority::Normal, Priority::High];

    /// Slot of this class in a `[_; 4]` indexed by drain order.
    pub fn index(self) -> usize {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }

    /// Whether the capacity policy may drop events of this class.
    pub fn is_evictable(self) -> bool {
        !matches!(self, Priority::Critical)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_order_matches_index() {
        for (i, p) in Priority::DRAIN_ORDER.iter().enumerate() {
            assert_eq!(p.index(), i);
        }
    }

    #[test]
    fn critical_is_never_evictable() {
        assert!(!Priority::Critical.is_evictable());
        assert!(!Priority::EVICTION_ORDER.contains(&Priority::Critical));
    }

    #[test]
    fn serializes_as_lowercase_name() {
        assert_eq!(serde_json::to_value(Priority::High).unwrap(), "high");
        let p: Priority = serde_json::from_value(serde_json::json!("low")).unwrap();
        assert_eq!(p, Priority::Low);
    }
}
