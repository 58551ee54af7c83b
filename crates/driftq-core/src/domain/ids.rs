//! Event identifiers.
//!
//! Events are identified by a ULID wrapped in [`EventId`]. ULIDs sort by
//! creation time and can be generated without coordination, which is all the
//! queue needs from an identifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Process-unique identifier of a queued event.
///
/// Serialized as the bare ULID string; `Display` adds an `evt-` prefix so log
/// lines are easy to grep.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Ulid);

impl EventId {
    /// Generate a fresh identifier from the current time and random bits.
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for EventId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt-{}", self.0)
    }
}
