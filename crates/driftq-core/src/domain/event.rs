//! Event: a unit of deferred work plus its retry bookkeeping.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EventId, EventStatus, Priority};

/// Producer-defined data carried by an event. The queue never looks inside.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Per-event retry cap used when the producer does not set one.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// A queued event.
///
/// Fields are read-only outside the crate: status and retry transitions are
/// applied by the dispatcher only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    event_type: String,
    payload: Payload,
    priority: Priority,
    status: EventStatus,
    created_at: DateTime<Utc>,
    retry_count: u32,
    max_retries: u32,
    next_retry_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl Event {
    /// Create a pending event stamped with the wall clock.
    pub fn new(event_type: impl Into<String>, payload: Payload, priority: Priority) -> Self {
        Self::new_at(event_type, payload, priority, Utc::now())
    }

    /// Create a pending event with an explicit creation time.
    pub fn new_at(
        event_type: impl Into<String>,
        payload: Payload,
        priority: Priority,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::generate(),
            event_type: event_type.into(),
            payload,
            priority,
            status: EventStatus::Pending,
            created_at,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            next_retry_at: None,
            last_error: None,
        }
    }

    /// Override the retry cap.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self.retry_count = self.retry_count.min(max_retries);
        self
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn status(&self) -> EventStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn next_retry_at(&self) -> Option<DateTime<Utc>> {
        self.next_retry_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Time spent since creation (zero if `now` is earlier).
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Can the dispatcher pick this event up at `now`?
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            EventStatus::Pending => true,
            EventStatus::Retrying => self.next_retry_at.is_some_and(|at| at <= now),
            EventStatus::Completed | EventStatus::Failed => false,
        }
    }

    /// Would one more retry reach `max_retries`?
    pub fn is_last_attempt(&self) -> bool {
        self.retry_count.saturating_add(1) >= self.max_retries
    }

    /// Flat mapping representation (enums as their lowercase names).
    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            // Event always serializes to an object.
            _ => serde_json::Map::new(),
        }
    }

    /// Rebuild an event from [`Event::to_map`] output.
    pub fn from_map(
        map: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, serde_json::Error> {
        let event: Event = serde_json::from_value(serde_json::Value::Object(map))?;
        if event.retry_count > event.max_retries {
            return Err(<serde_json::Error as serde::de::Error>::custom(format!(
                "retry_count {} exceeds max_retries {}",
                event.retry_count, event.max_retries
            )));
        }
        Ok(event)
    }

    pub(crate) fn mark_completed(&mut self) {
        self.status = EventStatus::Completed;
        self.next_retry_at = None;
    }

    /// Terminal failure without consuming a retry slot.
    pub(crate) fn mark_failed(&mut self, error: String) {
        self.status = EventStatus::Failed;
        self.next_retry_at = None;
        self.last_error = Some(error);
    }

    /// Terminal failure on the attempt that used up the last retry.
    pub(crate) fn mark_exhausted(&mut self, error: String) {
        self.retry_count = self.retry_count.saturating_add(1).min(self.max_retries);
        self.mark_failed(error);
    }

    /// Consume a retry slot and park the event until `next_retry_at`.
    pub(crate) fn schedule_retry(&mut self, next_retry_at: DateTime<Utc>, error: String) {
        self.retry_count = self.retry_count.saturating_add(1).min(self.max_retries);
        self.status = EventStatus::Retrying;
        self.next_retry_at = Some(next_retry_at);
        self.last_error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn payload() -> Payload {
        let mut p = Payload::new();
        p.insert("metric".into(), json!("cpu"));
        p.insert("value".into(), json!(0.42));
        p
    }

    #[test]
    fn new_event_is_pending() {
        let e = Event::new("metrics_submission", payload(), Priority::High);
        assert_eq!(e.status(), EventStatus::Pending);
        assert_eq!(e.retry_count(), 0);
        assert_eq!(e.max_retries(), DEFAULT_MAX_RETRIES);
        assert!(e.next_retry_at().is_none());
        assert!(e.last_error().is_none());
    }

    #[test]
    fn map_round_trip_keeps_every_field() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let mut e = Event::new_at("api_call", payload(), Priority::Low, now).with_max_retries(3);
        e.schedule_retry(now + chrono::Duration::seconds(4), "timeout".into());

        let map = e.to_map();
        assert_eq!(map["priority"], "low");
        assert_eq!(map["status"], "retrying");

        let back = Event::from_map(map).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn from_map_rejects_broken_retry_invariant() {
        let mut map = Event::new("ping", Payload::new(), Priority::Normal).to_map();
        map.insert("retry_count".into(), json!(9));
        map.insert("max_retries".into(), json!(2));
        assert!(Event::from_map(map).is_err());
    }

    #[test]
    fn retrying_event_waits_for_its_time() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let mut e = Event::new_at("ping", Payload::new(), Priority::Normal, now);
        e.schedule_retry(now + chrono::Duration::seconds(2), "boom".into());

        assert!(!e.is_eligible(now));
        assert!(e.is_eligible(now + chrono::Duration::seconds(2)));
    }

    #[test]
    fn retry_count_never_exceeds_cap() {
        let mut e = Event::new("ping", Payload::new(), Priority::Normal).with_max_retries(1);
        e.mark_exhausted("boom".into());
        assert_eq!(e.retry_count(), 1);

        let mut zero = Event::new("ping", Payload::new(), Priority::Normal).with_max_retries(0);
        assert!(zero.is_last_attempt());
        zero.mark_exhausted("boom".into());
        assert_eq!(zero.retry_count(), 0);
        assert_eq!(zero.status(), EventStatus::Failed);
    }
}
