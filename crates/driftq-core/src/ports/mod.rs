//! Ports - 抽象化レイヤー
//!
//! Seams the queue depends on but does not implement in production:
//! where time comes from and where dropped events go.

pub mod clock;
pub mod event_sink;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::event_sink::{EventSink, MemoryEventSink, NoopEventSink};
