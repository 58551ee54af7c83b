//! Domain model (ids, priorities, statuses, events).

pub mod event;
pub mod events;
pub mod ids;
pub mod priority;
pub mod state;

pub use self::event::{DEFAULT_MAX_RETRIES, Event, Payload};
pub use self::events::QueueEvent;
pub use self::ids::EventId;
pub use self::priority::Priority;
pub use self::state::EventStatus;
