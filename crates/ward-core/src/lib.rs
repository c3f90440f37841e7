//! Shared infrastructure for the `ward` resiliency crates: the event system every
//! pattern emits through, the common error envelope, named/refcounted shared-atomic
//! primitives, and sliding windows of outcomes.

pub mod error;
pub mod events;
pub mod shared_atomic;
pub mod sliding_window;

pub use error::WardError;
pub use events::{EventListener, EventListeners, FnListener, WardEvent};
pub use shared_atomic::{BreakerStateValue, NonAtomicInteger, SharedEnum, SharedInteger, SharedState};
pub use sliding_window::{CountWindow, TimeWindow};
