//! Bulkhead and circuit-breaker protection for calls to external dependencies, composed
//! into a single [`ProtectedResource`] per dependency.
//!
//! A resource pairs a [`ward_bulkhead::Bulkhead`] (a counting semaphore limiting
//! concurrent in-flight calls) with an optional breaker strategy (classic sliding-window,
//! PID-driven adaptive, or both fanned out together) that trips on sustained failures and
//! rejects calls outright while open. `acquire` runs a call through both in one step;
//! `ward::registry` hands out the same resource to every caller sharing an identifier, so
//! unrelated call sites protecting the same dependency share one bulkhead and one breaker.
//!
//! # Example
//!
//! ```
//! use ward::{BreakerStrategy, ProtectedResource};
//! use ward_bulkhead::{Bulkhead, BulkheadConfig};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let resource = ProtectedResource::<std::io::Error>::new(
//!     "payments-api",
//!     Bulkhead::new(BulkheadConfig::builder().tickets(10).build().unwrap()),
//!     BreakerStrategy::None,
//! );
//! let result = resource.acquire(|| async { Ok::<_, std::io::Error>(200) }).await;
//! assert_eq!(result.unwrap(), 200);
//! # });
//! ```

pub mod env;
pub mod events;
pub mod resource;

#[cfg(feature = "registry")]
pub mod registry;

#[cfg(feature = "tower-compat")]
pub mod tower_compat;

pub use events::ResourceEvent;
pub use resource::{BreakerStrategy, ProtectedResource};
pub use ward_core::WardError;

#[cfg(feature = "registry")]
pub use registry::{Consumer, Identifier, Registry};

#[cfg(feature = "tower-compat")]
pub use tower_compat::{ProtectedResourceLayer, ProtectedResourceService};
