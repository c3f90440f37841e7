//! A counting-semaphore bulkhead isolating concurrent calls to a dependency.
//!
//! Grounded on the donor's `Bulkhead<S>` (an `Arc<Semaphore>` wrapping a `tower::Service`,
//! whose `S::Error: From<BulkheadError>` bound lets a rejection fold straight into the
//! caller's own error type). That bound is kept here even though the call is now a plain
//! async block instead of a `tower::Service`: a bulkhead rejection converts into `E` via
//! `Into`, so `acquire` returns a single `Result<T, E>` rather than a nested one.
//!
//! # Example
//!
//! ```
//! use ward_bulkhead::{Bulkhead, BulkheadConfig, BulkheadError};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let bulkhead = Bulkhead::new(BulkheadConfig::builder().tickets(2).build().unwrap());
//! let result = bulkhead.acquire(|| async { Ok::<_, BulkheadError>(42) }).await;
//! assert_eq!(result.unwrap(), 42);
//! # });
//! ```

pub mod config;
pub mod error;
pub mod events;

pub use config::{BulkheadConfig, BulkheadConfigBuilder, Capacity};
pub use error::BulkheadError;
pub use events::BulkheadEvent;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

/// Where a bulkhead's ticket ledger lives.
enum Backing {
    /// An in-process semaphore; capacity is visible only to this process.
    Local(Arc<Semaphore>),
    /// A capacity ledger backed by a named shared-atomic slot, so sibling processes
    /// sharing the slot name see the same remaining-ticket count. The actual admission
    /// wait still happens locally via the semaphore; the shared slot is decremented and
    /// incremented alongside it purely as a cross-process observability ledger: a named
    /// semaphore whose permit count survives worker restarts, without requiring a literal
    /// SysV semaphore transport.
    Shared {
        semaphore: Arc<Semaphore>,
        ledger: ward_core::SharedInteger,
    },
}

/// A counting-semaphore bulkhead.
pub struct Bulkhead {
    backing: Backing,
    config: Arc<BulkheadConfig>,
}

impl Bulkhead {
    /// Builds an in-process bulkhead from `config`.
    pub fn new(config: BulkheadConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_calls()));
        Self {
            backing: Backing::Local(semaphore),
            config: Arc::new(config),
        }
    }

    /// Builds a bulkhead whose remaining-ticket count is also mirrored into a named
    /// shared-atomic slot, for deployments that want a cross-process view of a
    /// per-resource ticket ledger.
    pub fn with_shared_ledger(config: BulkheadConfig, slot_name: impl Into<String>) -> Self {
        let capacity = config.max_concurrent_calls();
        let semaphore = Arc::new(Semaphore::new(capacity));
        let ledger = ward_core::SharedInteger::new(slot_name, capacity as i64);
        Self {
            backing: Backing::Shared { semaphore, ledger },
            config: Arc::new(config),
        }
    }

    /// The resource name this bulkhead was configured with.
    pub fn name(&self) -> &str {
        self.config.name()
    }

    /// Total ticket capacity.
    pub fn max_concurrent_calls(&self) -> usize {
        self.config.max_concurrent_calls()
    }

    fn semaphore(&self) -> &Arc<Semaphore> {
        match &self.backing {
            Backing::Local(s) => s,
            Backing::Shared { semaphore, .. } => semaphore,
        }
    }

    /// Acquires a ticket (waiting up to the configured `max_wait_duration`), runs `f`, and
    /// releases the ticket before returning. A rejection (no ticket within the wait
    /// budget) converts into `E` via `Into`, so the caller sees one flat `Result<T, E>`.
    pub async fn acquire<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<BulkheadError>,
    {
        self.acquire_with_wait(self.config.max_wait_duration, f).await
    }

    /// Like [`Bulkhead::acquire`], but waits up to `wait` instead of the configured
    /// `max_wait_duration`. Used by callers (such as a protected resource composing this
    /// bulkhead with a breaker) that shrink the wait budget while the breaker is
    /// half-open, so a single stuck probe can't also starve a ticket for everyone else.
    pub async fn acquire_with_wait<F, Fut, T, E>(&self, wait: Option<Duration>, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<BulkheadError>,
    {
        let sem = self.semaphore();
        let permit = match wait {
            Some(d) if d.is_zero() => sem.clone().try_acquire_owned().ok(),
            Some(d) => tokio::time::timeout(d, sem.clone().acquire_owned())
                .await
                .ok()
                .and_then(Result::ok),
            None => sem.clone().acquire_owned().await.ok(),
        };

        let Some(permit) = permit else {
            #[cfg(feature = "tracing")]
            tracing::debug!(resource = self.name(), "bulkhead rejected call: occupied");
            #[cfg(feature = "metrics")]
            metrics::counter!("bulkhead_calls_rejected_total", "resource" => self.name().to_string())
                .increment(1);
            self.config.event_listeners.emit(&BulkheadEvent::CallRejected {
                name: self.config.name.clone(),
                timestamp: Instant::now(),
            });
            return Err(BulkheadError::ResourceOccupied {
                max_concurrent_calls: self.max_concurrent_calls(),
            }
            .into());
        };

        if let Backing::Shared { ledger, .. } = &self.backing {
            ledger.increment(-1);
        }

        let concurrent_calls = self.max_concurrent_calls() - sem.available_permits();
        self.config.event_listeners.emit(&BulkheadEvent::CallPermitted {
            name: self.config.name.clone(),
            timestamp: Instant::now(),
            concurrent_calls,
        });
        #[cfg(feature = "metrics")]
        {
            metrics::counter!("bulkhead_calls_permitted_total", "resource" => self.name().to_string())
                .increment(1);
            metrics::gauge!("bulkhead_concurrent_calls", "resource" => self.name().to_string())
                .set(concurrent_calls as f64);
        }

        let started = Instant::now();
        let result = f().await;
        drop(permit);
        if let Backing::Shared { ledger, .. } = &self.backing {
            ledger.increment(1);
        }
        let duration = started.elapsed();

        #[cfg(feature = "metrics")]
        metrics::gauge!("bulkhead_concurrent_calls", "resource" => self.name().to_string())
            .set((self.max_concurrent_calls() - sem.available_permits()) as f64);

        match &result {
            Ok(_) => self.config.event_listeners.emit(&BulkheadEvent::CallFinished {
                name: self.config.name.clone(),
                timestamp: Instant::now(),
                duration,
            }),
            Err(_) => self.config.event_listeners.emit(&BulkheadEvent::CallFailed {
                name: self.config.name.clone(),
                timestamp: Instant::now(),
                duration,
            }),
        }

        result
    }
}
