//! Named, refcounted atomic primitives shared across handles that name the same slot.
//!
//! Production Semian backs these with a SysV shared-memory segment so sibling worker
//! processes in a preforking server see the same breaker state. This workspace targets a
//! single multi-threaded process, so the segment is substituted with a process-wide named
//! registry of `Arc<AtomicI64>` slots: every `SharedInteger::new` call with the same name
//! attaches to the same atomic and bumps its refcount, exactly mirroring the semantics a
//! SysV segment would give multiple attachers without requiring an actual cross-process
//! transport. `destroy` releases one refcount and reaps the slot at zero.
//!
//! The one thing this substitution does *not* give you is durability across process
//! restarts — a fresh process starts every named slot back at zero. Call sites that
//! genuinely need cross-process sharing should swap this module for a real shared-memory
//! crate; the type surface here is designed to make that swap mechanical.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::error::WardError;

fn registry() -> &'static Mutex<HashMap<String, Arc<AtomicI64>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Arc<AtomicI64>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn refcounts() -> &'static Mutex<HashMap<String, usize>> {
    static REFCOUNTS: OnceLock<Mutex<HashMap<String, usize>>> = OnceLock::new();
    REFCOUNTS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// A named integer counter attached to a process-wide slot.
///
/// Every `SharedInteger::new` that names the same slot attaches to the same underlying
/// `AtomicI64` and observes its current value, the way a second SysV attacher to the same
/// segment would.
#[derive(Debug, Clone)]
pub struct SharedInteger {
    name: String,
    slot: Arc<AtomicI64>,
}

impl SharedInteger {
    /// Attaches to the named slot, creating it at `initial` if this is the first attach.
    pub fn new(name: impl Into<String>, initial: i64) -> Self {
        let name = name.into();
        let slot = {
            let mut reg = registry().lock().unwrap();
            Arc::clone(
                reg.entry(name.clone())
                    .or_insert_with(|| Arc::new(AtomicI64::new(initial))),
            )
        };
        *refcounts().lock().unwrap().entry(name.clone()).or_insert(0) += 1;
        Self { name, slot }
    }

    /// The slot's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value.
    pub fn value(&self) -> i64 {
        self.slot.load(Ordering::SeqCst)
    }

    /// Overwrites the value.
    pub fn set(&self, value: i64) {
        self.slot.store(value, Ordering::SeqCst);
    }

    /// Atomically adds `delta` and returns the post-increment value.
    ///
    /// Linearisable: under N concurrent incrementers each adding 1, the returned values
    /// form a permutation of `{k+1, ..., k+N}` for whatever `k` preceded the race.
    pub fn increment(&self, delta: i64) -> i64 {
        self.slot.fetch_add(delta, Ordering::SeqCst) + delta
    }

    /// Resets the slot to zero.
    pub fn reset(&self) {
        self.slot.store(0, Ordering::SeqCst);
    }

    /// Number of live handles attached to this slot, including this one.
    pub fn refcount(&self) -> usize {
        *refcounts().lock().unwrap().get(&self.name).unwrap_or(&0)
    }

    /// Releases this handle's refcount; when it reaches zero the slot is reaped from the
    /// registry (a later `new` with the same name starts fresh).
    pub fn destroy(self) {
        let mut counts = refcounts().lock().unwrap();
        if let Some(count) = counts.get_mut(&self.name) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(&self.name);
                registry().lock().unwrap().remove(&self.name);
            }
        }
    }
}

/// A non-thread-safe integer fast path. Unlike [`SharedInteger`] this is never
/// linearisable and must not be shared across threads; it exists for single-threaded
/// hot paths where the synchronization cost of an atomic is unwanted.
#[derive(Debug, Clone, Copy)]
pub struct NonAtomicInteger {
    value: i64,
}

impl NonAtomicInteger {
    /// Creates a fast-path counter with the given initial value.
    pub fn new(initial: i64) -> Self {
        Self { value: initial }
    }

    /// Current value.
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Adds `delta` and returns the post-increment value.
    pub fn increment(&mut self, delta: i64) -> i64 {
        self.value += delta;
        self.value
    }

    /// Resets to zero.
    pub fn reset(&mut self) {
        self.value = 0;
    }
}

/// A named enum-valued slot: an ordinal backed by [`SharedInteger`] plus the ordered list
/// of symbols it ranges over.
#[derive(Debug, Clone)]
pub struct SharedEnum {
    integer: SharedInteger,
    symbols: Vec<String>,
}

impl SharedEnum {
    /// Attaches to the named slot; `symbols[0]` is the initial value on first attach.
    pub fn new(name: impl Into<String>, symbols: Vec<String>) -> Result<Self, WardError<()>> {
        if symbols.is_empty() {
            return Err(WardError::InvalidValue {
                reason: "SharedEnum requires at least one symbol".to_string(),
            });
        }
        Ok(Self {
            integer: SharedInteger::new(name, 0),
            symbols,
        })
    }

    /// The current symbol.
    ///
    /// A corrupted shared segment can hold an ordinal outside `0..symbols.len()` (another
    /// process wrote garbage, or the slot was reused for a differently-sized enum). That is
    /// reported as [`WardError::InvalidValue`] rather than wrapped back into range, so the
    /// corruption is visible instead of silently mis-decoded as some other symbol.
    pub fn value(&self) -> Result<&str, WardError<()>> {
        let ord = self.integer.value();
        usize::try_from(ord)
            .ok()
            .and_then(|ord| self.symbols.get(ord))
            .map(String::as_str)
            .ok_or_else(|| WardError::InvalidValue {
                reason: format!(
                    "shared enum '{}' holds out-of-domain ordinal {ord} (valid range 0..{})",
                    self.integer.name(),
                    self.symbols.len()
                ),
            })
    }

    /// Sets the current symbol by name.
    pub fn set(&self, symbol: &str) -> Result<(), WardError<()>> {
        match self.symbols.iter().position(|s| s == symbol) {
            Some(ord) => {
                self.integer.set(ord as i64);
                Ok(())
            }
            None => Err(WardError::InvalidValue {
                reason: format!("'{symbol}' is not a member of this enum"),
            }),
        }
    }

    /// Advances the ordinal by `steps`, wrapping modulo the symbol count, and returns the
    /// resulting symbol.
    pub fn advance(&self, steps: i64) -> &str {
        let len = self.symbols.len() as i64;
        let new_ord = self.integer.increment(steps).rem_euclid(len);
        self.integer.set(new_ord);
        &self.symbols[new_ord as usize]
    }

    /// Resets to `symbols[0]`.
    pub fn reset(&self) {
        self.integer.reset();
    }
}

/// The three-valued circuit breaker state, backed by a [`SharedEnum`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerStateValue {
    /// Calls are admitted normally.
    Closed,
    /// Calls fail fast without running.
    Open,
    /// A single probe call is admitted to test recovery.
    HalfOpen,
}

impl BreakerStateValue {
    fn as_symbol(self) -> &'static str {
        match self {
            BreakerStateValue::Closed => "closed",
            BreakerStateValue::Open => "open",
            BreakerStateValue::HalfOpen => "half_open",
        }
    }

    fn from_symbol(s: &str) -> Result<Self, WardError<()>> {
        match s {
            "closed" => Ok(BreakerStateValue::Closed),
            "open" => Ok(BreakerStateValue::Open),
            "half_open" => Ok(BreakerStateValue::HalfOpen),
            other => Err(WardError::InvalidValue {
                reason: format!("'{other}' is not a valid breaker state symbol"),
            }),
        }
    }
}

/// A named, process-shared view of a breaker's state, for deployments that run the
/// classic breaker across multiple worker processes sharing one slot name.
#[derive(Debug, Clone)]
pub struct SharedState {
    inner: SharedEnum,
}

impl SharedState {
    /// Attaches to the named state slot, starting `closed` on first attach.
    pub fn new(name: impl Into<String>) -> Self {
        let inner = SharedEnum::new(
            name,
            vec![
                "closed".to_string(),
                "open".to_string(),
                "half_open".to_string(),
            ],
        )
        .expect("three symbols is never empty");
        Self { inner }
    }

    /// The current state.
    ///
    /// Fails with [`WardError::InvalidValue`] if the underlying slot holds an ordinal or
    /// symbol this process doesn't recognize, rather than quietly treating the segment as
    /// closed.
    pub fn get(&self) -> Result<BreakerStateValue, WardError<()>> {
        BreakerStateValue::from_symbol(self.inner.value()?)
    }

    /// `true` when closed. Panics if the shared segment is corrupted; prefer [`Self::get`]
    /// when the slot may be shared with a process you don't control.
    pub fn is_closed(&self) -> bool {
        self.get().expect("shared breaker state slot is corrupted") == BreakerStateValue::Closed
    }

    /// `true` when open. Panics if the shared segment is corrupted; prefer [`Self::get`]
    /// when the slot may be shared with a process you don't control.
    pub fn is_open(&self) -> bool {
        self.get().expect("shared breaker state slot is corrupted") == BreakerStateValue::Open
    }

    /// `true` when half-open. Panics if the shared segment is corrupted; prefer [`Self::get`]
    /// when the slot may be shared with a process you don't control.
    pub fn is_half_open(&self) -> bool {
        self.get().expect("shared breaker state slot is corrupted") == BreakerStateValue::HalfOpen
    }

    /// Transitions to open.
    pub fn open(&self) {
        self.inner
            .set(BreakerStateValue::Open.as_symbol())
            .expect("open is always a valid symbol");
    }

    /// Transitions to closed.
    pub fn close(&self) {
        self.inner
            .set(BreakerStateValue::Closed.as_symbol())
            .expect("closed is always a valid symbol");
    }

    /// Transitions to half-open.
    pub fn half_open(&self) {
        self.inner
            .set(BreakerStateValue::HalfOpen.as_symbol())
            .expect("half_open is always a valid symbol");
    }

    /// Resets to closed.
    pub fn reset(&self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn two_handles_to_the_same_name_see_the_same_value() {
        let a = SharedInteger::new("slot-a", 0);
        let b = SharedInteger::new("slot-a", 99);
        a.set(5);
        assert_eq!(b.value(), 5);
    }

    #[test]
    fn increment_returns_a_permutation_under_races() {
        let base = SharedInteger::new("slot-race", 0);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let h = SharedInteger::new("slot-race", 0);
                thread::spawn(move || h.increment(1))
            })
            .collect();
        let mut results: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        results.sort();
        assert_eq!(results, (1..=8).collect::<Vec<_>>());
        assert_eq!(base.value(), 8);
        base.destroy();
    }

    #[test]
    fn destroy_reaps_the_slot_once_refcount_hits_zero() {
        let a = SharedInteger::new("slot-destroy", 7);
        let b = a.clone();
        assert_eq!(a.refcount(), 2);
        a.destroy();
        assert_eq!(b.refcount(), 1);
        b.destroy();
        let fresh = SharedInteger::new("slot-destroy", 42);
        assert_eq!(fresh.value(), 42);
        fresh.destroy();
    }

    #[test]
    fn shared_enum_rejects_unknown_symbols() {
        let e = SharedEnum::new("slot-enum", vec!["a".into(), "b".into()]).unwrap();
        assert_eq!(e.value().unwrap(), "a");
        assert!(e.set("c").is_err());
        e.set("b").unwrap();
        assert_eq!(e.value().unwrap(), "b");
    }

    #[test]
    fn shared_enum_value_fails_on_out_of_domain_ordinal() {
        let e = SharedEnum::new("slot-enum-corrupt", vec!["a".into(), "b".into()]).unwrap();
        e.integer.set(7);
        assert!(matches!(e.value(), Err(WardError::InvalidValue { .. })));
        e.integer.destroy();
    }

    #[test]
    fn breaker_state_value_rejects_unknown_symbol() {
        assert!(BreakerStateValue::from_symbol("closed").is_ok());
        assert!(matches!(
            BreakerStateValue::from_symbol("quarantined"),
            Err(WardError::InvalidValue { .. })
        ));
    }

    #[test]
    fn shared_enum_requires_nonempty_symbols() {
        assert!(SharedEnum::new("slot-empty", vec![]).is_err());
    }

    #[test]
    fn shared_state_cycles_through_transitions() {
        let state = SharedState::new("slot-state");
        assert!(state.is_closed());
        state.open();
        assert!(state.is_open());
        state.half_open();
        assert!(state.is_half_open());
        state.reset();
        assert!(state.is_closed());
    }
}
