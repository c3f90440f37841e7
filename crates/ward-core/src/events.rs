//! The listener registry every pattern crate (`ward-bulkhead`, `ward-circuitbreaker`,
//! `ward-adaptive`, and the composition layer's own `ResourceEvent`) hangs its
//! observability hooks off of.
//!
//! A pattern defines its own event enum and implements [`WardEvent`] for it; callers
//! attach closures or structs via [`EventListeners::add`]. `emit` fans an event out to
//! every registered listener and isolates each one from the others: a listener that
//! panics is caught, attributed to the Rust type that registered it, and the rest still
//! run. That attribution is what a bare "fire the callbacks, see what sticks" fan-out
//! wouldn't give you — a config builder can register several closures
//! (`on_call_permitted`, `on_call_rejected`, a user's own `add_listener`) against the
//! same resource, and a panic report naming only a numeric slot is useless once there's
//! more than one.

#[cfg(feature = "tracing")]
use std::any::Any;
use std::any::type_name;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Implemented by a pattern's own event enum (`BulkheadEvent`, `CircuitBreakerEvent`,
/// `AdaptiveEvent`, `ResourceEvent`, ...).
pub trait WardEvent: Send + Sync + fmt::Debug {
    /// The kind of event, e.g. `"state_transition"` or `"call_rejected"`.
    fn event_type(&self) -> &'static str;

    /// When this event occurred.
    fn timestamp(&self) -> Instant;

    /// The name of the resource instance that emitted this event.
    fn resource_name(&self) -> &str;
}

/// Receives events of a single type from an [`EventListeners`] collection.
pub trait EventListener<E: WardEvent>: Send + Sync {
    fn on_event(&self, event: &E);
}

/// A listener, type-erased so `EventListeners` can hold a mix of closures and structs.
pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

struct Registration<E: WardEvent> {
    /// `type_name` of whatever was passed to [`EventListeners::add`], captured at
    /// registration time so a panicking listener can be named in diagnostics without
    /// requiring callers to label their own listeners.
    registrant: &'static str,
    listener: BoxedEventListener<E>,
}

impl<E: WardEvent> Clone for Registration<E> {
    fn clone(&self) -> Self {
        Self { registrant: self.registrant, listener: Arc::clone(&self.listener) }
    }
}

/// The set of listeners a single bulkhead, breaker, or adaptive breaker instance emits
/// its events to.
#[derive(Clone)]
pub struct EventListeners<E: WardEvent> {
    registrations: Vec<Registration<E>>,
}

impl<E: WardEvent> EventListeners<E> {
    pub fn new() -> Self {
        Self { registrations: Vec::new() }
    }

    /// Registers `listener`. Its concrete type is captured for panic attribution; a
    /// closure wrapped in [`FnListener`] is named by its closure type, which is cryptic
    /// but still pinpoints the registration site better than a bare index would.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.registrations
            .push(Registration { registrant: type_name::<L>(), listener: Arc::new(listener) });
    }

    /// Fans `event` out to every registered listener, in registration order.
    ///
    /// A listener's panic never stops the rest: it's caught, attributed to the
    /// registrant's type name, logged as a warning when `tracing` is enabled, and
    /// counted when `metrics` is enabled.
    pub fn emit(&self, event: &E) {
        for registration in &self.registrations {
            let listener = &registration.listener;
            let outcome =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener.on_event(event)));

            if let Err(_payload) = outcome {
                #[cfg(feature = "tracing")]
                log_listener_panic(registration.registrant, event, _payload.as_ref());

                #[cfg(feature = "metrics")]
                record_listener_panic_metric(registration.registrant, event);

                #[cfg(not(any(feature = "tracing", feature = "metrics")))]
                let _ = _payload;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }
}

impl<E: WardEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapts a plain closure into an [`EventListener`], so config builders can register
/// `move |e: &SomeEvent| { ... }` directly instead of defining a struct per hook.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<E>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f, _phantom: std::marker::PhantomData }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: WardEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}

#[cfg(feature = "tracing")]
fn log_listener_panic<E: WardEvent>(registrant: &'static str, event: &E, panic_payload: &(dyn Any + Send)) {
    let panic_message = panic_payload
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic_payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());

    tracing::warn!(
        listener = registrant,
        resource = event.resource_name(),
        event_type = event.event_type(),
        panic_message = %panic_message,
        "ward event listener panicked"
    );
}

#[cfg(feature = "metrics")]
fn record_listener_panic_metric<E: WardEvent>(registrant: &'static str, event: &E) {
    metrics::counter!(
        "ward_event_listener_panics_total",
        "resource" => event.resource_name().to_string(),
        "event_type" => event.event_type().to_string(),
        "listener" => registrant.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct TestEvent {
        name: String,
        timestamp: Instant,
    }

    impl WardEvent for TestEvent {
        fn event_type(&self) -> &'static str {
            "test"
        }

        fn timestamp(&self) -> Instant {
            self.timestamp
        }

        fn resource_name(&self) -> &str {
            &self.name
        }
    }

    #[test]
    fn emits_to_a_single_listener() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut listeners = EventListeners::new();
        listeners.add(FnListener::new(move |_event: &TestEvent| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let event = TestEvent {
            name: "test".to_string(),
            timestamp: Instant::now(),
        };

        listeners.emit(&event);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        listeners.emit(&event);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn emits_to_every_listener() {
        let counter1 = Arc::new(AtomicUsize::new(0));
        let counter2 = Arc::new(AtomicUsize::new(0));

        let c1 = Arc::clone(&counter1);
        let c2 = Arc::clone(&counter2);

        let mut listeners = EventListeners::new();
        listeners.add(FnListener::new(move |_: &TestEvent| {
            c1.fetch_add(1, Ordering::SeqCst);
        }));
        listeners.add(FnListener::new(move |_: &TestEvent| {
            c2.fetch_add(2, Ordering::SeqCst);
        }));

        let event = TestEvent {
            name: "test".to_string(),
            timestamp: Instant::now(),
        };

        listeners.emit(&event);
        assert_eq!(counter1.load(Ordering::SeqCst), 1);
        assert_eq!(counter2.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn a_panicking_listener_does_not_block_the_rest() {
        let successful = Arc::new(AtomicUsize::new(0));
        let successful_clone = Arc::clone(&successful);

        let mut listeners = EventListeners::new();
        listeners.add(FnListener::new(|_: &TestEvent| panic!("boom")));
        listeners.add(FnListener::new(move |_: &TestEvent| {
            successful_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let event = TestEvent {
            name: "panic-test".to_string(),
            timestamp: Instant::now(),
        };

        listeners.emit(&event);
        assert_eq!(successful.load(Ordering::SeqCst), 1);
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn listener_panics_increment_metrics() {
        use metrics::set_global_recorder;
        use metrics_util::debugging::DebugValue;
        use metrics_util::debugging::DebuggingRecorder;
        use std::sync::LazyLock;

        static RECORDER: LazyLock<DebuggingRecorder> = LazyLock::new(DebuggingRecorder::default);
        let _ = set_global_recorder(&*RECORDER);

        let mut listeners = EventListeners::new();
        listeners.add(FnListener::new(|_: &TestEvent| panic!("boom")));

        let event = TestEvent {
            name: "panic-metric-test".to_string(),
            timestamp: Instant::now(),
        };

        listeners.emit(&event);

        let snapshot = RECORDER.snapshotter().snapshot().into_vec();
        let panic_metric = snapshot.iter().find(|(key, _, _, value)| {
            key.key().name() == "ward_event_listener_panics_total"
                && matches!(value, DebugValue::Counter(_))
                && key
                    .key()
                    .labels()
                    .any(|label| label.key() == "resource" && label.value() == "panic-metric-test")
        });

        let metric = panic_metric.expect("expected listener panic counter");
        assert!(
            metric.0.key().labels().any(|label| label.key() == "listener" && !label.value().is_empty()),
            "expected the panicking registrant's type name on the counter"
        );
    }

    #[test]
    fn a_panicking_listener_is_attributed_to_its_own_registrant_not_a_neighbor() {
        struct FirstListener;
        impl EventListener<TestEvent> for FirstListener {
            fn on_event(&self, _event: &TestEvent) {
                panic!("boom")
            }
        }

        struct SecondListener(Arc<AtomicUsize>);
        impl EventListener<TestEvent> for SecondListener {
            fn on_event(&self, _event: &TestEvent) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let mut listeners = EventListeners::new();
        listeners.add(FirstListener);
        let hits = Arc::new(AtomicUsize::new(0));
        listeners.add(SecondListener(Arc::clone(&hits)));

        assert_eq!(listeners.registrations[0].registrant, type_name::<FirstListener>());
        assert_eq!(listeners.registrations[1].registrant, type_name::<SecondListener>());

        let event = TestEvent { name: "attribution-test".to_string(), timestamp: Instant::now() };
        listeners.emit(&event);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn listener_panics_are_logged() {
        use std::io::{self, Write};
        use std::sync::{Arc, Mutex};
        use tracing_subscriber::fmt;

        #[derive(Clone)]
        struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

        impl Write for CaptureWriter {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                let mut guard = self.0.lock().unwrap();
                guard.extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer_buffer = buffer.clone();

        let subscriber = fmt()
            .with_max_level(tracing::Level::WARN)
            .without_time()
            .with_ansi(false)
            .with_writer(move || CaptureWriter(writer_buffer.clone()))
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut listeners = EventListeners::new();
            listeners.add(FnListener::new(|_: &TestEvent| panic!("boom")));
            listeners.add(FnListener::new(|_: &TestEvent| ()));

            let event = TestEvent {
                name: "trace-test".to_string(),
                timestamp: Instant::now(),
            };

            listeners.emit(&event);
        });

        let output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(
            output.contains("ward event listener panicked"),
            "expected warning log, got: {output}"
        );
        assert!(
            output.contains("resource=\"trace-test\""),
            "expected resource label in log, got: {output}"
        );
    }
}
