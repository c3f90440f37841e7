//! A process-wide, identifier-keyed map of live [`ProtectedResource`]s.
//!
//! Grounded on `ward_core::shared_atomic`'s named-slot registry (a
//! `OnceLock<Mutex<HashMap<String, ...>>>` singleton that attaches-or-creates by name);
//! this registry generalizes that pattern from "one `AtomicI64` per name" to "one
//! type-erased `ProtectedResource` per name", since a single process-wide map can host
//! resources built over different application error types `A`.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use crate::resource::ProtectedResource;

/// A registry key. Stable across calls, unique per process.
pub type Identifier = String;

/// Something that consumes a registered resource. Held by the registry only as a
/// [`Weak`] reference: when every strong reference to a consumer drops, the registry
/// prunes it lazily on the next [`Registry::consumers_for`] call rather than eagerly
/// tracking drops.
pub trait Consumer: Send + Sync {}

impl<T: Send + Sync> Consumer for T {}

/// A type-erased handle to a registered resource: the `Any` arc lets `register` downcast
/// back to `Arc<ProtectedResource<A>>`, and `destroy` closes over a typed clone of the
/// same arc so `unregister` can tear it down without ever naming `A` (avoids relying on
/// trait-object upcasting, which this workspace's minimum supported Rust version
/// predates).
struct Entry {
    any: Arc<dyn Any + Send + Sync>,
    destroy: Box<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>,
}

fn entry_for<A>(resource: ProtectedResource<A>) -> (Arc<ProtectedResource<A>>, Entry)
where
    A: Send + Sync + std::fmt::Display + 'static,
{
    let resource = Arc::new(resource);
    let any: Arc<dyn Any + Send + Sync> = Arc::clone(&resource) as Arc<dyn Any + Send + Sync>;
    let for_destroy = Arc::clone(&resource);
    let destroy = Box::new(move || {
        let resource = Arc::clone(&for_destroy);
        Box::pin(async move {
            resource.destroy().await;
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    (resource, Entry { any, destroy })
}

/// A process-wide map of identifier to live resource, plus a weak-referenced set of
/// consumers per identifier.
///
/// First-writer-wins: concurrent `register` calls for the same identifier all observe
/// the same resource; only the first caller's factory actually runs.
pub struct Registry {
    resources: Mutex<HashMap<Identifier, Entry>>,
    consumers: Mutex<HashMap<Identifier, Vec<Weak<dyn Consumer>>>>,
}

impl Registry {
    fn new() -> Self {
        Self {
            resources: Mutex::new(HashMap::new()),
            consumers: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide singleton.
    pub fn global() -> &'static Registry {
        static REGISTRY: OnceLock<Registry> = OnceLock::new();
        REGISTRY.get_or_init(Registry::new)
    }

    /// Returns the resource registered under `id`, building it with `factory` if this is
    /// the first registration. `factory` is not called at all if `id` is already
    /// registered — first writer wins.
    ///
    /// # Panics
    ///
    /// Panics if `id` was already registered with a [`ProtectedResource`] over a
    /// different application error type `A`. An identifier is a key for one resource
    /// shape for the lifetime of the process; reusing it across incompatible error types
    /// is a programmer error, not a runtime condition to recover from.
    pub fn register<A, F>(&self, id: impl Into<Identifier>, factory: F) -> Arc<ProtectedResource<A>>
    where
        A: Send + Sync + std::fmt::Display + 'static,
        F: FnOnce() -> ProtectedResource<A>,
    {
        let id = id.into();
        let mut resources = self.resources.lock().unwrap();
        let any = match resources.get(&id) {
            Some(existing) => Arc::clone(&existing.any),
            None => {
                let (resource, entry) = entry_for(factory());
                resources.insert(id.clone(), entry);
                drop(resources);
                return resource;
            }
        };
        drop(resources);
        any.downcast::<ProtectedResource<A>>()
            .unwrap_or_else(|_| panic!("identifier '{id}' is already registered with a different application error type"))
    }

    /// Registers `consumer` as a holder of `id`'s resource. A no-op if `id` has no
    /// registered resource.
    pub fn add_consumer(&self, id: &str, consumer: &Arc<dyn Consumer>) {
        let mut consumers = self.consumers.lock().unwrap();
        consumers.entry(id.to_string()).or_default().push(Arc::downgrade(consumer));
    }

    /// Live consumers currently holding `id`'s resource, pruning any whose strong
    /// reference has since dropped.
    pub fn consumers_for(&self, id: &str) -> Vec<Arc<dyn Consumer>> {
        let mut consumers = self.consumers.lock().unwrap();
        let Some(weak_set) = consumers.get_mut(id) else {
            return Vec::new();
        };
        let mut live = Vec::with_capacity(weak_set.len());
        weak_set.retain(|w| match w.upgrade() {
            Some(strong) => {
                live.push(strong);
                true
            }
            None => false,
        });
        live
    }

    /// Removes and tears down `id`'s resource, if registered. A client calling for `id`
    /// afterward lazily re-registers a new resource via its own `register` call.
    pub async fn unregister(&self, id: &str) {
        let removed = self.resources.lock().unwrap().remove(id);
        self.consumers.lock().unwrap().remove(id);
        if let Some(entry) = removed {
            (entry.destroy)().await;
        }
    }

    /// Tears down and removes every registered resource. Destructive; intended for test
    /// teardown between cases that would otherwise share process-wide state.
    pub async fn unregister_all(&self) {
        let removed: Vec<Entry> = {
            let mut resources = self.resources.lock().unwrap();
            let mut consumers = self.consumers.lock().unwrap();
            consumers.clear();
            resources.drain().map(|(_, entry)| entry).collect()
        };
        for entry in removed {
            (entry.destroy)().await;
        }
    }

    /// Currently registered identifiers.
    pub fn resource_ids(&self) -> Vec<Identifier> {
        self.resources.lock().unwrap().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ward_bulkhead::{Bulkhead, BulkheadConfig};

    #[derive(Debug, Clone, PartialEq)]
    struct TestError;
    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error")
        }
    }
    impl std::error::Error for TestError {}

    fn build(name: &str) -> ProtectedResource<TestError> {
        ProtectedResource::new(
            name,
            Bulkhead::new(BulkheadConfig::builder().tickets(5).build().unwrap()),
            crate::resource::BreakerStrategy::None,
        )
    }

    #[tokio::test]
    async fn first_registration_wins() {
        let registry = Registry::new();
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let a = registry.register("payments", || {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            build("payments")
        });
        let b = registry.register("payments", || {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            build("payments")
        });
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unregister_removes_and_a_later_call_rebuilds() {
        let registry = Registry::new();
        let first = registry.register("cache", || build("cache"));
        registry.unregister("cache").await;
        let second = registry.register("cache", || build("cache"));
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn dead_consumers_are_pruned_on_read() {
        let registry = Registry::new();
        let _ = registry.register("queue", || build("queue"));
        let consumer: Arc<dyn Consumer> = Arc::new(());
        registry.add_consumer("queue", &consumer);
        assert_eq!(registry.consumers_for("queue").len(), 1);
        drop(consumer);
        assert_eq!(registry.consumers_for("queue").len(), 0);
    }

    #[tokio::test]
    async fn unregister_all_clears_every_resource() {
        let registry = Registry::new();
        let _ = registry.register("a", || build("a"));
        let _ = registry.register("b", || build("b"));
        registry.unregister_all().await;
        assert!(registry.resource_ids().is_empty());
    }
}
