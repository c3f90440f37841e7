//! A `tower::Layer`/`tower::Service` pair wrapping a [`ProtectedResource`] around an inner
//! service, for callers already building their stacks with `tower::ServiceBuilder`.
//!
//! Grounded on the donor's own bulkhead `tower::Service` wrapper: a cloned `Arc`-backed
//! guard wraps `inner.call`, returns a boxed future,
//! and forwards `poll_ready` straight to the inner service. Here the guard is a whole
//! [`ProtectedResource`] (bulkhead plus breaker) rather than a bare semaphore, so one layer
//! replaces what the donor stacks as two (`.layer(breaker).layer(bulkhead)`).

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::{Layer, Service};

use ward_core::WardError;

use crate::resource::ProtectedResource;

/// A `tower::Layer` that wraps a service with a [`ProtectedResource`].
#[derive(Clone)]
pub struct ProtectedResourceLayer<A> {
    resource: Arc<ProtectedResource<A>>,
}

impl<A> ProtectedResourceLayer<A> {
    /// Wraps `resource` (already built over the error type the inner service returns) into
    /// a layer.
    pub fn new(resource: Arc<ProtectedResource<A>>) -> Self {
        Self { resource }
    }
}

impl<S, A> Layer<S> for ProtectedResourceLayer<A> {
    type Service = ProtectedResourceService<S, A>;

    fn layer(&self, inner: S) -> Self::Service {
        ProtectedResourceService { inner, resource: Arc::clone(&self.resource) }
    }
}

/// A service guarded by a [`ProtectedResource`]: every call is admitted through the
/// resource's bulkhead and breaker before reaching `inner`.
#[derive(Clone)]
pub struct ProtectedResourceService<S, A> {
    inner: S,
    resource: Arc<ProtectedResource<A>>,
}

impl<S, Request> Service<Request> for ProtectedResourceService<S, S::Error>
where
    S: Service<Request> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + std::fmt::Display + 'static,
    Request: Send + 'static,
{
    type Response = S::Response;
    type Error = WardError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(WardError::Application)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let mut inner = self.inner.clone();
        let resource = Arc::clone(&self.resource);
        Box::pin(async move { resource.acquire(|| inner.call(request)).await })
    }
}
