//! The capability used to reach the service behind a subschema.

use std::sync::Arc;

use async_trait::async_trait;
use tower::BoxError;
use tower::Service;
use tower::ServiceExt;

use crate::graphql::Request;
use crate::graphql::Response;

/// Runs a GraphQL request against the service backing one subschema.
///
/// Used both for introspection and for delegating root fields at query time.
/// Transport, retries and authentication are the implementor's concern.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    /// Execute a GraphQL request and return its response.
    ///
    /// GraphQL errors belong in the [`Response`]; `Err` is reserved for failures
    /// to obtain a response at all.
    async fn execute(&self, request: Request) -> Result<Response, BoxError>;
}

#[async_trait]
impl<T> Executor for Arc<T>
where
    T: Executor + ?Sized,
{
    async fn execute(&self, request: Request) -> Result<Response, BoxError> {
        (**self).execute(request).await
    }
}

/// An [`Executor`] backed by a [`tower::Service`].
#[derive(Clone)]
pub struct ServiceExecutor<S> {
    service: S,
}

impl<S> ServiceExecutor<S> {
    /// Wrap a service.
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> Executor for ServiceExecutor<S>
where
    S: Service<Request, Response = Response, Error = BoxError> + Clone + Send + Sync + 'static,
    S::Future: Send,
{
    async fn execute(&self, request: Request) -> Result<Response, BoxError> {
        self.service.clone().oneshot(request).await
    }
}
