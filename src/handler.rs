//! Handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! A route table holds handlers of *different* types: plain async functions,
//! a nested [`Pipeline`](crate::Pipeline), the [`StaticFiles`](crate::StaticFiles)
//! provider, even another [`Router`](crate::Router). They all implement one
//! object-safe capability, [`Handler`], and are stored as
//! [`BoxedHandler`] (`Arc<dyn Handler>`).
//!
//! ```text
//! async fn hello(req: Request) -> Response { … }   ← user writes this
//!        ↓ handler_fn(hello)
//! FnHandler(hello)                                  ← implements Handler
//!        ↓ router.route("/", MatchMode::Exact, …)
//! Arc<dyn Handler>                                  ← one vtable dispatch
//!        ↓ handler.call(req) at request time
//! Box::pin(async { Ok(hello(req).await.into_response()) })
//! ```
//!
//! The runtime cost per request is one Arc clone plus one virtual call.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{BoxError, Error};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased future that resolves to a [`Response`] or a
/// fault.
///
/// `Send + 'static` lets tokio move the future across worker threads.
pub type BoxFuture = Pin<Box<dyn Future<Output = Result<Response, Error>> + Send + 'static>>;

/// A handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn Handler>;

/// The request-handling capability: `handle(request) -> response`.
///
/// Returning `Err` is a fault: the rest of the pipeline is skipped and the
/// client receives a `500`. Expected outcomes (not found, unauthorized, …) are
/// responses, not errors.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, req: Request) -> BoxFuture;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn call(&self, req: Request) -> BoxFuture {
        (**self).call(req)
    }
}

/// Turns an infallible async function into a [`Handler`].
///
/// ```rust
/// use trellis::{handler_fn, Request, Response};
///
/// async fn hello(_req: Request) -> Response {
///     Response::text("hello")
/// }
///
/// let handler = handler_fn(hello);
/// ```
pub fn handler_fn<F, Fut, R>(f: F) -> FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    FnHandler(f)
}

/// Turns a fallible async function into a [`Handler`]. An `Err` becomes a
/// handler fault.
pub fn try_handler_fn<F, Fut, R, E>(f: F) -> TryFnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    TryFnHandler(f)
}

/// Handler returned by [`handler_fn`].
pub struct FnHandler<F>(F);

impl<F, Fut, R> Handler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { Ok(fut.await.into_response()) })
    }
}

/// Handler returned by [`try_handler_fn`].
pub struct TryFnHandler<F>(F);

impl<F, Fut, R, E> Handler for TryFnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move {
            fut.await.map(IntoResponse::into_response).map_err(Error::handler)
        })
    }
}
