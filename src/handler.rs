//! Backend handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! The router holds handlers of *different* types in one
//! `HashMap<Method, Tree>`, so each is hidden behind a trait object
//! (`dyn ErasedHandler`) and stored uniformly:
//!
//! ```text
//! async fn orders(req: Request) -> Result<Response, E> { … }   ← user writes this
//!        ↓ router.on(Method::Get, "/orders", orders)
//! orders.into_boxed_handler()                                   ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(orders))                                   ← BoxedHandler
//!        ↓
//! handler.call(req) at request time                             ← one vtable dispatch
//!        ↓
//! Box::pin(async { orders(req).await.into_route_result() })     ← BoxFuture
//! ```
//!
//! Handlers are the gateway's routing collaborator. An `Err` from one is a
//! routing failure and sends the request through the `error` filter phase.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{BoxError, RouteError};
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::status::Status;

// ── Internal types ────────────────────────────────────────────────────────────

#[doc(hidden)]
pub type BoxFuture =
    Pin<Box<dyn Future<Output = Result<Response, RouteError>> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── IntoRouteResult ───────────────────────────────────────────────────────────

/// What a backend handler may return.
///
/// Anything [`IntoResponse`] succeeds. `Result<T, E>` succeeds on `Ok` and
/// reports a routing failure on `Err`.
pub trait IntoRouteResult {
    fn into_route_result(self) -> Result<Response, RouteError>;
}

impl IntoRouteResult for Response {
    fn into_route_result(self) -> Result<Response, RouteError> { Ok(self) }
}

impl IntoRouteResult for &'static str {
    fn into_route_result(self) -> Result<Response, RouteError> { Ok(self.into_response()) }
}

impl IntoRouteResult for String {
    fn into_route_result(self) -> Result<Response, RouteError> { Ok(self.into_response()) }
}

impl IntoRouteResult for Status {
    fn into_route_result(self) -> Result<Response, RouteError> { Ok(self.into_response()) }
}

impl<T, E> IntoRouteResult for Result<T, E>
where
    T: IntoResponse,
    E: Into<BoxError>,
{
    fn into_route_result(self) -> Result<Response, RouteError> {
        self.map(IntoResponse::into_response).map_err(RouteError::new)
    }
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid backend handler.
///
/// Satisfied automatically by any `async fn` with the signature:
///
/// ```text
/// async fn name(req: Request) -> impl IntoRouteResult
/// ```
///
/// Sealed: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoRouteResult + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoRouteResult + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoRouteResult + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_route_result() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;

    async fn ok(_req: Request) -> &'static str {
        "ok"
    }

    async fn failing(_req: Request) -> Result<Response, std::io::Error> {
        Err(std::io::Error::other("connection refused"))
    }

    #[tokio::test]
    async fn plain_return_succeeds() {
        let handler = ok.into_boxed_handler();
        let res = handler.call(Request::new(Method::Get, "/")).await.unwrap();
        assert_eq!(res.body(), b"ok");
    }

    #[tokio::test]
    async fn err_return_is_a_route_error() {
        let handler = failing.into_boxed_handler();
        let err = handler.call(Request::new(Method::Get, "/")).await.unwrap_err();
        assert_eq!(err.to_string(), "connection refused");
    }
}
