//! The request lifecycle.
//!
//! ```text
//! request ─► pre ──terminated?──► early-exit response
//!             │
//!             ▼
//!           route ──terminated?──► early-exit response
//!             │
//!             ├─ response set by a route filter ─┐
//!             ▼                                  │
//!           router ─► read body ─► backend handler
//!             │ Ok / no match        │ Err/panic │
//!             ▼                      ▼           │
//!           post ◄───────────────────┼───────────┘
//!             │                    error
//!             ▼                      │
//!          response ◄────────────────┘
//! ```
//!
//! Each phase runs on a blocking worker via `spawn_blocking`: filters are
//! synchronous and may do short blocking I/O, which must not stall the
//! runtime's async workers. The context moves to the worker and back, so it
//! is only ever touched by one thread at a time.
//!
//! The request body is read only once a backend is about to be called, and
//! at most `max_request_body` bytes of it. A request the filters reject is
//! answered without waiting for its body.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::context::{DEFAULT_MAX_EARLY_BODY, RequestContext};
use crate::error::{RouteError, panic_message};
use crate::filter::{Filter, FilterRegistry, Phase, PhaseReport};
use crate::handler::BoxedHandler;
use crate::request::{DEFAULT_MAX_REQUEST_BODY, Request};
use crate::response::Response;
use crate::router::Router;
use crate::status::Status;

/// Filters plus the router they guard.
///
/// Build it once at startup and pass it to
/// [`Server::serve`](crate::Server::serve), which shares it read-only across
/// every connection.
///
/// ```rust,no_run
/// use tollgate::{Gateway, Method, Request, Router, Server, filter::TokenFilter};
///
/// # async fn orders(_req: Request) -> &'static str { "[]" }
/// # async fn run() -> Result<(), tollgate::Error> {
/// let gateway = Gateway::new(Router::new().on(Method::Get, "/orders", orders))
///     .filter(TokenFilter::new());
///
/// Server::bind("0.0.0.0:3000").serve(gateway).await
/// # }
/// ```
pub struct Gateway {
    filters: FilterRegistry,
    router: Router,
    max_early_body: usize,
    max_request_body: usize,
}

impl Gateway {
    pub fn new(router: Router) -> Self {
        Self {
            filters: FilterRegistry::new(),
            router,
            max_early_body: DEFAULT_MAX_EARLY_BODY,
            max_request_body: DEFAULT_MAX_REQUEST_BODY,
        }
    }

    /// Applies the body limits and the disabled-filter list.
    pub fn configure(mut self, config: &Config) -> Self {
        self.max_early_body = config.max_early_body;
        self.max_request_body = config.max_request_body;
        for name in &config.disabled_filters {
            self.filters.disable(name.clone());
        }
        self
    }

    /// Registers a filter. Returns `self` for chaining.
    pub fn filter(mut self, filter: impl Filter) -> Self {
        self.filters.register(filter);
        self
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    /// Runs one phase synchronously on the calling thread.
    pub fn run_phase(&self, phase: Phase, ctx: &mut RequestContext) -> PhaseReport {
        self.filters.run_phase(phase, ctx)
    }

    /// Takes one request through every phase and produces its response.
    ///
    /// If this future is dropped (the client went away), the context is
    /// cancelled and the filter chain stops before its next filter.
    pub async fn handle(self: Arc<Self>, mut request: Request) -> Response {
        let ctx = RequestContext::new(&request, self.max_early_body);
        let _disconnect = ctx.cancellation().drop_guard();

        let Some(ctx) = run_blocking(&self, Phase::Pre, ctx).await else {
            return Response::status(Status::InternalServerError);
        };
        if let Some(done) = finished(ctx.is_terminated(), ctx.is_cancelled()) {
            debug!(status = ?ctx.response_status(), "pre phase ended the request");
            return match done {
                Done::Terminated => ctx.into_response(),
                Done::Cancelled => Response::status(Status::ClientClosedRequest),
            };
        }

        let Some(mut ctx) = run_blocking(&self, Phase::Route, ctx).await else {
            return Response::status(Status::InternalServerError);
        };
        if let Some(done) = finished(ctx.is_terminated(), ctx.is_cancelled()) {
            return match done {
                Done::Terminated => ctx.into_response(),
                Done::Cancelled => Response::status(Status::ClientClosedRequest),
            };
        }

        if ctx.response().is_some() {
            debug!("route filter answered, skipping router");
        } else {
            match self.router.lookup(request.method(), request.path()) {
                Some((handler, params)) => {
                    if let Err(status) = request.read_body(self.max_request_body).await {
                        ctx.terminate(status);
                        return ctx.into_response();
                    }
                    match call_backend(handler, request.with_params(params)).await {
                        Ok(response) => ctx.set_response(response),
                        Err(e) => {
                            warn!(error = %e, "backend handler failed");
                            ctx.set_failure(e);
                        }
                    }
                }
                None => ctx.set_response(Response::status(Status::NotFound)),
            }
        }

        let phase = if ctx.failure().is_some() { Phase::Error } else { Phase::Post };
        let Some(ctx) = run_blocking(&self, phase, ctx).await else {
            return Response::status(Status::InternalServerError);
        };
        ctx.into_response()
    }
}

/// Calls a backend handler, turning a panic into a routing failure.
async fn call_backend(handler: BoxedHandler, request: Request) -> Result<Response, RouteError> {
    match AssertUnwindSafe(async move { handler.call(request).await }).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(RouteError::new(format!(
            "backend handler panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

enum Done {
    Terminated,
    Cancelled,
}

fn finished(terminated: bool, cancelled: bool) -> Option<Done> {
    if terminated {
        Some(Done::Terminated)
    } else if cancelled {
        Some(Done::Cancelled)
    } else {
        None
    }
}

/// Runs `phase` on the blocking pool and hands the context back.
///
/// `None` only if the blocking task itself was lost (runtime shutting down);
/// filter panics are caught inside the registry and never get this far.
async fn run_blocking(gateway: &Arc<Gateway>, phase: Phase, mut ctx: RequestContext) -> Option<RequestContext> {
    let gateway = Arc::clone(gateway);
    let span = tracing::Span::current();

    let joined = tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        gateway.filters.run_phase(phase, &mut ctx);
        ctx
    })
    .await;

    match joined {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            error!(%phase, error = %e, "filter phase did not complete");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, mpsc};
    use std::time::Duration;

    use super::*;
    use crate::filter::{self, Signal, TokenFilter};
    use crate::Method;

    fn counting_router(hits: &Arc<AtomicUsize>) -> Router {
        let hits = Arc::clone(hits);
        Router::new().on(Method::Get, "/resource", move |_req: Request| {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                "from backend"
            }
        })
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str, phase: Phase) -> impl Filter {
        let log = Arc::clone(log);
        filter::from_fn(name, phase, 0, move |_| {
            log.lock().unwrap().push(name);
            Ok(Signal::none())
        })
    }

    #[tokio::test]
    async fn missing_token_never_reaches_router() {
        let hits = Arc::new(AtomicUsize::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));
        let gateway = Arc::new(
            Gateway::new(counting_router(&hits))
                .filter(TokenFilter::new())
                .filter(recorder(&log, "route", Phase::Route))
                .filter(recorder(&log, "post", Phase::Post))
                .filter(recorder(&log, "error", Phase::Error)),
        );

        let res = gateway.handle(Request::new(Method::Get, "/resource?x=1")).await;

        assert_eq!(res.status_code(), 401);
        assert_eq!(res.body(), b"token is empty");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn token_present_routes_exactly_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));
        let gateway = Arc::new(
            Gateway::new(counting_router(&hits))
                .filter(TokenFilter::new())
                .filter(recorder(&log, "route", Phase::Route))
                .filter(recorder(&log, "post", Phase::Post))
                .filter(recorder(&log, "error", Phase::Error)),
        );

        let res = gateway.handle(Request::new(Method::Get, "/resource?token=abc")).await;

        assert_eq!(res.status_code(), 200);
        assert_eq!(res.body(), b"from backend");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(*log.lock().unwrap(), ["route", "post"]);
    }

    #[tokio::test]
    async fn backend_failure_runs_error_phase_instead_of_post() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new().on(Method::Get, "/flaky", |_req: Request| async {
            Err::<Response, _>(std::io::Error::other("upstream reset"))
        });
        let gateway = Arc::new(
            Gateway::new(router)
                .filter(recorder(&log, "post", Phase::Post))
                .filter(recorder(&log, "error", Phase::Error)),
        );

        let res = gateway.handle(Request::new(Method::Get, "/flaky")).await;

        assert_eq!(res.status_code(), 502);
        assert_eq!(*log.lock().unwrap(), ["error"]);
    }

    #[tokio::test]
    async fn error_filter_can_shape_the_failure_response() {
        let router = Router::new().on(Method::Get, "/flaky", |_req: Request| async {
            Err::<Response, _>(std::io::Error::other("upstream reset"))
        });
        let gateway = Arc::new(Gateway::new(router).filter(filter::from_fn(
            "send-error",
            Phase::Error,
            0,
            |ctx| {
                let msg = ctx.failure().map(ToString::to_string).unwrap_or_default();
                ctx.terminate(Status::ServiceUnavailable);
                ctx.write_body(&msg)?;
                Ok(Signal::none())
            },
        )));

        let res = gateway.handle(Request::new(Method::Get, "/flaky")).await;

        assert_eq!(res.status_code(), 503);
        assert_eq!(res.body(), b"upstream reset");
    }

    #[tokio::test]
    async fn route_filter_overrides_router() {
        let hits = Arc::new(AtomicUsize::new(0));
        let gateway = Arc::new(Gateway::new(counting_router(&hits)).filter(filter::from_fn(
            "static",
            Phase::Route,
            0,
            |ctx| {
                ctx.set_response(Response::text("from route filter"));
                Ok(Signal::none())
            },
        )));

        let res = gateway.handle(Request::new(Method::Get, "/resource")).await;

        assert_eq!(res.body(), b"from route filter");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn post_filter_adds_headers_and_unmatched_path_is_404() {
        let gateway = Arc::new(Gateway::new(Router::new()).filter(filter::from_fn(
            "stamp",
            Phase::Post,
            0,
            |ctx| {
                if let Some(res) = ctx.response_mut() {
                    res.set_header("x-gateway", "tollgate");
                }
                Ok(Signal::none())
            },
        )));

        let res = gateway.handle(Request::new(Method::Get, "/nowhere")).await;

        assert_eq!(res.status_code(), 404);
        assert_eq!(res.header("x-gateway"), Some("tollgate"));
    }

    #[tokio::test]
    async fn disabled_token_filter_lets_everything_through() {
        let hits = Arc::new(AtomicUsize::new(0));
        let config = Config { disabled_filters: vec![TokenFilter::NAME.to_owned()], ..Config::default() };
        let gateway = Arc::new(
            Gateway::new(counting_router(&hits))
                .configure(&config)
                .filter(TokenFilter::from_config(&config)),
        );

        let res = gateway.handle(Request::new(Method::Get, "/resource")).await;

        assert_eq!(res.status_code(), 200);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_backend_is_a_routing_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new().on(Method::Get, "/explode", |_req: Request| async {
            if true {
                panic!("backend blew up");
            }
            "unreachable"
        });
        let gateway = Arc::new(
            Gateway::new(router)
                .filter(recorder(&log, "post", Phase::Post))
                .filter(recorder(&log, "error", Phase::Error)),
        );

        let res = tokio::spawn(gateway.handle(Request::new(Method::Get, "/explode")))
            .await
            .expect("panic must not escape the gateway");

        assert_eq!(res.status_code(), 502);
        assert_eq!(*log.lock().unwrap(), ["error"]);
    }

    #[tokio::test]
    async fn error_filter_sees_the_panic_message() {
        let router = Router::new().on(Method::Get, "/explode", |_req: Request| async {
            if true {
                panic!("backend blew up");
            }
            "unreachable"
        });
        let seen = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&seen);
        let gateway = Arc::new(Gateway::new(router).filter(filter::from_fn(
            "capture",
            Phase::Error,
            0,
            move |ctx| {
                *sink.lock().unwrap() = ctx.failure().map(ToString::to_string).unwrap_or_default();
                Ok(Signal::none())
            },
        )));

        let res = gateway.handle(Request::new(Method::Get, "/explode")).await;

        assert_eq!(res.status_code(), 502);
        assert_eq!(*seen.lock().unwrap(), "backend handler panicked: backend blew up");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dropping_handle_mid_phase_stops_the_chain() {
        let hits = Arc::new(AtomicUsize::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));

        let (started_tx, mut started_rx) = tokio::sync::mpsc::unbounded_channel::<()>();
        let (cancelled_tx, mut cancelled_rx) = tokio::sync::mpsc::unbounded_channel::<bool>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);

        let slow = filter::from_fn("slow", Phase::Pre, 0, move |ctx| {
            let _ = started_tx.send(());
            let _ = release_rx.lock().unwrap().recv();
            let _ = cancelled_tx.send(ctx.is_cancelled());
            Ok(Signal::none())
        });
        let gateway = Arc::new(
            Gateway::new(counting_router(&hits))
                .filter(slow)
                .filter({
                    let log = Arc::clone(&log);
                    filter::from_fn("after", Phase::Pre, 1, move |_| {
                        log.lock().unwrap().push("after");
                        Ok(Signal::none())
                    })
                })
                .filter(recorder(&log, "post", Phase::Post)),
        );

        let task = tokio::spawn(gateway.handle(Request::new(Method::Get, "/resource")));
        started_rx.recv().await.unwrap();

        // The client goes away while the pre phase is still running.
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        release_tx.send(()).unwrap();
        assert!(cancelled_rx.recv().await.unwrap());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
