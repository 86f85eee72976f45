//! # tollgate
//!
//! A pre-routing filter chain for API gateways behind a reverse proxy.
//!
//! ## The contract
//!
//! Every request walks the same four phases: `pre`, `route`, then `post` (or
//! `error` when the backend failed). Each phase runs its filters one by one,
//! lowest [`order`](filter::Filter::order) first, registration order breaking
//! ties. Before every filter the chain checks one flag: once a filter has
//! [terminated](RequestContext::terminate) the request, nothing else runs, in
//! this phase or any later one, and the client gets the early-exit response.
//!
//! What tollgate guarantees:
//!
//! - **Deterministic order.** Same registrations, same execution sequence.
//! - **Isolation.** A filter that errors or panics is logged and skipped over;
//!   it cannot take the pipeline down with it.
//! - **Terminations stick.** A termination is never undone, not by a later
//!   failure, not by a failed body write.
//!
//! What tollgate leaves to the proxy in front of it: TLS, load balancing,
//! rate limiting. And to other services: verifying what a token actually says.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tollgate::{Gateway, Method, Request, Response, Router, Server};
//! use tollgate::filter::TokenFilter;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tollgate::Error> {
//!     let router = Router::new().on(Method::Get, "/resource", resource);
//!
//!     // GET /resource          → 401 token is empty
//!     // GET /resource?token=x  → 200 from the backend
//!     let gateway = Gateway::new(router).filter(TokenFilter::new());
//!
//!     Server::bind("0.0.0.0:3000").serve(gateway).await
//! }
//!
//! async fn resource(_req: Request) -> Response {
//!     Response::text("hello")
//! }
//! ```

mod config;
mod context;
mod error;
mod gateway;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;
mod status;

pub mod filter;

pub use config::Config;
pub use context::{DEFAULT_MAX_EARLY_BODY, RequestContext};
pub use error::{BoxError, Error, RouteError};
pub use gateway::Gateway;
pub use handler::{Handler, IntoRouteResult};
pub use method::Method;
pub use request::{DEFAULT_MAX_REQUEST_BODY, Request};
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
pub use status::Status;
