//! HTTP status codes the gateway decides on its own.
//!
//! Backends answer with whatever they like; their status passes through
//! untouched. `Status` covers what a filter or the gateway itself emits:
//! rejections, routing misses, backend failures.
//!
//! ```rust
//! use tollgate::{RequestContext, Request, Method, Status};
//!
//! let req = Request::new(Method::Get, "/resource");
//! let mut ctx = RequestContext::from_request(&req);
//! ctx.terminate(Status::Forbidden);
//! assert_eq!(ctx.response_status_code(), Some(403));
//! ```

/// A status code emitted by the gateway.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    // ── 2xx Success ───────────────────────────────────────────────────────────
    Ok,                  // 200
    Created,             // 201
    NoContent,           // 204

    // ── 4xx Client errors ─────────────────────────────────────────────────────
    BadRequest,          // 400
    Unauthorized,        // 401
    Forbidden,           // 403
    NotFound,            // 404
    MethodNotAllowed,    // 405
    ContentTooLarge,     // 413
    TooManyRequests,     // 429
    ClientClosedRequest, // 499 (nginx)

    // ── 5xx Server errors ─────────────────────────────────────────────────────
    InternalServerError, // 500
    BadGateway,          // 502
    ServiceUnavailable,  // 503
    GatewayTimeout,      // 504
}

impl Status {
    pub fn code(self) -> u16 {
        self.into()
    }
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        match s {
            Status::Ok                  => 200,
            Status::Created             => 201,
            Status::NoContent           => 204,
            Status::BadRequest          => 400,
            Status::Unauthorized        => 401,
            Status::Forbidden           => 403,
            Status::NotFound            => 404,
            Status::MethodNotAllowed    => 405,
            Status::ContentTooLarge     => 413,
            Status::TooManyRequests     => 429,
            Status::ClientClosedRequest => 499,
            Status::InternalServerError => 500,
            Status::BadGateway          => 502,
            Status::ServiceUnavailable  => 503,
            Status::GatewayTimeout      => 504,
        }
    }
}
