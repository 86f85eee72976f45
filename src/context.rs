//! Per-request state shared by every filter in one pipeline traversal.
//!
//! A [`RequestContext`] is created when a request arrives, owned by the
//! gateway while the request is in flight, and lent to each filter as
//! `&RequestContext` (applicability) or `&mut RequestContext` (execution).
//! It is never shared across requests, so it carries no locks.
//!
//! The request fields are a snapshot: filters can read the method, URL,
//! query and headers but cannot change them. What filters *can* write is the
//! outcome: terminate with a status, write an early-exit body, and (in the
//! route and post phases) provide or adjust the response.

use std::collections::HashMap;
use std::fmt;
use std::io;

use tokio_util::sync::CancellationToken;

use crate::error::RouteError;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

/// Default cap on the early-exit body, in bytes.
pub const DEFAULT_MAX_EARLY_BODY: usize = 64 * 1024;

/// The mutable per-request state passed through the filter chain.
pub struct RequestContext {
    method: Method,
    url: String,
    path: String,
    query: HashMap<String, String>,
    headers: Vec<(String, String)>,

    terminated: bool,
    status: Option<Status>,
    body: Option<String>,
    body_limit: usize,

    response: Option<Response>,
    failure: Option<RouteError>,
    cancel: CancellationToken,
}

impl RequestContext {
    /// Snapshots `req` with the default early-exit body limit.
    pub fn from_request(req: &Request) -> Self {
        Self::new(req, DEFAULT_MAX_EARLY_BODY)
    }

    /// Snapshots `req`; `body_limit` caps what [`write_body`](Self::write_body) accepts.
    pub fn new(req: &Request, body_limit: usize) -> Self {
        Self {
            method: req.method(),
            url: req.url(),
            path: req.path().to_owned(),
            query: parse_query(req.query()),
            headers: req.headers().to_vec(),
            terminated: false,
            status: None,
            body: None,
            body_limit,
            response: None,
            failure: None,
            cancel: CancellationToken::new(),
        }
    }

    // ── Request snapshot ─────────────────────────────────────────────────────

    pub fn method(&self) -> Method { self.method }
    pub fn url(&self) -> &str { &self.url }
    pub fn path(&self) -> &str { &self.path }
    pub fn query_params(&self) -> &HashMap<String, String> { &self.query }

    /// A query parameter by name. `?token` and `?token=` both yield `Some("")`.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    // ── Termination ──────────────────────────────────────────────────────────

    /// Stops the chain and fixes the early-exit status.
    ///
    /// This is the only way to set `terminated`, so a terminated context
    /// always carries a status. Termination is one-way; calling again only
    /// replaces the status.
    pub fn terminate(&mut self, status: Status) {
        self.terminated = true;
        self.status = Some(status);
    }

    pub fn is_terminated(&self) -> bool { self.terminated }

    pub fn response_status(&self) -> Option<Status> { self.status }

    pub fn response_status_code(&self) -> Option<u16> {
        self.status.map(u16::from)
    }

    /// Appends to the early-exit body.
    ///
    /// Fails once the body would exceed the configured limit; nothing is
    /// written in that case. The caller decides whether that matters.
    pub fn write_body(&mut self, chunk: &str) -> io::Result<()> {
        let written = self.body.as_ref().map_or(0, String::len);
        if written + chunk.len() > self.body_limit {
            return Err(io::Error::new(
                io::ErrorKind::FileTooLarge,
                format!("early-exit body exceeds {} bytes", self.body_limit),
            ));
        }
        self.body.get_or_insert_with(String::new).push_str(chunk);
        Ok(())
    }

    pub fn response_body(&self) -> Option<&str> { self.body.as_deref() }

    // ── Routing outcome ──────────────────────────────────────────────────────

    /// Supplies the routed response. In the route phase this replaces the
    /// default router.
    pub fn set_response(&mut self, response: Response) {
        self.response = Some(response);
    }

    pub fn response(&self) -> Option<&Response> { self.response.as_ref() }

    /// The routed response, for post filters that add headers.
    pub fn response_mut(&mut self) -> Option<&mut Response> { self.response.as_mut() }

    pub(crate) fn set_failure(&mut self, failure: RouteError) {
        self.failure = Some(failure);
    }

    /// The routing failure that sent this request into the error phase.
    pub fn failure(&self) -> Option<&RouteError> { self.failure.as_ref() }

    // ── Cancellation ─────────────────────────────────────────────────────────

    /// A handle that stops the chain before the next filter when cancelled.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool { self.cancel.is_cancelled() }

    // ── Final response ───────────────────────────────────────────────────────

    /// The response to send once the pipeline is done.
    ///
    /// A terminated context answers with its status and early-exit body and
    /// nothing else; any routed response is discarded. Otherwise the routed
    /// response goes out, or 502 when routing failed and no error filter
    /// took over.
    pub fn into_response(self) -> Response {
        if self.terminated {
            let status = self.status.unwrap_or(Status::InternalServerError);
            return match self.body {
                Some(body) => Response::builder().status(status).text(body),
                None => Response::status(status),
            };
        }
        match self.response {
            Some(response) => response,
            None => Response::status(Status::BadGateway),
        }
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("terminated", &self.terminated)
            .field("status", &self.status)
            .field("routed", &self.response.is_some())
            .field("failed", &self.failure.is_some())
            .finish_non_exhaustive()
    }
}

/// First occurrence wins for repeated keys.
fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let Some(query) = query else { return params };
    for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
        params.entry(k.into_owned()).or_insert_with(|| v.into_owned());
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(target: &str) -> RequestContext {
        RequestContext::from_request(&Request::new(Method::Get, target))
    }

    #[test]
    fn query_snapshot_decodes_and_keeps_first_value() {
        let ctx = ctx("/r?token=a%20b&token=second&flag");
        assert_eq!(ctx.query_param("token"), Some("a b"));
        assert_eq!(ctx.query_param("flag"), Some(""));
        assert_eq!(ctx.query_param("missing"), None);
    }

    #[test]
    fn terminate_always_sets_status() {
        let mut ctx = ctx("/r");
        assert!(!ctx.is_terminated());
        assert_eq!(ctx.response_status_code(), None);

        ctx.terminate(Status::Unauthorized);
        assert!(ctx.is_terminated());
        assert_eq!(ctx.response_status_code(), Some(401));
    }

    #[test]
    fn write_body_respects_limit() {
        let mut ctx = RequestContext::new(&Request::new(Method::Get, "/r"), 8);
        ctx.write_body("12345").unwrap();
        let err = ctx.write_body("6789").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::FileTooLarge);
        assert_eq!(ctx.response_body(), Some("12345"));
    }

    #[test]
    fn terminated_context_discards_routed_response() {
        let mut ctx = ctx("/r");
        ctx.set_response(Response::text("from backend"));
        ctx.terminate(Status::Forbidden);
        ctx.write_body("nope").unwrap();

        let res = ctx.into_response();
        assert_eq!(res.status_code(), 403);
        assert_eq!(res.body(), b"nope");
    }

    #[test]
    fn unrouted_context_answers_bad_gateway() {
        assert_eq!(ctx("/r").into_response().status_code(), 502);
    }

    #[test]
    fn cancellation_is_shared_with_handle() {
        let ctx = ctx("/r");
        ctx.cancellation().cancel();
        assert!(ctx.is_cancelled());
    }
}
