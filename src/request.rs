//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};

use crate::method::Method;
use crate::status::Status;

/// Default cap on a request body forwarded to a backend, in bytes.
pub const DEFAULT_MAX_REQUEST_BODY: usize = 2 * 1024 * 1024;

/// An incoming HTTP request.
///
/// Filters never see this type directly; they read the snapshot copied into
/// [`RequestContext`](crate::RequestContext). A request off the wire carries
/// its body unread until the filter chain lets it through to a backend, so a
/// rejected request is answered without waiting for its body. Backend
/// handlers receive it by value with the body buffered.
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: Vec<(String, String)>,
    body: Bytes,
    unread: Option<Incoming>,
    params: HashMap<String, String>,
}

impl Request {
    /// Builds a request from a method and a request target (`/path?query`).
    ///
    /// ```rust
    /// use tollgate::{Method, Request};
    ///
    /// let req = Request::new(Method::Get, "/resource?token=abc")
    ///     .header("host", "api.example.com");
    /// assert_eq!(req.path(), "/resource");
    /// assert_eq!(req.query(), Some("token=abc"));
    /// ```
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_owned())),
            None => (target, None),
        };
        let path = if path.is_empty() { "/" } else { path };
        Self {
            method,
            path: path.to_owned(),
            query,
            headers: Vec::new(),
            body: Bytes::new(),
            unread: None,
            params: HashMap::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Converts a hyper request head. The body stays on the wire.
    ///
    /// Unknown methods come back as the 405 the server should answer with.
    pub(crate) fn from_hyper(req: hyper::Request<Incoming>) -> Result<Self, Status> {
        let (parts, body) = req.into_parts();
        let method: Method = parts.method.as_str().parse().map_err(|()| Status::MethodNotAllowed)?;

        let headers = parts.headers.iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_owned(), v.to_owned())))
            .collect();

        Ok(Self {
            method,
            path: parts.uri.path().to_owned(),
            query: parts.uri.query().map(str::to_owned),
            headers,
            body: Bytes::new(),
            unread: Some(body),
            params: HashMap::new(),
        })
    }

    /// Reads the body still on the wire, at most `limit` bytes.
    ///
    /// Over the limit is 413, a broken body 400. A declared `content-length`
    /// over the limit fails before anything is read. A request built with
    /// [`Request::body`] has nothing left to read and always succeeds.
    pub(crate) async fn read_body(&mut self, limit: usize) -> Result<(), Status> {
        let Some(incoming) = self.unread.take() else { return Ok(()) };

        let declared = incoming.size_hint().lower();
        if declared > limit as u64 {
            tracing::debug!(declared, limit, "declared request body over limit");
            return Err(Status::ContentTooLarge);
        }

        match Limited::new(incoming, limit).collect().await {
            Ok(collected) => {
                self.body = collected.to_bytes();
                Ok(())
            }
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                tracing::debug!(limit, "request body over limit");
                Err(Status::ContentTooLarge)
            }
            Err(e) => {
                tracing::debug!(error = %e, "failed to read request body");
                Err(Status::BadRequest)
            }
        }
    }

    pub(crate) fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn query(&self) -> Option<&str> { self.query.as_deref() }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn bytes(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a named path parameter captured by the router.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Reconstructs the request URL without its query string.
    ///
    /// Scheme comes from `x-forwarded-proto` (set by the proxy in front),
    /// defaulting to `http`. Without a `host` header only the path remains.
    pub fn url(&self) -> String {
        match self.header_value("host") {
            Some(host) => {
                let scheme = self.header_value("x-forwarded-proto").unwrap_or("http");
                format!("{scheme}://{host}{}", self.path)
            }
            None => self.path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_target_into_path_and_query() {
        let req = Request::new(Method::Get, "/resource?x=1&token=abc");
        assert_eq!(req.path(), "/resource");
        assert_eq!(req.query(), Some("x=1&token=abc"));

        let bare = Request::new(Method::Get, "?x=1");
        assert_eq!(bare.path(), "/");
    }

    #[test]
    fn url_uses_host_and_forwarded_proto() {
        let req = Request::new(Method::Get, "/a?b=c")
            .header("Host", "gw.local:8080")
            .header("X-Forwarded-Proto", "https");
        assert_eq!(req.url(), "https://gw.local:8080/a");

        let no_host = Request::new(Method::Get, "/a");
        assert_eq!(no_host.url(), "/a");
    }
}
