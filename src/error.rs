//! Unified error types.

use std::any::Any;

use thiserror::Error as ThisError;

/// A boxed, thread-safe error. What filter bodies and backend handlers fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by tollgate's fallible operations.
///
/// A missing token is not an `Error`. Neither is a 404 or a failing backend.
/// Those are HTTP [`Response`](crate::Response) values decided by the filter
/// chain. This type surfaces infrastructure failures only: bad configuration,
/// binding to a port, accepting a connection.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    InvalidAddr(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// A backend handler failure.
///
/// Produced when a routed handler returns `Err` or panics. The gateway stores
/// it in the request context and runs the `error` phase instead of `post`.
#[derive(Debug, ThisError)]
#[error("{0}")]
pub struct RouteError(BoxError);

impl RouteError {
    pub fn new(err: impl Into<BoxError>) -> Self {
        Self(err.into())
    }

    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_error_displays_inner_message() {
        let err = RouteError::new("backend unreachable");
        assert_eq!(err.to_string(), "backend unreachable");
        assert_eq!(err.inner().to_string(), "backend unreachable");
    }

    #[test]
    fn io_error_converts() {
        let err: Error = std::io::Error::other("boom").into();
        assert_eq!(err.to_string(), "io: boom");
    }

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let payload = std::panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static");

        let n = 7;
        let payload = std::panic::catch_unwind(|| panic!("formatted {n}")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 7");
    }
}
