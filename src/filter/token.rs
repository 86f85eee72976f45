//! The token-presence gate.
//!
//! Rejects requests that carry no `token` query parameter with
//! `401 token is empty`. Presence is all it checks: it never looks at what
//! the token says, whether it is signed, or whether it has expired. Verifying
//! it is some other filter's job (or the backend's).

use tracing::{debug, info, warn};

use super::{Filter, FilterResult, Phase, Signal};
use crate::config::Config;
use crate::context::RequestContext;
use crate::status::Status;

/// Pre-phase filter, order 0, applicable to every request.
#[derive(Clone, Debug)]
pub struct TokenFilter {
    param: String,
    blank_is_missing: bool,
}

impl TokenFilter {
    pub const NAME: &'static str = "token";

    /// Body of the 401. An early-exit body limit below its length drops it.
    pub const REJECTION_BODY: &'static str = "token is empty";

    /// Looks for `token`; any value, even an empty one, counts as present.
    pub fn new() -> Self {
        Self { param: "token".to_owned(), blank_is_missing: false }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .param(&config.token_param)
            .blank_is_missing(config.blank_token_is_missing)
    }

    /// Query parameter to look for.
    pub fn param(mut self, name: &str) -> Self {
        self.param = name.to_owned();
        self
    }

    /// Treat empty and whitespace-only values as absent.
    pub fn blank_is_missing(mut self, yes: bool) -> Self {
        self.blank_is_missing = yes;
        self
    }

    fn present(&self, ctx: &RequestContext) -> bool {
        match ctx.query_param(&self.param) {
            None => false,
            Some(value) => !(self.blank_is_missing && value.trim().is_empty()),
        }
    }
}

impl Default for TokenFilter {
    fn default() -> Self { Self::new() }
}

impl Filter for TokenFilter {
    fn name(&self) -> &str { Self::NAME }
    fn phase(&self) -> Phase { Phase::Pre }
    fn order(&self) -> i32 { 0 }

    fn execute(&self, ctx: &mut RequestContext) -> FilterResult {
        info!("{} >>> {}", ctx.method(), ctx.url());

        if !self.present(ctx) {
            warn!("{}", Self::REJECTION_BODY);
            ctx.terminate(Status::Unauthorized);
            // The 401 is decided; losing the body must not change that.
            if let Err(e) = ctx.write_body(Self::REJECTION_BODY) {
                debug!(error = %e, "early-exit body not written");
            }
            return Ok(Signal::none());
        }

        info!("ok");
        Ok(Signal::none())
    }
}
