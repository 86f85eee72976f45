//! The filter contract.
//!
//! A filter is four answers and one action:
//!
//! | Query | Meaning |
//! |---|---|
//! | [`phase`](Filter::phase) | which stage of the pipeline it joins |
//! | [`order`](Filter::order) | lower runs first; ties run in registration order |
//! | [`is_applicable`](Filter::is_applicable) | whether it runs for *this* request |
//! | [`execute`](Filter::execute) | the body, which may mutate the context |
//!
//! Any type implementing [`Filter`] qualifies. For one-off filters (and test
//! spies) [`from_fn`] wraps a closure.
//!
//! ```rust
//! use tollgate::filter::{self, Phase, Signal};
//! use tollgate::Status;
//!
//! let deny_admin = filter::from_fn("deny-admin", Phase::Pre, 10, |ctx| {
//!     ctx.terminate(Status::Forbidden);
//!     Ok(Signal::note("admin path blocked"))
//! })
//! .when(|ctx| ctx.path().starts_with("/admin"));
//! ```
//!
//! # What `execute` may do
//!
//! Read the request snapshot, terminate the chain, write the early-exit body,
//! emit tracing events. It runs synchronously on a blocking worker, so short
//! bounded I/O is fine; waiting indefinitely is not, and neither is retrying.
//! A failure (an `Err` or a panic) is logged by the dispatcher and the chain
//! moves on. A termination the filter set before failing stands.

mod phase;
mod registry;
mod token;

use std::borrow::Cow;

pub use phase::Phase;
pub use registry::{FilterRegistry, Halt, PhaseReport};
pub use token::TokenFilter;

use crate::context::RequestContext;
use crate::error::BoxError;

/// What `execute` returns on success.
pub type FilterResult = Result<Signal, BoxError>;

/// A diagnostic value handed back by [`Filter::execute`].
///
/// The dispatcher logs it at debug level and otherwise ignores it. It is not
/// a control channel: the only way to stop the chain is
/// [`RequestContext::terminate`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Signal(Option<Cow<'static, str>>);

impl Signal {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn note(msg: impl Into<Cow<'static, str>>) -> Self {
        Self(Some(msg.into()))
    }

    pub fn message(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// A unit of request-processing logic bound to one [`Phase`].
pub trait Filter: Send + Sync + 'static {
    /// Used in logs and matched against `disabled_filters`.
    fn name(&self) -> &str;

    fn phase(&self) -> Phase;

    fn order(&self) -> i32;

    /// Evaluated fresh for every request. Must not have side effects.
    fn is_applicable(&self, _ctx: &RequestContext) -> bool {
        true
    }

    fn execute(&self, ctx: &mut RequestContext) -> FilterResult;
}

// ── Closure filters ───────────────────────────────────────────────────────────

type Predicate = Box<dyn Fn(&RequestContext) -> bool + Send + Sync + 'static>;

/// A [`Filter`] built from a closure. See [`from_fn`].
pub struct FnFilter<F> {
    name: Cow<'static, str>,
    phase: Phase,
    order: i32,
    predicate: Option<Predicate>,
    body: F,
}

/// Builds a filter from its phase, order and body. Always applicable unless
/// narrowed with [`FnFilter::when`].
pub fn from_fn<F>(
    name: impl Into<Cow<'static, str>>,
    phase: Phase,
    order: i32,
    body: F,
) -> FnFilter<F>
where
    F: Fn(&mut RequestContext) -> FilterResult + Send + Sync + 'static,
{
    FnFilter { name: name.into(), phase, order, predicate: None, body }
}

impl<F> FnFilter<F> {
    /// Restricts the filter to requests matching `predicate`.
    pub fn when(mut self, predicate: impl Fn(&RequestContext) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }
}

impl<F> Filter for FnFilter<F>
where
    F: Fn(&mut RequestContext) -> FilterResult + Send + Sync + 'static,
{
    fn name(&self) -> &str { &self.name }
    fn phase(&self) -> Phase { self.phase }
    fn order(&self) -> i32 { self.order }

    fn is_applicable(&self, ctx: &RequestContext) -> bool {
        self.predicate.as_ref().is_none_or(|p| p(ctx))
    }

    fn execute(&self, ctx: &mut RequestContext) -> FilterResult {
        (self.body)(ctx)
    }
}
