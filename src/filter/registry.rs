//! Filter registration and per-phase dispatch.
//!
//! Filters are registered at startup, sorted once per phase by
//! `(order, registration index)`, and never touched again. The registry is
//! then moved into the [`Gateway`](crate::Gateway), shared behind an `Arc`,
//! and only ever read. Registration takes `&mut self`, so once it is shared
//! there is no way to register anything.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, trace, warn};

use super::{Filter, Phase};
use crate::context::RequestContext;
use crate::error::panic_message;

struct Entry {
    seq: usize,
    filter: Box<dyn Filter>,
}

/// Why a phase stopped before its last filter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Halt {
    /// The context was terminated (possibly before the phase started).
    Terminated,
    /// The request was cancelled, usually by a client disconnect.
    Cancelled,
}

/// What happened during one [`FilterRegistry::run_phase`] call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PhaseReport {
    pub phase: Phase,
    /// Filters whose body ran, successfully or not.
    pub executed: usize,
    /// Filters passed over: not applicable, disabled, or their predicate panicked.
    pub skipped: usize,
    /// Filters whose body returned `Err` or panicked.
    pub failed: usize,
    pub halted: Option<Halt>,
}

impl PhaseReport {
    fn new(phase: Phase) -> Self {
        Self { phase, executed: 0, skipped: 0, failed: 0, halted: None }
    }
}

/// The set of registered filters, grouped by phase.
#[derive(Default)]
pub struct FilterRegistry {
    phases: [Vec<Entry>; 4],
    disabled: HashSet<String>,
    registered: usize,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filter to its phase.
    pub fn register(&mut self, filter: impl Filter) {
        self.register_boxed(Box::new(filter));
    }

    pub fn register_boxed(&mut self, filter: Box<dyn Filter>) {
        let seq = self.registered;
        self.registered += 1;

        debug!(filter = filter.name(), phase = %filter.phase(), order = filter.order(), "filter registered");

        let entries = &mut self.phases[filter.phase().index()];
        entries.push(Entry { seq, filter });
        entries.sort_by_key(|e| (e.filter.order(), e.seq));
    }

    /// Skips the named filter at dispatch. It stays registered.
    pub fn disable(&mut self, name: impl Into<String>) {
        self.disabled.insert(name.into());
    }

    pub fn len(&self) -> usize {
        self.registered
    }

    pub fn is_empty(&self) -> bool {
        self.registered == 0
    }

    /// Names of the filters in `phase`, in dispatch order.
    pub fn names(&self, phase: Phase) -> impl Iterator<Item = &str> {
        self.phases[phase.index()].iter().map(|e| e.filter.name())
    }

    /// Runs every filter of `phase` against `ctx`, in order.
    ///
    /// Before each filter the chain stops if `ctx` is terminated or
    /// cancelled. A predicate that panics counts as "not applicable". A body
    /// that fails (returns `Err` or panics) is logged and the chain moves on;
    /// whatever it did to `ctx` before failing, termination included, stays.
    pub fn run_phase(&self, phase: Phase, ctx: &mut RequestContext) -> PhaseReport {
        let mut report = PhaseReport::new(phase);

        for entry in &self.phases[phase.index()] {
            if ctx.is_terminated() {
                report.halted = Some(Halt::Terminated);
                break;
            }
            if ctx.is_cancelled() {
                debug!(%phase, "request cancelled, stopping filter chain");
                report.halted = Some(Halt::Cancelled);
                break;
            }

            let filter = entry.filter.as_ref();
            let name = filter.name();

            if self.disabled.contains(name) {
                trace!(filter = name, "filter disabled");
                report.skipped += 1;
                continue;
            }

            let applicable = match panic::catch_unwind(AssertUnwindSafe(|| filter.is_applicable(ctx))) {
                Ok(applicable) => applicable,
                Err(payload) => {
                    warn!(filter = name, %phase, panic = panic_message(payload.as_ref()), "applicability check panicked, skipping");
                    false
                }
            };
            if !applicable {
                trace!(filter = name, "filter not applicable");
                report.skipped += 1;
                continue;
            }

            report.executed += 1;
            match panic::catch_unwind(AssertUnwindSafe(|| filter.execute(ctx))) {
                Ok(Ok(signal)) => {
                    if let Some(msg) = signal.message() {
                        debug!(filter = name, %phase, signal = msg, "filter signalled");
                    }
                }
                Ok(Err(e)) => {
                    report.failed += 1;
                    error!(filter = name, %phase, error = %e, terminated = ctx.is_terminated(), "filter failed");
                }
                Err(payload) => {
                    report.failed += 1;
                    error!(filter = name, %phase, panic = panic_message(payload.as_ref()), terminated = ctx.is_terminated(), "filter panicked");
                }
            }
        }

        // Terminated by the last filter in the phase.
        if report.halted.is_none() && ctx.is_terminated() {
            report.halted = Some(Halt::Terminated);
        }

        debug!(?report, "phase complete");
        report
    }
}
