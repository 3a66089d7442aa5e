//! Dispatch and registration statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Internal counters, updated with relaxed atomics on the hot path.
#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    pub(crate) events_published: AtomicU64,
    pub(crate) handlers_invoked: AtomicU64,
    pub(crate) handler_failures: AtomicU64,
    pub(crate) events_consumed: AtomicU64,
    pub(crate) plan_rebuilds: AtomicU64,
    pub(crate) plan_hits: AtomicU64,
}

impl StatCounters {
    pub(crate) fn add(&self, counter: &AtomicU64, amount: u64) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    pub(crate) fn bump(&self, counter: &AtomicU64) {
        self.add(counter, 1);
    }
}

/// Point-in-time snapshot of bus activity, from [`EventBus::stats`].
///
/// [`EventBus::stats`]: crate::EventBus::stats
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BusStats {
    /// Publish calls since the bus was created.
    pub events_published: u64,
    /// Handler invocations, including failing ones.
    pub handlers_invoked: u64,
    /// Handler invocations that returned an error.
    pub handler_failures: u64,
    /// Publishes short-circuited by a consumed event.
    pub events_consumed: u64,
    /// Invoker thunks synthesized (at most one per subscriber method).
    pub synthesized_thunks: u64,
    /// Bindings that fell back to checked invocation.
    pub degraded_bindings: u64,
    /// Dispatch plans rebuilt after a registry change.
    pub plan_rebuilds: u64,
    /// Dispatches served from a cached plan.
    pub plan_hits: u64,
    /// Currently registered subscriber instances.
    pub subscribers: usize,
    /// Currently registered handlers across all event types.
    pub handlers: usize,
}

impl StatCounters {
    pub(crate) fn snapshot(&self) -> BusStats {
        BusStats {
            events_published: self.events_published.load(Ordering::Relaxed),
            handlers_invoked: self.handlers_invoked.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            events_consumed: self.events_consumed.load(Ordering::Relaxed),
            plan_rebuilds: self.plan_rebuilds.load(Ordering::Relaxed),
            plan_hits: self.plan_hits.load(Ordering::Relaxed),
            // factory counters and registry sizes are filled in by the bus
            ..BusStats::default()
        }
    }
}
