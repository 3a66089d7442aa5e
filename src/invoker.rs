//! Invoker synthesis: per-method invocation thunks and instance binding.
//!
//! Each handler is resolved to a direct call once per (subscriber type,
//! method, event type), so dispatch never pays for generic per-call
//! introspection. The synthesized thunk takes
//! the subscriber instance and the event as parameters, so one thunk serves
//! every instance of its subscriber type; binding an instance merely closes
//! over an `Arc`.

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::error::{HandlerError, HandlerResult};
use crate::subscriber::ErasedSubscriber;

/// Strategy for binding a subscriber instance to a synthesized thunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvokerMode {
    /// Downcast the instance once at bind time and call the handler function
    /// directly; dispatch performs no per-call type checks.
    #[default]
    Specialized,
    /// Route every call through the cached thunk, which re-checks the
    /// subscriber type on each invocation. Slower, but tolerant of erased
    /// instances whose concrete type is only known at call time.
    Checked,
}

/// Type-erased synthesized unit: (subscriber instance, event) -> result.
pub(crate) type Thunk<K> =
    Arc<dyn Fn(&(dyn Any + Send + Sync), &K) -> HandlerResult + Send + Sync>;

/// A thunk bound to one subscriber instance, keyed by event type `K`.
pub(crate) struct BoundCall<K: ?Sized + 'static> {
    call: Arc<dyn Fn(&K) -> HandlerResult + Send + Sync>,
}

impl<K: ?Sized + 'static> BoundCall<K> {
    pub(crate) fn invoke(&self, view: &K) -> HandlerResult {
        (self.call)(view)
    }
}

/// Result of binding a handler to a subscriber instance.
pub(crate) struct BoundOutcome {
    /// A `BoundCall<K>` erased by event-type key.
    pub(crate) call: Box<dyn Any + Send + Sync>,
    /// Whether the specialized bind failed and the checked thunk is used.
    pub(crate) degraded: bool,
}

/// Synthesizes and caches invocation thunks.
///
/// Synthesis happens at most once per (subscriber type, method, event type):
/// the map's shard lock makes concurrent first registrations of the same
/// subscriber type wait for the winning synthesis instead of duplicating it.
#[derive(Default)]
pub(crate) struct InvokerFactory {
    thunks: DashMap<MethodKey, Arc<dyn Any + Send + Sync>>,
    synthesized: AtomicU64,
    degraded: AtomicU64,
}

/// (subscriber type, method name, event type): the method signature.
type MethodKey = (TypeId, &'static str, TypeId);

impl InvokerFactory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of thunks synthesized so far.
    pub(crate) fn synthesized(&self) -> u64 {
        self.synthesized.load(Ordering::Relaxed)
    }

    /// Number of bindings that fell back to the checked thunk.
    pub(crate) fn degraded(&self) -> u64 {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Binds `handler` to `instance`, producing the erased call the registry
    /// stores. A specialized bind that cannot downcast the instance degrades
    /// to the checked thunk with a warning instead of failing registration.
    pub(crate) fn bind<S, K>(
        &self,
        method: &'static str,
        handler: fn(&S, &K) -> HandlerResult,
        mode: InvokerMode,
        instance: &ErasedSubscriber,
    ) -> BoundOutcome
    where
        S: Any + Send + Sync,
        K: ?Sized + Any,
    {
        let thunk = self.thunk_for::<S, K>(method, handler);

        if mode == InvokerMode::Specialized {
            match Arc::clone(instance).downcast::<S>() {
                Ok(subscriber) => {
                    let call: Arc<dyn Fn(&K) -> HandlerResult + Send + Sync> =
                        Arc::new(move |event| handler(&subscriber, event));
                    return BoundOutcome {
                        call: Box::new(BoundCall { call }),
                        degraded: false,
                    };
                }
                Err(_) => {
                    warn!(
                        "⚠️ specialized bind of {}::{} rejected the instance, \
                         falling back to checked invocation",
                        std::any::type_name::<S>(),
                        method,
                    );
                    self.degraded.fetch_add(1, Ordering::Relaxed);
                    return BoundOutcome {
                        call: Self::bind_checked(thunk, instance),
                        degraded: true,
                    };
                }
            }
        }

        BoundOutcome {
            call: Self::bind_checked(thunk, instance),
            degraded: false,
        }
    }

    fn bind_checked<K: ?Sized + Any>(
        thunk: Thunk<K>,
        instance: &ErasedSubscriber,
    ) -> Box<dyn Any + Send + Sync> {
        let instance = Arc::clone(instance);
        let call: Arc<dyn Fn(&K) -> HandlerResult + Send + Sync> =
            Arc::new(move |event| thunk(&*instance, event));
        Box::new(BoundCall { call })
    }

    fn thunk_for<S, K>(&self, method: &'static str, handler: fn(&S, &K) -> HandlerResult) -> Thunk<K>
    where
        S: Any + Send + Sync,
        K: ?Sized + Any,
    {
        let key = (TypeId::of::<S>(), method, TypeId::of::<K>());

        let synthesize = move || -> Thunk<K> {
            Arc::new(
                move |subscriber: &(dyn Any + Send + Sync), event: &K| match subscriber
                    .downcast_ref::<S>()
                {
                    Some(subscriber) => handler(subscriber, event),
                    None => Err(HandlerError::msg(format!(
                        "subscriber instance is not a {}",
                        std::any::type_name::<S>()
                    ))),
                },
            )
        };

        if let Some(existing) = self
            .thunks
            .get(&key)
            .and_then(|entry| entry.value().downcast_ref::<Thunk<K>>().cloned())
        {
            return existing;
        }

        let entry = self.thunks.entry(key).or_insert_with(|| {
            self.synthesized.fetch_add(1, Ordering::Relaxed);
            debug!(
                "🛠️ synthesized invoker thunk for {}::{}",
                std::any::type_name::<S>(),
                method,
            );
            Arc::new(synthesize()) as Arc<dyn Any + Send + Sync>
        });
        match entry.value().downcast_ref::<Thunk<K>>() {
            Some(thunk) => thunk.clone(),
            // The (type, method, event) key makes a mismatch unreachable;
            // synthesize an uncached thunk rather than panic if it ever isn't.
            None => synthesize(),
        }
    }
}

impl std::fmt::Debug for InvokerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvokerFactory")
            .field("thunks", &self.thunks.len())
            .field("synthesized", &self.synthesized())
            .field("degraded", &self.degraded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerResult;
    use crate::subscriber::{Priority, Subscriber, SubscriberScan};

    #[derive(Debug)]
    struct Probe;

    impl Probe {
        fn on_unit(&self, _event: &u32) -> HandlerResult {
            Ok(())
        }
    }

    impl Subscriber for Probe {
        fn describe(scan: &mut SubscriberScan<Self>) {
            scan.handler("on_unit", Priority::NORMAL, Probe::on_unit);
        }
    }

    #[test]
    fn synthesis_is_cached_per_method() {
        let factory = InvokerFactory::new();
        let a: ErasedSubscriber = Arc::new(Probe);
        let b: ErasedSubscriber = Arc::new(Probe);

        factory.bind::<Probe, u32>("on_unit", Probe::on_unit, InvokerMode::Checked, &a);
        factory.bind::<Probe, u32>("on_unit", Probe::on_unit, InvokerMode::Checked, &b);

        assert_eq!(factory.synthesized(), 1);
    }

    #[test]
    fn specialized_bind_degrades_on_foreign_instance() {
        let factory = InvokerFactory::new();
        let foreign: ErasedSubscriber = Arc::new(42_u64);

        let outcome =
            factory.bind::<Probe, u32>("on_unit", Probe::on_unit, InvokerMode::Specialized, &foreign);
        assert!(outcome.degraded);
        assert_eq!(factory.degraded(), 1);

        // The checked thunk still type-checks per call and reports the
        // mismatch through the handler error channel.
        let call = outcome
            .call
            .downcast_ref::<BoundCall<u32>>()
            .expect("bound call keyed by event type");
        assert!(call.invoke(&7).is_err());
    }

    #[test]
    fn checked_bind_invokes_through_thunk() {
        let factory = InvokerFactory::new();
        let probe: ErasedSubscriber = Arc::new(Probe);

        let outcome =
            factory.bind::<Probe, u32>("on_unit", Probe::on_unit, InvokerMode::Checked, &probe);
        assert!(!outcome.degraded);

        let call = outcome
            .call
            .downcast_ref::<BoundCall<u32>>()
            .expect("bound call keyed by event type");
        assert!(call.invoke(&7).is_ok());
    }
}
