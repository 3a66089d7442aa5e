//! The event bus: registration front end and dispatch router.

use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, error, trace};

use crate::error::EventError;
use crate::event::{Event, Routes};
use crate::invoker::{InvokerFactory, InvokerMode};
use crate::registry::{BoundInvoker, HandlerRegistry, PendingInvoker, SubscriberId};
use crate::stats::{BusStats, StatCounters};
use crate::subscriber::{Subscriber, SubscriberScan};

/// Callback receiving handler invocation errors.
pub type ErrorSink = Arc<dyn Fn(&EventError) + Send + Sync>;

/// Outcome of one publish call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    /// Handlers invoked, including failing ones.
    pub invoked: usize,
    /// Handlers that returned an error.
    pub failed: usize,
    /// Whether dispatch stopped early because the event was consumed.
    pub consumed: bool,
}

/// Configures and builds an [`EventBus`].
#[derive(Default)]
pub struct EventBusBuilder {
    mode: InvokerMode,
    error_sink: Option<ErrorSink>,
}

impl EventBusBuilder {
    /// Selects the invoker binding strategy. Defaults to
    /// [`InvokerMode::Specialized`].
    pub fn invoker_mode(mut self, mode: InvokerMode) -> Self {
        self.mode = mode;
        self
    }

    /// Installs a callback receiving every handler invocation error. The
    /// default sink logs through `tracing::error!`.
    pub fn on_error(mut self, sink: impl Fn(&EventError) + Send + Sync + 'static) -> Self {
        self.error_sink = Some(Arc::new(sink));
        self
    }

    pub fn build(self) -> EventBus {
        EventBus {
            registry: HandlerRegistry::new(),
            factory: InvokerFactory::new(),
            mode: self.mode,
            plans: DashMap::new(),
            error_sink: self
                .error_sink
                .unwrap_or_else(|| Arc::new(|err| error!("❌ {err}"))),
            counters: StatCounters::default(),
        }
    }
}

/// A self-contained event bus instance.
///
/// Buses are explicitly constructed and owned; create as many independent
/// ones as needed (one per test, one per engine subsystem). All methods take
/// `&self` and the bus is `Send + Sync`, so it is typically shared as an
/// `Arc<EventBus>`.
pub struct EventBus {
    registry: HandlerRegistry,
    factory: InvokerFactory,
    mode: InvokerMode,
    /// Merged, globally ordered dispatch plans cached per concrete event
    /// type, invalidated by the registry version.
    plans: DashMap<PlanKey, CachedPlan>,
    error_sink: ErrorSink,
    counters: StatCounters,
}

/// (event-type key, full-closure?): `publish` and `publish_as` of the same
/// type produce different route sets and must not share a plan.
type PlanKey = (TypeId, bool);

struct CachedPlan {
    version: u64,
    steps: Arc<Vec<PlanStep>>,
}

#[derive(Clone)]
struct PlanStep {
    /// Index into the publish call's route views.
    route: usize,
    invoker: Arc<BoundInvoker>,
}

impl EventBus {
    /// Creates a bus with default configuration.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::default()
    }

    /// Registers all handlers declared by the subscriber's type, bound to
    /// this instance.
    ///
    /// Registration is atomic: if any declaration fails validation, or this
    /// instance is already registered, nothing is registered and the first
    /// error is returned. Returns the number of handlers registered.
    pub fn register<S: Subscriber>(&self, subscriber: &Arc<S>) -> Result<usize, EventError> {
        let mut scan = SubscriberScan::<S>::run();
        if !scan.errors.is_empty() {
            return Err(scan.errors.remove(0));
        }

        let id = SubscriberId::of(subscriber);
        let instance: Arc<dyn Any + Send + Sync> = Arc::clone(subscriber) as _;

        // Bind every invoker before touching the registry, so a failure can
        // never leave a partial registration behind.
        let mut pending = Vec::with_capacity(scan.decls.len());
        for decl in scan.decls {
            let Some(binder) = decl.binder else {
                // Validated above; a decl without binder cannot get here.
                continue;
            };
            let outcome = binder(&self.factory, self.mode, &instance);
            pending.push(PendingInvoker {
                descriptor: Arc::new(decl.descriptor),
                call: outcome.call,
            });
        }

        let name = std::any::type_name::<S>();
        let count = self.registry.register(id, instance, name, pending)?;
        debug!("📝 registered {count} handlers for {name}");
        Ok(count)
    }

    /// Removes every handler bound to this subscriber instance, across all
    /// event types. Returns `false` (not an error) if the instance was never
    /// registered. In-flight dispatches keep their snapshot and are
    /// unaffected.
    pub fn unregister<S: Subscriber>(&self, subscriber: &Arc<S>) -> bool {
        self.registry.unregister(SubscriberId::of(subscriber))
    }

    /// Dispatches the event to every handler in its type closure, in
    /// descending priority order with registration order breaking ties
    /// globally. Handler failures are reported to the error sink and never
    /// stop the remaining handlers; a consumed event stops dispatch at the
    /// next check.
    pub fn publish<E: Event>(&self, event: &E) -> DispatchReport {
        let mut routes = Routes::new();
        event.visit_routes(&mut routes);
        self.dispatch(
            (TypeId::of::<E>(), true),
            std::any::type_name::<E>(),
            &routes,
            &|| event.is_consumed(),
        )
    }

    /// Dispatches a borrowed view under exactly one event-type key, ignoring
    /// the view's own closure: the analog of firing an event *as* one of its
    /// supertypes. Consumption flags are not observed on this path.
    pub fn publish_as<K: ?Sized + Any>(&self, view: &K) -> DispatchReport {
        let mut routes = Routes::new();
        routes.single(view);
        self.dispatch(
            (TypeId::of::<K>(), false),
            std::any::type_name::<K>(),
            &routes,
            &|| false,
        )
    }

    fn dispatch(
        &self,
        key: PlanKey,
        event_name: &'static str,
        routes: &Routes<'_>,
        consumed: &dyn Fn() -> bool,
    ) -> DispatchReport {
        self.counters.bump(&self.counters.events_published);

        let steps = self.plan_for(key, routes);
        if steps.is_empty() {
            trace!("📭 no handlers for {event_name}");
            return DispatchReport::default();
        }

        let mut report = DispatchReport::default();
        for step in steps.iter() {
            if consumed() {
                report.consumed = true;
                self.counters.bump(&self.counters.events_consumed);
                break;
            }

            report.invoked += 1;
            let view = &routes.views[step.route];
            if let Err(source) = view.call.invoke(&step.invoker) {
                report.failed += 1;
                self.counters.bump(&self.counters.handler_failures);
                let err = EventError::HandlerInvocation {
                    handler: step.invoker.descriptor.label(),
                    source,
                };
                (self.error_sink)(&err);
            }
        }

        self.counters
            .add(&self.counters.handlers_invoked, report.invoked as u64);
        report
    }

    /// Returns the merged dispatch plan for one route set, rebuilt only when
    /// the registry has changed since the cached plan was built.
    fn plan_for(&self, key: PlanKey, routes: &Routes<'_>) -> Arc<Vec<PlanStep>> {
        let version = self.registry.version();
        if let Some(cached) = self.plans.get(&key) {
            if cached.version == version {
                self.counters.bump(&self.counters.plan_hits);
                return Arc::clone(&cached.steps);
            }
        }

        let mut steps = Vec::new();
        for (index, view) in routes.views.iter().enumerate() {
            let Some(snapshot) = self.registry.snapshot_for(view.key) else {
                continue;
            };
            for invoker in snapshot.iter() {
                // Exact-match handlers only see events published under their
                // own key, not deliveries routed in from a subtype closure.
                if !view.primary && !invoker.descriptor.accepts_subtypes {
                    continue;
                }
                steps.push(PlanStep {
                    route: index,
                    invoker: Arc::clone(invoker),
                });
            }
        }
        // Global ordering across the whole closure, not per-type
        // concatenation: priority descending, then registration order.
        steps.sort_by(|a, b| {
            b.invoker
                .descriptor
                .priority
                .cmp(&a.invoker.descriptor.priority)
                .then(a.invoker.seq.cmp(&b.invoker.seq))
        });

        self.counters.bump(&self.counters.plan_rebuilds);
        let steps = Arc::new(steps);

        // Cache only if the registry did not move under the rebuild; the
        // current dispatch still uses the plan it just built.
        if self.registry.version() == version {
            self.plans.insert(
                key,
                CachedPlan {
                    version,
                    steps: Arc::clone(&steps),
                },
            );
        }
        steps
    }

    /// Point-in-time activity counters and registry sizes.
    pub fn stats(&self) -> BusStats {
        let mut stats = self.counters.snapshot();
        stats.synthesized_thunks = self.factory.synthesized();
        stats.degraded_bindings = self.factory.degraded();
        stats.subscribers = self.registry.subscriber_count();
        stats.handlers = self.registry.invoker_count();
        stats
    }

    /// Currently registered handlers across all event types.
    pub fn handler_count(&self) -> usize {
        self.registry.invoker_count()
    }

    /// Currently registered subscriber instances.
    pub fn subscriber_count(&self) -> usize {
        self.registry.subscriber_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("registry", &self.registry)
            .field("factory", &self.factory)
            .field("mode", &self.mode)
            .field("cached_plans", &self.plans.len())
            .finish()
    }
}
