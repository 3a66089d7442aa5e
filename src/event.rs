//! Event trait, type-closure routing and consumption flag.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use smallvec::SmallVec;

use crate::error::HandlerError;
use crate::invoker::BoundCall;
use crate::registry::BoundInvoker;

/// Trait implemented by every publishable event type.
///
/// Use the [`impl_event!`](crate::impl_event) macro rather than implementing
/// this by hand; the macro generates [`visit_routes`](Event::visit_routes)
/// from the declared supertype views.
///
/// An event's *type closure* is the set of event-type keys it is dispatched
/// under: its own concrete type plus every declared supertype view. A view is
/// usually a `dyn Trait` coercion of the event itself, but it may also be a
/// projection of an embedded base event:
///
/// ```
/// use eventlib::{impl_event, Event, Routes};
///
/// #[derive(Debug)]
/// struct MessageEvent { text: String }
/// impl_event!(MessageEvent);
///
/// #[derive(Debug)]
/// struct ChatMessage { base: MessageEvent, channel: u32 }
///
/// impl Event for ChatMessage {
///     fn visit_routes<'e>(&'e self, routes: &mut Routes<'e>) {
///         routes.primary(self);
///         routes.supertype::<MessageEvent>(&self.base);
///     }
/// }
/// ```
///
/// The closure is enumerated by generated code, so no runtime type walking
/// happens on publish; the coercion from the concrete type to each view is
/// resolved where the concrete type is statically known.
pub trait Event: Any + Send + Sync + fmt::Debug + 'static {
    /// Enumerates the routes this event is dispatched under, most derived
    /// first. The default routes only the concrete type.
    fn visit_routes<'e>(&'e self, routes: &mut Routes<'e>)
    where
        Self: Sized,
    {
        routes.primary(self);
    }

    /// Whether a handler has marked this event consumed. Checked by the
    /// router between invocations; once true, remaining handlers are skipped.
    /// Events opt in by carrying a [`Consumed`] flag.
    fn is_consumed(&self) -> bool {
        false
    }
}

/// Opt-in consumption flag for events supporting dispatch short-circuit.
///
/// Embed one as a field and wire it up through `impl_event!`:
///
/// ```
/// use eventlib::{impl_event, Consumed};
///
/// #[derive(Debug, Default)]
/// struct ClickEvent { consumed: Consumed }
/// impl_event!(ClickEvent, consumed: consumed);
/// ```
#[derive(Debug, Default)]
pub struct Consumed(AtomicBool);

impl Consumed {
    /// Creates an unmarked flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the event consumed. Handlers call this through a shared
    /// reference; the flag is never cleared.
    pub fn mark(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns whether the flag has been marked.
    pub fn is_marked(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Collector for an event's type closure during one publish call.
///
/// Populated by [`Event::visit_routes`]; each entry pairs an event-type key
/// with a typed view of the event borrowed for the duration of the dispatch.
pub struct Routes<'e> {
    pub(crate) views: SmallVec<[RouteView<'e>; 4]>,
}

impl<'e> Routes<'e> {
    pub(crate) fn new() -> Self {
        Self {
            views: SmallVec::new(),
        }
    }

    /// Routes the event under its own concrete type. Must be the first route.
    pub fn primary<E: Event>(&mut self, view: &'e E) {
        self.push::<E>(view, true);
    }

    /// Routes the event under a supertype view, either a `dyn Trait` coercion
    /// or a borrowed base-event projection.
    pub fn supertype<K: ?Sized + Any>(&mut self, view: &'e K) {
        self.push::<K>(view, false);
    }

    /// Single-key route used by `publish_as`.
    pub(crate) fn single<K: ?Sized + Any>(&mut self, view: &'e K) {
        self.push::<K>(view, true);
    }

    fn push<K: ?Sized + Any>(&mut self, view: &'e K, primary: bool) {
        self.views.push(RouteView {
            key: TypeId::of::<K>(),
            primary,
            call: Box::new(RouteCall { view }),
        });
    }
}

/// One entry of an event's type closure.
pub(crate) struct RouteView<'e> {
    pub(crate) key: TypeId,
    pub(crate) primary: bool,
    pub(crate) call: Box<dyn ErasedRouteCall + 'e>,
}

/// Applies a bound invoker to the typed view held by a route.
///
/// The invoker's call is erased by event-type key; the route re-establishes
/// the typed context, so a key mismatch is an internal inconsistency and is
/// reported as a handler error instead of panicking.
pub(crate) trait ErasedRouteCall {
    fn invoke(&self, bound: &BoundInvoker) -> Result<(), HandlerError>;
}

struct RouteCall<'e, K: ?Sized> {
    view: &'e K,
}

impl<K: ?Sized + Any> ErasedRouteCall for RouteCall<'_, K> {
    fn invoke(&self, bound: &BoundInvoker) -> Result<(), HandlerError> {
        match bound.call.downcast_ref::<BoundCall<K>>() {
            Some(call) => call.invoke(self.view),
            None => Err(HandlerError::msg(format!(
                "invoker for {}::{} cannot receive events keyed as {}",
                bound.descriptor.subscriber_name,
                bound.descriptor.method,
                std::any::type_name::<K>(),
            ))),
        }
    }
}
