//! Subscriber contract and the subscription scanner.

use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{EventError, HandlerResult};
use crate::invoker::{BoundOutcome, InvokerFactory, InvokerMode};

/// Trait implemented by objects owning handler methods.
///
/// `describe` declares the handlers of the type; it is the marker contract
/// that makes a method recognizable as a handler. The event-parameter shape
/// is enforced by the function-pointer signature: exactly one subscriber
/// reference and one event reference.
///
/// ```
/// use eventlib::{HandlerResult, Priority, Subscriber, SubscriberScan};
/// # use eventlib::impl_event;
/// # #[derive(Debug)] struct Hello;
/// # impl_event!(Hello);
///
/// struct Logger;
///
/// impl Logger {
///     fn on_hello(&self, _event: &Hello) -> HandlerResult {
///         Ok(())
///     }
/// }
///
/// impl Subscriber for Logger {
///     fn describe(scan: &mut SubscriberScan<Self>) {
///         scan.handler("on_hello", Priority::NORMAL, Logger::on_hello);
///     }
/// }
/// ```
pub trait Subscriber: Any + Send + Sync + 'static {
    /// Declares the handler methods of this subscriber type.
    fn describe(scan: &mut SubscriberScan<Self>)
    where
        Self: Sized;
}

/// Relative invocation order among handlers of one dispatch.
///
/// Higher priorities run earlier; handlers of equal priority run in
/// registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub i32);

impl Priority {
    pub const HIGHEST: Priority = Priority(200);
    pub const HIGH: Priority = Priority(100);
    pub const NORMAL: Priority = Priority(0);
    pub const LOW: Priority = Priority(-100);
    pub const LOWEST: Priority = Priority(-200);
}

impl Default for Priority {
    fn default() -> Self {
        Priority::NORMAL
    }
}

/// Immutable description of one declared handler method.
#[derive(Debug, Clone)]
pub struct HandlerDescriptor {
    /// `TypeId` of the subscriber type declaring the handler.
    pub subscriber_type: TypeId,
    /// Type name of the subscriber.
    pub subscriber_name: &'static str,
    /// Declared method name.
    pub method: &'static str,
    /// Event-type key the handler is registered under.
    pub event_type: TypeId,
    /// Type name of the event key.
    pub event_name: &'static str,
    /// Invocation priority.
    pub priority: Priority,
    /// Whether the handler also receives events routed here from a subtype's
    /// closure, or only events published under this exact key.
    pub accepts_subtypes: bool,
    /// Whether the declaration passed scan validation.
    pub valid: bool,
}

impl HandlerDescriptor {
    pub(crate) fn label(&self) -> String {
        format!("{}::{}", self.subscriber_name, self.method)
    }
}

/// Inspects a subscriber type and returns descriptors for all of its declared
/// handlers, including invalid ones (flagged via
/// [`HandlerDescriptor::valid`]). Scanning has no side effects and may be
/// repeated freely.
pub fn scan<S: Subscriber>() -> Vec<HandlerDescriptor> {
    SubscriberScan::<S>::run()
        .decls
        .into_iter()
        .map(|decl| decl.descriptor)
        .collect()
}

pub(crate) type ErasedSubscriber = Arc<dyn Any + Send + Sync>;

pub(crate) type BinderFn =
    Box<dyn Fn(&InvokerFactory, InvokerMode, &ErasedSubscriber) -> BoundOutcome + Send + Sync>;

pub(crate) struct HandlerDecl {
    pub(crate) descriptor: HandlerDescriptor,
    /// `None` for declarations that failed validation.
    pub(crate) binder: Option<BinderFn>,
}

/// Collects handler declarations during [`Subscriber::describe`].
pub struct SubscriberScan<S: ?Sized> {
    pub(crate) decls: Vec<HandlerDecl>,
    pub(crate) errors: Vec<EventError>,
    _subscriber: PhantomData<fn(&S)>,
}

impl<S: Subscriber> SubscriberScan<S> {
    pub(crate) fn run() -> Self {
        let mut scan = Self {
            decls: Vec::new(),
            errors: Vec::new(),
            _subscriber: PhantomData,
        };
        S::describe(&mut scan);
        scan
    }

    /// Declares a handler for the event key `K`, which may be a concrete
    /// event type or a `dyn Trait` supertype view. The handler also receives
    /// events whose closure routes through `K`.
    pub fn handler<K: ?Sized + Any>(
        &mut self,
        method: &'static str,
        priority: Priority,
        handler: fn(&S, &K) -> HandlerResult,
    ) {
        self.declare(method, priority, true, handler);
    }

    /// Declares a handler invoked only for events published under exactly
    /// `K`, never through a subtype's closure. `K` must be a concrete event
    /// type; declaring an exact handler on a `dyn Trait` key is an invalid
    /// shape.
    pub fn handler_exact<K: ?Sized + Any>(
        &mut self,
        method: &'static str,
        priority: Priority,
        handler: fn(&S, &K) -> HandlerResult,
    ) {
        self.declare(method, priority, false, handler);
    }

    fn declare<K: ?Sized + Any>(
        &mut self,
        method: &'static str,
        priority: Priority,
        accepts_subtypes: bool,
        handler: fn(&S, &K) -> HandlerResult,
    ) {
        let mut descriptor = HandlerDescriptor {
            subscriber_type: TypeId::of::<S>(),
            subscriber_name: std::any::type_name::<S>(),
            method,
            event_type: TypeId::of::<K>(),
            event_name: std::any::type_name::<K>(),
            priority,
            accepts_subtypes,
            valid: true,
        };

        // A thin reference means K is a concrete type; trait-object views
        // carry vtable metadata.
        let concrete = std::mem::size_of::<&K>() == std::mem::size_of::<usize>();

        let invalid_reason = if method.trim().is_empty() {
            Some("method name must not be blank".to_string())
        } else if !accepts_subtypes && !concrete {
            Some(format!(
                "exact handler requires a concrete event type, got {}",
                descriptor.event_name
            ))
        } else {
            None
        };

        if let Some(reason) = invalid_reason {
            descriptor.valid = false;
            self.errors.push(EventError::InvalidHandlerShape {
                subscriber: descriptor.subscriber_name,
                method,
                reason,
            });
            self.decls.push(HandlerDecl {
                descriptor,
                binder: None,
            });
            return;
        }

        let duplicate = self.decls.iter().any(|decl| {
            decl.descriptor.method == method && decl.descriptor.event_type == descriptor.event_type
        });
        if duplicate {
            descriptor.valid = false;
            self.errors.push(EventError::DuplicateHandler {
                subscriber: descriptor.subscriber_name,
                method,
            });
            self.decls.push(HandlerDecl {
                descriptor,
                binder: None,
            });
            return;
        }

        let binder: BinderFn = Box::new(move |factory, mode, instance| {
            factory.bind::<S, K>(method, handler, mode, instance)
        });
        self.decls.push(HandlerDecl {
            descriptor,
            binder: Some(binder),
        });
    }
}
