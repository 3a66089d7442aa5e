//! Macros for declaring event types.

/// Implements [`Event`](crate::Event) for a type, optionally declaring
/// supertype views and a consumption flag.
///
/// ```
/// use eventlib::{impl_event, Consumed};
///
/// trait Greeting { fn text(&self) -> &str; }
///
/// #[derive(Debug)]
/// struct Hello { text: String }
/// impl Greeting for Hello {
///     fn text(&self) -> &str { &self.text }
/// }
///
/// // Plain event, dispatched only under its own type.
/// #[derive(Debug)]
/// struct Tick;
/// impl_event!(Tick);
///
/// // Dispatched under Hello and dyn Greeting.
/// impl_event!(Hello => dyn Greeting);
///
/// // Supports the consumption short-circuit.
/// #[derive(Debug, Default)]
/// struct Click { consumed: Consumed }
/// impl_event!(Click, consumed: consumed);
/// ```
#[macro_export]
macro_rules! impl_event {
    ($event:ty) => {
        impl $crate::Event for $event {}
    };

    ($event:ty => $($parent:ty),+ $(,)?) => {
        impl $crate::Event for $event {
            fn visit_routes<'e>(&'e self, routes: &mut $crate::Routes<'e>) {
                routes.primary(self);
                $( routes.supertype::<$parent>(self); )+
            }
        }
    };

    ($event:ty, consumed: $field:ident) => {
        impl $crate::Event for $event {
            fn is_consumed(&self) -> bool {
                self.$field.is_marked()
            }
        }
    };

    ($event:ty, consumed: $field:ident => $($parent:ty),+ $(,)?) => {
        impl $crate::Event for $event {
            fn visit_routes<'e>(&'e self, routes: &mut $crate::Routes<'e>) {
                routes.primary(self);
                $( routes.supertype::<$parent>(self); )+
            }

            fn is_consumed(&self) -> bool {
                self.$field.is_marked()
            }
        }
    };
}
