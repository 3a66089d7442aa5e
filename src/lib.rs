//! # EventLib
//!
//! A single-process, in-memory typed event bus. Producers publish typed
//! events; subscribers declare typed handler methods; every publish reaches
//! all matching handlers in priority order with minimal per-call overhead.
//!
//! ## Key Features
//!
//! - **Synthesized invokers**: each handler method is resolved to a direct
//!   call thunk once per subscriber type and cached, so dispatch never pays
//!   for generic per-call introspection
//! - **Type-closure routing**: an event is delivered under its concrete type
//!   and every declared supertype view (`dyn Trait` coercions or embedded
//!   base events)
//! - **Deterministic ordering**: descending priority, registration order
//!   among equals, applied globally across the whole closure
//! - **Snapshot isolation**: registration and unregistration never disturb an
//!   in-flight dispatch; concurrent publishers are fully supported
//! - **Failure isolation**: a failing handler is reported through the error
//!   sink and never stops the rest of the dispatch
//!
//! ## Usage
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use eventlib::{impl_event, EventBus, HandlerResult, Priority, Subscriber, SubscriberScan};
//!
//! #[derive(Debug)]
//! struct PlayerJoined { name: String }
//! impl_event!(PlayerJoined);
//!
//! #[derive(Default)]
//! struct JoinLog { seen: Mutex<Vec<String>> }
//!
//! impl JoinLog {
//!     fn on_player_joined(&self, event: &PlayerJoined) -> HandlerResult {
//!         self.seen.lock().unwrap().push(event.name.clone());
//!         Ok(())
//!     }
//! }
//!
//! impl Subscriber for JoinLog {
//!     fn describe(scan: &mut SubscriberScan<Self>) {
//!         scan.handler("on_player_joined", Priority::NORMAL, JoinLog::on_player_joined);
//!     }
//! }
//!
//! let bus = EventBus::new();
//! let log = Arc::new(JoinLog::default());
//! bus.register(&log).unwrap();
//!
//! let report = bus.publish(&PlayerJoined { name: "Alice".into() });
//! assert_eq!(report.invoked, 1);
//! assert_eq!(log.seen.lock().unwrap().as_slice(), ["Alice"]);
//! ```
//!
//! Buses are explicitly constructed values, not ambient globals; create one
//! per subsystem or per test and share it as an `Arc<EventBus>`.

pub mod bus;
pub mod error;
pub mod event;
pub mod invoker;
pub mod macros;
pub mod registry;
pub mod stats;
pub mod subscriber;

pub use bus::{DispatchReport, ErrorSink, EventBus, EventBusBuilder};
pub use error::{EventError, HandlerError, HandlerResult};
pub use event::{Consumed, Event, Routes};
pub use invoker::InvokerMode;
pub use registry::SubscriberId;
pub use stats::BusStats;
pub use subscriber::{scan, HandlerDescriptor, Priority, Subscriber, SubscriberScan};

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, EventError>;
