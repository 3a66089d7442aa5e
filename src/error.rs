//! Error types for the event bus.

/// Errors surfaced by registration and dispatch.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// A declared handler violates the handler contract. Registration of the
    /// whole subscriber fails without touching the registry.
    #[error("invalid handler shape for {subscriber}::{method}: {reason}")]
    InvalidHandlerShape {
        /// Type name of the subscriber declaring the handler.
        subscriber: &'static str,
        /// Method name as declared in the scan.
        method: &'static str,
        /// Human-readable description of the violation.
        reason: String,
    },

    /// The same (subscriber, method) pair was registered twice without an
    /// intervening unregister, either within one scan or across register calls.
    #[error("handler {subscriber}::{method} is already registered")]
    DuplicateHandler {
        /// Type name of the subscriber.
        subscriber: &'static str,
        /// Method name of the offending handler.
        method: &'static str,
    },

    /// A handler returned an error during dispatch. Reported through the bus
    /// error sink; never aborts the remaining handlers of the publish call.
    #[error("handler {handler} failed during dispatch")]
    HandlerInvocation {
        /// `SubscriberType::method` label of the failing handler.
        handler: String,
        /// The error the handler returned.
        #[source]
        source: HandlerError,
    },
}

/// Error type returned by handler methods.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl HandlerError {
    /// Creates a handler error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a handler error wrapping an underlying error.
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Result type returned by handler methods.
pub type HandlerResult = Result<(), HandlerError>;
