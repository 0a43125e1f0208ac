//! Error types for the message bus.

use std::fmt;

use thiserror::Error;

/// Which side of the bus a handler was registered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// One-to-many notification.
    Broadcast,
    /// One-to-one request/response.
    Call,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Broadcast => write!(f, "broadcast"),
            Channel::Call => write!(f, "call"),
        }
    }
}

/// Errors surfaced by bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// A topic was empty or whitespace-only.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// A call handler is already bound to the topic.
    ///
    /// `register` only logs this; `try_register` returns it.
    #[error("Call topic '{topic}' is already registered")]
    DuplicateRegistration { topic: String },

    /// A user handler returned an error or panicked.
    #[error("{channel} handler for '{topic}' failed: {source}")]
    HandlerExecution {
        topic: String,
        channel: Channel,
        #[source]
        source: anyhow::Error,
    },

    /// `invoke` needs a tokio runtime to schedule the handler on.
    #[error("No tokio runtime available to schedule the call")]
    RuntimeUnavailable,
}

impl BusError {
    pub(crate) fn handler(topic: &str, channel: Channel, source: anyhow::Error) -> Self {
        BusError::HandlerExecution {
            topic: topic.to_string(),
            channel,
            source,
        }
    }

    /// The error the handler itself returned, if this is a handler failure.
    #[must_use]
    pub fn handler_source(&self) -> Option<&anyhow::Error> {
        match self {
            BusError::HandlerExecution { source, .. } => Some(source),
            _ => None,
        }
    }
}
