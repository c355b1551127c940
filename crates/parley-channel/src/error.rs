//! Channel error types
//!
//! Everything here is caught at the router or coordinator boundary and
//! turned into an error frame; none of it closes the connection.

use std::any::Any;

use parley_protocol::{ErrorKind, ProtocolError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Unknown command: {verb}")]
    Routing { verb: String },

    #[error("Invalid arguments for {verb}: {source}")]
    Decode {
        verb: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Handler(HandlerFault),

    #[error("A {namespace} workflow is already running")]
    DuplicateStream { namespace: String },

    #[error("Registration already exists: {key}")]
    DuplicateKey { key: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid command registration: {0}")]
    Registration(String),

    #[error("Connection closed")]
    Closed,

    #[error("Outbound queue full")]
    Backpressure,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChannelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChannelError::Protocol(_) => ErrorKind::Protocol,
            ChannelError::Routing { .. } => ErrorKind::Routing,
            ChannelError::Decode { .. } => ErrorKind::Decode,
            ChannelError::Handler(fault) => fault.kind(),
            ChannelError::DuplicateStream { .. } => ErrorKind::DuplicateStream,
            ChannelError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            ChannelError::Cancelled | ChannelError::Closed => ErrorKind::Cancelled,
            ChannelError::Registration(_) | ChannelError::Io(_) | ChannelError::Backpressure => {
                ErrorKind::Handler
            }
        }
    }
}

impl From<HandlerFault> for ChannelError {
    fn from(fault: HandlerFault) -> Self {
        ChannelError::Handler(fault)
    }
}

/// Failure returned by a command handler or workflow.
///
/// Any error type converts into a fault with `?`. Channel errors keep their
/// kind so a duplicate registration still reports as `duplicateKey`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFault {
    kind: ErrorKind,
    message: String,
}

impl HandlerFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Handler,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for HandlerFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl<E> From<E> for HandlerFault
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        let kind = (&error as &dyn Any)
            .downcast_ref::<ChannelError>()
            .map(ChannelError::kind)
            .unwrap_or(ErrorKind::Handler);
        Self {
            kind,
            message: error.to_string(),
        }
    }
}
