//! Protocol error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Empty frame")]
    EmptyFrame,

    #[error("Invalid verb token: {0:?}")]
    InvalidVerb(String),

    #[error("Malformed payload for {verb}: {source}")]
    MalformedPayload {
        verb: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Frame exceeds {0} bytes")]
    FrameTooLarge(usize),

    #[error("Payload for {0} could not be serialized")]
    Unserializable(String, #[source] serde_json::Error),
}
