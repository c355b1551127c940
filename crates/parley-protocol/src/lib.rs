//! Parley Protocol
//!
//! Frame codec for the command channel between the web UI and the host.
//! One transport message is one frame: `"<verb>"` or `"<verb> <payload>"`,
//! where the payload is a single JSON value.

mod envelope;
mod error;
mod frame;

pub use envelope::CommandEnvelope;
pub use error::ProtocolError;
pub use frame::{error_verb, ErrorKind, Frame, COMMAND_ERROR_VERB};

pub type Result<T> = std::result::Result<T, ProtocolError>;
