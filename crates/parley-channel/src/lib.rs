//! Parley Channel
//!
//! Multiplexes independent commands and long-lived interactive workflows
//! over one ordered frame stream:
//!
//! - [`Router`] resolves verbs (exact first, then namespace prefixes) and runs
//!   handlers as independent tasks.
//! - [`SerialGateTable`] keeps invocations of one handler type from overlapping.
//! - [`StreamCoordinator`] drives step-by-step workflows that suspend until
//!   the client replies.
//! - [`DisposableRegistry`] owns named cancelable registrations for the
//!   lifetime of a connection.

mod codec;
mod connection;
mod disposables;
mod error;
mod gate;
mod router;
mod server;
mod stream;

pub use codec::{Empty, NamespaceHandler, ObserveHandler, RequestHandler};
pub use connection::{CallContext, Connection, FrameSink, DEFAULT_OUTBOUND_FRAMES};
pub use disposables::DisposableRegistry;
pub use error::{ChannelError, HandlerFault};
pub use gate::{GateKey, Lease, SerialGateTable, Ticket};
pub use router::{RouteKind, Router, RouterBuilder};
pub use server::{serve_connection, ServeOptions, DEFAULT_MAX_FRAME_BYTES};
pub use stream::{
    StreamCoordinator, StreamOutcome, StreamState, StreamVerbs, Workflow, WorkflowStep, CANCEL_VERB,
    SUBMIT_VERB,
};

pub use parley_protocol::{CommandEnvelope, ErrorKind, Frame};

pub type Result<T> = std::result::Result<T, ChannelError>;
