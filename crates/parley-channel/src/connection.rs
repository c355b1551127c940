//! Per-connection context
//!
//! A `Connection` owns everything scoped to one client: the output sink,
//! the disposable registry, the streaming coordinator and the cancellation
//! signal. Handlers receive it through a fresh [`CallContext`] per call.

use std::sync::Arc;

use parley_protocol::Frame;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::codec::decode_arg;
use crate::disposables::DisposableRegistry;
use crate::error::ChannelError;
use crate::gate::SerialGateTable;
use crate::stream::StreamCoordinator;
use crate::Result;

/// Outbound frames a connection may have queued before senders wait
pub const DEFAULT_OUTBOUND_FRAMES: usize = 128;

/// Handle to the connection's single writer. Each send is one whole frame.
///
/// The queue is bounded: `send` waits for room, `try_send` fails with
/// `Backpressure` instead.
#[derive(Clone, Debug)]
pub struct FrameSink {
    tx: mpsc::Sender<Frame>,
}

impl FrameSink {
    pub fn new(tx: mpsc::Sender<Frame>) -> Self {
        Self { tx }
    }

    /// A sink plus the receiving end, for custom writers and tests
    pub fn channel() -> (Self, mpsc::Receiver<Frame>) {
        Self::with_capacity(DEFAULT_OUTBOUND_FRAMES)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub async fn send(&self, frame: Frame) -> Result<()> {
        self.tx.send(frame).await.map_err(|_| ChannelError::Closed)
    }

    pub async fn send_payload<T: Serialize + ?Sized>(&self, verb: &str, payload: &T) -> Result<()> {
        self.send(Frame::with_payload(verb, payload)?).await
    }

    /// Queue `frame` without waiting
    pub fn try_send(&self, frame: Frame) -> Result<()> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => ChannelError::Backpressure,
            TrySendError::Closed(_) => ChannelError::Closed,
        })
    }

    pub fn try_send_payload<T: Serialize + ?Sized>(&self, verb: &str, payload: &T) -> Result<()> {
        self.try_send(Frame::with_payload(verb, payload)?)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct Connection {
    id: Uuid,
    sink: FrameSink,
    disposables: DisposableRegistry,
    streams: StreamCoordinator,
    gates: Arc<SerialGateTable>,
    cancel: CancellationToken,
}

impl Connection {
    pub fn new(sink: FrameSink, gates: Arc<SerialGateTable>, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            sink,
            disposables: DisposableRegistry::new(),
            streams: StreamCoordinator::new(),
            gates,
            cancel,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn sink(&self) -> &FrameSink {
        &self.sink
    }

    pub fn disposables(&self) -> &DisposableRegistry {
        &self.disposables
    }

    pub fn streams(&self) -> &StreamCoordinator {
        &self.streams
    }

    pub fn gates(&self) -> &Arc<SerialGateTable> {
        &self.gates
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel everything scoped to this connection. Safe to call repeatedly.
    pub fn teardown(&self) {
        self.cancel.cancel();
        let streams = self.streams.shutdown();
        let released = self.disposables.dispose_all();

        tracing::debug!(
            connection = %self.id,
            streams,
            released,
            "Connection torn down"
        );
    }
}

/// Context for one handler invocation
#[derive(Clone)]
pub struct CallContext {
    connection: Arc<Connection>,
    verb: String,
}

impl CallContext {
    pub fn new(connection: Arc<Connection>, verb: impl Into<String>) -> Self {
        Self {
            connection,
            verb: verb.into(),
        }
    }

    /// The verb as received, including any namespace prefix
    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn sink(&self) -> &FrameSink {
        self.connection.sink()
    }

    pub fn disposables(&self) -> &DisposableRegistry {
        self.connection.disposables()
    }

    pub fn streams(&self) -> &StreamCoordinator {
        self.connection.streams()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        self.connection.cancellation()
    }

    /// Decode a payload the way typed handlers do: a missing payload reads
    /// as `{}` and a mismatch fails with a `Decode` error.
    pub fn decode<T: DeserializeOwned>(&self, payload: Option<Value>) -> Result<T> {
        decode_arg(&self.verb, payload)
    }

    /// Queue `frame`, waiting for room. Gives up with `Cancelled` once the
    /// connection closes.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancellation().cancelled() => Err(ChannelError::Cancelled),
            sent = self.sink().send(frame) => sent,
        }
    }

    pub async fn send_payload<T: Serialize + ?Sized>(&self, verb: &str, payload: &T) -> Result<()> {
        self.send(Frame::with_payload(verb, payload)?).await
    }
}
