//! Streaming session coordinator
//!
//! Drives multi-round workflows that push a step to the client and then
//! suspend until the client answers:
//!
//! ```text
//! Idle
//!   ↓ begin
//! Producing ──(step written)──→ AwaitingReply
//!   ↑                               │
//!   └──────── submitStep ───────────┘
//!
//! AwaitingReply ── cancel / shutdown ──→ Cancelled
//! Producing ── step source exhausted ──→ Completed
//! any ── workflow error ──→ Faulted
//! ```
//!
//! While a stream is awaiting a reply, the very next inbound envelope on the
//! connection belongs to it, whatever its verb. Only one stream may run per
//! namespace at a time.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use parking_lot::Mutex;
use parley_protocol::{CommandEnvelope, Frame};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::connection::FrameSink;
use crate::error::{ChannelError, HandlerFault};
use crate::Result;

/// Reply verb that hands `handleData` to the current step
pub const SUBMIT_VERB: &str = "submitStep";
/// Reply verb that abandons the workflow
pub const CANCEL_VERB: &str = "cancel";

/// Outbound verbs used by one streaming namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamVerbs {
    /// Carries each step as `{"stepType", "stepValue"}`
    pub step: &'static str,
    /// Carries `{"error"}` for faults and unexpected replies
    pub error: &'static str,
    /// Sent once on reaching a terminal state, with `{"outcome"}`
    pub finished: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub step_type: String,
    pub step_value: Value,
}

impl WorkflowStep {
    pub fn new(step_type: impl Into<String>, value: impl Serialize) -> std::result::Result<Self, HandlerFault> {
        Ok(Self {
            step_type: step_type.into(),
            step_value: serde_json::to_value(value)?,
        })
    }
}

/// A lazily produced sequence of steps.
///
/// `close` runs exactly once when the workflow ends for any reason, so a
/// step source holding files or handles can release them.
#[async_trait]
pub trait Workflow: Send + 'static {
    /// Produce the next step, or `None` when the sequence is exhausted
    async fn next_step(&mut self) -> std::result::Result<Option<WorkflowStep>, HandlerFault>;

    /// Apply the client's answer to the step most recently produced
    async fn submit(&mut self, handle_data: Value) -> std::result::Result<(), HandlerFault>;

    async fn close(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    /// Producing a step or handling a submitted reply
    Producing,
    /// Step written; the next inbound envelope is the reply
    AwaitingReply,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Cancelled,
    Faulted(String),
}

impl StreamOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamOutcome::Completed => "completed",
            StreamOutcome::Cancelled => "cancelled",
            StreamOutcome::Faulted(_) => "faulted",
        }
    }
}

enum StreamInput {
    Submit(CommandEnvelope),
    Cancel(CommandEnvelope),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplyKind {
    Submit,
    Cancel,
    Unexpected,
}

/// Sort a reply by verb, with or without the stream's namespace prefix
fn classify(namespace: &str, envelope: &CommandEnvelope) -> ReplyKind {
    let verb = envelope.strip_namespace(namespace).unwrap_or(envelope.verb());
    if verb.eq_ignore_ascii_case(SUBMIT_VERB) {
        ReplyKind::Submit
    } else if verb.eq_ignore_ascii_case(CANCEL_VERB) {
        ReplyKind::Cancel
    } else {
        ReplyKind::Unexpected
    }
}

struct ActiveStream {
    namespace: String,
    state: StreamState,
    // Some exactly while state == AwaitingReply
    reply_slot: Option<oneshot::Sender<StreamInput>>,
    cancel: CancellationToken,
    sink: FrameSink,
    error_verb: &'static str,
}

impl StreamInput {
    fn into_envelope(self) -> Option<CommandEnvelope> {
        match self {
            StreamInput::Submit(envelope) | StreamInput::Cancel(envelope) => Some(envelope),
            StreamInput::Shutdown => None,
        }
    }
}

impl ActiveStream {
    fn abort(&mut self) {
        self.cancel.cancel();
        if let Some(slot) = self.reply_slot.take() {
            let _ = slot.send(StreamInput::Shutdown);
        }
    }
}

#[derive(Default)]
struct CoordinatorState {
    streams: Vec<ActiveStream>,
    closed: bool,
}

#[derive(Clone, Default)]
pub struct StreamCoordinator {
    state: Arc<Mutex<CoordinatorState>>,
}

impl StreamCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `workflow` under `namespace`.
    ///
    /// Fails with `DuplicateStream` if a workflow already runs in that
    /// namespace, and with `Cancelled` once the coordinator is shut down.
    pub fn begin<W: Workflow>(
        &self,
        namespace: &str,
        verbs: StreamVerbs,
        workflow: W,
        sink: FrameSink,
        cancel: &CancellationToken,
    ) -> Result<JoinHandle<StreamOutcome>> {
        let cancel = cancel.child_token();
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(ChannelError::Cancelled);
            }
            if state
                .streams
                .iter()
                .any(|s| s.namespace.eq_ignore_ascii_case(namespace))
            {
                return Err(ChannelError::DuplicateStream {
                    namespace: namespace.to_string(),
                });
            }
            state.streams.push(ActiveStream {
                namespace: namespace.to_string(),
                state: StreamState::Producing,
                reply_slot: None,
                cancel: cancel.clone(),
                sink: sink.clone(),
                error_verb: verbs.error,
            });
        }

        tracing::debug!(namespace, "Workflow started");

        let driver = Driver {
            coordinator: self.clone(),
            namespace: namespace.to_string(),
            verbs,
            sink,
            cancel,
            workflow,
        };
        Ok(tokio::spawn(driver.run()))
    }

    /// Hand `envelope` to the stream awaiting a reply, if any.
    ///
    /// Returns the envelope back when no stream is waiting, in which case it
    /// should be routed normally. A reply other than `submitStep` or `cancel`
    /// is answered with the stream's error verb and the stream stays
    /// suspended on the same step.
    pub fn intercept(&self, envelope: CommandEnvelope) -> Option<CommandEnvelope> {
        let (namespace, slot, input) = {
            let mut state = self.state.lock();
            let Some(stream) = state
                .streams
                .iter_mut()
                .find(|s| s.state == StreamState::AwaitingReply)
            else {
                return Some(envelope);
            };

            let input = match classify(&stream.namespace, &envelope) {
                ReplyKind::Submit => StreamInput::Submit(envelope),
                ReplyKind::Cancel => StreamInput::Cancel(envelope),
                ReplyKind::Unexpected => {
                    tracing::debug!(namespace = %stream.namespace, verb = envelope.verb(), "Unexpected workflow reply");
                    let error = Frame::error(
                        stream.error_verb,
                        format!("Expected {SUBMIT_VERB} or {CANCEL_VERB}, got {}", envelope.verb()),
                    );
                    if let Err(e) = stream.sink.try_send(error) {
                        tracing::debug!(namespace = %stream.namespace, error = %e, "Workflow error frame dropped");
                    }
                    return None;
                }
            };

            let Some(slot) = stream.reply_slot.take() else {
                return input.into_envelope();
            };
            stream.state = StreamState::Producing;
            (stream.namespace.clone(), slot, input)
        };

        tracing::debug!(namespace = %namespace, "Delivering reply to workflow");

        // Err means the workflow ended between suspending and now
        slot.send(input).err().and_then(StreamInput::into_envelope)
    }

    pub fn state(&self, namespace: &str) -> StreamState {
        self.state
            .lock()
            .streams
            .iter()
            .find(|s| s.namespace.eq_ignore_ascii_case(namespace))
            .map(|s| s.state)
            .unwrap_or(StreamState::Idle)
    }

    /// Namespace of the stream currently awaiting a reply
    pub fn suspended_namespace(&self) -> Option<String> {
        self.state
            .lock()
            .streams
            .iter()
            .find(|s| s.state == StreamState::AwaitingReply)
            .map(|s| s.namespace.clone())
    }

    /// Cancel the workflow running under `namespace`. Returns false if none.
    pub fn cancel(&self, namespace: &str) -> bool {
        let mut state = self.state.lock();
        match state
            .streams
            .iter_mut()
            .find(|s| s.namespace.eq_ignore_ascii_case(namespace))
        {
            Some(stream) => {
                stream.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every workflow and refuse new ones. Returns how many were running.
    pub fn shutdown(&self) -> usize {
        let mut streams = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.streams)
        };

        for stream in &mut streams {
            stream.abort();
        }
        streams.len()
    }

    fn suspend(&self, namespace: &str) -> Option<oneshot::Receiver<StreamInput>> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        let stream = state.streams.iter_mut().find(|s| s.namespace == namespace)?;
        let (tx, rx) = oneshot::channel();
        stream.reply_slot = Some(tx);
        stream.state = StreamState::AwaitingReply;
        Some(rx)
    }

    fn finish(&self, namespace: &str) {
        self.state.lock().streams.retain(|s| s.namespace != namespace);
    }
}

struct Driver<W> {
    coordinator: StreamCoordinator,
    namespace: String,
    verbs: StreamVerbs,
    sink: FrameSink,
    cancel: CancellationToken,
    workflow: W,
}

impl<W: Workflow> Driver<W> {
    async fn run(mut self) -> StreamOutcome {
        let outcome = self.run_steps().await;

        self.workflow.close().await;
        self.coordinator.finish(&self.namespace);

        if let StreamOutcome::Faulted(message) = &outcome {
            tracing::warn!(namespace = %self.namespace, error = %message, "Workflow faulted");
            let _ = self.sink.send(Frame::error(self.verbs.error, message)).await;
        }
        if let Ok(frame) =
            Frame::with_payload(self.verbs.finished, &json!({ "outcome": outcome.as_str() }))
        {
            let _ = self.sink.send(frame).await;
        }

        tracing::debug!(namespace = %self.namespace, outcome = outcome.as_str(), "Workflow finished");
        outcome
    }

    async fn run_steps(&mut self) -> StreamOutcome {
        loop {
            let produced = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return StreamOutcome::Cancelled,
                produced = guarded(self.workflow.next_step()) => produced,
            };

            let step = match produced {
                Ok(Some(step)) => step,
                Ok(None) => return StreamOutcome::Completed,
                Err(fault) => return StreamOutcome::Faulted(fault.to_string()),
            };
            let frame = match Frame::with_payload(self.verbs.step, &step) {
                Ok(frame) => frame,
                Err(e) => return StreamOutcome::Faulted(e.to_string()),
            };

            // Suspend before queueing the step so a fast reply cannot be
            // routed as an ordinary command.
            let Some(reply) = self.coordinator.suspend(&self.namespace) else {
                return StreamOutcome::Cancelled;
            };
            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return StreamOutcome::Cancelled,
                sent = self.sink.send(frame) => sent,
            };
            if sent.is_err() {
                return StreamOutcome::Cancelled;
            }

            // Unexpected replies are answered by the coordinator, so only
            // submit, cancel or shutdown arrive here.
            let input = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return StreamOutcome::Cancelled,
                input = reply => input,
            };
            let data = match input {
                Ok(StreamInput::Submit(envelope)) => handle_data(envelope),
                Ok(StreamInput::Cancel(_)) | Ok(StreamInput::Shutdown) | Err(_) => {
                    return StreamOutcome::Cancelled
                }
            };

            let submitted = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return StreamOutcome::Cancelled,
                submitted = guarded(self.workflow.submit(data)) => submitted,
            };
            if let Err(fault) = submitted {
                return StreamOutcome::Faulted(fault.to_string());
            }
        }
    }
}

/// `handleData` from a `submitStep` payload, `null` when absent
fn handle_data(envelope: CommandEnvelope) -> Value {
    match envelope.into_payload() {
        Some(Value::Object(mut fields)) => fields.remove("handleData").unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Treat a panic inside workflow code as a fault
async fn guarded<T, F>(future: F) -> std::result::Result<T, HandlerFault>
where
    F: Future<Output = std::result::Result<T, HandlerFault>>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(HandlerFault::new("Workflow panicked")))
}
