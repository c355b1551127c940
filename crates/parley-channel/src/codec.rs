//! Typed codec registry
//!
//! Handlers declare their argument and result types; the adapters here turn
//! each one into a uniform [`Invoke`] entry so the router never inspects
//! types at dispatch time. Two shapes exist: request/result handlers whose
//! return value is encoded as the paired reply frame, and fire-and-observe
//! handlers that write their own frames (if any).

use std::any::type_name;

use async_trait::async_trait;
use parley_protocol::{error_verb, Frame};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::connection::CallContext;
use crate::error::{ChannelError, HandlerFault};
use crate::Result;

/// Argument type for commands that take no payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// Request/result command: the returned value is written as `RESULT_VERB <value>`,
/// and failures as `<RESULT_VERB>Error {"error": ..}`.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    type Arg: DeserializeOwned + Send;
    type Output: Serialize + Send;

    const RESULT_VERB: &'static str;
    /// Serialize invocations of this handler type
    const SERIAL: bool = false;

    async fn handle(&self, ctx: &CallContext, arg: Self::Arg) -> std::result::Result<Self::Output, HandlerFault>;
}

/// Fire-and-observe command: writes zero or more frames itself
#[async_trait]
pub trait ObserveHandler: Send + Sync + 'static {
    type Arg: DeserializeOwned + Send;

    const SERIAL: bool = false;

    async fn handle(&self, ctx: &CallContext, arg: Self::Arg) -> std::result::Result<(), HandlerFault>;
}

/// Handler for every verb under a dot-terminated prefix. Receives the verb
/// with the prefix stripped and the undecoded payload.
#[async_trait]
pub trait NamespaceHandler: Send + Sync + 'static {
    const SERIAL: bool = false;

    async fn handle(
        &self,
        ctx: &CallContext,
        verb: &str,
        payload: Option<Value>,
    ) -> std::result::Result<(), HandlerFault>;
}

/// Decode a payload into a handler argument. A missing payload decodes as `{}`.
pub(crate) fn decode_arg<T: DeserializeOwned>(verb: &str, payload: Option<Value>) -> Result<T> {
    let payload = payload.unwrap_or_else(|| Value::Object(Default::default()));
    serde_json::from_value(payload).map_err(|source| ChannelError::Decode {
        verb: verb.to_string(),
        source,
    })
}

/// Uniform entry stored in the routing table
#[async_trait]
pub(crate) trait Invoke: Send + Sync {
    /// Run the handler. `Ok(Some(frame))` is the reply to write.
    async fn invoke(&self, ctx: &CallContext, payload: Option<Value>) -> Result<Option<Frame>>;

    /// Frame reporting `error` for a call to `verb`
    fn error_frame(&self, verb: &str, error: &ChannelError) -> Frame;

    fn handler_name(&self) -> &'static str;
}

pub(crate) struct RequestEntry<H>(pub(crate) H);

#[async_trait]
impl<H: RequestHandler> Invoke for RequestEntry<H> {
    async fn invoke(&self, ctx: &CallContext, payload: Option<Value>) -> Result<Option<Frame>> {
        let arg = decode_arg::<H::Arg>(ctx.verb(), payload)?;
        let output = self.0.handle(ctx, arg).await?;
        Ok(Some(Frame::with_payload(H::RESULT_VERB, &output)?))
    }

    fn error_frame(&self, _verb: &str, error: &ChannelError) -> Frame {
        Frame::error(&error_verb(H::RESULT_VERB), error)
    }

    fn handler_name(&self) -> &'static str {
        type_name::<H>()
    }
}

pub(crate) struct ObserveEntry<H>(pub(crate) H);

#[async_trait]
impl<H: ObserveHandler> Invoke for ObserveEntry<H> {
    async fn invoke(&self, ctx: &CallContext, payload: Option<Value>) -> Result<Option<Frame>> {
        let arg = decode_arg::<H::Arg>(ctx.verb(), payload)?;
        self.0.handle(ctx, arg).await?;
        Ok(None)
    }

    fn error_frame(&self, verb: &str, error: &ChannelError) -> Frame {
        Frame::command_error(verb, error.kind(), error)
    }

    fn handler_name(&self) -> &'static str {
        type_name::<H>()
    }
}

pub(crate) struct NamespaceEntry<H> {
    handler: H,
    prefix_len: usize,
}

impl<H> NamespaceEntry<H> {
    pub(crate) fn new(handler: H, prefix: &str) -> Self {
        Self {
            handler,
            prefix_len: prefix.len(),
        }
    }
}

#[async_trait]
impl<H: NamespaceHandler> Invoke for NamespaceEntry<H> {
    async fn invoke(&self, ctx: &CallContext, payload: Option<Value>) -> Result<Option<Frame>> {
        // Router only selects this entry when the prefix matched
        let remainder = ctx.verb().get(self.prefix_len..).unwrap_or_default();
        self.handler.handle(ctx, remainder, payload).await?;
        Ok(None)
    }

    fn error_frame(&self, verb: &str, error: &ChannelError) -> Frame {
        Frame::command_error(verb, error.kind(), error)
    }

    fn handler_name(&self) -> &'static str {
        type_name::<H>()
    }
}
