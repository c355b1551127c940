//! Chat log commands
//!
//! Appends are skipped (and reported with a null id) while message logging
//! is switched off in the settings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_channel::{CallContext, HandlerFault, RequestHandler};
use parley_core::{LogMessage, MessageKind, NewMessage};
use serde::{Deserialize, Serialize};

use super::blocking;
use crate::state::AppState;

const DEFAULT_RECENT_LIMIT: usize = 50;
const MAX_RECENT_LIMIT: usize = 500;

#[derive(Debug, Serialize)]
pub struct LoggedMessage {
    pub id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentArgs {
    pub character: String,
    pub target: String,
    pub before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RecentMessages {
    pub messages: Vec<LogMessage>,
}

async fn append(state: &AppState, kind: MessageKind, message: NewMessage) -> Result<LoggedMessage, HandlerFault> {
    let host = state.host().clone();
    let id = blocking(move || -> parley_core::Result<Option<i64>> {
        if !host.settings().get()?.log_messages {
            return Ok(None);
        }
        let id = match kind {
            MessageKind::Channel => host.chat_log().append_channel_message(&message)?,
            MessageKind::Private => host.chat_log().append_private_message(&message)?,
        };
        Ok(Some(id))
    })
    .await?;
    Ok(LoggedMessage { id })
}

pub struct LogChannelMessage(pub AppState);

#[async_trait]
impl RequestHandler for LogChannelMessage {
    type Arg = NewMessage;
    type Output = LoggedMessage;
    const RESULT_VERB: &'static str = "loggedMessage";
    const SERIAL: bool = true;

    async fn handle(&self, _ctx: &CallContext, message: NewMessage) -> Result<LoggedMessage, HandlerFault> {
        append(&self.0, MessageKind::Channel, message).await
    }
}

pub struct LogPrivateMessage(pub AppState);

#[async_trait]
impl RequestHandler for LogPrivateMessage {
    type Arg = NewMessage;
    type Output = LoggedMessage;
    const RESULT_VERB: &'static str = "loggedMessage";
    const SERIAL: bool = true;

    async fn handle(&self, _ctx: &CallContext, message: NewMessage) -> Result<LoggedMessage, HandlerFault> {
        append(&self.0, MessageKind::Private, message).await
    }
}

pub struct GetRecentMessages(pub AppState);

#[async_trait]
impl RequestHandler for GetRecentMessages {
    type Arg = RecentArgs;
    type Output = RecentMessages;
    const RESULT_VERB: &'static str = "gotRecentMessages";

    async fn handle(&self, _ctx: &CallContext, args: RecentArgs) -> Result<RecentMessages, HandlerFault> {
        let log = self.0.host().chat_log().clone();
        let before = args.before.unwrap_or_else(Utc::now);
        let limit = args
            .limit
            .unwrap_or(DEFAULT_RECENT_LIMIT)
            .clamp(1, MAX_RECENT_LIMIT);

        let messages =
            blocking(move || log.recent_before(&args.character, &args.target, before, limit))
                .await?;
        Ok(RecentMessages { messages })
    }
}
