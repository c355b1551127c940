//! `LogImport.` namespace
//!
//! `LogImport.beginImport {"source": "<dir>"}` starts the import wizard.
//! While a step is outstanding the client answers with `submitStep` or
//! `cancel`, which the stream coordinator intercepts before routing.

use std::path::PathBuf;

use async_trait::async_trait;
use parley_channel::{CallContext, HandlerFault, NamespaceHandler};
use serde::Deserialize;
use serde_json::Value;

use crate::import::{LogImport, IMPORT_VERBS};
use crate::state::AppState;

pub const NAMESPACE: &str = "LogImport.";

#[derive(Debug, Deserialize)]
struct BeginArgs {
    source: PathBuf,
}

pub struct LogImportCommands(pub AppState);

#[async_trait]
impl NamespaceHandler for LogImportCommands {
    async fn handle(&self, ctx: &CallContext, verb: &str, payload: Option<Value>) -> Result<(), HandlerFault> {
        if !verb.eq_ignore_ascii_case("beginImport") {
            return Err(HandlerFault::new(format!("Unknown import command: {verb}")));
        }

        let args: BeginArgs = ctx.decode(payload)?;
        tracing::info!(source = %args.source.display(), "Starting log import");

        let workflow = LogImport::new(args.source, self.0.host().chat_log().clone());
        ctx.streams().begin(
            NAMESPACE,
            IMPORT_VERBS,
            workflow,
            ctx.sink().clone(),
            ctx.cancellation(),
        )?;
        Ok(())
    }
}
