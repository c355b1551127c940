//! Chat log database maintenance

use async_trait::async_trait;
use parley_channel::{CallContext, Empty, HandlerFault, RequestHandler};
use serde::Serialize;

use super::blocking;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DatabaseSize {
    pub bytes: u64,
}

pub struct GetDatabaseSize(pub AppState);

#[async_trait]
impl RequestHandler for GetDatabaseSize {
    type Arg = Empty;
    type Output = DatabaseSize;
    const RESULT_VERB: &'static str = "gotDatabaseSize";

    async fn handle(&self, _ctx: &CallContext, _arg: Empty) -> Result<DatabaseSize, HandlerFault> {
        let log = self.0.host().chat_log().clone();
        let bytes = blocking(move || log.size_bytes()).await?;
        Ok(DatabaseSize { bytes })
    }
}

pub struct VacuumDatabase(pub AppState);

#[async_trait]
impl RequestHandler for VacuumDatabase {
    type Arg = Empty;
    type Output = DatabaseSize;
    const RESULT_VERB: &'static str = "vacuumedDatabase";
    const SERIAL: bool = true;

    async fn handle(&self, _ctx: &CallContext, _arg: Empty) -> Result<DatabaseSize, HandlerFault> {
        let log = self.0.host().chat_log().clone();
        let bytes = blocking(move || log.vacuum()).await?;
        tracing::info!(bytes, "Vacuumed chat log");
        Ok(DatabaseSize { bytes })
    }
}

/// Deletes every logged message
pub struct ClearDatabase(pub AppState);

#[async_trait]
impl RequestHandler for ClearDatabase {
    type Arg = Empty;
    type Output = DatabaseSize;
    const RESULT_VERB: &'static str = "clearedDatabase";
    const SERIAL: bool = true;

    async fn handle(&self, _ctx: &CallContext, _arg: Empty) -> Result<DatabaseSize, HandlerFault> {
        let log = self.0.host().chat_log().clone();
        let bytes = blocking(move || log.clear()).await?;
        tracing::info!(bytes, "Cleared chat log");
        Ok(DatabaseSize { bytes })
    }
}
