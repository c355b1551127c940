//! Settings commands

use async_trait::async_trait;
use parley_channel::{CallContext, Empty, HandlerFault, RequestHandler};
use parley_core::AppSettings;
use serde_json::Value;

use super::blocking;
use crate::state::AppState;

pub struct GetSettings(pub AppState);

#[async_trait]
impl RequestHandler for GetSettings {
    type Arg = Empty;
    type Output = AppSettings;
    const RESULT_VERB: &'static str = "gotSettings";

    async fn handle(&self, _ctx: &CallContext, _arg: Empty) -> Result<AppSettings, HandlerFault> {
        let settings = self.0.host().settings().clone();
        blocking(move || settings.get()).await
    }
}

/// Payload is a JSON merge patch over the settings document
pub struct UpdateSettings(pub AppState);

#[async_trait]
impl RequestHandler for UpdateSettings {
    type Arg = Value;
    type Output = AppSettings;
    const RESULT_VERB: &'static str = "settingsUpdated";
    const SERIAL: bool = true;

    async fn handle(&self, _ctx: &CallContext, patch: Value) -> Result<AppSettings, HandlerFault> {
        let settings = self.0.host().settings().clone();
        blocking(move || settings.update(&patch)).await
    }
}
