//! Locale commands

use async_trait::async_trait;
use parley_channel::{CallContext, Empty, HandlerFault, RequestHandler};
use serde::Serialize;

use super::fault;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct LocaleList {
    pub locales: Vec<String>,
}

pub struct GetLocaleList(pub AppState);

#[async_trait]
impl RequestHandler for GetLocaleList {
    type Arg = Empty;
    type Output = LocaleList;
    const RESULT_VERB: &'static str = "gotLocales";

    async fn handle(&self, _ctx: &CallContext, _arg: Empty) -> Result<LocaleList, HandlerFault> {
        let locales = self.0.locales().list().await.map_err(fault)?;
        Ok(LocaleList { locales })
    }
}
