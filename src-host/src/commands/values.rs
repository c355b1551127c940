//! Named value commands
//!
//! `CheckoutValue` hands out the current version; `SaveValue` only succeeds
//! while that version is still current.

use async_trait::async_trait;
use parley_channel::{CallContext, HandlerFault, RequestHandler};
use parley_core::NamedValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::blocking;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct KeyArgs {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveArgs {
    pub key: String,
    #[serde(default)]
    pub value: Value,
    pub version: i64,
}

/// `version` is null when the key was never saved
#[derive(Debug, Serialize)]
pub struct ValueReply {
    pub key: String,
    pub value: Value,
    pub version: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SavedValue {
    pub key: String,
    pub version: i64,
}

pub struct GetValue(pub AppState);

#[async_trait]
impl RequestHandler for GetValue {
    type Arg = KeyArgs;
    type Output = ValueReply;
    const RESULT_VERB: &'static str = "gotValue";

    async fn handle(&self, _ctx: &CallContext, args: KeyArgs) -> Result<ValueReply, HandlerFault> {
        let settings = self.0.host().settings().clone();
        let key = args.key.clone();
        let stored = blocking(move || settings.get_value(&key)).await?;

        Ok(match stored {
            Some(NamedValue { key, value, version }) => ValueReply {
                key,
                value,
                version: Some(version),
            },
            None => ValueReply {
                key: args.key,
                value: Value::Null,
                version: None,
            },
        })
    }
}

pub struct CheckoutValue(pub AppState);

#[async_trait]
impl RequestHandler for CheckoutValue {
    type Arg = KeyArgs;
    type Output = NamedValue;
    const RESULT_VERB: &'static str = "checkedOutValue";

    async fn handle(&self, _ctx: &CallContext, args: KeyArgs) -> Result<NamedValue, HandlerFault> {
        let settings = self.0.host().settings().clone();
        blocking(move || settings.checkout_value(&args.key)).await
    }
}

pub struct SaveValue(pub AppState);

#[async_trait]
impl RequestHandler for SaveValue {
    type Arg = SaveArgs;
    type Output = SavedValue;
    const RESULT_VERB: &'static str = "savedValue";
    const SERIAL: bool = true;

    async fn handle(&self, _ctx: &CallContext, args: SaveArgs) -> Result<SavedValue, HandlerFault> {
        let settings = self.0.host().settings().clone();
        let key = args.key.clone();
        let version =
            blocking(move || settings.save_value(&args.key, &args.value, args.version)).await?;
        Ok(SavedValue { key, version })
    }
}
