//! `Window.` namespace
//!
//! Fire-and-observe: each command writes its own `windowState`,
//! `zoomChanged` or `stylesheetChanged` frame.

use async_trait::async_trait;
use parley_channel::{CallContext, HandlerFault, NamespaceHandler};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{fault, forward_changes};
use crate::collaborators::WindowState;
use crate::state::AppState;

pub const NAMESPACE: &str = "Window.";

const STYLESHEET_KEY: &str = "window:stylesheet";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WindowStatus {
    state: WindowState,
    #[serde(skip_serializing_if = "Option::is_none")]
    dev_tools: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ZoomArgs {
    level: f64,
}

#[derive(Debug, Serialize)]
struct Zoom {
    level: f64,
}

#[derive(Serialize)]
struct Stylesheet {
    stylesheet: String,
}

pub struct WindowCommands(pub AppState);

impl WindowCommands {
    async fn send_state(&self, ctx: &CallContext, state: WindowState, dev_tools: Option<bool>) -> Result<(), HandlerFault> {
        ctx.send_payload("windowState", &WindowStatus { state, dev_tools }).await?;
        Ok(())
    }

    fn watch_stylesheet(&self, ctx: &CallContext) -> Result<(), HandlerFault> {
        let stop = ctx.cancellation().child_token();
        let release = stop.clone();
        ctx.disposables().add(STYLESHEET_KEY, move || release.cancel())?;

        forward_changes(
            ctx.sink().clone(),
            self.0.window().stylesheet(),
            "stylesheetChanged",
            stop,
            |stylesheet| Stylesheet { stylesheet },
        );
        Ok(())
    }
}

#[async_trait]
impl NamespaceHandler for WindowCommands {
    async fn handle(&self, ctx: &CallContext, verb: &str, payload: Option<Value>) -> Result<(), HandlerFault> {
        let window = self.0.window();

        match verb.to_ascii_lowercase().as_str() {
            "minimize" => self.send_state(ctx, window.minimize().map_err(fault)?, None).await,
            "maximize" => self.send_state(ctx, window.maximize().map_err(fault)?, None).await,
            "restore" => self.send_state(ctx, window.restore().map_err(fault)?, None).await,
            "close" => self.send_state(ctx, window.close().map_err(fault)?, None).await,
            "toggledevtools" => {
                let open = window.toggle_dev_tools().map_err(fault)?;
                self.send_state(ctx, window.state(), Some(open)).await
            }
            "getzoom" => {
                ctx.send_payload("zoomChanged", &Zoom { level: window.zoom() }).await?;
                Ok(())
            }
            "setzoom" => {
                let args: ZoomArgs = ctx.decode(payload)?;
                let level = window.set_zoom(args.level).map_err(fault)?;
                ctx.send_payload("zoomChanged", &Zoom { level }).await?;
                Ok(())
            }
            "watchstylesheet" => self.watch_stylesheet(ctx),
            "unwatchstylesheet" => {
                ctx.disposables().remove(STYLESHEET_KEY);
                Ok(())
            }
            _ => Err(HandlerFault::new(format!("Unknown window command: {verb}"))),
        }
    }
}
