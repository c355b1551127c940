//! Idle and update monitors
//!
//! Each monitor is a named registration in the connection's disposable
//! registry. While registered it pushes `<kind>StateChanged {name, state}`
//! whenever the observed state changes.

use async_trait::async_trait;
use parley_channel::{CallContext, HandlerFault, RequestHandler};
use serde::{Deserialize, Serialize};

use super::forward_changes;
use crate::collaborators::StateMonitor;

#[derive(Debug, Clone, Copy)]
pub struct MonitorKind {
    key_prefix: &'static str,
    push_verb: &'static str,
}

impl MonitorKind {
    fn key(&self, name: &str) -> String {
        format!("{}:{}", self.key_prefix, name)
    }
}

pub const IDLE: MonitorKind = MonitorKind {
    key_prefix: "idle",
    push_verb: "idleStateChanged",
};

pub const UPDATE: MonitorKind = MonitorKind {
    key_prefix: "update",
    push_verb: "updateStateChanged",
};

#[derive(Debug, Deserialize)]
pub struct MonitorArgs {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct AddedMonitor {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct RemovedMonitor {
    pub name: String,
    pub removed: bool,
}

#[derive(Serialize)]
struct StateChanged<T> {
    name: String,
    state: T,
}

pub struct AddMonitor<T> {
    monitor: StateMonitor<T>,
    kind: MonitorKind,
}

impl<T> AddMonitor<T> {
    pub fn new(monitor: StateMonitor<T>, kind: MonitorKind) -> Self {
        Self { monitor, kind }
    }
}

#[async_trait]
impl<T> RequestHandler for AddMonitor<T>
where
    T: Clone + Serialize + Send + Sync + 'static,
{
    type Arg = MonitorArgs;
    type Output = AddedMonitor;
    const RESULT_VERB: &'static str = "addedMonitor";

    async fn handle(&self, ctx: &CallContext, args: MonitorArgs) -> Result<AddedMonitor, HandlerFault> {
        if args.name.trim().is_empty() {
            return Err(HandlerFault::new("Monitor name must not be empty"));
        }

        let stop = ctx.cancellation().child_token();
        // Register before starting, so a duplicate name never starts a second watcher
        let release = stop.clone();
        ctx.disposables()
            .add(self.kind.key(&args.name), move || release.cancel())?;

        let name = args.name.clone();
        forward_changes(
            ctx.sink().clone(),
            self.monitor.subscribe(),
            self.kind.push_verb,
            stop,
            move |state| StateChanged {
                name: name.clone(),
                state,
            },
        );

        tracing::debug!(monitor = %args.name, kind = self.kind.key_prefix, "Monitor added");
        Ok(AddedMonitor { name: args.name })
    }
}

pub struct RemoveMonitor(pub MonitorKind);

#[async_trait]
impl RequestHandler for RemoveMonitor {
    type Arg = MonitorArgs;
    type Output = RemovedMonitor;
    const RESULT_VERB: &'static str = "removedMonitor";

    async fn handle(&self, ctx: &CallContext, args: MonitorArgs) -> Result<RemovedMonitor, HandlerFault> {
        let removed = ctx.disposables().remove(&self.0.key(&args.name));
        Ok(RemovedMonitor {
            name: args.name,
            removed,
        })
    }
}
