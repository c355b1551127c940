//! Command handlers
//!
//! These handlers bridge the UI's command channel to the host services.

pub mod database;
pub mod files;
pub mod import;
pub mod locale;
pub mod logs;
pub mod monitors;
pub mod settings;
pub mod values;
pub mod window;

use parley_channel::{ChannelError, FrameSink, HandlerFault, RouterBuilder};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// Add every host command to `builder`
pub fn register(builder: RouterBuilder, state: &AppState) -> RouterBuilder {
    builder
        .request("GetLocaleList", locale::GetLocaleList(state.clone()))
        .request("GetSettings", settings::GetSettings(state.clone()))
        .request("UpdateSettings", settings::UpdateSettings(state.clone()))
        .request("GetValue", values::GetValue(state.clone()))
        .request("CheckoutValue", values::CheckoutValue(state.clone()))
        .request("SaveValue", values::SaveValue(state.clone()))
        .request("LogChannelMessage", logs::LogChannelMessage(state.clone()))
        .request("LogPrivateMessage", logs::LogPrivateMessage(state.clone()))
        .request("GetRecentMessages", logs::GetRecentMessages(state.clone()))
        .request("GetDatabaseSize", database::GetDatabaseSize(state.clone()))
        .request("VacuumDatabase", database::VacuumDatabase(state.clone()))
        .request("ClearDatabase", database::ClearDatabase(state.clone()))
        .request("SelectFile", files::SelectFile(state.clone()))
        .request(
            "AddIdleMonitor",
            monitors::AddMonitor::new(state.idle().clone(), monitors::IDLE),
        )
        .request("RemoveIdleMonitor", monitors::RemoveMonitor(monitors::IDLE))
        .request(
            "AddUpdateMonitor",
            monitors::AddMonitor::new(state.updates().clone(), monitors::UPDATE),
        )
        .request("RemoveUpdateMonitor", monitors::RemoveMonitor(monitors::UPDATE))
        .namespace(window::NAMESPACE, window::WindowCommands(state.clone()))
        .namespace(import::NAMESPACE, import::LogImportCommands(state.clone()))
}

/// Run blocking storage or filesystem work off the async workers
pub(crate) async fn blocking<F, T, E>(work: F) -> Result<T, HandlerFault>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    Ok(tokio::task::spawn_blocking(work).await??)
}

/// Like [`blocking`], for filesystem work reported through `anyhow`
pub(crate) async fn blocking_fs<F, T>(work: F) -> Result<T, HandlerFault>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?.map_err(fault)
}

/// Collaborator failures carry their whole context chain
pub(crate) fn fault(error: anyhow::Error) -> HandlerFault {
    HandlerFault::new(format!("{error:#}"))
}

/// Push `verb <render(value)>` every time `rx` changes, until `stop` fires or
/// the connection goes away. Never waits on the outbound queue.
pub(crate) fn forward_changes<T, P, F>(
    sink: FrameSink,
    mut rx: watch::Receiver<T>,
    verb: &'static str,
    stop: CancellationToken,
    render: F,
) where
    T: Clone + Send + Sync + 'static,
    P: Serialize + Send,
    F: Fn(T) -> P + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let value = rx.borrow_and_update().clone();
                    match sink.try_send_payload(verb, &render(value)) {
                        Ok(()) => {}
                        // A client that stops reading misses intermediate
                        // states; the next change carries the current one.
                        Err(ChannelError::Backpressure) => {
                            tracing::warn!(verb, "Outbound queue full, change dropped");
                        }
                        Err(_) => break,
                    }
                }
            }
        }
        tracing::debug!(verb, "Stopped forwarding changes");
    });
}
