//! Parley host
//!
//! Serves the chat client's command channel: every client connection gets
//! its own streaming coordinator and disposable registry, while the router
//! and its serial gates are shared by the whole process.

pub mod collaborators;
pub mod commands;
pub mod import;
mod state;

pub use state::AppState;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parley_channel::{serve_connection, Router, ServeOptions};
use parley_core::{Config, Host};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const CONNECTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Router with every host command registered
pub fn build_router(state: &AppState) -> parley_channel::Result<Router> {
    commands::register(Router::builder(), state).build()
}

/// Accept clients on `listener` until `shutdown` fires, then wait (bounded)
/// for open connections to wind down.
pub async fn serve(
    listener: TcpListener,
    router: Arc<Router>,
    options: ServeOptions,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        continue;
                    }
                };

                let (reader, writer) = stream.into_split();
                let router = Arc::clone(&router);
                let shutdown = shutdown.clone();
                connections.spawn(async move {
                    if let Err(e) = serve_connection(router, reader, writer, options, shutdown).await {
                        tracing::warn!(%peer, error = %e, "Connection closed with error");
                    }
                });
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    tracing::info!(open = connections.len(), "Shutting down");
    let drain = async { while connections.join_next().await.is_some() {} };
    if tokio::time::timeout(CONNECTION_DRAIN_TIMEOUT, drain).await.is_err() {
        connections.abort_all();
    }
    Ok(())
}

/// Open host state, bind the configured address and serve until Ctrl-C
pub async fn run(config: Config) -> anyhow::Result<()> {
    let host = Host::open(config.clone()).context("Failed to open host state")?;
    let state = AppState::new(host);
    let router = Arc::new(build_router(&state)?);

    let listener = TcpListener::bind(&config.listen_address)
        .await
        .with_context(|| format!("Failed to listen on {}", config.listen_address))?;
    tracing::info!(address = %listener.local_addr()?, "Command channel listening");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested");
                signal.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "Cannot listen for shutdown signal"),
        }
    });

    let options = ServeOptions {
        max_frame_bytes: config.max_frame_bytes,
        ..ServeOptions::default()
    };
    serve(listener, router, options, shutdown).await
}
