//! Connection serving
//!
//! Newline-delimited frames in, newline-delimited frames out. A single writer
//! task owns the output half; everything else enqueues whole frames through
//! the connection's [`FrameSink`].

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parley_protocol::{CommandEnvelope, Frame, ProtocolError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use crate::connection::{FrameSink, DEFAULT_OUTBOUND_FRAMES};
use crate::error::ChannelError;
use crate::router::Router;
use crate::Result;

/// Default upper bound on a single inbound or outbound frame
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
pub struct ServeOptions {
    pub max_frame_bytes: usize,
    /// Frames queued for the writer before senders have to wait
    pub outbound_frames: usize,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            outbound_frames: DEFAULT_OUTBOUND_FRAMES,
        }
    }
}

/// Serve one client until it disconnects, the transport faults, or
/// `shutdown` fires. Connection-scoped state is torn down before returning.
pub async fn serve_connection<R, W>(
    router: Arc<Router>,
    reader: R,
    writer: W,
    options: ServeOptions,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut reader = FramedRead::new(reader, LinesCodec::new_with_max_length(options.max_frame_bytes));
    let mut writer = FramedWrite::new(writer, LinesCodec::new_with_max_length(options.max_frame_bytes));

    let (sink, mut out_rx) = FrameSink::with_capacity(options.outbound_frames);
    let connection = router.connect(sink, shutdown.child_token());
    let connection_id = connection.id();

    tracing::info!(connection = %connection_id, "Client connected");

    let mut writer_task = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if let Err(e) = writer.send(frame.into_string()).await {
                tracing::warn!(connection = %connection_id, error = %e, "Frame write failed");
                break;
            }
        }
    });

    let outcome = loop {
        let next = tokio::select! {
            biased;
            _ = connection.cancellation().cancelled() => break Ok(()),
            next = reader.next() => next,
        };

        let line = match next {
            Some(Ok(line)) => line,
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                tracing::warn!(connection = %connection_id, limit = options.max_frame_bytes, "Frame too large, closing");
                break Err(ChannelError::Protocol(ProtocolError::FrameTooLarge(
                    options.max_frame_bytes,
                )));
            }
            Some(Err(LinesCodecError::Io(e))) => {
                tracing::warn!(connection = %connection_id, error = %e, "Read failed");
                break Err(ChannelError::Io(e));
            }
            None => break Ok(()),
        };

        if line.trim().is_empty() {
            continue;
        }

        match CommandEnvelope::decode(&line) {
            Ok(envelope) => {
                router.route(&connection, envelope);
            }
            Err(e) => {
                tracing::debug!(connection = %connection_id, error = %e, "Undecodable frame");
                let verb = line.split_whitespace().next().unwrap_or_default();
                let error = ChannelError::Protocol(e);
                if let Err(e) = connection
                    .sink()
                    .try_send(Frame::command_error(verb, error.kind(), &error))
                {
                    tracing::debug!(connection = %connection_id, error = %e, "Error frame dropped");
                }
            }
        }
    };

    connection.teardown();
    // Handler tasks may still hold clones of the sink; bounded wait for
    // whatever is already queued.
    drop(connection);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer_task).await.is_err() {
        writer_task.abort();
    }

    tracing::info!(connection = %connection_id, "Client disconnected");
    outcome
}
