//! Writer task for the outbound half of a transport.
//!
//! Single writer consuming the channel's outbound queue, so messages reach
//! the transport in the order `send()` was called.
//!
//! # Shutdown
//!
//! - Stop signal: drain every message already queued, then release the transport
//! - All senders dropped: release the transport
//! - Write error: the transport is broken; release it immediately
//!
//! In every case the channel transitions to `Closed` once the writer exits.

use std::sync::Arc;

use log::{debug, trace, warn};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::ChannelShared;
use crate::protocol::{Message, write_frame};

/// Handle to a running Writer Task.
pub(super) struct WriterTaskHandle {
    _join_handle: JoinHandle<()>,
}

/// Spawn a writer task draining `rx` into `writer`.
pub(super) fn spawn_writer_task<W>(
    writer: W,
    rx: mpsc::UnboundedReceiver<Message>,
    shared: Arc<ChannelShared>,
) -> WriterTaskHandle
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let join_handle = tokio::spawn(async move {
        writer_loop(writer, rx, &shared).await;
        shared.writer_exited();
    });
    WriterTaskHandle {
        _join_handle: join_handle,
    }
}

async fn writer_loop<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<Message>,
    shared: &ChannelShared,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;

            _ = shared.stop_writer.cancelled() => {
                debug!(target: "taskbridge::channel::writer", "Writer stopping, draining queue");
                while let Ok(message) = rx.try_recv() {
                    if let Err(e) = write_message(&mut writer, &message).await {
                        warn!(
                            target: "taskbridge::channel::writer",
                            "Write error during drain: {}",
                            e
                        );
                        return;
                    }
                }
                break;
            }

            message = rx.recv() => {
                match message {
                    Some(message) => {
                        if let Err(e) = write_message(&mut writer, &message).await {
                            warn!(
                                target: "taskbridge::channel::writer",
                                "Write error: {}, closing channel",
                                e
                            );
                            return;
                        }
                    }
                    None => {
                        debug!(target: "taskbridge::channel::writer", "All senders dropped");
                        break;
                    }
                }
            }
        }
    }

    // Signal EOF to the peer; failure here only means it is already gone.
    if let Err(e) = writer.shutdown().await {
        debug!(
            target: "taskbridge::channel::writer",
            "Transport shutdown error: {}",
            e
        );
    }
}

async fn write_message<W>(writer: &mut W, message: &Message) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    trace!(
        target: "taskbridge::channel::writer",
        "Sending {:?} {}",
        message.tag(),
        message.id()
    );
    write_frame(writer, &message.to_json()).await
}
