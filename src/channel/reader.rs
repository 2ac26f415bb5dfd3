//! Reader task for the inbound half of a transport.
//!
//! The Reader Task:
//! - Runs in a spawned tokio task
//! - Reads `Content-Length` frames and decodes them into messages
//! - Pushes messages into the channel's inbound queue in arrival order
//! - Skips frames that do not decode to a message
//! - Shuts down on EOF, read error, or the stop signal

use std::sync::Arc;

use log::{debug, trace, warn};
use tokio::io::{AsyncRead, BufReader};
use tokio::task::JoinHandle;

use super::ChannelShared;
use crate::protocol::{Message, read_frame};

/// Handle to a running Reader Task.
///
/// The task is stopped through the shared stop token; the join handle is held
/// so the task stays associated with its channel.
pub(super) struct ReaderTaskHandle {
    _join_handle: JoinHandle<()>,
}

/// Spawn a reader task feeding `shared.inbound`.
pub(super) fn spawn_reader_task<R>(reader: R, shared: Arc<ChannelShared>) -> ReaderTaskHandle
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let join_handle = tokio::spawn(reader_loop(reader, shared));
    ReaderTaskHandle {
        _join_handle: join_handle,
    }
}

async fn reader_loop<R>(reader: R, shared: Arc<ChannelShared>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    loop {
        tokio::select! {
            biased;

            _ = shared.stop_reader.cancelled() => {
                debug!(target: "taskbridge::channel::reader", "Reader stopped");
                return;
            }

            frame = read_frame(&mut reader) => {
                match frame {
                    Ok(Some(body)) => {
                        if let Some(message) = decode(&body) {
                            trace!(
                                target: "taskbridge::channel::reader",
                                "Received {:?} {}",
                                message.tag(),
                                message.id()
                            );
                            shared.inbound.push(message);
                        }
                    }
                    Ok(None) => {
                        debug!(target: "taskbridge::channel::reader", "Transport reached EOF");
                        break;
                    }
                    Err(e) => {
                        warn!(
                            target: "taskbridge::channel::reader",
                            "Transport read error: {}, closing channel",
                            e
                        );
                        break;
                    }
                }
            }
        }
    }
    shared.remote_hung_up();
}

/// Decode one frame body, logging and discarding anything malformed.
fn decode(body: &[u8]) -> Option<Message> {
    let value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            warn!(
                target: "taskbridge::channel::reader",
                "Skipping frame with invalid JSON: {}",
                e
            );
            return None;
        }
    };
    match Message::from_json(value) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!(target: "taskbridge::channel::reader", "Skipping frame: {}", e);
            None
        }
    }
}
