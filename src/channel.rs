//! Message channel over a duplex byte transport.
//!
//! A `MessageChannel` owns one transport endpoint (a child's pipes, the
//! process's own stdio, or an in-memory duplex) and turns it into:
//! - `send()`: enqueue one message; never blocks, never fails directly
//! - `receive()`: pull incoming messages in arrival order until the channel closes
//! - `close()`: idempotent shutdown that drains queued outbound messages first
//!
//! # Module Structure
//!
//! - `queue` - single-consumer async queue fed by the reader task
//! - `reader` - background task decoding inbound frames into the queue
//! - `writer` - background task writing outbound messages in FIFO order

pub mod queue;
mod reader;
mod writer;

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Child;
use tokio::sync::{Mutex, MutexGuard, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::protocol::Message;
use queue::{AsyncQueue, QueueConsumer};
use reader::{ReaderTaskHandle, spawn_reader_task};
use writer::{WriterTaskHandle, spawn_writer_task};

/// Buffer size of each direction of an in-memory channel pair.
const PAIR_BUFFER_BYTES: usize = 64 * 1024;

/// Lifecycle of a channel.
///
/// Transitions are monotonic:
/// - Open -> Closing (on `close()`)
/// - Closing -> Closed (once queued outbound messages are written)
/// - Open -> Closed (transport disconnected)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChannelState {
    /// Transport connected
    Open,
    /// Close requested, outbound queue draining
    Closing,
    /// No further send/receive (terminal state)
    Closed,
}

/// State shared between the channel and its reader/writer tasks.
pub(crate) struct ChannelShared {
    state: watch::Sender<ChannelState>,
    inbound: AsyncQueue<Message>,
    /// Graceful writer stop: drain queued messages, then exit
    stop_writer: CancellationToken,
    stop_reader: CancellationToken,
}

impl ChannelShared {
    fn new(inbound: AsyncQueue<Message>) -> Self {
        let (state, _) = watch::channel(ChannelState::Open);
        Self {
            state,
            inbound,
            stop_writer: CancellationToken::new(),
            stop_reader: CancellationToken::new(),
        }
    }

    pub(crate) fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Advance the lifecycle state. Returns `true` if the state changed.
    pub(crate) fn advance(&self, to: ChannelState) -> bool {
        self.state.send_if_modified(|state| {
            if to > *state {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// The remote side stopped sending: stop accepting inbound messages and
    /// let the writer flush and exit.
    pub(crate) fn remote_hung_up(&self) {
        self.inbound.close();
        self.stop_writer.cancel();
    }

    /// The writer has exited: the transport is no longer usable.
    pub(crate) fn writer_exited(&self) {
        self.stop_reader.cancel();
        self.inbound.close();
        self.advance(ChannelState::Closed);
    }
}

/// Duplex message channel owning one transport endpoint.
pub struct MessageChannel {
    shared: Arc<ChannelShared>,
    outbound: mpsc::UnboundedSender<Message>,
    consumer: Mutex<QueueConsumer<Message>>,
    _reader: ReaderTaskHandle,
    _writer: WriterTaskHandle,
}

impl std::fmt::Debug for MessageChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageChannel")
            .field("state", &self.state())
            .field("buffered", &self.shared.inbound.len())
            .finish()
    }
}

impl MessageChannel {
    /// Create a channel over a reader/writer pair.
    ///
    /// Spawns the reader and writer tasks, so this must be called from within
    /// a tokio runtime.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (inbound, consumer) = AsyncQueue::with_consumer();
        let shared = Arc::new(ChannelShared::new(inbound));
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        let reader = spawn_reader_task(reader, Arc::clone(&shared));
        let writer = spawn_writer_task(writer, outbound_rx, Arc::clone(&shared));

        Self {
            shared,
            outbound,
            consumer: Mutex::new(consumer),
            _reader: reader,
            _writer: writer,
        }
    }

    /// Two channels connected back to back in memory.
    ///
    /// Messages sent on one are received by the other, with the same framing
    /// and lifecycle as a process pipe.
    pub fn pair() -> (Self, Self) {
        let (left, right) = tokio::io::duplex(PAIR_BUFFER_BYTES);
        let (left_read, left_write) = tokio::io::split(left);
        let (right_read, right_write) = tokio::io::split(right);
        (
            Self::new(left_read, left_write),
            Self::new(right_read, right_write),
        )
    }

    /// Channel over this process's stdin/stdout (worker side).
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Channel over a spawned child's piped stdout/stdin.
    ///
    /// Takes ownership of both pipes; fails if either was not piped.
    pub fn for_child(child: &mut Child) -> io::Result<Self> {
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("child stdin is not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("child stdout is not piped"))?;
        Ok(Self::new(stdout, stdin))
    }

    /// Enqueue a message for delivery.
    ///
    /// Messages sent after `close()` are dropped; transport failures surface
    /// through the receive side and the channel state.
    pub fn send(&self, message: Message) {
        if !self.is_open() {
            log::debug!(
                target: "taskbridge::channel",
                "Dropping {:?} {} on {:?} channel",
                message.tag(),
                message.id(),
                self.state()
            );
            return;
        }
        if let Err(mpsc::error::SendError(message)) = self.outbound.send(message) {
            log::debug!(
                target: "taskbridge::channel",
                "Writer gone, dropping {:?} {}",
                message.tag(),
                message.id()
            );
        }
    }

    /// Incoming messages, oldest first.
    ///
    /// Only one stream exists at a time; dropping it and calling `receive()`
    /// again resumes from the current position. The stream ends once the
    /// channel is closed and every buffered message has been consumed.
    pub async fn receive(&self) -> MessageStream<'_> {
        MessageStream {
            consumer: self.consumer.lock().await,
        }
    }

    /// Request shutdown. Idempotent.
    ///
    /// Inbound delivery stops immediately, so in-flight `receive()` iteration
    /// ends after draining what is already buffered. Queued outbound messages
    /// are still written before the transport is released.
    pub fn close(&self) {
        if !self.shared.advance(ChannelState::Closing) {
            return;
        }
        log::debug!(target: "taskbridge::channel", "Closing channel");
        self.shared.inbound.close();
        self.shared.stop_reader.cancel();
        self.shared.stop_writer.cancel();
    }

    /// Wait until the channel reaches `Closed`.
    pub async fn closed(&self) {
        let mut state = self.shared.state.subscribe();
        // The sender lives in `self.shared`, so this cannot observe a dropped sender.
        let _ = state.wait_for(|state| *state == ChannelState::Closed).await;
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ChannelState::Closed
    }
}

impl Drop for MessageChannel {
    fn drop(&mut self) {
        self.shared.stop_reader.cancel();
        self.shared.stop_writer.cancel();
    }
}

/// Sequence of incoming messages, borrowed from a [`MessageChannel`].
pub struct MessageStream<'a> {
    consumer: MutexGuard<'a, QueueConsumer<Message>>,
}

impl MessageStream<'_> {
    /// Next message, or `None` once the channel has closed and drained.
    pub async fn next(&mut self) -> Option<Message> {
        self.consumer.next().await
    }
}
