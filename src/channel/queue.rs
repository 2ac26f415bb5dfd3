//! Single-consumer async queue.
//!
//! Bridges push-style delivery (a reader task that receives messages whenever
//! they arrive) to one pull-based reader that suspends while the queue is
//! empty. Closing the queue lets the consumer drain what is buffered and then
//! observe end-of-stream.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::error::LockResultExt;

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

struct QueueInner<T> {
    state: Mutex<QueueState<T>>,
    /// Permit-based wakeup for the single consumer
    notify: Notify,
    consumer_taken: AtomicBool,
}

/// Producer side of the queue. Cheap to clone; all clones feed the same consumer.
pub struct AsyncQueue<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T> Clone for AsyncQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for AsyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AsyncQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    items: VecDeque::new(),
                    closed: false,
                }),
                notify: Notify::new(),
                consumer_taken: AtomicBool::new(false),
            }),
        }
    }

    /// Create a queue together with its only consumer.
    pub fn with_consumer() -> (Self, QueueConsumer<T>) {
        let queue = Self::new();
        queue.inner.consumer_taken.store(true, Ordering::Release);
        let consumer = QueueConsumer {
            inner: Arc::clone(&queue.inner),
        };
        (queue, consumer)
    }

    /// Append one item, waking the consumer.
    ///
    /// Returns `false` (and drops the item) if the queue is already closed.
    pub fn push(&self, item: T) -> bool {
        self.push_all(std::iter::once(item)) == 1
    }

    /// Append several items, waking the consumer once.
    ///
    /// Returns how many items were accepted (0 once closed).
    pub fn push_all(&self, items: impl IntoIterator<Item = T>) -> usize {
        let accepted = {
            let mut state = self.inner.state.lock().recover_poison("AsyncQueue::push_all");
            if state.closed {
                return 0;
            }
            let before = state.items.len();
            state.items.extend(items);
            state.items.len() - before
        };
        if accepted > 0 {
            self.inner.notify.notify_one();
        }
        accepted
    }

    /// Mark that no more items will be pushed. Idempotent.
    pub fn close(&self) {
        {
            let mut state = self.inner.state.lock().recover_poison("AsyncQueue::close");
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.inner.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().recover_poison("AsyncQueue::is_closed").closed
    }

    /// Number of buffered items.
    pub fn len(&self) -> usize {
        self.inner.state.lock().recover_poison("AsyncQueue::len").items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a consumer has been handed out and is still alive.
    ///
    /// Producers whose output is optional can skip pushing when nobody reads.
    pub fn has_consumer(&self) -> bool {
        self.inner.consumer_taken.load(Ordering::Acquire) && !self.is_closed()
    }

    /// Take the consumer half.
    ///
    /// Only one consumer exists per queue; later calls return `None`.
    pub fn consumer(&self) -> Option<QueueConsumer<T>> {
        if self.inner.consumer_taken.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(QueueConsumer {
            inner: Arc::clone(&self.inner),
        })
    }
}

/// Consumer half of an [`AsyncQueue`].
pub struct QueueConsumer<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T> QueueConsumer<T> {
    /// Next item, suspending while the queue is empty and open.
    ///
    /// Returns `None` once the queue is closed and fully drained.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            {
                let mut state = self.inner.state.lock().recover_poison("QueueConsumer::next");
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            self.inner.notify.notified().await;
        }
    }

}

impl<T> Drop for QueueConsumer<T> {
    /// Nobody can read the queue any more: refuse further pushes and release
    /// what is buffered.
    fn drop(&mut self) {
        let mut state = self.inner.state.lock().recover_poison("QueueConsumer::drop");
        state.closed = true;
        state.items.clear();
    }
}
