//! FIFO queue with a blocking pop and idempotent close.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

/// Backing storage above this many slots is released once the queue drains.
const COMPACT_THRESHOLD: usize = 1024;

/// Why a non-blocking push did not enqueue the item.
#[derive(Debug, PartialEq, Eq)]
pub enum PushError<T> {
    /// The queue is at capacity.
    Full(T),
    /// The queue was closed.
    Closed(T),
}

impl<T> PushError<T> {
    /// Recover the rejected item.
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(item) | PushError::Closed(item) => item,
        }
    }
}

/// A FIFO queue shared between producers and async consumers.
///
/// [`pop`](Queue::pop) waits until an item is available or the queue is
/// closed; it returns `None` only when the queue is closed **and** empty, so
/// items pushed before [`close`](Queue::close) are still drained.
///
/// An unbounded queue (see [`Queue::new`]) carries raw process events to the
/// dispatch task. A bounded queue (see [`Queue::bounded`]) backs each
/// subscriber inbox, where the policy picks between [`try_push`],
/// [`push_evicting`] and [`push_wait`].
///
/// [`try_push`]: Queue::try_push
/// [`push_evicting`]: Queue::push_evicting
/// [`push_wait`]: Queue::push_wait
#[derive(Debug)]
pub struct Queue<T> {
    state: Mutex<QueueState<T>>,
    capacity: Option<usize>,
    /// Signalled when an item is pushed or the queue closes.
    readable: Notify,
    /// Signalled when an item is popped or the queue closes.
    writable: Notify,
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> QueueState<T> {
    fn pop_front(&mut self) -> Option<T> {
        let item = self.items.pop_front();
        if self.items.is_empty() && self.items.capacity() > COMPACT_THRESHOLD {
            self.items.shrink_to(COMPACT_THRESHOLD);
        }
        item
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T> {
    /// Create an unbounded queue.
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// Create a queue that holds at most `capacity` items.
    ///
    /// A capacity of zero is treated as one.
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity.max(1)))
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            capacity,
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_full(&self, state: &QueueState<T>) -> bool {
        self.capacity.is_some_and(|cap| state.items.len() >= cap)
    }

    /// Append an item, ignoring capacity.
    ///
    /// Returns `false` if the queue is already closed; the item is discarded.
    pub fn push(&self, item: T) -> bool {
        {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            state.items.push_back(item);
        }
        self.readable.notify_one();
        true
    }

    /// Append an item if there is room.
    pub fn try_push(&self, item: T) -> Result<(), PushError<T>> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(PushError::Closed(item));
            }
            if self.is_full(&state) {
                return Err(PushError::Full(item));
            }
            state.items.push_back(item);
        }
        self.readable.notify_one();
        Ok(())
    }

    /// Append an item, evicting the oldest items to make room.
    ///
    /// Returns the first evicted item, if any. Never waits.
    pub fn push_evicting(&self, item: T) -> Result<Option<T>, PushError<T>> {
        let evicted = {
            let mut state = self.lock();
            if state.closed {
                return Err(PushError::Closed(item));
            }
            let mut evicted = None;
            while self.is_full(&state) {
                match state.pop_front() {
                    Some(old) => {
                        evicted.get_or_insert(old);
                    }
                    None => break,
                }
            }
            state.items.push_back(item);
            evicted
        };
        self.readable.notify_one();
        Ok(evicted)
    }

    /// Append an item, waiting for room.
    ///
    /// Returns `false` if the queue closes before the item could be added.
    pub async fn push_wait(&self, item: T) -> bool {
        let mut item = Some(item);
        loop {
            let writable = self.writable.notified();
            tokio::pin!(writable);
            writable.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return false;
                }
                if !self.is_full(&state) {
                    if let Some(item) = item.take() {
                        state.items.push_back(item);
                    }
                    drop(state);
                    self.readable.notify_one();
                    return true;
                }
            }

            writable.await;
        }
    }

    /// Remove the oldest item, waiting until one is available.
    ///
    /// Returns `None` once the queue is closed and fully drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let readable = self.readable.notified();
            tokio::pin!(readable);
            readable.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(item) = state.pop_front() {
                    drop(state);
                    self.writable.notify_one();
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }

            readable.await;
        }
    }

    /// Remove the oldest item without waiting.
    pub fn try_pop(&self) -> Option<T> {
        let item = self.lock().pop_front();
        if item.is_some() {
            self.writable.notify_one();
        }
        item
    }

    /// Close the queue.
    ///
    /// Idempotent. Wakes every waiting consumer and producer; later pushes fail.
    pub fn close(&self) {
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.readable.notify_waiters();
        self.writable.notify_waiters();
    }

    /// Whether [`close`](Queue::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of buffered items.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Whether no items are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
