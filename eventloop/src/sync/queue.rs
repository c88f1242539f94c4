//! Blocking multi-producer FIFO queue.
//!
//! A `VecDeque` behind one mutex, paired with a condition variable signalled
//! whenever the queue becomes non-empty.
//!
//! # Overview
//!
//! - [`MessageQueue::push`] never blocks and has no capacity bound.
//! - [`MessageQueue::pop_blocking`] suspends the caller while the queue is empty.
//! - [`MessageQueue::drain_and_release`] closes the queue and drops everything
//!   left in it. A closed queue hands pushed items back to the caller and
//!   never suspends a consumer.
//!
//! # Example
//!
//! ```
//! use eventloop::sync::queue::MessageQueue;
//!
//! let queue = MessageQueue::new();
//! queue.push(1).unwrap();
//! queue.push(2).unwrap();
//!
//! assert_eq!(queue.pop_blocking(), Some(1));
//! assert_eq!(queue.drain_and_release(), 1);
//! assert_eq!(queue.push(3), Err(3));
//! assert_eq!(queue.pop_blocking(), None);
//! ```

use std::collections::VecDeque;
use std::mem;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use minstant::Instant;

/// Timeout specification for blocking operations.
#[derive(Debug, Clone, Copy)]
pub enum Timeout {
    /// Wait indefinitely.
    Infinite,
    /// Wait for at most the specified duration.
    Duration(Duration),
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Unbounded FIFO shared by any number of producers and one consumer.
pub struct MessageQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
}

impl<T> MessageQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    // A panic never leaves `State` half-updated, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `item` at the tail and wakes one waiting consumer.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` if the queue has been closed by
    /// [`drain_and_release`](Self::drain_and_release).
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut state = self.lock();
        if state.closed {
            return Err(item);
        }
        state.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the head without waiting.
    #[must_use]
    pub fn try_pop(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Removes the head, suspending while the queue is empty.
    ///
    /// Returns `None` only once the queue is closed and empty.
    #[must_use]
    pub fn pop_blocking(&self) -> Option<T> {
        self.pop_timeout(Timeout::Infinite)
    }

    /// Removes the head, suspending for at most `timeout` while the queue is empty.
    ///
    /// Returns `None` on timeout or once the queue is closed and empty.
    #[must_use]
    pub fn pop_timeout(&self, timeout: impl Into<Timeout>) -> Option<T> {
        let deadline = match timeout.into() {
            Timeout::Infinite => None,
            Timeout::Duration(d) => Some(Instant::now() + d),
        };

        let mut state = self.lock();
        // Wake-ups may be spurious or stolen; always re-check.
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = match deadline {
                None => self
                    .not_empty
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(dl) => {
                    let now = Instant::now();
                    if now >= dl {
                        return None;
                    }
                    self.not_empty
                        .wait_timeout(state, dl.duration_since(now))
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Closes the queue and drops every element still in it.
    ///
    /// Elements are dropped after the lock is released, so their destructors
    /// may touch the queue. Returns the number of elements released.
    pub fn drain_and_release(&self) -> usize {
        self.drain_and_release_with(|_| {})
    }

    /// Like [`drain_and_release`](Self::drain_and_release), but shows each
    /// element to `inspect` just before it is dropped.
    pub fn drain_and_release_with<F>(&self, mut inspect: F) -> usize
    where
        F: FnMut(&T),
    {
        let drained = {
            let mut state = self.lock();
            state.closed = true;
            mem::take(&mut state.items)
        };
        // A consumer parked on an empty queue must observe the close.
        self.not_empty.notify_all();

        let count = drained.len();
        for item in drained {
            inspect(&item);
        }
        count
    }

    /// Accepts pushes again after a drain.
    pub fn reopen(&self) {
        self.lock().closed = false;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
