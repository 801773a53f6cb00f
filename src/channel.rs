//! Bounded single-producer/single-consumer channel with drop-oldest backpressure
//!
//! Producers never block: pushing onto a full channel evicts the oldest queued
//! entry and enqueues the new one under the same lock, so the queue never holds
//! more than `capacity` entries. Consumers either wait cooperatively for the next
//! entry (`recv`) or poll without waiting (`try_recv`).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::Notify;

/// Returned by [`Sender::push`] when the receiving half has been dropped
#[derive(Debug, PartialEq, Eq)]
pub struct Closed<T>(pub T);

impl<T> std::fmt::Display for Closed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "channel receiver has been dropped")
    }
}

impl<T: std::fmt::Debug> std::error::Error for Closed<T> {}

/// Error for non-blocking receive attempts
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    #[error("channel is empty")]
    Empty,
    #[error("channel sender has been dropped")]
    Disconnected,
}

struct Shared<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    evicted: AtomicU64,
    notify: Notify,
    sender_alive: AtomicBool,
    receiver_alive: AtomicBool,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // A panic while holding the lock cannot leave the deque half-updated
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Producing half of a drop-oldest channel
pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

/// Consuming half of a drop-oldest channel
pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

/// Create a bounded drop-oldest channel. A capacity of 0 is treated as 1.
pub fn bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::with_capacity(capacity)),
        capacity,
        evicted: AtomicU64::new(0),
        notify: Notify::new(),
        sender_alive: AtomicBool::new(true),
        receiver_alive: AtomicBool::new(true),
    });

    (
        Sender {
            shared: Arc::clone(&shared),
        },
        Receiver { shared },
    )
}

impl<T> Sender<T> {
    /// Enqueue an item without blocking
    ///
    /// Returns the evicted entry when the channel was at capacity.
    pub fn push(&self, item: T) -> Result<Option<T>, Closed<T>> {
        if !self.shared.receiver_alive.load(Ordering::Acquire) {
            return Err(Closed(item));
        }

        let evicted = {
            let mut queue = self.shared.lock();
            let evicted = if queue.len() >= self.shared.capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(item);
            evicted
        };

        if evicted.is_some() {
            self.shared.evicted.fetch_add(1, Ordering::Relaxed);
        }
        self.shared.notify.notify_one();
        Ok(evicted)
    }

    /// Drop the oldest entry if the channel is currently full
    pub fn evict_if_full(&self) -> Option<T> {
        let evicted = {
            let mut queue = self.shared.lock();
            if queue.len() >= self.shared.capacity {
                queue.pop_front()
            } else {
                None
            }
        };

        if evicted.is_some() {
            self.shared.evicted.fetch_add(1, Ordering::Relaxed);
        }
        evicted
    }

    /// Handle for reading channel diagnostics from another task
    pub fn stats(&self) -> ChannelStats<T> {
        ChannelStats {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        self.shared.sender_alive.store(false, Ordering::Release);
        self.shared.notify.notify_one();
    }
}

impl<T> Receiver<T> {
    /// Wait for the next entry
    ///
    /// Returns `None` once the sender is gone and the queue has been drained.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            if let Some(item) = self.shared.pop() {
                return Some(item);
            }
            if !self.shared.sender_alive.load(Ordering::Acquire) {
                // The sender may have pushed right before dropping
                return self.shared.pop();
            }
            self.shared.notify.notified().await;
        }
    }

    /// Take at most one entry without waiting
    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        if let Some(item) = self.shared.pop() {
            return Ok(item);
        }
        if self.shared.sender_alive.load(Ordering::Acquire) {
            Err(TryRecvError::Empty)
        } else {
            self.shared.pop().ok_or(TryRecvError::Disconnected)
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.shared.receiver_alive.store(false, Ordering::Release);
    }
}

/// Read-only view of a channel's depth and eviction counter
pub struct ChannelStats<T> {
    shared: Arc<Shared<T>>,
}

impl<T> ChannelStats<T> {
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn evicted(&self) -> u64 {
        self.shared.evicted.load(Ordering::Relaxed)
    }
}
