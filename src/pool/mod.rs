//! Bounded resource pools.
//!
//! Both pools used by a region read, decoder handles and tile work buffers,
//! share one mechanism: a LIFO stack of idle items that grows lazily up to a
//! fixed capacity. When the stack is empty and the capacity is reached, a
//! borrower blocks on a condition variable until an item is returned or the
//! acquire timeout expires.
//!
//! ```text
//! acquire ──► idle item? ──yes──► hand out
//!                │ no
//!                ▼
//!         below capacity? ──yes──► create (outside the lock) ──► hand out
//!                │ no
//!                ▼
//!         wait for release (until deadline) ──► retry
//! ```
//!
//! Pools live for one region read and are cleared at the end of it.

mod buffer;
mod reader;

pub use buffer::{BufferPool, BufferShape, PooledBuffer, WorkBuffer};
pub use reader::{BoundTarget, PooledReader, ReaderPool};

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

/// Why an acquire did not produce an item.
#[derive(Debug)]
pub(crate) enum AcquireError<E> {
    /// Capacity reached and nothing was released before the deadline
    Timeout(Duration),
    /// The factory failed while growing the pool
    Create(E),
}

struct PoolState<T> {
    idle: Vec<T>,
    created: usize,
}

/// Lazily growing LIFO pool with a hard capacity.
pub(crate) struct ResourcePool<T> {
    name: &'static str,
    capacity: usize,
    state: Mutex<PoolState<T>>,
    released: Condvar,
}

impl<T> ResourcePool<T> {
    pub(crate) fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
            state: Mutex::new(PoolState {
                idle: Vec::with_capacity(capacity),
                created: 0,
            }),
            released: Condvar::new(),
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items created so far, idle or borrowed.
    pub(crate) fn created(&self) -> usize {
        self.state.lock().created
    }

    pub(crate) fn idle(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// Take an idle item, create one if below capacity, or wait.
    ///
    /// `create` runs without the pool lock held; a failed creation gives its
    /// slot back so another borrower may try again.
    pub(crate) fn acquire<E>(
        &self,
        timeout: Duration,
        create: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, AcquireError<E>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        loop {
            if let Some(item) = state.idle.pop() {
                return Ok(item);
            }

            if state.created < self.capacity {
                state.created += 1;
                let created = state.created;
                drop(state);

                return match create() {
                    Ok(item) => {
                        debug!(pool = self.name, created, capacity = self.capacity, "Pool grew");
                        Ok(item)
                    }
                    Err(err) => {
                        self.state.lock().created -= 1;
                        self.released.notify_one();
                        Err(AcquireError::Create(err))
                    }
                };
            }

            if self.released.wait_until(&mut state, deadline).timed_out()
                && state.idle.is_empty()
                && state.created >= self.capacity
            {
                return Err(AcquireError::Timeout(timeout));
            }
        }
    }

    /// Return an item. Items are never discarded on release.
    pub(crate) fn release(&self, item: T) {
        self.state.lock().idle.push(item);
        self.released.notify_one();
    }

    /// Drop every idle item and return how many were dropped.
    pub(crate) fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.idle.len();
        state.idle.clear();
        state.created -= dropped;
        dropped
    }
}

// =============================================================================
// Tests
// =============================================================================
