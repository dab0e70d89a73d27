//! Pool of cloned decoder handles.
//!
//! Decoder handles are stateful and not safe to share, so every worker decodes
//! through its own clone of the primary handle. Clones are created on demand
//! and reused for the rest of the read. Each borrowed handle is re-bound to the
//! pool's [`BoundTarget`] before it is handed out, so a handle never carries a
//! binding from elsewhere into a tile decode.

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{DecodeError, RegionError};
use crate::slide::Decoder;

use super::{AcquireError, ResourcePool};

/// The (series, resolution) pair every handle of a pool is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BoundTarget {
    pub series: usize,
    pub resolution: usize,
}

/// Lazily growing pool of decoder handles cloned from a primary handle.
pub struct ReaderPool<'a, D: Decoder> {
    primary: &'a Mutex<D>,
    target: BoundTarget,
    slots: ResourcePool<D>,
    acquire_timeout: Duration,
}

impl<'a, D: Decoder> ReaderPool<'a, D> {
    /// Create an empty pool. No handle is cloned until the first borrow.
    pub fn new(
        primary: &'a Mutex<D>,
        target: BoundTarget,
        capacity: usize,
        acquire_timeout: Duration,
    ) -> Self {
        Self {
            primary,
            target,
            slots: ResourcePool::new("reader", capacity),
            acquire_timeout,
        }
    }

    pub fn target(&self) -> BoundTarget {
        self.target
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Number of handles cloned so far.
    pub fn created(&self) -> usize {
        self.slots.created()
    }

    pub fn idle(&self) -> usize {
        self.slots.idle()
    }

    /// Borrow a handle bound to the pool target.
    ///
    /// # Errors
    ///
    /// - [`RegionError::CloneFailed`] if a new clone was needed and cloning failed
    /// - [`RegionError::PoolExhausted`] if no handle came back within the acquire timeout
    /// - [`RegionError::Decode`] if binding the handle failed
    pub fn borrow(&self) -> Result<PooledReader<'_, 'a, D>, RegionError> {
        let mut handle = self
            .slots
            .acquire(self.acquire_timeout, || self.clone_primary())
            .map_err(|err| match err {
                AcquireError::Timeout(waited) => RegionError::PoolExhausted {
                    resource: self.slots.name(),
                    waited,
                },
                AcquireError::Create(err) => RegionError::CloneFailed(err),
            })?;

        if let Err(err) = handle.bind(self.target.series, self.target.resolution) {
            self.slots.release(handle);
            return Err(RegionError::Decode(err));
        }

        Ok(PooledReader {
            pool: self,
            handle: Some(handle),
        })
    }

    /// Drop all idle handles.
    pub fn clear(&self) -> usize {
        self.slots.clear()
    }

    fn clone_primary(&self) -> Result<D, DecodeError> {
        self.primary.lock().try_clone()
    }
}

/// A decoder handle on loan from a [`ReaderPool`].
///
/// Only a pool can produce one. The handle goes back to the pool when the
/// guard drops, on success and failure paths alike.
pub struct PooledReader<'p, 'a, D: Decoder> {
    pool: &'p ReaderPool<'a, D>,
    handle: Option<D>,
}

impl<D: Decoder> PooledReader<'_, '_, D> {
    pub fn target(&self) -> BoundTarget {
        self.pool.target
    }

    /// Replace the borrowed handle with a fresh clone of the primary.
    ///
    /// Used before retrying a failed tile. The pool's handle count does not
    /// change: the fresh clone takes over the slot of the old one.
    pub fn refresh(&mut self) -> Result<(), RegionError> {
        let mut fresh = self.pool.clone_primary().map_err(RegionError::CloneFailed)?;
        fresh.bind(self.pool.target.series, self.pool.target.resolution)?;
        self.handle = Some(fresh);
        Ok(())
    }
}

impl<D: Decoder> Deref for PooledReader<'_, '_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.handle.as_ref().expect("pooled handle is present until drop")
    }
}

impl<D: Decoder> DerefMut for PooledReader<'_, '_, D> {
    fn deref_mut(&mut self) -> &mut D {
        self.handle.as_mut().expect("pooled handle is present until drop")
    }
}

impl<D: Decoder> Drop for PooledReader<'_, '_, D> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.slots.release(handle);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
