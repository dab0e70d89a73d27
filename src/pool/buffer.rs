//! Pool of per-tile scratch buffers.

use std::convert::Infallible;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use crate::error::RegionError;
use crate::region::Sample;

use super::{AcquireError, ResourcePool};

/// Scratch space for decoding one tile.
///
/// Sized for a full tile; edge tiles use a prefix of each buffer.
#[derive(Debug)]
pub struct WorkBuffer<T> {
    /// Raw plane bytes as returned by the decoder
    pub(crate) raw: Vec<u8>,

    /// Bytes of one channel after de-interleaving
    pub(crate) channel: Vec<u8>,

    /// Converted samples, one tile-sized plane per output channel
    pub(crate) pixels: Vec<T>,
}

impl<T: Sample> WorkBuffer<T> {
    /// Allocate a buffer for tiles of `shape`.
    pub fn new(shape: BufferShape) -> Self {
        let pixels = shape.tile_width as usize * shape.tile_height as usize;
        let bps = T::PIXEL_TYPE.bytes_per_sample();
        Self {
            raw: Vec::with_capacity(pixels * bps * shape.samples_per_plane as usize),
            channel: Vec::with_capacity(pixels * bps),
            pixels: vec![T::default(); pixels * shape.channels],
        }
    }

    /// Size the pixel buffer for a tile of `pixel_count` pixels.
    pub(crate) fn prepare(&mut self, pixel_count: usize, channels: usize) {
        self.pixels.resize(pixel_count * channels, T::default());
    }
}

/// Dimensions every [`WorkBuffer`] of a pool is allocated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferShape {
    pub tile_width: u32,
    pub tile_height: u32,

    /// Output channels decoded per tile
    pub channels: usize,

    /// Samples stored per decoder plane (RGB count)
    pub samples_per_plane: u32,
}

/// Lazily growing pool of [`WorkBuffer`]s.
pub struct BufferPool<T> {
    slots: ResourcePool<WorkBuffer<T>>,
    shape: BufferShape,
    acquire_timeout: Duration,
}

impl<T: Sample> BufferPool<T> {
    pub fn new(shape: BufferShape, capacity: usize, acquire_timeout: Duration) -> Self {
        Self {
            slots: ResourcePool::new("work buffer", capacity),
            shape,
            acquire_timeout,
        }
    }

    pub fn shape(&self) -> BufferShape {
        self.shape
    }

    pub fn created(&self) -> usize {
        self.slots.created()
    }

    pub fn idle(&self) -> usize {
        self.slots.idle()
    }

    /// Borrow a buffer, allocating one if the pool is below capacity.
    pub fn borrow(&self) -> Result<PooledBuffer<'_, T>, RegionError> {
        let buffer = self
            .slots
            .acquire(self.acquire_timeout, || {
                Ok::<_, Infallible>(WorkBuffer::new(self.shape))
            })
            .map_err(|err| match err {
                AcquireError::Timeout(waited) => RegionError::PoolExhausted {
                    resource: self.slots.name(),
                    waited,
                },
                AcquireError::Create(never) => match never {},
            })?;

        Ok(PooledBuffer {
            pool: self,
            buffer: Some(buffer),
        })
    }

    pub fn clear(&self) -> usize {
        self.slots.clear()
    }
}

/// A [`WorkBuffer`] on loan, returned to its pool on drop.
pub struct PooledBuffer<'p, T: Sample> {
    pool: &'p BufferPool<T>,
    buffer: Option<WorkBuffer<T>>,
}

impl<T: Sample> Deref for PooledBuffer<'_, T> {
    type Target = WorkBuffer<T>;

    fn deref(&self) -> &WorkBuffer<T> {
        self.buffer.as_ref().expect("pooled buffer is present until drop")
    }
}

impl<T: Sample> DerefMut for PooledBuffer<'_, T> {
    fn deref_mut(&mut self) -> &mut WorkBuffer<T> {
        self.buffer.as_mut().expect("pooled buffer is present until drop")
    }
}

impl<T: Sample> Drop for PooledBuffer<'_, T> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.slots.release(buffer);
        }
    }
}
