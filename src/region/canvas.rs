//! Result canvas.
//!
//! The canvas is allocated once per read at reader-space size, one plane per
//! output channel. Before decoding starts it is split into one
//! [`TileTarget`] per planned tile: each target owns mutable row segments
//! covering exactly its tile's rectangle. Because the plan partitions the
//! region, the segments are disjoint and workers write through them with no
//! locking at all.
//!
//! After assembly the canvas can be reduced by repeated 2x box downscaling,
//! performed in place.

use crate::tile::TilePlan;

use super::sample::Sample;

/// Destination pixel planes for one region read.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultCanvas<T> {
    width: u32,
    height: u32,
    planes: Vec<Vec<T>>,
}

impl<T: Sample> ResultCanvas<T> {
    /// Allocate a zero-filled canvas.
    pub fn new(width: u32, height: u32, channels: usize) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            planes: (0..channels).map(|_| vec![T::default(); len]).collect(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channel_count(&self) -> usize {
        self.planes.len()
    }

    pub fn plane(&self, channel: usize) -> &[T] {
        &self.planes[channel]
    }

    pub fn into_planes(self) -> Vec<Vec<T>> {
        self.planes
    }

    /// Split the canvas into one write target per tile of `plan`.
    ///
    /// The plan's clipped region must have the canvas size; tile rectangles
    /// are translated relative to the region origin. Targets are returned in
    /// plan order.
    pub(crate) fn tile_targets(&mut self, plan: &TilePlan) -> Vec<TileTarget<'_, T>> {
        debug_assert_eq!(plan.region.width, self.width);
        debug_assert_eq!(plan.region.height, self.height);

        let channels = self.planes.len();
        let mut targets: Vec<TileTarget<'_, T>> = plan
            .tiles
            .iter()
            .map(|tile| TileTarget {
                tile_index: tile.index,
                width: tile.rect.width,
                height: tile.rect.height,
                rows: (0..channels)
                    .map(|_| Vec::with_capacity(tile.rect.height as usize))
                    .collect(),
            })
            .collect();

        if self.width == 0 {
            return targets;
        }

        let columns = plan.columns as usize;
        for (channel, plane) in self.planes.iter_mut().enumerate() {
            for (y, row) in plane.chunks_mut(self.width as usize).enumerate() {
                let grid_row = y / plan.tile_height as usize;
                let mut rest = row;
                for column in 0..columns {
                    let width = plan.column_width(column as u32) as usize;
                    let (segment, tail) = std::mem::take(&mut rest).split_at_mut(width);
                    rest = tail;
                    targets[grid_row * columns + column].rows[channel].push(segment);
                }
            }
        }

        targets
    }

    /// Halve both dimensions with a 2x2 box filter, in place.
    ///
    /// An odd trailing row or column is dropped.
    pub fn downscale_2x(&mut self) {
        let (width, height) = (self.width as usize, self.height as usize);
        let (half_w, half_h) = (width / 2, height / 2);

        for plane in &mut self.planes {
            // Output index y*half_w+x never exceeds the first input index
            // 2y*width+2x, and later outputs only read later inputs.
            for y in 0..half_h {
                for x in 0..half_w {
                    let i = 2 * y * width + 2 * x;
                    let sum = plane[i].to_f64()
                        + plane[i + 1].to_f64()
                        + plane[i + width].to_f64()
                        + plane[i + width + 1].to_f64();
                    plane[y * half_w + x] = T::from_f64(sum / 4.0);
                }
            }
            plane.truncate(half_w * half_h);
        }

        self.width = half_w as u32;
        self.height = half_h as u32;
    }

    /// Apply `rounds` successive [`downscale_2x`](Self::downscale_2x) passes.
    pub fn downscale(&mut self, rounds: u32) {
        for _ in 0..rounds {
            self.downscale_2x();
        }
    }
}

/// Exclusive write access to one tile's rectangle of the canvas.
pub(crate) struct TileTarget<'c, T> {
    tile_index: usize,
    width: u32,
    height: u32,

    /// Row segments per channel, top to bottom
    rows: Vec<Vec<&'c mut [T]>>,
}

impl<T: Sample> TileTarget<'_, T> {
    pub(crate) fn tile_index(&self) -> usize {
        self.tile_index
    }

    pub(crate) fn width(&self) -> u32 {
        self.width
    }

    pub(crate) fn height(&self) -> u32 {
        self.height
    }

    /// Copy a tile-sized, row-major plane of samples into `channel`.
    ///
    /// Rows or columns of `pixels` beyond the target are ignored, and a short
    /// source leaves the remainder untouched.
    pub(crate) fn write_channel(&mut self, channel: usize, pixels: &[T], src_width: usize) {
        if src_width == 0 {
            return;
        }
        for (dst, src) in self.rows[channel].iter_mut().zip(pixels.chunks(src_width)) {
            let n = dst.len().min(src.len());
            dst[..n].copy_from_slice(&src[..n]);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
