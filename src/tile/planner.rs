//! Tile planning.
//!
//! A read request is partitioned into a row-major grid of non-overlapping
//! rectangles. Every tile but the last column/row has the full tile size;
//! edge tiles are clipped to the remaining extent, never padded.

use serde::Serialize;

use crate::error::RegionError;

/// Tile edge used when the decoder has no preferred tile size.
pub const DEFAULT_TILE_SIZE: u32 = 512;

// =============================================================================
// Rectangle
// =============================================================================

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Overlapping part of two rectangles, `None` if they do not overlap.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 as u64 || y1 <= y0 as u64 {
            return None;
        }
        Some(Rect::new(x0, y0, (x1 - x0 as u64) as u32, (y1 - y0 as u64) as u32))
    }

    /// Clip to an image of `width` x `height` anchored at the origin.
    pub fn clip_to(&self, width: u32, height: u32) -> Option<Rect> {
        self.intersection(&Rect::new(0, 0, width, height))
    }

    /// Map a full-resolution rectangle onto a level `shift` steps down the
    /// pyramid. The origin rounds down and the far edge rounds up so the
    /// result still covers every source pixel.
    pub fn shifted_down(&self, shift: u32) -> Rect {
        if shift == 0 {
            return *self;
        }
        let shift = shift.min(63);
        let x0 = (self.x as u64) >> shift;
        let y0 = (self.y as u64) >> shift;
        let round = (1u64 << shift) - 1;
        let x1 = (self.right() + round) >> shift;
        let y1 = (self.bottom() + round) >> shift;
        Rect::new(x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32)
    }

    /// Express this rectangle relative to `origin`'s top-left corner.
    pub fn relative_to(&self, origin: &Rect) -> Rect {
        Rect::new(
            self.x.saturating_sub(origin.x),
            self.y.saturating_sub(origin.y),
            self.width,
            self.height,
        )
    }
}

// =============================================================================
// Plane Position
// =============================================================================

/// Which channels a read covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSelection {
    /// One channel, producing a single-plane canvas
    Single(u32),
    /// Every channel of the series, one canvas plane each
    All,
}

/// Z/T/channel coordinates shared by every tile of one read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PlanePosition {
    pub z: u32,
    pub t: u32,
    pub channels: ChannelSelection,
}

impl Default for PlanePosition {
    fn default() -> Self {
        Self {
            z: 0,
            t: 0,
            channels: ChannelSelection::Single(0),
        }
    }
}

// =============================================================================
// Tiles
// =============================================================================

/// One unit of decode work, in reader-space coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// Row-major index within the plan
    pub index: usize,
    pub column: u32,
    pub row: u32,
    pub rect: Rect,
    pub position: PlanePosition,
}

/// A covering grid of tiles over a clipped region.
#[derive(Debug, Clone)]
pub struct TilePlan {
    /// Region after clipping to the level bounds
    pub region: Rect,
    pub tile_width: u32,
    pub tile_height: u32,
    pub columns: u32,
    pub rows: u32,
    pub tiles: Vec<Tile>,
}

impl TilePlan {
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Width of tiles in `column`, accounting for the clipped last column.
    pub fn column_width(&self, column: u32) -> u32 {
        let start = column * self.tile_width;
        self.tile_width.min(self.region.width - start)
    }

    /// Height of tiles in `row`, accounting for the clipped last row.
    pub fn row_height(&self, row: u32) -> u32 {
        let start = row * self.tile_height;
        self.tile_height.min(self.region.height - start)
    }
}

/// Partition `region` into tiles of at most `tile_width` x `tile_height`.
///
/// The region is first clipped to `bounds` (the reader-space level size).
///
/// # Errors
///
/// - [`RegionError::InvalidTileSize`] if either tile edge is zero
/// - [`RegionError::EmptyRegion`] if nothing of the region lies inside `bounds`
pub fn plan(
    region: Rect,
    bounds: (u32, u32),
    tile_width: u32,
    tile_height: u32,
    position: PlanePosition,
) -> Result<TilePlan, RegionError> {
    if tile_width == 0 || tile_height == 0 {
        return Err(RegionError::InvalidTileSize {
            width: tile_width,
            height: tile_height,
        });
    }

    let clipped = region
        .clip_to(bounds.0, bounds.1)
        .ok_or_else(|| RegionError::EmptyRegion {
            reason: format!(
                "{}x{} at ({}, {}) lies outside the {}x{} level",
                region.width, region.height, region.x, region.y, bounds.0, bounds.1
            ),
        })?;

    let columns = clipped.width.div_ceil(tile_width);
    let rows = clipped.height.div_ceil(tile_height);

    let mut tiles = Vec::with_capacity(columns as usize * rows as usize);
    for row in 0..rows {
        let y = row * tile_height;
        let height = tile_height.min(clipped.height - y);
        for column in 0..columns {
            let x = column * tile_width;
            let width = tile_width.min(clipped.width - x);
            tiles.push(Tile {
                index: tiles.len(),
                column,
                row,
                rect: Rect::new(clipped.x + x, clipped.y + y, width, height),
                position,
            });
        }
    }

    Ok(TilePlan {
        region: clipped,
        tile_width,
        tile_height,
        columns,
        rows,
        tiles,
    })
}

/// Tile edge derived from a decoder hint: the largest power of two not above
/// the hint, or [`DEFAULT_TILE_SIZE`] when there is no usable hint.
pub fn default_tile_size(optimal: Option<u32>) -> u32 {
    match optimal {
        Some(size) if size > 0 => 1 << (31 - size.leading_zeros()),
        _ => DEFAULT_TILE_SIZE,
    }
}

// =============================================================================
// Tests
// =============================================================================
