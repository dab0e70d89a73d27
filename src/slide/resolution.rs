//! Resolution table.
//!
//! Pyramids often carry levels that are not clean power-of-two reductions of
//! the base image (thumbnails, label images, odd vendor levels). Only levels
//! whose width ratio to level 0 is a power of two within
//! [`LEVEL_TOLERANCE`] are usable for region reads. A requested resolution
//! shift maps to the deepest usable level not beyond it, plus a residual
//! number of 2x downscale passes.

use serde::Serialize;
use tracing::debug;

use crate::error::DecodeError;

use super::decoder::Decoder;

/// Maximum distance of `log2(width0 / width)` from an integer for a level to
/// count as a native power-of-two level.
pub const LEVEL_TOLERANCE: f64 = 0.005;

/// A usable resolution level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NativeLevel {
    /// Power-of-two shift relative to level 0
    pub shift: u32,

    /// Index of the level in the decoder
    pub reader_index: usize,

    pub width: u32,
    pub height: u32,
}

/// Result of resolving a requested resolution shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedLevel {
    /// Decoder resolution index to read from
    pub reader_index: usize,

    /// Shift of that level relative to level 0
    pub reader_shift: u32,

    /// Remaining 2x downscale passes to reach the requested resolution
    pub residual: u32,
}

/// Usable levels of one series, sorted by ascending shift.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionTable {
    series: usize,
    levels: Vec<NativeLevel>,
}

impl ResolutionTable {
    /// Discover the usable levels of `series`.
    ///
    /// Binds the decoder to every level of the series in turn and leaves it
    /// bound to `(series, 0)`.
    pub fn build<D: Decoder>(decoder: &mut D, series: usize) -> Result<Self, DecodeError> {
        decoder.bind(series, 0)?;
        let base_width = decoder.size_x();
        let mut levels = vec![NativeLevel {
            shift: 0,
            reader_index: 0,
            width: base_width,
            height: decoder.size_y(),
        }];

        let count = decoder.resolution_count();
        for reader_index in 1..count {
            decoder.bind(series, reader_index)?;
            let width = decoder.size_x();
            let height = decoder.size_y();

            match power_of_two_shift(base_width, width) {
                Some(shift) if shift > 0 => {
                    if levels.iter().any(|l| l.shift == shift) {
                        debug!(series, reader_index, shift, "Duplicate resolution level ignored");
                        continue;
                    }
                    levels.push(NativeLevel {
                        shift,
                        reader_index,
                        width,
                        height,
                    });
                }
                _ => {
                    debug!(
                        series,
                        reader_index,
                        width,
                        base_width,
                        "Skipping non power-of-two resolution level"
                    );
                }
            }
        }

        decoder.bind(series, 0)?;
        levels.sort_by_key(|l| l.shift);

        debug!(series, levels = levels.len(), of = count, "Built resolution table");
        Ok(Self { series, levels })
    }

    pub fn series(&self) -> usize {
        self.series
    }

    /// Usable levels, level 0 first.
    pub fn levels(&self) -> &[NativeLevel] {
        &self.levels
    }

    /// Map a requested resolution shift to a reader level and residual.
    ///
    /// Picks the largest usable shift not beyond `requested`. Shift 0 always
    /// resolves to reader level 0 with no residual.
    pub fn resolve(&self, requested: u32) -> ResolvedLevel {
        let level = self
            .levels
            .iter()
            .rev()
            .find(|l| l.shift <= requested)
            .unwrap_or(&self.levels[0]);

        ResolvedLevel {
            reader_index: level.reader_index,
            reader_shift: level.shift,
            residual: requested - level.shift,
        }
    }
}

/// `log2(base / width)` rounded, if it lies within [`LEVEL_TOLERANCE`] of an integer.
fn power_of_two_shift(base: u32, width: u32) -> Option<u32> {
    if base == 0 || width == 0 || width > base {
        return None;
    }
    let level = (base as f64 / width as f64).log2();
    let rounded = level.round();
    ((level - rounded).abs() < LEVEL_TOLERANCE).then_some(rounded as u32)
}

// =============================================================================
// Tests
// =============================================================================
