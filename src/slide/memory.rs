//! In-memory pyramid decoder.
//!
//! `MemoryDecoder` holds fully decoded plane data for every series and
//! resolution level. Level data is shared between clones, so cloning a handle
//! for a worker only copies the binding.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::DecodeError;
use crate::region::PixelType;
use crate::tile::Rect;

use super::decoder::Decoder;

// =============================================================================
// Levels and Series
// =============================================================================

/// Raw plane data of one resolution level.
#[derive(Debug, Clone)]
pub struct MemoryLevel {
    pub width: u32,
    pub height: u32,

    /// One buffer per plane, indexed by [`Decoder::plane_index`]
    pub planes: Vec<Vec<u8>>,
}

impl MemoryLevel {
    pub fn new(width: u32, height: u32, planes: Vec<Vec<u8>>) -> Self {
        Self {
            width,
            height,
            planes,
        }
    }
}

/// Metadata and levels of one image series.
#[derive(Debug, Clone)]
pub struct MemorySeries {
    pub pixel_type: PixelType,
    pub size_z: u32,
    pub size_c: u32,
    pub size_t: u32,
    pub rgb_channel_count: u32,
    pub interleaved: bool,
    pub little_endian: bool,
    pub levels: Vec<MemoryLevel>,
}

impl MemorySeries {
    /// A planar series with a single Z and T position.
    pub fn new(pixel_type: PixelType, size_c: u32) -> Self {
        Self {
            pixel_type,
            size_z: 1,
            size_c,
            size_t: 1,
            rgb_channel_count: 1,
            interleaved: false,
            little_endian: true,
            levels: Vec::new(),
        }
    }

    pub fn with_stack(mut self, size_z: u32, size_t: u32) -> Self {
        self.size_z = size_z;
        self.size_t = size_t;
        self
    }

    /// Store `count` samples per plane, interleaved per pixel or as sub-planes.
    pub fn with_rgb(mut self, count: u32, interleaved: bool) -> Self {
        self.rgb_channel_count = count;
        self.interleaved = interleaved;
        self
    }

    pub fn with_big_endian(mut self) -> Self {
        self.little_endian = false;
        self
    }

    pub fn with_level(mut self, level: MemoryLevel) -> Self {
        self.levels.push(level);
        self
    }

    /// Number of planes each level must provide.
    pub fn plane_count(&self) -> usize {
        let effective_c = (self.size_c / self.rgb_channel_count.max(1)).max(1);
        self.size_z as usize * effective_c as usize * self.size_t as usize
    }

    fn plane_len(&self, width: u32, height: u32) -> usize {
        width as usize
            * height as usize
            * self.pixel_type.bytes_per_sample()
            * self.rgb_channel_count.max(1) as usize
    }

    fn validate(&self, index: usize) -> Result<(), DecodeError> {
        if self.levels.is_empty() {
            return Err(DecodeError::Unsupported {
                reason: format!("series {index} has no resolution levels"),
            });
        }
        if self.rgb_channel_count == 0 || self.size_c % self.rgb_channel_count != 0 {
            return Err(DecodeError::Unsupported {
                reason: format!(
                    "series {index}: {} channels cannot be split into planes of {}",
                    self.size_c, self.rgb_channel_count
                ),
            });
        }

        let planes = self.plane_count();
        for (resolution, level) in self.levels.iter().enumerate() {
            if level.planes.len() != planes {
                return Err(DecodeError::Unsupported {
                    reason: format!(
                        "series {index} level {resolution}: expected {planes} planes, got {}",
                        level.planes.len()
                    ),
                });
            }
            let expected = self.plane_len(level.width, level.height);
            if let Some(bad) = level.planes.iter().find(|p| p.len() != expected) {
                return Err(DecodeError::UnexpectedPlaneData {
                    expected,
                    actual: bad.len(),
                });
            }
        }
        Ok(())
    }
}

// =============================================================================
// Memory Decoder
// =============================================================================

/// Decoder over fully in-memory plane data.
///
/// # Example
///
/// ```
/// use wsi_region_reader::slide::{Decoder, MemoryDecoder, MemoryLevel, MemorySeries};
/// use wsi_region_reader::region::PixelType;
///
/// let series = MemorySeries::new(PixelType::U8, 1)
///     .with_level(MemoryLevel::new(4, 4, vec![vec![7u8; 16]]))
///     .with_level(MemoryLevel::new(2, 2, vec![vec![9u8; 4]]));
/// let mut decoder = MemoryDecoder::new(vec![series]).unwrap();
///
/// decoder.bind(0, 1).unwrap();
/// assert_eq!(decoder.size_x(), 2);
/// ```
#[derive(Debug)]
pub struct MemoryDecoder {
    series: Arc<[MemorySeries]>,
    source: Option<PathBuf>,
    tile_size: Option<(u32, u32)>,
    bound_series: usize,
    bound_resolution: usize,
}

impl MemoryDecoder {
    /// Create a decoder bound to series 0, resolution 0.
    pub fn new(series: Vec<MemorySeries>) -> Result<Self, DecodeError> {
        if series.is_empty() {
            return Err(DecodeError::Unsupported {
                reason: "no image series".to_string(),
            });
        }
        for (index, s) in series.iter().enumerate() {
            s.validate(index)?;
        }

        Ok(Self {
            series: series.into(),
            source: None,
            tile_size: None,
            bound_series: 0,
            bound_resolution: 0,
        })
    }

    /// Record the path this data was loaded from.
    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// Advertise a preferred tile size to the planner.
    pub fn with_tile_size(mut self, width: u32, height: u32) -> Self {
        self.tile_size = Some((width, height));
        self
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn current_series(&self) -> &MemorySeries {
        &self.series[self.bound_series]
    }

    fn current_level(&self) -> &MemoryLevel {
        &self.current_series().levels[self.bound_resolution]
    }
}

impl Decoder for MemoryDecoder {
    fn series_count(&self) -> usize {
        self.series.len()
    }

    fn bind(&mut self, series: usize, resolution: usize) -> Result<(), DecodeError> {
        let Some(s) = self.series.get(series) else {
            return Err(DecodeError::InvalidSeries {
                series,
                count: self.series.len(),
            });
        };
        if resolution >= s.levels.len() {
            return Err(DecodeError::InvalidResolution {
                resolution,
                count: s.levels.len(),
            });
        }
        self.bound_series = series;
        self.bound_resolution = resolution;
        Ok(())
    }

    fn series(&self) -> usize {
        self.bound_series
    }

    fn resolution(&self) -> usize {
        self.bound_resolution
    }

    fn resolution_count(&self) -> usize {
        self.current_series().levels.len()
    }

    fn size_x(&self) -> u32 {
        self.current_level().width
    }

    fn size_y(&self) -> u32 {
        self.current_level().height
    }

    fn size_z(&self) -> u32 {
        self.current_series().size_z
    }

    fn size_c(&self) -> u32 {
        self.current_series().size_c
    }

    fn size_t(&self) -> u32 {
        self.current_series().size_t
    }

    fn rgb_channel_count(&self) -> u32 {
        self.current_series().rgb_channel_count
    }

    fn is_interleaved(&self) -> bool {
        self.current_series().interleaved
    }

    fn is_little_endian(&self) -> bool {
        self.current_series().little_endian
    }

    fn pixel_type(&self) -> PixelType {
        self.current_series().pixel_type
    }

    fn read_region_bytes(
        &mut self,
        plane: usize,
        rect: Rect,
        out: &mut Vec<u8>,
    ) -> Result<(), DecodeError> {
        let series = self.current_series();
        let level = self.current_level();

        let data = level.planes.get(plane).ok_or(DecodeError::InvalidPlane {
            plane,
            count: level.planes.len(),
        })?;
        if rect.right() > level.width as u64 || rect.bottom() > level.height as u64 {
            return Err(DecodeError::RegionOutOfBounds {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                level_width: level.width,
                level_height: level.height,
            });
        }

        let bps = series.pixel_type.bytes_per_sample();
        let rgb = series.rgb_channel_count.max(1) as usize;
        let (stride, sub_planes) = if series.interleaved {
            (bps * rgb, 1)
        } else {
            (bps, rgb)
        };

        let level_width = level.width as usize;
        let sub_plane_len = level_width * level.height as usize * stride;
        let row_len = rect.width as usize * stride;

        out.clear();
        out.reserve(row_len * rect.height as usize * sub_planes);
        for sub in 0..sub_planes {
            let base = sub * sub_plane_len;
            for y in rect.y..rect.y + rect.height {
                let start = base + (y as usize * level_width + rect.x as usize) * stride;
                out.extend_from_slice(&data[start..start + row_len]);
            }
        }
        Ok(())
    }

    fn optimal_tile_width(&self) -> Option<u32> {
        self.tile_size.map(|(w, _)| w)
    }

    fn optimal_tile_height(&self) -> Option<u32> {
        self.tile_size.map(|(_, h)| h)
    }

    fn try_clone(&self) -> Result<Self, DecodeError> {
        Ok(Self {
            series: Arc::clone(&self.series),
            source: self.source.clone(),
            tile_size: self.tile_size,
            bound_series: self.bound_series,
            bound_resolution: self.bound_resolution,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
