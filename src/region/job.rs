//! Region read requests and results.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::tile::{ChannelSelection, PlanePosition, Rect};

use super::canvas::ResultCanvas;
use super::sample::Sample;

// =============================================================================
// Read Request
// =============================================================================

/// Parameters of one region read.
///
/// The region is given in full-resolution (level 0) pixel coordinates,
/// whatever resolution is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub series: usize,

    /// Requested resolution as a power-of-two shift (0 = full resolution)
    pub resolution: u32,

    /// Region in level 0 coordinates
    pub region: Rect,

    pub z: u32,
    pub t: u32,
    pub channels: ChannelSelection,

    /// Tile width override; defaults to the decoder hint or 512
    pub tile_width: Option<u32>,

    /// Tile height override; defaults to the decoder hint or 512
    pub tile_height: Option<u32>,
}

impl ReadRequest {
    /// Read `region` of channel 0 at full resolution from series 0.
    pub fn new(region: Rect) -> Self {
        Self {
            series: 0,
            resolution: 0,
            region,
            z: 0,
            t: 0,
            channels: ChannelSelection::Single(0),
            tile_width: None,
            tile_height: None,
        }
    }

    pub fn with_series(mut self, series: usize) -> Self {
        self.series = series;
        self
    }

    pub fn at_resolution(mut self, resolution: u32) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_plane(mut self, z: u32, t: u32) -> Self {
        self.z = z;
        self.t = t;
        self
    }

    pub fn with_channel(mut self, channel: u32) -> Self {
        self.channels = ChannelSelection::Single(channel);
        self
    }

    pub fn with_all_channels(mut self) -> Self {
        self.channels = ChannelSelection::All;
        self
    }

    pub fn with_tile_size(mut self, width: u32, height: u32) -> Self {
        self.tile_width = Some(width);
        self.tile_height = Some(height);
        self
    }

    pub fn position(&self) -> PlanePosition {
        PlanePosition {
            z: self.z,
            t: self.t,
            channels: self.channels,
        }
    }
}

// =============================================================================
// Job State
// =============================================================================

/// Lifecycle of one region read.
///
/// ```text
/// Idle ──► Planning ──► Submitting ──► Draining ──► Done
///             │              │             ├──────► Cancelled
///             └──────────────┴─────────────┴──────► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Planning,
    Submitting,
    Draining,
    Done,
    Cancelled,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Cancelled | JobState::Failed)
    }

    pub(crate) fn transition(&mut self, next: JobState) {
        debug!(from = %self, to = %next, "Region read state change");
        *self = next;
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Idle => "idle",
            JobState::Planning => "planning",
            JobState::Submitting => "submitting",
            JobState::Draining => "draining",
            JobState::Done => "done",
            JobState::Cancelled => "cancelled",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Read Report
// =============================================================================

/// A tile whose decode failed. Its canvas rectangle was left zeroed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedTile {
    pub index: usize,

    /// Tile rectangle in reader-level coordinates
    pub rect: Rect,

    pub error: String,
}

/// Summary of one region read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadReport {
    /// Final state of the read
    pub state: JobState,

    /// Requested region in level 0 coordinates
    pub requested_region: Rect,

    /// Clipped region actually decoded, in reader-level coordinates
    pub reader_region: Rect,

    pub requested_resolution: u32,

    /// Decoder resolution index read from
    pub reader_level: usize,

    /// Power-of-two shift of the reader level
    pub reader_shift: u32,

    /// 2x downscale passes applied after assembly
    pub residual_downscale: u32,

    pub tile_width: u32,
    pub tile_height: u32,
    pub workers: usize,

    pub tiles_total: usize,
    pub tiles_completed: usize,
    pub tiles_failed: usize,

    /// Tiles never decoded because the read was cancelled
    pub tiles_skipped: usize,

    pub failed_tiles: Vec<FailedTile>,

    /// Decoder handles cloned for the read
    pub readers_created: usize,

    pub elapsed_ms: u64,
}

// =============================================================================
// Region Image
// =============================================================================

/// An assembled region: one plane of samples per channel, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionImage<T> {
    width: u32,
    height: u32,
    planes: Vec<Vec<T>>,
    report: ReadReport,
}

impl<T: Sample> RegionImage<T> {
    pub(crate) fn from_canvas(canvas: ResultCanvas<T>, report: ReadReport) -> Self {
        Self {
            width: canvas.width(),
            height: canvas.height(),
            planes: canvas.into_planes(),
            report,
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

    /// Samples of one output channel.
    pub fn channel(&self, channel: usize) -> Option<&[T]> {
        self.planes.get(channel).map(Vec::as_slice)
    }

    pub fn planes(&self) -> &[Vec<T>] {
        &self.planes
    }

    /// Sample at (`x`, `y`) of `channel`, or `None` outside the image.
    pub fn sample(&self, x: u32, y: u32, channel: usize) -> Option<T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = y as usize * self.width as usize + x as usize;
        self.planes.get(channel).map(|plane| plane[index])
    }

    /// Samples in pixel-interleaved order (`c0 c1 c2 c0 c1 c2 ...`).
    pub fn to_interleaved(&self) -> Vec<T> {
        let pixels = self.width as usize * self.height as usize;
        let mut out = Vec::with_capacity(pixels * self.planes.len());
        for i in 0..pixels {
            out.extend(self.planes.iter().map(|plane| plane[i]));
        }
        out
    }

    pub fn report(&self) -> &ReadReport {
        &self.report
    }

    pub fn into_planes(self) -> Vec<Vec<T>> {
        self.planes
    }
}

// =============================================================================
// Read Outcome
// =============================================================================

/// Result of a region read that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome<T> {
    /// Every tile was processed. Failed tiles, if any, are listed in the report.
    Complete(RegionImage<T>),

    /// The read was cancelled by the progress callback or the cancellation token.
    Cancelled {
        report: ReadReport,
        /// The partially filled region, when the reader keeps partial results
        partial: Option<RegionImage<T>>,
    },
}

impl<T: Sample> ReadOutcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReadOutcome::Cancelled { .. })
    }

    pub fn report(&self) -> &ReadReport {
        match self {
            ReadOutcome::Complete(image) => image.report(),
            ReadOutcome::Cancelled { report, .. } => report,
        }
    }

    /// The complete image, or the partial one of a cancelled read.
    pub fn into_image(self) -> Option<RegionImage<T>> {
        match self {
            ReadOutcome::Complete(image) => Some(image),
            ReadOutcome::Cancelled { partial, .. } => partial,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
