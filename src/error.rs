use std::time::Duration;

use thiserror::Error;

use crate::region::PixelType;

/// Errors reported by a [`Decoder`](crate::slide::Decoder) implementation.
///
/// These are raised per call; whether one is fatal depends on where it
/// happens. During setup it aborts the whole read, inside a tile worker it
/// only marks that tile as failed.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// Underlying I/O failure while reading pixel data
    #[error("I/O error: {0}")]
    Io(String),

    /// Series index is not present in the opened file
    #[error("Series {series} out of range (file has {count})")]
    InvalidSeries { series: usize, count: usize },

    /// Resolution index is not present in the bound series
    #[error("Resolution {resolution} out of range (series has {count})")]
    InvalidResolution { resolution: usize, count: usize },

    /// Plane index is not present at the bound series/resolution
    #[error("Plane {plane} out of range (series has {count})")]
    InvalidPlane { plane: usize, count: usize },

    /// Z/C/T position does not exist
    #[error("Invalid plane position: z={z}, c={c}, t={t}")]
    InvalidPosition { z: u32, c: u32, t: u32 },

    /// Requested rectangle lies outside the bound resolution level
    #[error("Region {x},{y} {width}x{height} exceeds level bounds {level_width}x{level_height}")]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        level_width: u32,
        level_height: u32,
    },

    /// The decoder returned fewer bytes than the rectangle requires
    #[error("Unexpected plane data: expected {expected} bytes, got {actual}")]
    UnexpectedPlaneData { expected: usize, actual: usize },

    /// File or pixel layout cannot be handled
    #[error("Unsupported format: {reason}")]
    Unsupported { reason: String },

    /// Cloning a handle failed
    #[error("Failed to clone decoder handle: {0}")]
    Clone(String),

    /// Any other decoder-specific failure
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for DecodeError {
    fn from(err: std::io::Error) -> Self {
        DecodeError::Io(err.to_string())
    }
}

/// Errors that abort a region read.
///
/// Per-tile decode failures are not represented here unless the configured
/// failure policy is exceeded; they are collected in the
/// [`ReadReport`](crate::region::ReadReport) instead.
#[derive(Debug, Clone, Error)]
pub enum RegionError {
    /// The decoder failed during setup (bind, metadata, layout)
    #[error("Decoder error: {0}")]
    Decode(#[from] DecodeError),

    /// A worker could not obtain its own decoder handle
    #[error("Failed to clone reader for worker: {0}")]
    CloneFailed(DecodeError),

    /// A pool could not hand out a resource within the acquire timeout
    #[error("Timed out after {waited:?} waiting for a pooled {resource}")]
    PoolExhausted {
        resource: &'static str,
        waited: Duration,
    },

    /// Requested sample type does not match the decoder's pixel type
    #[error("Pixel type mismatch: requested {requested:?}, decoder provides {actual:?}")]
    PixelTypeMismatch {
        requested: PixelType,
        actual: PixelType,
    },

    /// The requested region does not intersect the image, or vanishes after downscaling
    #[error("Empty region: {reason}")]
    EmptyRegion { reason: String },

    /// Channel index beyond the series channel count
    #[error("Invalid channel {channel} (series has {count})")]
    InvalidChannel { channel: u32, count: u32 },

    /// Tile size must be non-zero
    #[error("Invalid tile size {width}x{height}")]
    InvalidTileSize { width: u32, height: u32 },

    /// Reader settings failed validation
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// A worker thread could not be started
    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(String),

    /// More tiles failed than the failure policy allows
    #[error("{failed} of {total} tiles failed (limit {limit})")]
    TooManyFailedTiles {
        failed: usize,
        total: usize,
        limit: usize,
    },

    /// Writing the assembled region failed
    #[error("Failed to encode region: {message}")]
    Encode { message: String },
}
