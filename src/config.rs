//! Configuration management for the region reader.
//!
//! This module provides:
//! - [`ReaderSettings`]: library-level tuning of the worker pool and failure policy
//! - [`Cli`]: command-line arguments via clap, with `REGION_`-prefixed
//!   environment variable fallbacks
//!
//! # Example
//!
//! ```ignore
//! use wsi_region_reader::config::{Cli, Command};
//! use clap::Parser;
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Command::Read(config) => println!("Reading {}", config.input.display()),
//!     Command::Levels(config) => println!("Inspecting {}", config.input.display()),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `REGION_WORKERS` - Worker threads per read (default: available parallelism - 1)
//! - `REGION_QUEUE_CAPACITY` - Bounded tile queue length (default: 2 x workers)
//! - `REGION_PYRAMID_LEVELS` - Levels built when opening an image file (default: 4)
//! - `REGION_TILE_RETRIES` - Retries per failed tile with a fresh reader (default: 0)
//! - `REGION_MAX_FAILED_TILES` - Fail the read above this many failed tiles (default: unlimited)
//! - `REGION_JPEG_QUALITY` - Quality for JPEG output (default: 90)

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use crate::tile::{ChannelSelection, Rect};

// =============================================================================
// Default Values
// =============================================================================

/// Default time a borrower waits for a pooled reader or buffer.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default tick of the submit/drain loops.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default number of levels built when opening an image file.
pub const DEFAULT_PYRAMID_LEVELS: usize = 4;

/// Default JPEG quality for written regions.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Worker threads used when none are configured: one less than the
/// available parallelism, and at least one.
pub fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(1)
        .max(1)
}

// =============================================================================
// Reader Settings
// =============================================================================

/// Tuning for one [`RegionReader`](crate::region::RegionReader).
///
/// Settings are fixed for the duration of a read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReaderSettings {
    /// Worker threads, and capacity of the reader and buffer pools
    pub workers: usize,

    /// Tiles that may wait in the queue before submission blocks
    pub queue_capacity: usize,

    /// How long a worker waits for a pooled reader or buffer
    pub acquire_timeout: Duration,

    /// Tick of the submit-retry and drain loops; progress is reported each tick
    pub poll_interval: Duration,

    /// Extra attempts for a failed tile, each with a freshly cloned reader
    pub tile_retries: u32,

    /// Fail the read when more tiles than this fail. `None` tolerates any number.
    pub max_failed_tiles: Option<usize>,

    /// Return the partially filled region when a read is cancelled
    pub keep_partial_on_cancel: bool,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        let workers = default_worker_count();
        Self {
            workers,
            queue_capacity: workers * 2,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            tile_retries: 0,
            max_failed_tiles: None,
            keep_partial_on_cancel: false,
        }
    }
}

impl ReaderSettings {
    /// Set the worker count, keeping the queue at twice the workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self.queue_capacity = workers * 2;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_tile_retries(mut self, retries: u32) -> Self {
        self.tile_retries = retries;
        self
    }

    pub fn with_max_failed_tiles(mut self, limit: Option<usize>) -> Self {
        self.max_failed_tiles = limit;
        self
    }

    pub fn with_keep_partial_on_cancel(mut self, keep: bool) -> Self {
        self.keep_partial_on_cancel = keep;
        self
    }

    /// Validate the settings and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("workers must be greater than 0".to_string());
        }
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be greater than 0".to_string());
        }
        if self.poll_interval.is_zero() {
            return Err("poll_interval must be greater than 0".to_string());
        }
        if self.acquire_timeout.is_zero() {
            return Err("acquire_timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// WSI Region Reader - concurrent region extraction from pyramidal images.
///
/// Opens an image as a multi-resolution pyramid and reads rectangular regions
/// at any power-of-two resolution, decoding tiles in parallel.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-region-reader")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Read a region and write it as PNG or JPEG
    Read(ReadConfig),

    /// Show the usable resolution levels of an image
    Levels(LevelsConfig),
}

/// Arguments of the `read` command.
#[derive(Args, Debug, Clone)]
pub struct ReadConfig {
    // =========================================================================
    // Input / Output
    // =========================================================================
    /// Image file to read from (PNG or JPEG).
    pub input: PathBuf,

    /// Output file; the extension selects PNG or JPEG.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Number of power-of-two levels to build for the input image.
    #[arg(long, default_value_t = DEFAULT_PYRAMID_LEVELS, env = "REGION_PYRAMID_LEVELS")]
    pub pyramid_levels: usize,

    // =========================================================================
    // Region
    // =========================================================================
    /// Image series.
    #[arg(long, default_value_t = 0)]
    pub series: usize,

    /// Requested resolution as a power-of-two shift (0 = full resolution).
    #[arg(short, long, default_value_t = 0)]
    pub resolution: u32,

    /// Left edge in full-resolution pixels.
    #[arg(long, default_value_t = 0)]
    pub x: u32,

    /// Top edge in full-resolution pixels.
    #[arg(long, default_value_t = 0)]
    pub y: u32,

    /// Width in full-resolution pixels (default: to the right edge).
    #[arg(long)]
    pub width: Option<u32>,

    /// Height in full-resolution pixels (default: to the bottom edge).
    #[arg(long)]
    pub height: Option<u32>,

    #[arg(long, default_value_t = 0)]
    pub z: u32,

    #[arg(long, default_value_t = 0)]
    pub t: u32,

    /// Single channel to read. All channels when omitted.
    #[arg(short, long)]
    pub channel: Option<u32>,

    // =========================================================================
    // Tiling and Workers
    // =========================================================================
    /// Tile width (default: decoder hint rounded to a power of two, else 512).
    #[arg(long)]
    pub tile_width: Option<u32>,

    /// Tile height (default: decoder hint rounded to a power of two, else 512).
    #[arg(long)]
    pub tile_height: Option<u32>,

    /// Worker threads.
    #[arg(long, env = "REGION_WORKERS")]
    pub workers: Option<usize>,

    /// Bounded tile queue length.
    #[arg(long, env = "REGION_QUEUE_CAPACITY")]
    pub queue_capacity: Option<usize>,

    /// Seconds to wait for a pooled reader or buffer.
    #[arg(long, default_value_t = DEFAULT_ACQUIRE_TIMEOUT.as_secs())]
    pub acquire_timeout_secs: u64,

    // =========================================================================
    // Failure Policy
    // =========================================================================
    /// Retries per failed tile, each with a freshly cloned reader.
    #[arg(long, default_value_t = 0, env = "REGION_TILE_RETRIES")]
    pub retries: u32,

    /// Fail the read when more tiles than this fail.
    #[arg(long, env = "REGION_MAX_FAILED_TILES")]
    pub max_failed_tiles: Option<usize>,

    /// Write whatever was decoded when the read is interrupted.
    #[arg(long, default_value_t = false)]
    pub keep_partial: bool,

    // =========================================================================
    // Output
    // =========================================================================
    /// JPEG quality (1-100) when writing JPEG.
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "REGION_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Print the read report as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ReadConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.pyramid_levels == 0 {
            return Err("pyramid_levels must be greater than 0".to_string());
        }
        if self.width == Some(0) || self.height == Some(0) {
            return Err("width and height must be greater than 0".to_string());
        }
        if self.tile_width == Some(0) || self.tile_height == Some(0) {
            return Err("tile_width and tile_height must be greater than 0".to_string());
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }
        if self.acquire_timeout_secs == 0 {
            return Err("acquire_timeout_secs must be greater than 0".to_string());
        }
        self.reader_settings().validate()
    }

    /// Build reader settings, falling back to defaults for unset values.
    pub fn reader_settings(&self) -> ReaderSettings {
        let mut settings = ReaderSettings::default();
        if let Some(workers) = self.workers {
            settings = settings.with_workers(workers);
        }
        if let Some(capacity) = self.queue_capacity {
            settings = settings.with_queue_capacity(capacity);
        }
        settings
            .with_acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
            .with_tile_retries(self.retries)
            .with_max_failed_tiles(self.max_failed_tiles)
            .with_keep_partial_on_cancel(self.keep_partial)
    }

    /// Requested rectangle in full-resolution pixels, extended to the image
    /// edge where width or height are unset.
    pub fn region(&self, full_width: u32, full_height: u32) -> Rect {
        Rect::new(
            self.x,
            self.y,
            self.width
                .unwrap_or_else(|| full_width.saturating_sub(self.x)),
            self.height
                .unwrap_or_else(|| full_height.saturating_sub(self.y)),
        )
    }

    pub fn channels(&self) -> ChannelSelection {
        self.channel
            .map(ChannelSelection::Single)
            .unwrap_or(ChannelSelection::All)
    }
}

/// Arguments of the `levels` command.
#[derive(Args, Debug, Clone)]
pub struct LevelsConfig {
    /// Image file to inspect.
    pub input: PathBuf,

    /// Number of power-of-two levels to build for the input image.
    #[arg(long, default_value_t = DEFAULT_PYRAMID_LEVELS, env = "REGION_PYRAMID_LEVELS")]
    pub pyramid_levels: usize,

    #[arg(long, default_value_t = 0)]
    pub series: usize,

    /// Show the reader level chosen for every requested resolution up to this one.
    #[arg(long, default_value_t = 8)]
    pub max_resolution: u32,

    /// Print as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl LevelsConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.pyramid_levels == 0 {
            return Err("pyramid_levels must be greater than 0".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
