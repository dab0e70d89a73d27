//! # WSI Region Reader
//!
//! Concurrent region extraction from multi-resolution (pyramidal) images.
//!
//! Given a decoder for a large tiled image, this library reads an arbitrary
//! rectangle at any power-of-two resolution: it picks the closest native
//! pyramid level, splits the region into tiles, decodes the tiles in parallel
//! on a bounded worker pool, assembles them into one canvas and applies any
//! residual 2x downscaling.
//!
//! ## Features
//!
//! - **Sparse pyramids**: only levels that are clean power-of-two reductions are used
//! - **Pooled decoders**: each worker decodes through its own cloned handle
//! - **Backpressure**: tiles are submitted through a bounded queue
//! - **Cooperative cancellation**: progress callback or [`CancellationToken`]
//! - **Partial failure tolerance**: a failed tile leaves a gap, not an error
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`slide`] - Decoder capability trait, in-memory and image-file decoders, resolution table
//! - [`pool`] - Bounded pools of decoder handles and tile work buffers
//! - [`tile`] - Tile geometry, planning and the per-tile worker
//! - [`region`] - Job coordinator, result canvas and output encoding
//! - [`config`] - Reader settings and CLI types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use wsi_region_reader::{open_pyramid, ReadRequest, Rect, RegionEncoder, RegionReader};
//!
//! let decoder = open_pyramid(Path::new("slide.png"), 4).unwrap();
//! let reader = RegionReader::new(decoder);
//!
//! // 1/4 scale read of a 2048x2048 full-resolution region, all channels
//! let request = ReadRequest::new(Rect::new(1024, 1024, 2048, 2048))
//!     .at_resolution(2)
//!     .with_all_channels();
//!
//! let outcome = reader
//!     .read_region::<u8, _>(&request, |done, total| {
//!         println!("{done}/{total} tiles");
//!         true
//!     })
//!     .unwrap();
//!
//! if let Some(image) = outcome.into_image() {
//!     RegionEncoder::new()
//!         .write(&image, Path::new("region.png"))
//!         .unwrap();
//! }
//! ```
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod config;
pub mod error;
pub mod pool;
pub mod region;
pub mod slide;
pub mod tile;

// Re-export commonly used types
pub use config::{Cli, Command, LevelsConfig, ReadConfig, ReaderSettings};
pub use error::{DecodeError, RegionError};
pub use pool::{BoundTarget, BufferPool, PooledBuffer, PooledReader, ReaderPool};
pub use region::{
    EncodableSample, FailedTile, JobState, OutputFormat, PixelType, ReadOutcome, ReadReport,
    ReadRequest, RegionEncoder, RegionImage, RegionReader, ResultCanvas, Sample,
};
pub use slide::{
    open_pyramid, Decoder, MemoryDecoder, MemoryLevel, MemorySeries, NativeLevel,
    ResolutionTable, ResolvedLevel, LEVEL_TOLERANCE,
};
pub use tile::{
    default_tile_size, plan, ChannelSelection, PlanePosition, Rect, Tile, TilePlan,
    DEFAULT_TILE_SIZE,
};
