//! Region reads.
//!
//! This module ties the other layers together into one call:
//!
//! ```text
//! ReadRequest (level 0 rect, resolution, z/t/channels)
//!      │
//!      ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────────┐
//! │ Resolution   │──►│ Tile planner │──►│ Workers + pools      │
//! │ table        │   │              │   │ (write ResultCanvas) │
//! └──────────────┘   └──────────────┘   └──────────┬───────────┘
//!                                                  ▼
//!                                   residual 2x downscale passes
//!                                                  │
//!                                                  ▼
//!                                   ReadOutcome ─► RegionEncoder
//! ```
//!
//! - [`RegionReader`]: job coordinator, entry point for reads
//! - [`ResultCanvas`]: destination planes and in-place downscaling
//! - [`RegionEncoder`]: PNG/JPEG output
//! - [`Sample`] / [`PixelType`]: typed samples decoded from raw bytes

pub(crate) mod canvas;
mod coordinator;
mod encoder;
mod job;
pub(crate) mod sample;

pub use canvas::ResultCanvas;
pub use coordinator::RegionReader;
pub use encoder::{EncodableSample, OutputFormat, RegionEncoder, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY};
pub use job::{FailedTile, JobState, ReadOutcome, ReadReport, ReadRequest, RegionImage};
pub use sample::{PixelType, Sample};
