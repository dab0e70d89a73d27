//! Slide abstraction layer.
//!
//! This module defines the narrow capability a region read needs from an
//! image decoder, plus the pieces built directly on top of it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         RegionReader (coordinator)      │
//! └──────────┬─────────────────────┬────────┘
//!            │                     │
//!            ▼                     ▼
//! ┌────────────────────┐  ┌─────────────────────┐
//! │  ResolutionTable   │  │     ReaderPool      │
//! │ (usable levels)    │  │ (one clone/worker)  │
//! └──────────┬─────────┘  └──────────┬──────────┘
//!            └──────────┬────────────┘
//!                       ▼
//! ┌─────────────────────────────────────────┐
//! │             Decoder Trait               │
//! │   (bind, sizes, plane bytes, clone)     │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │  MemoryDecoder  │    │   open_pyramid()    │
//! │ (in-memory)     │    │ (PNG/JPEG -> levels)│
//! └─────────────────┘    └─────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use wsi_region_reader::slide::{open_pyramid, ResolutionTable};
//!
//! let mut decoder = open_pyramid(Path::new("slide.png"), 4)?;
//! let table = ResolutionTable::build(&mut decoder, 0)?;
//!
//! // closest usable level for a 1/8 scale read
//! let resolved = table.resolve(3);
//! ```

mod decoder;
mod image_file;
mod memory;
mod resolution;

pub use decoder::Decoder;
pub use image_file::open_pyramid;
pub use memory::{MemoryDecoder, MemoryLevel, MemorySeries};
pub use resolution::{NativeLevel, ResolutionTable, ResolvedLevel, LEVEL_TOLERANCE};
