//! Tile planning and decoding.
//!
//! A region read is split into tiles by the planner and each tile is decoded
//! by a worker on the coordinator's thread pool.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │               Job Coordinator            │
//! └─────────┬───────────────────────┬────────┘
//!           │ plan()                │ TileJob (bounded queue)
//!           ▼                       ▼
//! ┌──────────────────┐    ┌──────────────────────────────┐
//! │   Tile Planner   │    │         Tile Worker          │
//! │ (row-major grid, │    │ borrow reader + buffer       │
//! │  clipped edges)  │    │ read → split → convert       │
//! └──────────────────┘    │ write into canvas target     │
//!                         └──────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`Rect`]: pixel rectangle with clipping and pyramid shifting
//! - [`plan`]: covering, non-overlapping tile grid over a region
//! - [`TilePlan`] / [`Tile`]: the planned work
//! - the tile worker, internal to the crate, driven by the coordinator

mod planner;
pub(crate) mod worker;

pub use planner::{
    default_tile_size, plan, ChannelSelection, PlanePosition, Rect, Tile, TilePlan,
    DEFAULT_TILE_SIZE,
};
