//! Tile grid engine
//!
//! Computes which tiles a viewport needs, keeps one cache entry per tile,
//! drives their asynchronous loads and double-buffers levels across zoom
//! animations. Painting the tiles is left to whoever consumes the
//! [`TileEvent`] stream.

pub mod layer;
pub mod loader;
pub mod range;
pub mod types;

pub use layer::TileGrid;
pub use loader::{Completion, LoadId, LoadScheduler, TileFuture, TileLoadError, TileProducer};
pub use range::{
    compute_visible_tile_range, desired_coords, sort_by_center_distance, try_visible_tile_range,
    TileRange,
};
pub use types::{
    FrozenLevel, GridOptions, GridState, TileEntry, TileEvent, TileLevel, TileStatus,
};
