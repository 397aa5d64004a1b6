//! Prelude module for common mapgrid types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use mapgrid::prelude::*;`

pub use crate::core::{
    bounds::Bounds,
    config::MapOptions,
    crs::{Crs, DistanceModel, ZoomScale, EPSG3395, EPSG3857, EPSG4326, EPSG900913, SIMPLE},
    geo::{LatLng, LatLngBounds, Point, TileCoord, TileKey},
    projection::{LonLat, Mercator, Projection, SphericalMercator},
    transformation::Transformation,
    viewport::{ViewEvent, Viewport},
};

pub use crate::layers::animation::{EasingType, LevelTransform};

pub use crate::layers::tile::{
    compute_visible_tile_range, FrozenLevel, GridOptions, GridState, LoadId, TileEntry, TileEvent,
    TileFuture, TileGrid, TileLevel, TileLoadError, TileProducer, TileRange, TileStatus,
};

pub use crate::tiles::{HttpTileProducer, TemplateSource, TileSource};

pub use crate::traits::ViewObserver;

pub use crate::{MapError, Result};

pub use instant::Instant;
pub use std::{sync::Arc, time::Duration};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
