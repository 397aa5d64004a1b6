//! # mapgrid
//!
//! Coordinate reference systems, viewport math and a tile-grid cache for
//! slippy map engines, modelled on the way Leaflet lays out its tiles.
//!
//! The library is split into the pure geometry in [`core`] (points, bounds,
//! projections, CRS and the [`Viewport`]) and the [`TileGrid`] engine in
//! [`layers::tile`], which decides what tiles a view needs and tracks their
//! asynchronous loads. [`tiles`] provides an HTTP producer for URL templates.

pub mod core;
pub mod layers;
pub mod prelude;
pub mod tiles;
pub mod traits;
pub use crate::core::constants;

// Re-export public API
pub use core::{
    bounds::Bounds,
    config::MapOptions,
    crs::Crs,
    geo::{LatLng, LatLngBounds, Point, TileCoord, TileKey},
    projection::Projection,
    transformation::Transformation,
    viewport::{ViewEvent, Viewport},
};

pub use layers::tile::{GridOptions, TileEvent, TileGrid, TileLoadError, TileProducer, TileRange};

pub use tiles::{HttpTileProducer, TemplateSource, TileSource};

pub use traits::ViewObserver;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error type alias for convenience
pub type Error = MapError;
