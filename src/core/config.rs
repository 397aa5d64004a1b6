//! Typed map configuration.
//!
//! Options are plain serde structs with explicit defaults. They are validated
//! once when turned into runtime objects, never re-checked on the hot path.

use serde::{Deserialize, Serialize};

use crate::core::constants::{DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM};
use crate::core::crs::Crs;
use crate::core::geo::{LatLng, LatLngBounds, Point};
use crate::core::viewport::Viewport;
use crate::Result;

/// Initial view and limits of a map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapOptions {
    /// CRS code resolved through [`Crs::from_code`]
    pub crs: String,
    pub center: LatLng,
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Viewport size in pixels
    pub size: Point,
    pub max_bounds: Option<LatLngBounds>,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            crs: "EPSG:3857".to_string(),
            center: LatLng::default(),
            zoom: 0.0,
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            size: Point::new(800.0, 600.0),
            max_bounds: None,
        }
    }
}

impl MapOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Resolves the CRS and builds a viewport honouring the limits
    pub fn into_viewport(self) -> Result<Viewport> {
        let crs = Crs::from_code(&self.crs)?;
        let mut viewport = Viewport::with_zoom_limits(
            crs,
            self.center,
            self.zoom,
            self.size,
            self.min_zoom,
            self.max_zoom,
        )?;
        viewport.set_max_bounds(self.max_bounds)?;
        Ok(viewport)
    }
}
