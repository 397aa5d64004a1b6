//! Core data types for the tile grid

use serde::{Deserialize, Serialize};

use crate::core::constants::{
    DEFAULT_BACKGROUND_TIMEOUT_MS, DEFAULT_FADE_DURATION_MS, DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM,
    TILE_SIZE,
};
use crate::core::geo::{LatLngBounds, Point, TileCoord, TileKey};
use crate::layers::animation::{fade_opacity_at, EasingType, LevelTransform};
use crate::layers::tile::loader::{LoadId, TileLoadError};
use crate::prelude::{Duration, HashMap, Instant};
use crate::{MapError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridOptions {
    pub tile_size: u32,
    /// No tiles are shown below this map zoom
    pub min_zoom: f64,
    /// No tiles are shown above this map zoom
    pub max_zoom: f64,
    /// Tiles above this zoom are requested at this zoom and scaled up
    pub max_native_zoom: Option<i32>,
    /// Tiles below this zoom are requested at this zoom and scaled down
    pub min_native_zoom: Option<i32>,
    /// Disable longitude/latitude wrapping of tile indices
    pub no_wrap: bool,
    /// Only tiles overlapping these bounds are requested
    pub bounds: Option<LatLngBounds>,
    /// Tiles within this many tiles of the visible range survive eviction
    pub keep_buffer: u32,
    pub evict: bool,
    /// Request tiles for the target zoom while a zoom animation runs
    pub update_when_zooming: bool,
    pub fade_duration_ms: u64,
    /// Curve of the fade-in
    pub fade_easing: EasingType,
    pub background_timeout_ms: u64,
    /// Abort the producer future of a tile evicted before it finished
    pub abort_evicted_loads: bool,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            tile_size: TILE_SIZE,
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            max_native_zoom: None,
            min_native_zoom: None,
            no_wrap: false,
            bounds: None,
            keep_buffer: 0,
            evict: true,
            update_when_zooming: true,
            fade_duration_ms: DEFAULT_FADE_DURATION_MS,
            fade_easing: EasingType::Linear,
            background_timeout_ms: DEFAULT_BACKGROUND_TIMEOUT_MS,
            abort_evicted_loads: false,
        }
    }
}

impl GridOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tile_size == 0 {
            return Err(MapError::InvalidConfig("tile_size must be positive".into()));
        }
        if !self.min_zoom.is_finite() || !self.max_zoom.is_finite() {
            return Err(MapError::InvalidConfig("zoom limits must be finite".into()));
        }
        if self.min_zoom > self.max_zoom {
            return Err(MapError::InvalidConfig(format!(
                "min_zoom {} is greater than max_zoom {}",
                self.min_zoom, self.max_zoom
            )));
        }
        if let (Some(min), Some(max)) = (self.min_native_zoom, self.max_native_zoom) {
            if min > max {
                return Err(MapError::InvalidConfig(format!(
                    "min_native_zoom {min} is greater than max_native_zoom {max}"
                )));
            }
        }
        if let Some(bounds) = &self.bounds {
            if !bounds.is_valid() {
                return Err(MapError::InvalidConfig(format!(
                    "tile bounds {bounds:?} are not valid"
                )));
            }
        }
        Ok(())
    }

    pub fn fade_duration(&self) -> Duration {
        Duration::from_millis(self.fade_duration_ms)
    }

    pub fn background_timeout(&self) -> Duration {
        Duration::from_millis(self.background_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileStatus {
    Loading,
    Loaded,
    Errored,
    Unloaded,
}

/// One cached tile. `coord` is already wrapped into the world.
#[derive(Debug, Clone)]
pub struct TileEntry<H> {
    pub coord: TileCoord,
    pub status: TileStatus,
    pub handle: Option<H>,
    pub error: Option<TileLoadError>,
    pub requested_at: Instant,
    /// When the tile settled, loaded or errored
    pub loaded_at: Option<Instant>,
    pub(crate) load_id: LoadId,
}

impl<H> TileEntry<H> {
    pub(crate) fn loading(coord: TileCoord, load_id: LoadId) -> Self {
        Self {
            coord,
            status: TileStatus::Loading,
            handle: None,
            error: None,
            requested_at: Instant::now(),
            loaded_at: None,
            load_id,
        }
    }

    pub fn key(&self) -> TileKey {
        self.coord.key()
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.status, TileStatus::Loaded | TileStatus::Errored)
    }

    /// Fade-in opacity at `now`; zero until the tile has settled
    pub fn opacity_at(&self, now: Instant, fade: Duration, easing: EasingType) -> f64 {
        match self.loaded_at {
            Some(loaded_at) if self.is_settled() => fade_opacity_at(loaded_at, now, fade, easing),
            _ => 0.0,
        }
    }
}

/// The tiles of one integer zoom and where that zoom sits relative to the
/// current view
#[derive(Debug)]
pub struct TileLevel<H> {
    pub zoom: i32,
    /// World pixel position (at `zoom`) of the view's pixel origin
    pub origin: Point,
    pub transform: LevelTransform,
    pub(crate) tiles: HashMap<TileKey, TileEntry<H>>,
}

impl<H> TileLevel<H> {
    pub fn new(zoom: i32, origin: Point) -> Self {
        Self {
            zoom,
            origin,
            transform: LevelTransform::identity(),
            tiles: HashMap::default(),
        }
    }

    pub fn get(&self, key: &TileKey) -> Option<&TileEntry<H>> {
        self.tiles.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TileKey, &TileEntry<H>)> {
        self.tiles.iter()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn loaded_count(&self) -> usize {
        self.tiles
            .values()
            .filter(|entry| entry.status == TileStatus::Loaded)
            .count()
    }

    /// Share of tiles already loaded; an empty level counts as unloaded
    pub fn loaded_ratio(&self) -> f64 {
        if self.tiles.is_empty() {
            0.0
        } else {
            self.loaded_count() as f64 / self.tiles.len() as f64
        }
    }
}

/// A level frozen at the start of a zoom animation and drawn behind the
/// populating foreground until it is cleared.
#[derive(Debug)]
pub struct FrozenLevel<H> {
    pub level: TileLevel<H>,
    /// How many tiles the level had when frozen, loaded or not
    pub expected: usize,
}

impl<H> FrozenLevel<H> {
    pub fn zoom(&self) -> i32 {
        self.level.zoom
    }

    pub fn transform(&self) -> LevelTransform {
        self.level.transform
    }

    pub fn loaded_ratio(&self) -> f64 {
        if self.expected == 0 {
            0.0
        } else {
            self.level.loaded_count() as f64 / self.expected as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridState {
    Idle,
    /// Some admitted tiles have not settled yet
    Populating,
    /// Every admitted tile loaded or errored
    Settled,
}

/// Lifecycle notifications for the paint layer
#[derive(Debug, Clone, PartialEq)]
pub enum TileEvent {
    /// A new batch started populating
    Loading,
    RequestStart { coord: TileCoord },
    Ready { coord: TileCoord },
    Error { coord: TileCoord, error: TileLoadError },
    Unload { coord: TileCoord },
    /// Every tile of the current batch settled; fired once per batch
    BatchSettled { zoom: i32 },
    BackgroundCleared { zoom: i32 },
}
