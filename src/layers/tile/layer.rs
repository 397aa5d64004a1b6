//! The tile grid: keeps one cache entry per visible tile in sync with a
//! moving viewport.
//!
//! All state is mutated from the caller's loop. Tile producers only hand back
//! futures; their results are applied by [`TileGrid::tick`] (or while
//! awaiting [`TileGrid::settled`]). A result whose entry has been evicted or
//! replaced in the meantime is dropped.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::core::bounds::Bounds;
use crate::core::constants::BACKGROUND_KEEP_RATIO;
use crate::core::crs::{wrap_index, Crs};
use crate::core::geo::{LatLng, LatLngBounds, Point, TileCoord, TileKey};
use crate::core::viewport::{ViewEvent, Viewport};
use crate::layers::animation::LevelTransform;
use crate::layers::tile::loader::{Completion, LoadId, LoadScheduler, TileProducer};
use crate::layers::tile::range::{
    compute_visible_tile_range, desired_coords, sort_by_center_distance, try_visible_tile_range,
    TileRange,
};
use crate::layers::tile::types::{
    FrozenLevel, GridOptions, GridState, TileEntry, TileEvent, TileLevel, TileStatus,
};
use crate::prelude::{HashMap, HashSet, Instant};
use crate::traits::ViewObserver;
use crate::{MapError, Result};

pub struct TileGrid<P: TileProducer> {
    options: GridOptions,
    crs: &'static Crs,
    producer: P,

    level: Option<TileLevel<P::Handle>>,
    background: Option<FrozenLevel<P::Handle>>,
    tile_zoom: Option<i32>,

    wrap_x: Option<(i32, i32)>,
    wrap_y: Option<(i32, i32)>,
    global_tile_range: Option<TileRange>,

    state: GridState,
    tiles_to_load: usize,
    tiles_total: u64,

    loads: LoadScheduler<P::Handle>,
    next_load_id: u64,

    events_tx: Sender<TileEvent>,
    events_rx: Receiver<TileEvent>,

    zooming: bool,
    background_deadline: Option<Instant>,
}

impl<P: TileProducer> TileGrid<P> {
    pub fn new(crs: &'static Crs, producer: P, options: GridOptions) -> Result<Self> {
        options.validate()?;
        let (events_tx, events_rx) = unbounded();

        Ok(Self {
            options,
            crs,
            producer,
            level: None,
            background: None,
            tile_zoom: None,
            wrap_x: None,
            wrap_y: None,
            global_tile_range: None,
            state: GridState::Idle,
            tiles_to_load: 0,
            tiles_total: 0,
            loads: LoadScheduler::new(),
            next_load_id: 0,
            events_tx,
            events_rx,
            zooming: false,
            background_deadline: None,
        })
    }

    pub fn options(&self) -> &GridOptions {
        &self.options
    }

    pub fn crs(&self) -> &'static Crs {
        self.crs
    }

    pub fn producer(&self) -> &P {
        &self.producer
    }

    pub fn state(&self) -> GridState {
        self.state
    }

    /// Entries still waiting for their producer
    pub fn tiles_to_load(&self) -> usize {
        self.tiles_to_load
    }

    /// Every load ever issued by this grid
    pub fn tiles_total(&self) -> u64 {
        self.tiles_total
    }

    pub fn tile_zoom(&self) -> Option<i32> {
        self.tile_zoom
    }

    pub fn is_zooming(&self) -> bool {
        self.zooming
    }

    pub fn level(&self) -> Option<&TileLevel<P::Handle>> {
        self.level.as_ref()
    }

    pub fn background(&self) -> Option<&FrozenLevel<P::Handle>> {
        self.background.as_ref()
    }

    pub fn entry(&self, key: &TileKey) -> Option<&TileEntry<P::Handle>> {
        self.level.as_ref().and_then(|level| level.get(key))
    }

    pub fn entries(&self) -> impl Iterator<Item = &TileEntry<P::Handle>> {
        self.level.iter().flat_map(|level| level.tiles.values())
    }

    pub fn len(&self) -> usize {
        self.level.as_ref().map_or(0, TileLevel::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receiver for lifecycle notifications. Every clone competes for the
    /// same queue.
    pub fn events(&self) -> Receiver<TileEvent> {
        self.events_rx.clone()
    }

    /// Takes every notification queued so far
    pub fn drain_events(&self) -> Vec<TileEvent> {
        self.events_rx.try_iter().collect()
    }

    /// Replaces the geographic restriction; applied on the next update
    pub fn set_bounds(&mut self, bounds: Option<LatLngBounds>) -> Result<()> {
        let mut options = self.options.clone();
        options.bounds = bounds;
        options.validate()?;
        self.options = options;
        Ok(())
    }

    /// Fade-in opacity of a cached tile at `now`
    pub fn tile_opacity(&self, key: &TileKey, now: Instant) -> Option<f64> {
        let fade = self.options.fade_duration();
        self.entry(key)
            .map(|entry| entry.opacity_at(now, fade, self.options.fade_easing))
    }

    /// Brings tile indices into the world on wrapped axes
    pub fn wrap_coords(&self, coord: &TileCoord) -> TileCoord {
        TileCoord::new(
            self.wrap_x.map_or(coord.x, |range| wrap_index(coord.x, range)),
            self.wrap_y.map_or(coord.y, |range| wrap_index(coord.y, range)),
            coord.z,
        )
    }

    /// Canonical cache key of a possibly unwrapped coordinate
    pub fn key_for(&self, coord: &TileCoord) -> TileKey {
        self.wrap_coords(coord).key()
    }

    /// Geographic footprint of a tile
    pub fn tile_coords_to_bounds(&self, coord: &TileCoord) -> Result<LatLngBounds> {
        let tile_size = self.options.tile_size as f64;
        let nw_point = Point::new(coord.x as f64, coord.y as f64) * tile_size;
        let se_point = nw_point + Point::new(tile_size, tile_size);
        let zoom = coord.z as f64;

        let nw = self.crs.point_to_lat_lng(nw_point, zoom)?;
        let se = self.crs.point_to_lat_lng(se_point, zoom)?;
        let bounds = LatLngBounds::from_corners(nw, se);

        if self.options.no_wrap {
            Ok(bounds)
        } else {
            Ok(self.crs.wrap_lat_lng_bounds(&bounds))
        }
    }

    /// Inside the world on non-wrapped axes and overlapping the restriction
    pub fn is_valid_tile(&self, coord: &TileCoord) -> Result<bool> {
        if let Some(global) = &self.global_tile_range {
            let x_bounded = self.crs.wrap_lng().is_none() || self.options.no_wrap;
            if x_bounded && (coord.x < global.min_x || coord.x > global.max_x) {
                return Ok(false);
            }
            let y_bounded = self.crs.wrap_lat().is_none() || self.options.no_wrap;
            if y_bounded && (coord.y < global.min_y || coord.y > global.max_y) {
                return Ok(false);
            }
        }

        match &self.options.bounds {
            Some(restriction) => Ok(restriction.overlaps(&self.tile_coords_to_bounds(coord)?)),
            None => Ok(true),
        }
    }

    /// Whether `coord` would be fetched now: valid and not cached under its key
    pub fn admit(&self, coord: &TileCoord) -> Result<bool> {
        if self.entry(&self.key_for(coord)).is_some() {
            return Ok(false);
        }
        self.is_valid_tile(coord)
    }

    /// Re-derives the desired tile set from the viewport
    pub fn update(&mut self, viewport: &Viewport) -> Result<()> {
        self.check_crs(viewport)?;
        self.set_view(viewport, viewport.center(), viewport.zoom(), false)
    }

    /// Hard reset followed by an update
    pub fn redraw(&mut self, viewport: &Viewport) -> Result<()> {
        self.reset();
        self.update(viewport)
    }

    /// Drops every cached tile and the background level
    pub fn reset(&mut self) {
        log::debug!("tile grid hard reset at zoom {:?}", self.tile_zoom);
        self.unload_front();
        self.clear_background();
        self.level = None;
        self.tile_zoom = None;
        self.global_tile_range = None;
        self.wrap_x = None;
        self.wrap_y = None;
        self.zooming = false;
        self.background_deadline = None;
    }

    /// Starts an animated zoom towards `center`/`zoom`. The current level is
    /// frozen as background unless it is under half loaded while the older
    /// background is at least half loaded.
    pub fn zoom_anim(&mut self, viewport: &Viewport, center: LatLng, zoom: f64) -> Result<()> {
        self.check_crs(viewport)?;
        let target = self.clamp_tile_zoom(zoom);

        if target != self.tile_zoom {
            self.freeze_front();
        }

        self.zooming = true;
        self.background_deadline = None;

        if self.options.update_when_zooming || target == self.tile_zoom {
            self.set_view(viewport, center, zoom, true)
        } else {
            self.set_zoom_transforms(viewport, center, zoom)
        }
    }

    /// Ends a zoom animation; the background goes away once the new level
    /// settles or the timeout elapses
    pub fn zoom_end(&mut self, viewport: &Viewport) -> Result<()> {
        let was_zooming = self.zooming;
        self.zooming = false;
        self.update(viewport)?;
        if was_zooming && self.background.is_some() {
            self.background_deadline = Some(Instant::now() + self.options.background_timeout());
        }
        Ok(())
    }

    /// One scheduler tick at the current time
    pub fn tick(&mut self) -> usize {
        self.tick_at(Instant::now())
    }

    /// Applies every finished load and expires the background. Returns how
    /// many completions were processed, stale ones included.
    pub fn tick_at(&mut self, now: Instant) -> usize {
        let completions = self.loads.poll_ready();
        let processed = completions.len();
        for completion in completions {
            self.complete(completion, now);
        }
        self.maybe_clear_background(now);
        processed
    }

    /// Waits until every admitted tile has loaded or errored
    pub async fn settled(&mut self) {
        while self.tiles_to_load > 0 {
            match self.loads.next().await {
                Some(completion) => self.complete(completion, Instant::now()),
                None => break,
            }
        }
        self.maybe_clear_background(Instant::now());
    }

    fn check_crs(&self, viewport: &Viewport) -> Result<()> {
        if self.crs.same_as(viewport.crs()) {
            Ok(())
        } else {
            Err(MapError::InvalidConfig(format!(
                "tile grid uses {} but the viewport uses {}",
                self.crs.code(),
                viewport.crs().code()
            )))
        }
    }

    /// Integer tile zoom for a map zoom, `None` outside the zoom limits
    fn clamp_tile_zoom(&self, zoom: f64) -> Option<i32> {
        let tile_zoom = zoom.round();
        if tile_zoom > self.options.max_zoom || tile_zoom < self.options.min_zoom {
            return None;
        }

        let mut tile_zoom = tile_zoom as i32;
        if let Some(max_native) = self.options.max_native_zoom {
            tile_zoom = tile_zoom.min(max_native);
        }
        if let Some(min_native) = self.options.min_native_zoom {
            tile_zoom = tile_zoom.max(min_native);
        }
        Some(tile_zoom)
    }

    fn set_view(
        &mut self,
        viewport: &Viewport,
        center: LatLng,
        zoom: f64,
        animating: bool,
    ) -> Result<()> {
        let tile_zoom = self.clamp_tile_zoom(zoom);

        if tile_zoom != self.tile_zoom || self.level.is_none() {
            if tile_zoom != self.tile_zoom {
                log::debug!(
                    "tile zoom {:?} -> {:?} (animated: {animating})",
                    self.tile_zoom,
                    tile_zoom
                );
            }
            self.unload_front();
            self.tile_zoom = tile_zoom;
            self.reset_grid(viewport)?;
        }

        if let Some(tile_zoom) = tile_zoom {
            self.update_range(viewport, center, zoom, tile_zoom)?;
        }
        self.set_zoom_transforms(viewport, center, zoom)
    }

    fn reset_grid(&mut self, viewport: &Viewport) -> Result<()> {
        let Some(tile_zoom) = self.tile_zoom else {
            self.level = None;
            self.global_tile_range = None;
            self.wrap_x = None;
            self.wrap_y = None;
            return Ok(());
        };

        let zoom = tile_zoom as f64;
        let tile_size = self.options.tile_size;

        let origin_lat_lng = viewport.unproject(viewport.pixel_origin(), None)?;
        let origin = self.crs.lat_lng_to_point(origin_lat_lng, zoom)?.round();
        self.level = Some(TileLevel::new(tile_zoom, origin));

        // round before dividing so float noise at the world edge cannot
        // add or drop a whole tile column
        self.global_tile_range = self.crs.projected_bounds(zoom).map(|bounds| {
            let bounds = Bounds::new(bounds.min.round(), bounds.max.round());
            compute_visible_tile_range(&bounds, tile_size)
        });

        let tile_size = tile_size as f64;
        self.wrap_x = match self.crs.wrap_lng() {
            Some((west, east)) if !self.options.no_wrap => {
                let west = self.crs.lat_lng_to_point(LatLng::new(0.0, west), zoom)?;
                let east = self.crs.lat_lng_to_point(LatLng::new(0.0, east), zoom)?;
                Some(wrap_span(west.x, east.x, tile_size))
            }
            _ => None,
        };
        // y-flipping transformations put the southern edge below the northern one
        self.wrap_y = match self.crs.wrap_lat() {
            Some((south, north)) if !self.options.no_wrap => {
                let south = self.crs.lat_lng_to_point(LatLng::new(south, 0.0), zoom)?;
                let north = self.crs.lat_lng_to_point(LatLng::new(north, 0.0), zoom)?;
                Some(wrap_span(south.y, north.y, tile_size))
            }
            _ => None,
        };
        Ok(())
    }

    /// Pixel area (at the tile zoom) covered by the view at `center`/`zoom`
    fn tiled_pixel_bounds(
        &self,
        viewport: &Viewport,
        center: LatLng,
        zoom: f64,
        tile_zoom: i32,
    ) -> Result<Bounds> {
        let scale = self.crs.scale(zoom) / self.crs.scale(tile_zoom as f64);
        let pixel_center = self.crs.lat_lng_to_point(center, tile_zoom as f64)?.floor();
        let half_size = viewport.size() / (scale * 2.0);
        Ok(Bounds::new(pixel_center - half_size, pixel_center + half_size))
    }

    fn update_range(
        &mut self,
        viewport: &Viewport,
        center: LatLng,
        zoom: f64,
        tile_zoom: i32,
    ) -> Result<()> {
        let pixel_bounds = self.tiled_pixel_bounds(viewport, center, zoom, tile_zoom)?;
        let range = try_visible_tile_range(&pixel_bounds, self.options.tile_size)?;
        let keep_range = range.pad(self.options.keep_buffer);

        let mut desired = HashSet::default();
        for coord in desired_coords(&keep_range, tile_zoom) {
            if self.is_valid_tile(&coord)? {
                desired.insert(self.key_for(&coord));
            }
        }

        let mut queue = Vec::new();
        let mut queued = HashSet::default();
        for coord in desired_coords(&range, tile_zoom) {
            let key = self.key_for(&coord);
            // two unwrapped coordinates can share one wrapped key
            if queued.contains(&key) || !self.admit(&coord)? {
                continue;
            }
            queued.insert(key);
            queue.push(coord);
        }
        sort_by_center_distance(&mut queue, range.center());

        if !queue.is_empty() {
            if self.state != GridState::Populating {
                self.state = GridState::Populating;
                self.emit(TileEvent::Loading);
            }
            for coord in queue {
                self.add_tile(coord);
            }
        }

        if self.options.evict {
            self.evict_outside(&desired);
        }
        self.check_settled();
        Ok(())
    }

    fn add_tile(&mut self, coord: TileCoord) {
        if self.level.is_none() {
            return;
        }
        let wrapped = self.wrap_coords(&coord);
        let key = wrapped.key();

        self.next_load_id += 1;
        let load_id = LoadId(self.next_load_id);
        log::trace!("requesting tile {wrapped} ({load_id})");

        let future = self.producer.produce(wrapped);
        self.loads.spawn(key, load_id, future);
        if let Some(level) = self.level.as_mut() {
            level.tiles.insert(key, TileEntry::loading(wrapped, load_id));
        }

        self.tiles_to_load += 1;
        self.tiles_total += 1;
        self.emit(TileEvent::RequestStart { coord: wrapped });
    }

    fn complete(&mut self, completion: Completion<P::Handle>, now: Instant) {
        let Completion {
            key,
            load_id,
            result,
        } = completion;

        let Some(entry) = self.level.as_mut().and_then(|level| level.tiles.get_mut(&key)) else {
            log::trace!("ignoring completion {load_id} for evicted tile {key}");
            return;
        };
        if entry.load_id != load_id || entry.status != TileStatus::Loading {
            log::trace!("ignoring stale completion {load_id} for tile {key}");
            return;
        }

        entry.loaded_at = Some(now);
        let coord = entry.coord;
        let event = match result {
            Ok(handle) => {
                entry.status = TileStatus::Loaded;
                entry.handle = Some(handle);
                TileEvent::Ready { coord }
            }
            Err(error) => {
                log::warn!("tile {coord} failed to load: {error}");
                entry.status = TileStatus::Errored;
                entry.error = Some(error.clone());
                TileEvent::Error { coord, error }
            }
        };

        self.tiles_to_load = self.tiles_to_load.saturating_sub(1);
        self.emit(event);
        self.check_settled();
    }

    fn check_settled(&mut self) {
        if self.state == GridState::Populating && self.tiles_to_load == 0 {
            self.state = GridState::Settled;
            let zoom = self.tile_zoom.unwrap_or_default();
            log::debug!("tile batch settled at zoom {zoom} ({} loads so far)", self.tiles_total);
            self.emit(TileEvent::BatchSettled { zoom });
        }
    }

    fn evict_outside(&mut self, desired: &HashSet<TileKey>) {
        let stale: Vec<TileKey> = match &self.level {
            Some(level) => level
                .tiles
                .keys()
                .filter(|key| !desired.contains(key))
                .copied()
                .collect(),
            None => return,
        };
        for key in stale {
            self.remove_tile(&key);
        }
    }

    /// Removes one entry from the front level, emitting `Unload`
    pub fn remove_tile(&mut self, key: &TileKey) -> Option<TileEntry<P::Handle>> {
        let mut entry = self.level.as_mut()?.tiles.remove(key)?;

        if entry.status == TileStatus::Loading {
            self.tiles_to_load = self.tiles_to_load.saturating_sub(1);
            if self.options.abort_evicted_loads {
                self.loads.abort(entry.load_id);
            }
        }
        log::trace!("unloading tile {}", entry.coord);
        entry.status = TileStatus::Unloaded;
        self.emit(TileEvent::Unload { coord: entry.coord });
        Some(entry)
    }

    /// Unloads every front tile and abandons the current batch
    fn unload_front(&mut self) {
        let keys: Vec<TileKey> = match &self.level {
            Some(level) => level.tiles.keys().copied().collect(),
            None => Vec::new(),
        };
        for key in keys {
            self.remove_tile(&key);
        }
        self.tiles_to_load = 0;
        self.state = GridState::Idle;
    }

    fn freeze_front(&mut self) {
        let Some(level) = self.level.as_ref() else {
            return;
        };
        let front_ratio = level.loaded_ratio();
        let background_ratio = self.background.as_ref().map_or(0.0, FrozenLevel::loaded_ratio);

        if front_ratio < BACKGROUND_KEEP_RATIO && background_ratio >= BACKGROUND_KEEP_RATIO {
            log::debug!(
                "front level {} only {:.0}% loaded, keeping background ({:.0}%)",
                level.zoom,
                front_ratio * 100.0,
                background_ratio * 100.0
            );
            self.unload_front();
            return;
        }

        self.clear_background();

        let Some(mut level) = self.level.take() else {
            return;
        };
        let expected = level.len();
        let (loaded, unsettled): (HashMap<_, _>, HashMap<_, _>) = level
            .tiles
            .drain()
            .partition(|(_, entry)| entry.status == TileStatus::Loaded);

        let mut frozen = TileLevel::new(level.zoom, level.origin);
        frozen.transform = level.transform;
        frozen.tiles = loaded;
        log::debug!(
            "freezing level {} as background ({} of {expected} tiles loaded)",
            frozen.zoom,
            frozen.len()
        );

        // tiles still loading or errored unload through the usual path
        level.tiles = unsettled;
        self.level = Some(level);
        self.unload_front();
        self.level = None;

        self.background = Some(FrozenLevel {
            level: frozen,
            expected,
        });
    }

    fn set_zoom_transforms(
        &mut self,
        viewport: &Viewport,
        center: LatLng,
        zoom: f64,
    ) -> Result<()> {
        let new_origin = viewport.new_pixel_origin(center, zoom)?;
        let crs = self.crs;
        let transform_for = |level_zoom: i32, origin: Point| {
            let scale = crs.scale(zoom) / crs.scale(level_zoom as f64);
            LevelTransform::new((origin * scale - new_origin).round(), scale)
        };

        if let Some(level) = self.level.as_mut() {
            level.transform = transform_for(level.zoom, level.origin);
        }
        if let Some(background) = self.background.as_mut() {
            background.level.transform =
                transform_for(background.level.zoom, background.level.origin);
        }
        Ok(())
    }

    fn maybe_clear_background(&mut self, now: Instant) {
        if self.background.is_none() || self.zooming {
            return;
        }
        let expired = self.background_deadline.map_or(false, |deadline| now >= deadline);
        if self.state == GridState::Settled || expired {
            self.clear_background();
        }
    }

    fn clear_background(&mut self) {
        self.background_deadline = None;
        let Some(background) = self.background.take() else {
            return;
        };

        let zoom = background.zoom();
        log::debug!("clearing background level {zoom}");
        for entry in background.level.tiles.into_values() {
            self.emit(TileEvent::Unload { coord: entry.coord });
        }
        self.emit(TileEvent::BackgroundCleared { zoom });
    }

    fn emit(&self, event: TileEvent) {
        // the grid owns a receiver, so the channel never disconnects
        let _ = self.events_tx.send(event);
    }
}

/// Tile-index span between two projected world edges, in either order
fn wrap_span(a: f64, b: f64, tile_size: f64) -> (i32, i32) {
    let (low, high) = (a.min(b).round(), a.max(b).round());
    ((low / tile_size).floor() as i32, (high / tile_size).ceil() as i32)
}

impl<P: TileProducer> ViewObserver for TileGrid<P> {
    fn on_view_event(&mut self, event: &ViewEvent, viewport: &Viewport) -> Result<()> {
        match *event {
            ViewEvent::MoveEnd => self.update(viewport),
            ViewEvent::ViewReset => self.redraw(viewport),
            ViewEvent::ZoomAnim { center, zoom } => self.zoom_anim(viewport, center, zoom),
            ViewEvent::ZoomEnd => self.zoom_end(viewport),
        }
    }
}
