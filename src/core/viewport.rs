use crate::core::bounds::Bounds;
use crate::core::constants::{DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM, MAX_ZOOM_LIMIT};
use crate::core::crs::Crs;
use crate::core::geo::{LatLng, LatLngBounds, Point};
use crate::{MapError, Result};

/// View-change signals raised by [`Viewport`] mutators and consumed by
/// observers such as the tile grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewEvent {
    /// The view settled after a pan, resize or zoom
    MoveEnd,
    /// The zoom changed without animation; observers must start over
    ViewReset,
    /// A zoom animation towards `center`/`zoom` is starting
    ZoomAnim { center: LatLng, zoom: f64 },
    /// A zoom (animated or not) has finished
    ZoomEnd,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingZoom {
    center: LatLng,
    zoom: f64,
}

/// Manages the current view of the map: center, zoom, and screen dimensions.
///
/// The pixel origin is recomputed from scratch on every center or zoom
/// change and is never shifted incrementally.
#[derive(Debug, Clone)]
pub struct Viewport {
    crs: &'static Crs,
    center: LatLng,
    zoom: f64,
    size: Point,
    min_zoom: f64,
    max_zoom: f64,
    pixel_origin: Point,
    max_bounds: Option<LatLngBounds>,
    pending_zoom: Option<PendingZoom>,
}

impl Viewport {
    /// Creates a new viewport with the default zoom limits (0 to 18). A zoom
    /// outside them is clamped; use [`Viewport::with_zoom_limits`] otherwise.
    pub fn new(crs: &'static Crs, center: LatLng, zoom: f64, size: Point) -> Result<Self> {
        Self::with_zoom_limits(crs, center, zoom, size, DEFAULT_MIN_ZOOM, DEFAULT_MAX_ZOOM)
    }

    /// Creates a viewport whose zoom is clamped into `min_zoom..=max_zoom`
    pub fn with_zoom_limits(
        crs: &'static Crs,
        center: LatLng,
        zoom: f64,
        size: Point,
        min_zoom: f64,
        max_zoom: f64,
    ) -> Result<Self> {
        center.ensure_finite()?;
        check_zoom(zoom)?;
        check_size(size)?;
        check_zoom_limits(min_zoom, max_zoom)?;

        let mut viewport = Self {
            crs,
            center,
            zoom: zoom.clamp(min_zoom, max_zoom),
            size,
            min_zoom,
            max_zoom,
            pixel_origin: Point::default(),
            max_bounds: None,
            pending_zoom: None,
        };
        viewport.pixel_origin = viewport.new_pixel_origin(center, viewport.zoom)?;
        Ok(viewport)
    }

    /// Sets the zoom limits, clamping the current zoom into them
    pub fn set_zoom_limits(&mut self, min_zoom: f64, max_zoom: f64) -> Result<()> {
        check_zoom_limits(min_zoom, max_zoom)?;

        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self.zoom = self.zoom.clamp(min_zoom, max_zoom);
        self.pixel_origin = self.new_pixel_origin(self.center, self.zoom)?;
        Ok(())
    }

    /// Restricts the center to `bounds` (or lifts the restriction)
    pub fn set_max_bounds(&mut self, bounds: Option<LatLngBounds>) -> Result<()> {
        if let Some(bounds) = &bounds {
            if !bounds.is_valid() {
                return Err(MapError::InvalidConfig(format!(
                    "max bounds {bounds:?} are not valid"
                )));
            }
        }
        self.max_bounds = bounds;
        self.center = self.clamp_center(self.center);
        self.pixel_origin = self.new_pixel_origin(self.center, self.zoom)?;
        Ok(())
    }

    pub fn crs(&self) -> &'static Crs {
        self.crs
    }

    pub fn center(&self) -> LatLng {
        self.center
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn size(&self) -> Point {
        self.size
    }

    pub fn min_zoom(&self) -> f64 {
        self.min_zoom
    }

    pub fn max_zoom(&self) -> f64 {
        self.max_zoom
    }

    pub fn max_bounds(&self) -> Option<&LatLngBounds> {
        self.max_bounds.as_ref()
    }

    /// True between `begin_zoom_animation` and `end_zoom_animation`
    pub fn is_zoom_animating(&self) -> bool {
        self.pending_zoom.is_some()
    }

    /// Moves the view. A zoom change raises `ViewReset`, `ZoomEnd` and
    /// `MoveEnd`; a pure move raises `MoveEnd`.
    pub fn set_view(&mut self, center: LatLng, zoom: f64) -> Result<Vec<ViewEvent>> {
        center.ensure_finite()?;
        check_zoom(zoom)?;

        let zoom = self.clamp_zoom(zoom);
        let center = self.clamp_center(center);
        let pixel_origin = self.new_pixel_origin(center, zoom)?;
        let zoom_changed = zoom != self.zoom;

        self.center = center;
        self.zoom = zoom;
        self.pixel_origin = pixel_origin;
        self.pending_zoom = None;

        if zoom_changed {
            log::debug!("view reset at zoom {zoom}, center {center}");
            Ok(vec![ViewEvent::ViewReset, ViewEvent::ZoomEnd, ViewEvent::MoveEnd])
        } else {
            Ok(vec![ViewEvent::MoveEnd])
        }
    }

    pub fn set_center(&mut self, center: LatLng) -> Result<Vec<ViewEvent>> {
        self.set_view(center, self.zoom)
    }

    pub fn set_zoom(&mut self, zoom: f64) -> Result<Vec<ViewEvent>> {
        self.set_view(self.center, zoom)
    }

    /// Pans by a pixel offset at the current zoom
    pub fn pan_by(&mut self, offset: Point) -> Result<Vec<ViewEvent>> {
        offset.ensure_finite()?;
        let projected = self.project(self.center, None)? + offset;
        let center = self.unproject(projected, None)?;
        self.set_view(center, self.zoom)
    }

    /// Resizes the view around the same center
    pub fn set_size(&mut self, size: Point) -> Result<Vec<ViewEvent>> {
        check_size(size)?;
        self.size = size;
        self.pixel_origin = self.new_pixel_origin(self.center, self.zoom)?;
        Ok(vec![ViewEvent::MoveEnd])
    }

    /// Announces an animated zoom without touching the current state, so
    /// observers can freeze what they show before the view jumps
    pub fn begin_zoom_animation(&mut self, center: LatLng, zoom: f64) -> Result<Vec<ViewEvent>> {
        center.ensure_finite()?;
        check_zoom(zoom)?;

        let pending = PendingZoom {
            center: self.clamp_center(center),
            zoom: self.clamp_zoom(zoom),
        };
        self.pending_zoom = Some(pending);
        Ok(vec![ViewEvent::ZoomAnim {
            center: pending.center,
            zoom: pending.zoom,
        }])
    }

    /// Commits the pending animated zoom. Without one this is a no-op.
    pub fn end_zoom_animation(&mut self) -> Result<Vec<ViewEvent>> {
        let Some(pending) = self.pending_zoom.take() else {
            return Ok(Vec::new());
        };

        self.pixel_origin = self.new_pixel_origin(pending.center, pending.zoom)?;
        self.center = pending.center;
        self.zoom = pending.zoom;
        Ok(vec![ViewEvent::ZoomEnd, ViewEvent::MoveEnd])
    }

    /// Projects a LatLng to world pixel coordinates at `zoom` (current by default)
    pub fn project(&self, lat_lng: LatLng, zoom: Option<f64>) -> Result<Point> {
        self.crs.lat_lng_to_point(lat_lng, zoom.unwrap_or(self.zoom))
    }

    /// Unprojects world pixel coordinates back to LatLng at `zoom`
    pub fn unproject(&self, point: Point, zoom: Option<f64>) -> Result<LatLng> {
        self.crs.point_to_lat_lng(point, zoom.unwrap_or(self.zoom))
    }

    /// World pixel position of the top-left corner of the view
    pub fn pixel_origin(&self) -> Point {
        self.pixel_origin
    }

    /// Pixel origin the view would have at `center`/`zoom`
    pub fn new_pixel_origin(&self, center: LatLng, zoom: f64) -> Result<Point> {
        let half = self.size / 2.0;
        Ok((self.project(center, Some(zoom))? - half).round())
    }

    /// Visible area in world pixels at the current zoom
    pub fn pixel_bounds(&self) -> Bounds {
        Bounds::new(self.pixel_origin, self.pixel_origin + self.size)
    }

    /// Pixel extent of the whole world; `None` for infinite CRSes
    pub fn pixel_world_bounds(&self, zoom: Option<f64>) -> Option<Bounds> {
        self.crs.projected_bounds(zoom.unwrap_or(self.zoom))
    }

    /// Position relative to the pixel origin, snapped to whole pixels
    pub fn lat_lng_to_layer_point(&self, lat_lng: LatLng) -> Result<Point> {
        Ok(self.project(lat_lng, None)?.round() - self.pixel_origin)
    }

    pub fn layer_point_to_lat_lng(&self, point: Point) -> Result<LatLng> {
        self.unproject(point + self.pixel_origin, None)
    }

    /// Scale factor between `from_zoom` (current by default) and `to_zoom`
    pub fn zoom_scale(&self, to_zoom: f64, from_zoom: Option<f64>) -> f64 {
        self.crs.scale(to_zoom) / self.crs.scale(from_zoom.unwrap_or(self.zoom))
    }

    /// Zoom reached by applying `scale` to `from_zoom` (current by default)
    pub fn scale_zoom(&self, scale: f64, from_zoom: Option<f64>) -> f64 {
        let zoom = self
            .crs
            .zoom(scale * self.crs.scale(from_zoom.unwrap_or(self.zoom)));
        if zoom.is_nan() {
            f64::INFINITY
        } else {
            zoom
        }
    }

    /// Zoom level at which `bounds` best matches the view.
    ///
    /// With `inside == false` ("cover") this is the highest zoom at which
    /// the bounds plus `padding` still fit in the view. With `inside == true`
    /// it is the lowest zoom at which the bounds fill the view on at least
    /// one axis, or `None` when no zoom up to `max_zoom` does.
    ///
    /// The scan walks zoom levels one by one so it stays correct for custom
    /// CRSes whose scale is not monotonic.
    pub fn bounds_zoom(
        &self,
        bounds: &LatLngBounds,
        inside: bool,
        padding: Point,
    ) -> Result<Option<f64>> {
        let nw = bounds.north_west();
        let se = bounds.south_east();
        let size = self.size;

        let mut zoom = self.min_zoom - if inside { 1.0 } else { 0.0 };
        let mut not_found;
        loop {
            zoom += 1.0;
            let bounds_size =
                self.project(se, Some(zoom))? - self.project(nw, Some(zoom))? + padding;
            not_found = if inside {
                bounds_size.x < size.x || bounds_size.y < size.y
            } else {
                size.contains(&bounds_size)
            };
            if !(not_found && zoom <= self.max_zoom) {
                break;
            }
        }

        if inside {
            Ok(if not_found { None } else { Some(zoom) })
        } else {
            Ok(Some(zoom - 1.0))
        }
    }

    /// Geographic bounds of the visible area
    pub fn bounds(&self) -> Result<LatLngBounds> {
        let pixel_bounds = self.pixel_bounds();
        let south_west = self.unproject(pixel_bounds.bottom_left(), None)?;
        let north_east = self.unproject(pixel_bounds.top_right(), None)?;
        Ok(LatLngBounds::new(south_west, north_east))
    }

    pub fn distance(&self, a: &LatLng, b: &LatLng) -> f64 {
        self.crs.distance(a, b)
    }

    pub fn wrap_lat_lng(&self, lat_lng: LatLng) -> LatLng {
        self.crs.wrap_lat_lng(lat_lng)
    }

    fn clamp_zoom(&self, zoom: f64) -> f64 {
        zoom.clamp(self.min_zoom, self.max_zoom)
    }

    /// Clamps center to max_bounds if set
    fn clamp_center(&self, center: LatLng) -> LatLng {
        match &self.max_bounds {
            Some(bounds) => LatLng::new(
                center.lat.clamp(bounds.south(), bounds.north()),
                center.lng.clamp(bounds.west(), bounds.east()),
            ),
            None => center,
        }
    }
}

fn check_zoom(zoom: f64) -> Result<()> {
    if zoom.is_finite() {
        Ok(())
    } else {
        Err(MapError::InvalidCoordinates(format!("non-finite zoom {zoom}")))
    }
}

fn check_zoom_limits(min_zoom: f64, max_zoom: f64) -> Result<()> {
    check_zoom(min_zoom)?;
    check_zoom(max_zoom)?;
    if min_zoom.abs() > MAX_ZOOM_LIMIT || max_zoom.abs() > MAX_ZOOM_LIMIT {
        return Err(MapError::InvalidConfig(format!(
            "zoom limits {min_zoom}..{max_zoom} exceed +/-{MAX_ZOOM_LIMIT}"
        )));
    }
    if min_zoom > max_zoom {
        return Err(MapError::InvalidConfig(format!(
            "min_zoom {min_zoom} is greater than max_zoom {max_zoom}"
        )));
    }
    Ok(())
}

fn check_size(size: Point) -> Result<()> {
    if size.is_finite() && size.x >= 0.0 && size.y >= 0.0 {
        Ok(())
    } else {
        Err(MapError::InvalidConfig(format!(
            "viewport size ({}, {}) must be finite and non-negative",
            size.x, size.y
        )))
    }
}
