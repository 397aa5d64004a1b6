//! Coordinate reference systems.
//!
//! A [`Crs`] composes a [`Projection`], a [`Transformation`] and a zoom scale
//! rule. The shipped systems are process-wide immutable statics; custom ones
//! are built with [`Crs::custom`] and passed around by `&'static` reference.

use std::f64::consts::PI;
use std::fmt;

use crate::core::bounds::Bounds;
use crate::core::constants::{EARTH_RADIUS, REFERENCE_TILE_SIZE};
use crate::core::geo::{spherical_distance, LatLng, LatLngBounds, Point};
use crate::core::projection::{LonLat, Mercator, Projection, SphericalMercator};
use crate::core::transformation::Transformation;
use crate::{MapError, Result};

static LON_LAT: LonLat = LonLat;
static SPHERICAL_MERCATOR: SphericalMercator = SphericalMercator::new();
static ELLIPSOIDAL_MERCATOR: Mercator = Mercator::new();

const MERCATOR_SCALE: f64 = 0.5 / (PI * EARTH_RADIUS);

/// Spherical (web) Mercator, the default for slippy maps.
pub static EPSG3857: Crs = Crs {
    code: "EPSG:3857",
    projection: &SPHERICAL_MERCATOR,
    transformation: Transformation::new(MERCATOR_SCALE, 0.5, -MERCATOR_SCALE, 0.5),
    zoom_scale: ZoomScale::Exponential {
        base_size: REFERENCE_TILE_SIZE,
    },
    wrap_lng: Some((-180.0, 180.0)),
    wrap_lat: None,
    infinite: false,
    distance_model: DistanceModel::Spherical {
        radius: EARTH_RADIUS,
    },
};

/// Legacy code for [`EPSG3857`]; the same instance.
pub static EPSG900913: &Crs = &EPSG3857;

/// Mercator on the WGS84 ellipsoid.
pub static EPSG3395: Crs = Crs {
    code: "EPSG:3395",
    projection: &ELLIPSOIDAL_MERCATOR,
    transformation: Transformation::new(MERCATOR_SCALE, 0.5, -MERCATOR_SCALE, 0.5),
    zoom_scale: ZoomScale::Exponential {
        base_size: REFERENCE_TILE_SIZE,
    },
    wrap_lng: Some((-180.0, 180.0)),
    wrap_lat: None,
    infinite: false,
    distance_model: DistanceModel::Spherical {
        radius: EARTH_RADIUS,
    },
};

/// Plate carrée over WGS84 degrees.
pub static EPSG4326: Crs = Crs {
    code: "EPSG:4326",
    projection: &LON_LAT,
    transformation: Transformation::new(1.0 / 180.0, 1.0, -1.0 / 180.0, 0.5),
    zoom_scale: ZoomScale::Exponential {
        base_size: REFERENCE_TILE_SIZE,
    },
    wrap_lng: Some((-180.0, 180.0)),
    wrap_lat: None,
    infinite: false,
    distance_model: DistanceModel::Spherical {
        radius: EARTH_RADIUS,
    },
};

/// Flat, unbounded plane for non-geographic maps (floor plans, game maps).
/// One map unit is one pixel at zoom 0.
pub static SIMPLE: Crs = Crs {
    code: "SIMPLE",
    projection: &LON_LAT,
    transformation: Transformation::new(1.0, 0.0, -1.0, 0.0),
    zoom_scale: ZoomScale::Exponential { base_size: 1.0 },
    wrap_lng: None,
    wrap_lat: None,
    infinite: true,
    distance_model: DistanceModel::Planar,
};

/// How a CRS turns a zoom level into a pixel scale factor.
#[derive(Debug, Clone, Copy)]
pub enum ZoomScale {
    /// `base_size * 2^zoom`
    Exponential { base_size: f64 },
    /// User supplied scale and its inverse
    Custom {
        scale: fn(f64) -> f64,
        zoom: fn(f64) -> f64,
    },
}

impl ZoomScale {
    pub fn scale(&self, zoom: f64) -> f64 {
        match *self {
            ZoomScale::Exponential { base_size } => base_size * 2f64.powf(zoom),
            ZoomScale::Custom { scale, .. } => scale(zoom),
        }
    }

    pub fn zoom(&self, scale: f64) -> f64 {
        match *self {
            ZoomScale::Exponential { base_size } => (scale / base_size).log2(),
            ZoomScale::Custom { zoom, .. } => zoom(scale),
        }
    }
}

/// Distance model used by [`Crs::distance`]. Geographic systems measure along
/// the sphere in meters; flat systems measure in their own units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceModel {
    Spherical { radius: f64 },
    Planar,
}

pub struct Crs {
    code: &'static str,
    projection: &'static dyn Projection,
    transformation: Transformation,
    zoom_scale: ZoomScale,
    wrap_lng: Option<(f64, f64)>,
    wrap_lat: Option<(f64, f64)>,
    infinite: bool,
    distance_model: DistanceModel,
}

impl fmt::Debug for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crs")
            .field("code", &self.code)
            .field("projection", &self.projection)
            .field("infinite", &self.infinite)
            .finish()
    }
}

impl Crs {
    /// Starts a custom CRS: exponential 256px scale, no wrapping, finite,
    /// spherical distance. Adjust with the `with_*` builders.
    pub fn custom(
        code: &'static str,
        projection: &'static dyn Projection,
        transformation: Transformation,
    ) -> Self {
        Self {
            code,
            projection,
            transformation,
            zoom_scale: ZoomScale::Exponential {
                base_size: REFERENCE_TILE_SIZE,
            },
            wrap_lng: None,
            wrap_lat: None,
            infinite: false,
            distance_model: DistanceModel::Spherical {
                radius: EARTH_RADIUS,
            },
        }
    }

    pub fn with_zoom_scale(mut self, zoom_scale: ZoomScale) -> Self {
        self.zoom_scale = zoom_scale;
        self
    }

    pub fn with_wrap_lng(mut self, range: Option<(f64, f64)>) -> Self {
        self.wrap_lng = range;
        self
    }

    pub fn with_wrap_lat(mut self, range: Option<(f64, f64)>) -> Self {
        self.wrap_lat = range;
        self
    }

    pub fn with_infinite(mut self, infinite: bool) -> Self {
        self.infinite = infinite;
        self
    }

    pub fn with_distance_model(mut self, model: DistanceModel) -> Self {
        self.distance_model = model;
        self
    }

    /// Resolves a CRS code (case-insensitive) to one of the shipped statics
    pub fn from_code(code: &str) -> Result<&'static Crs> {
        match code.trim().to_ascii_uppercase().as_str() {
            "EPSG:3857" | "EPSG3857" => Ok(&EPSG3857),
            "EPSG:900913" | "EPSG900913" => Ok(EPSG900913),
            "EPSG:3395" | "EPSG3395" => Ok(&EPSG3395),
            "EPSG:4326" | "EPSG4326" => Ok(&EPSG4326),
            "SIMPLE" => Ok(&SIMPLE),
            other => Err(MapError::InvalidConfig(format!("unknown CRS code '{other}'"))),
        }
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn projection(&self) -> &'static dyn Projection {
        self.projection
    }

    pub fn transformation(&self) -> &Transformation {
        &self.transformation
    }

    pub fn wrap_lng(&self) -> Option<(f64, f64)> {
        self.wrap_lng
    }

    pub fn wrap_lat(&self) -> Option<(f64, f64)> {
        self.wrap_lat
    }

    pub fn is_infinite(&self) -> bool {
        self.infinite
    }

    pub fn distance_model(&self) -> DistanceModel {
        self.distance_model
    }

    /// Same system: identical instance or identical code
    pub fn same_as(&self, other: &Crs) -> bool {
        std::ptr::eq(self, other) || self.code == other.code
    }

    /// Geographic point to pixel coordinates at `zoom`
    pub fn lat_lng_to_point(&self, lat_lng: LatLng, zoom: f64) -> Result<Point> {
        lat_lng.ensure_finite()?;
        ensure_finite_zoom(zoom)?;
        let projected = self.projection.project(lat_lng);
        Ok(self.transformation.transform(projected, self.scale(zoom)))
    }

    /// Pixel coordinates at `zoom` back to a geographic point
    pub fn point_to_lat_lng(&self, point: Point, zoom: f64) -> Result<LatLng> {
        point.ensure_finite()?;
        ensure_finite_zoom(zoom)?;
        let untransformed = self.transformation.untransform(point, self.scale(zoom));
        Ok(self.projection.unproject(untransformed))
    }

    pub fn project(&self, lat_lng: LatLng) -> Point {
        self.projection.project(lat_lng)
    }

    pub fn unproject(&self, point: Point) -> LatLng {
        self.projection.unproject(point)
    }

    pub fn scale(&self, zoom: f64) -> f64 {
        self.zoom_scale.scale(zoom)
    }

    pub fn zoom(&self, scale: f64) -> f64 {
        self.zoom_scale.zoom(scale)
    }

    /// Pixel extent of the whole world at `zoom`; `None` for infinite systems
    pub fn projected_bounds(&self, zoom: f64) -> Option<Bounds> {
        if self.infinite {
            return None;
        }

        let bounds = self.projection.bounds();
        let scale = self.scale(zoom);
        Some(Bounds::new(
            self.transformation.transform(bounds.min, scale),
            self.transformation.transform(bounds.max, scale),
        ))
    }

    /// Brings a point into the wrap ranges of this CRS
    pub fn wrap_lat_lng(&self, lat_lng: LatLng) -> LatLng {
        let lng = match self.wrap_lng {
            Some(range) => wrap_num(lat_lng.lng, range, false),
            None => lat_lng.lng,
        };
        let lat = match self.wrap_lat {
            Some(range) => wrap_num(lat_lng.lat, range, false),
            None => lat_lng.lat,
        };
        LatLng::new(lat, lng)
    }

    /// Shifts bounds so their center falls inside the wrap ranges. A center
    /// sitting exactly on the upper wrap edge is kept there.
    pub fn wrap_lat_lng_bounds(&self, bounds: &LatLngBounds) -> LatLngBounds {
        let center = bounds.center();
        let wrapped = LatLng::new(
            self.wrap_lat
                .map_or(center.lat, |range| wrap_num(center.lat, range, true)),
            self.wrap_lng
                .map_or(center.lng, |range| wrap_num(center.lng, range, true)),
        );

        let lat_shift = center.lat - wrapped.lat;
        let lng_shift = center.lng - wrapped.lng;
        if lat_shift == 0.0 && lng_shift == 0.0 {
            return *bounds;
        }

        LatLngBounds::new(
            LatLng::new(
                bounds.south_west.lat - lat_shift,
                bounds.south_west.lng - lng_shift,
            ),
            LatLng::new(
                bounds.north_east.lat - lat_shift,
                bounds.north_east.lng - lng_shift,
            ),
        )
    }

    /// Distance between two points: meters on geographic systems, map units
    /// on planar ones
    pub fn distance(&self, a: &LatLng, b: &LatLng) -> f64 {
        match self.distance_model {
            DistanceModel::Spherical { radius } => spherical_distance(a, b, radius),
            DistanceModel::Planar => {
                let dx = b.lng - a.lng;
                let dy = b.lat - a.lat;
                (dx * dx + dy * dy).sqrt()
            }
        }
    }
}

fn ensure_finite_zoom(zoom: f64) -> Result<()> {
    if zoom.is_finite() {
        Ok(())
    } else {
        Err(MapError::InvalidCoordinates(format!("non-finite zoom {zoom}")))
    }
}

/// Wraps `x` into `[min, max)`. With `include_max`, `x == max` maps to `max`
/// instead of `min`; this variant is only meant for bounds checks.
pub fn wrap_num(x: f64, (min, max): (f64, f64), include_max: bool) -> f64 {
    if include_max && x == max {
        return x;
    }
    if x >= min && x < max {
        return x;
    }
    let d = max - min;
    ((x - min) % d + d) % d + min
}

/// Integer variant of [`wrap_num`] for tile indices.
pub fn wrap_index(x: i32, (min, max): (i32, i32)) -> i32 {
    let d = max - min;
    if d <= 0 {
        return x;
    }
    (x - min).rem_euclid(d) + min
}
