//! Pure mappings between geographic coordinates and a projected plane.
//!
//! Projections are stateless apart from their constants, so the shipped ones
//! live in `static` items and are shared by reference between CRS instances.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};
use std::fmt::Debug;

use crate::core::bounds::Bounds;
use crate::core::constants::{
    EARTH_RADIUS, EARTH_RADIUS_MINOR, MERCATOR_MAX_ITERATIONS, MERCATOR_SIN_EPSILON,
    MERCATOR_TOLERANCE,
};
use crate::core::geo::{LatLng, Point};

/// A planar projection of the globe.
///
/// `unproject(project(p))` recovers `p` for every point inside `bounds()`.
/// Behaviour outside the bounds is whatever the formulas produce; poles are
/// clamped rather than reported as errors.
pub trait Projection: Debug + Send + Sync {
    fn project(&self, lat_lng: LatLng) -> Point;

    fn unproject(&self, point: Point) -> LatLng;

    /// Valid extent of the projected plane
    fn bounds(&self) -> Bounds;
}

/// Equirectangular identity: `x = lng`, `y = lat`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LonLat;

impl Projection for LonLat {
    fn project(&self, lat_lng: LatLng) -> Point {
        Point::new(lat_lng.lng, lat_lng.lat)
    }

    fn unproject(&self, point: Point) -> LatLng {
        LatLng::new(point.y, point.x)
    }

    fn bounds(&self) -> Bounds {
        Bounds::from_coords(-180.0, -90.0, 180.0, 90.0)
    }
}

/// Web Mercator on a sphere of radius `radius`.
#[derive(Debug, Clone, Copy)]
pub struct SphericalMercator {
    pub radius: f64,
}

impl SphericalMercator {
    pub const fn new() -> Self {
        Self {
            radius: EARTH_RADIUS,
        }
    }
}

impl Default for SphericalMercator {
    fn default() -> Self {
        Self::new()
    }
}

impl Projection for SphericalMercator {
    fn project(&self, lat_lng: LatLng) -> Point {
        let sin = lat_lng
            .lat
            .to_radians()
            .sin()
            .clamp(-1.0 + MERCATOR_SIN_EPSILON, 1.0 - MERCATOR_SIN_EPSILON);

        Point::new(
            self.radius * lat_lng.lng.to_radians(),
            self.radius / 2.0 * ((1.0 + sin) / (1.0 - sin)).ln(),
        )
    }

    fn unproject(&self, point: Point) -> LatLng {
        LatLng::new(
            (2.0 * (point.y / self.radius).exp().atan() - FRAC_PI_2).to_degrees(),
            (point.x / self.radius).to_degrees(),
        )
    }

    fn bounds(&self) -> Bounds {
        let d = self.radius * PI;
        Bounds::from_coords(-d, -d, d, d)
    }
}

/// Mercator on the WGS84 ellipsoid (EPSG:3395).
///
/// The inverse has no closed form and is solved by fixed-point iteration on
/// the latitude, bounded by `max_iterations` and stopped early once the
/// correction falls below `tolerance` radians.
#[derive(Debug, Clone, Copy)]
pub struct Mercator {
    pub radius: f64,
    pub radius_minor: f64,
    pub max_iterations: u32,
    pub tolerance: f64,
}

impl Mercator {
    pub const fn new() -> Self {
        Self {
            radius: EARTH_RADIUS,
            radius_minor: EARTH_RADIUS_MINOR,
            max_iterations: MERCATOR_MAX_ITERATIONS,
            tolerance: MERCATOR_TOLERANCE,
        }
    }

    /// Same ellipsoid with a different precision/cost tradeoff for `unproject`
    pub const fn with_iteration(max_iterations: u32, tolerance: f64) -> Self {
        Self {
            radius: EARTH_RADIUS,
            radius_minor: EARTH_RADIUS_MINOR,
            max_iterations,
            tolerance,
        }
    }

    pub fn eccentricity(&self) -> f64 {
        let ratio = self.radius_minor / self.radius;
        (1.0 - ratio * ratio).sqrt()
    }
}

impl Default for Mercator {
    fn default() -> Self {
        Self::new()
    }
}

impl Projection for Mercator {
    fn project(&self, lat_lng: LatLng) -> Point {
        let e = self.eccentricity();
        let phi = lat_lng.lat.to_radians();
        let con = e * phi.sin();

        let ts = (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - con) / (1.0 + con)).powf(e / 2.0);
        let y = -self.radius * ts.max(1e-10).ln();

        Point::new(lat_lng.lng.to_radians() * self.radius, y)
    }

    fn unproject(&self, point: Point) -> LatLng {
        let e = self.eccentricity();
        let ts = (-point.y / self.radius).exp();
        let mut phi = FRAC_PI_2 - 2.0 * ts.atan();

        let mut dphi = f64::INFINITY;
        let mut i = 0;
        while i < self.max_iterations && dphi.abs() > self.tolerance {
            let con = e * phi.sin();
            let con = ((1.0 - con) / (1.0 + con)).powf(e / 2.0);
            dphi = FRAC_PI_2 - 2.0 * (ts * con).atan() - phi;
            phi += dphi;
            i += 1;
        }

        LatLng::new(phi.to_degrees(), (point.x / self.radius).to_degrees())
    }

    fn bounds(&self) -> Bounds {
        Bounds::from_coords(
            -20_037_508.342_79,
            -15_496_570.739_72,
            20_037_508.342_79,
            18_764_656.231_38,
        )
    }
}
