use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

use crate::core::constants::{EARTH_RADIUS, LAT_LNG_MARGIN};
use crate::{MapError, Result};

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate without validation
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Creates a LatLng, rejecting NaN and infinite components
    pub fn try_new(lat: f64, lng: f64) -> Result<Self> {
        let lat_lng = Self::new(lat, lng);
        lat_lng.ensure_finite()?;
        Ok(lat_lng)
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    pub(crate) fn ensure_finite(&self) -> Result<()> {
        if self.is_finite() {
            Ok(())
        } else {
            Err(MapError::InvalidCoordinates(format!(
                "non-finite lat/lng ({}, {})",
                self.lat, self.lng
            )))
        }
    }

    /// Validates that the coordinates are within the geographic ranges
    pub fn is_valid(&self) -> bool {
        self.lat >= -90.0 && self.lat <= 90.0 && self.lng >= -180.0 && self.lng <= 180.0
    }

    /// Component-wise comparison with a tolerance (defaults to 1e-9 degrees)
    pub fn equals(&self, other: &LatLng, max_margin: Option<f64>) -> bool {
        let margin = (self.lat - other.lat)
            .abs()
            .max((self.lng - other.lng).abs());
        margin <= max_margin.unwrap_or(LAT_LNG_MARGIN)
    }

    /// Great-circle distance in meters using the spherical law of cosines
    pub fn distance_to(&self, other: &LatLng) -> f64 {
        spherical_distance(self, other, EARTH_RADIUS)
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LatLng({:.6}, {:.6})", self.lat, self.lng)
    }
}

impl From<geo_types::Coord<f64>> for LatLng {
    fn from(coord: geo_types::Coord<f64>) -> Self {
        Self::new(coord.y, coord.x)
    }
}

impl From<LatLng> for geo_types::Coord<f64> {
    fn from(lat_lng: LatLng) -> Self {
        geo_types::coord! { x: lat_lng.lng, y: lat_lng.lat }
    }
}

/// Spherical law of cosines on a sphere of the given radius.
pub(crate) fn spherical_distance(a: &LatLng, b: &LatLng, radius: f64) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    // rounding can push the cosine just outside [-1, 1] for identical points
    let cos_c = lat1.sin() * lat2.sin() + lat1.cos() * lat2.cos() * delta_lng.cos();
    radius * cos_c.clamp(-1.0, 1.0).acos()
}

/// Represents a point in pixel or projected coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub(crate) fn ensure_finite(&self) -> Result<()> {
        if self.is_finite() {
            Ok(())
        } else {
            Err(MapError::InvalidCoordinates(format!(
                "non-finite point ({}, {})",
                self.x, self.y
            )))
        }
    }

    /// Component-wise multiplication
    pub fn scale_by(&self, other: &Point) -> Point {
        Point::new(self.x * other.x, self.y * other.y)
    }

    /// Component-wise division
    pub fn unscale_by(&self, other: &Point) -> Point {
        Point::new(self.x / other.x, self.y / other.y)
    }

    pub fn round(&self) -> Point {
        *Self::clone(self).round_mut()
    }

    pub fn floor(&self) -> Point {
        *Self::clone(self).floor_mut()
    }

    pub fn ceil(&self) -> Point {
        *Self::clone(self).ceil_mut()
    }

    pub fn trunc(&self) -> Point {
        *Self::clone(self).trunc_mut()
    }

    pub fn round_mut(&mut self) -> &mut Self {
        self.x = self.x.round();
        self.y = self.y.round();
        self
    }

    pub fn floor_mut(&mut self) -> &mut Self {
        self.x = self.x.floor();
        self.y = self.y.floor();
        self
    }

    pub fn ceil_mut(&mut self) -> &mut Self {
        self.x = self.x.ceil();
        self.y = self.y.ceil();
        self
    }

    pub fn trunc_mut(&mut self) -> &mut Self {
        self.x = self.x.trunc();
        self.y = self.y.trunc();
        self
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// True when `other` fits inside this point taken as a size, ignoring signs
    pub fn contains(&self, other: &Point) -> bool {
        other.x.abs() <= self.x.abs() && other.y.abs() <= self.y.abs()
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Point::new(x, y)
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Point::new(x, y)
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;

    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f64> for Point {
    type Output = Point;

    fn div(self, rhs: f64) -> Point {
        Point::new(self.x / rhs, self.y / rhs)
    }
}

impl Neg for Point {
    type Output = Point;

    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

impl AddAssign for Point {
    fn add_assign(&mut self, rhs: Point) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl SubAssign for Point {
    fn sub_assign(&mut self, rhs: Point) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

/// Represents a bounding box of geographical coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl LatLngBounds {
    pub fn new(south_west: LatLng, north_east: LatLng) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// Builds bounds from any two opposite corners
    pub fn from_corners(a: LatLng, b: LatLng) -> Self {
        Self::new(
            LatLng::new(a.lat.min(b.lat), a.lng.min(b.lng)),
            LatLng::new(a.lat.max(b.lat), a.lng.max(b.lng)),
        )
    }

    /// Creates bounds from individual coordinates
    pub fn from_coords(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self::new(LatLng::new(south, west), LatLng::new(north, east))
    }

    pub fn is_valid(&self) -> bool {
        self.south_west.is_finite()
            && self.north_east.is_finite()
            && self.south_west.lat <= self.north_east.lat
            && self.south_west.lng <= self.north_east.lng
    }

    pub fn south(&self) -> f64 {
        self.south_west.lat
    }

    pub fn west(&self) -> f64 {
        self.south_west.lng
    }

    pub fn north(&self) -> f64 {
        self.north_east.lat
    }

    pub fn east(&self) -> f64 {
        self.north_east.lng
    }

    pub fn north_west(&self) -> LatLng {
        LatLng::new(self.north(), self.west())
    }

    pub fn south_east(&self) -> LatLng {
        LatLng::new(self.south(), self.east())
    }

    /// Checks if the bounds contain a point (edges included)
    pub fn contains(&self, point: &LatLng) -> bool {
        point.lat >= self.south_west.lat
            && point.lat <= self.north_east.lat
            && point.lng >= self.south_west.lng
            && point.lng <= self.north_east.lng
    }

    pub fn contains_bounds(&self, other: &LatLngBounds) -> bool {
        self.contains(&other.south_west) && self.contains(&other.north_east)
    }

    /// True if the bounds share at least one point (touching edges count)
    pub fn intersects(&self, other: &LatLngBounds) -> bool {
        other.north_east.lat >= self.south_west.lat
            && other.south_west.lat <= self.north_east.lat
            && other.north_east.lng >= self.south_west.lng
            && other.south_west.lng <= self.north_east.lng
    }

    /// True if the bounds share a non-zero area
    pub fn overlaps(&self, other: &LatLngBounds) -> bool {
        other.north_east.lat > self.south_west.lat
            && other.south_west.lat < self.north_east.lat
            && other.north_east.lng > self.south_west.lng
            && other.south_west.lng < self.north_east.lng
    }

    /// Extends the bounds to include a point
    pub fn extend(&mut self, point: &LatLng) -> &mut Self {
        self.south_west.lat = self.south_west.lat.min(point.lat);
        self.south_west.lng = self.south_west.lng.min(point.lng);
        self.north_east.lat = self.north_east.lat.max(point.lat);
        self.north_east.lng = self.north_east.lng.max(point.lng);
        self
    }

    /// Grows each side by `ratio` of the current span
    pub fn pad(&self, ratio: f64) -> LatLngBounds {
        let height_buffer = (self.north() - self.south()).abs() * ratio;
        let width_buffer = (self.east() - self.west()).abs() * ratio;
        LatLngBounds::from_coords(
            self.south() - height_buffer,
            self.west() - width_buffer,
            self.north() + height_buffer,
            self.east() + width_buffer,
        )
    }

    /// Gets the center point of the bounds
    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south_west.lat + self.north_east.lat) / 2.0,
            (self.south_west.lng + self.north_east.lng) / 2.0,
        )
    }

    pub fn equals(&self, other: &LatLngBounds, max_margin: Option<f64>) -> bool {
        self.south_west.equals(&other.south_west, max_margin)
            && self.north_east.equals(&other.north_east, max_margin)
    }
}

impl From<geo_types::Rect<f64>> for LatLngBounds {
    fn from(rect: geo_types::Rect<f64>) -> Self {
        LatLngBounds::from_corners(rect.min().into(), rect.max().into())
    }
}

/// A tile index at a given integer zoom. Indices may lie outside the world
/// before wrapping is applied by the tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl TileCoord {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Cache key of this coordinate as-is (no wrapping)
    pub fn key(&self) -> TileKey {
        TileKey::new(self.x, self.y)
    }

    /// Euclidean distance in tile-index space
    pub fn distance_to(&self, point: &Point) -> f64 {
        Point::new(self.x as f64, self.y as f64).distance_to(point)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Canonical cache key `"x:y"`; the zoom is implied by the owning grid level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    pub x: i32,
    pub y: i32,
}

impl TileKey {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn to_coord(self, z: i32) -> TileCoord {
        TileCoord::new(self.x, self.y, z)
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.x, self.y)
    }
}

impl FromStr for TileKey {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self> {
        let (x, y) = s
            .split_once(':')
            .ok_or_else(|| MapError::ParseError(format!("tile key '{s}' is not 'x:y'")))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<i32>()
                .map_err(|e| MapError::ParseError(format!("tile key '{s}': {e}")))
        };
        Ok(TileKey::new(parse(x)?, parse(y)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lat_lng_creation() {
        let coord = LatLng::new(40.7128, -74.0060);
        assert_eq!(coord.lat, 40.7128);
        assert_eq!(coord.lng, -74.0060);
        assert!(coord.is_valid());
    }

    #[test]
    fn test_try_new_rejects_nan() {
        assert!(LatLng::try_new(f64::NAN, 0.0).is_err());
        assert!(LatLng::try_new(0.0, f64::INFINITY).is_err());
        assert!(LatLng::try_new(10.0, 20.0).is_ok());
    }

    #[test]
    fn test_lat_lng_distance() {
        let nyc = LatLng::new(40.7128, -74.0060);
        let la = LatLng::new(34.0522, -118.2437);
        let distance = nyc.distance_to(&la);

        // Distance should be approximately 3944 km
        assert!((distance - 3944000.0).abs() < 10000.0);
        assert_eq!(nyc.distance_to(&nyc), 0.0);
    }

    #[test]
    fn test_point_chaining() {
        let mut p = Point::new(1.4, -2.6);
        p.round_mut().floor_mut();
        assert_eq!(p, Point::new(1.0, -3.0));

        let q = Point::new(1.5, 2.5);
        assert_eq!(q.floor(), Point::new(1.0, 2.0));
        assert_eq!(q, Point::new(1.5, 2.5));
        assert_eq!(q.ceil(), Point::new(2.0, 3.0));
        assert_eq!(Point::new(-1.7, 1.7).trunc(), Point::new(-1.0, 1.0));
    }

    #[test]
    fn test_point_ops() {
        let a = Point::from((3.0, 4.0));
        let b = Point::from([1.0, 1.0]);
        assert_eq!(a + b, Point::new(4.0, 5.0));
        assert_eq!(a - b, Point::new(2.0, 3.0));
        assert_eq!(a * 2.0, Point::new(6.0, 8.0));
        assert_eq!(a / 2.0, Point::new(1.5, 2.0));
        assert_eq!(Point::default().distance_to(&a), 5.0);
        assert_eq!(a.scale_by(&Point::new(2.0, 3.0)), Point::new(6.0, 12.0));
        assert!(a.contains(&Point::new(-3.0, 4.0)));
        assert!(!a.contains(&Point::new(3.1, 0.0)));
    }

    #[test]
    fn test_bounds_contains() {
        let bounds = LatLngBounds::from_coords(40.0, -75.0, 41.0, -73.0);
        let point_inside = LatLng::new(40.5, -74.0);
        let point_outside = LatLng::new(42.0, -74.0);

        assert!(bounds.contains(&point_inside));
        assert!(!bounds.contains(&point_outside));
        assert!(bounds.contains(&LatLng::new(41.0, -73.0)));
    }

    #[test]
    fn test_bounds_touching_edges() {
        let a = LatLngBounds::from_coords(0.0, 0.0, 10.0, 10.0);
        let b = LatLngBounds::from_coords(0.0, 10.0, 10.0, 20.0);
        assert!(a.intersects(&b));
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn test_tile_key_round_trip() {
        let key: TileKey = "3:-2".parse().unwrap();
        assert_eq!(key, TileKey::new(3, -2));
        assert_eq!(key.to_string(), "3:-2");
        assert!("3-2".parse::<TileKey>().is_err());
        assert!("a:1".parse::<TileKey>().is_err());
    }

    #[test]
    fn test_geo_types_conversion() {
        let coord = geo_types::coord! { x: 12.5, y: 41.9 };
        let lat_lng = LatLng::from(coord);
        assert_eq!(lat_lng, LatLng::new(41.9, 12.5));
        let back: geo_types::Coord<f64> = lat_lng.into();
        assert_eq!(back, coord);
    }
}
