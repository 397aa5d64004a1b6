use mapgrid::core::crs::{wrap_num, Crs, EPSG3395, EPSG3857, EPSG4326, EPSG900913, SIMPLE};
use mapgrid::core::projection::{Mercator, Projection, SphericalMercator};
use mapgrid::core::transformation::Transformation;
use mapgrid::{LatLng, LatLngBounds, MapError, Point};
use once_cell::sync::Lazy;
use std::f64::consts::PI;

static PRECISE_MERCATOR: Mercator = Mercator::with_iteration(30, 1e-15);

/// EPSG:3395 with a tighter inverse so round trips hold to 1e-9 degrees
static PRECISE_3395: Lazy<Crs> = Lazy::new(|| {
    let scale = 0.5 / (PI * PRECISE_MERCATOR.radius);
    Crs::custom(
        "EPSG:3395-precise",
        &PRECISE_MERCATOR,
        Transformation::new(scale, 0.5, -scale, 0.5),
    )
    .with_wrap_lng(Some((-180.0, 180.0)))
});

fn sample_points() -> Vec<LatLng> {
    let mut points = Vec::new();
    for lat in [-85.0, -60.5, -33.3, -1.0, 0.0, 0.25, 12.75, 45.0, 70.1, 85.0] {
        for lng in [-180.0, -120.4, -0.5, 0.0, 33.3, 90.0, 179.9] {
            points.push(LatLng::new(lat, lng));
        }
    }
    points
}

fn assert_round_trip(crs: &Crs, zooms: &[f64]) {
    for &zoom in zooms {
        for point in sample_points() {
            let pixel = crs.lat_lng_to_point(point, zoom).unwrap();
            let back = crs.point_to_lat_lng(pixel, zoom).unwrap();
            assert!(
                back.equals(&point, Some(1e-9)),
                "{} at zoom {zoom}: {point} came back as {back}",
                crs.code()
            );
        }
    }
}

#[test]
fn test_round_trip_spherical_mercator() {
    assert_round_trip(&EPSG3857, &[0.0, 1.0, 5.5, 12.0, 18.0]);
}

#[test]
fn test_round_trip_plate_carree() {
    assert_round_trip(&EPSG4326, &[0.0, 3.0, 10.25, 18.0]);
}

#[test]
fn test_round_trip_ellipsoidal_mercator() {
    assert_round_trip(&PRECISE_3395, &[0.0, 4.0, 16.0]);
}

#[test]
fn test_round_trip_simple() {
    assert_round_trip(&SIMPLE, &[0.0, 2.0, 7.0]);
}

/// The shipped EPSG:3395 stops after 15 iterations or a 1e-7 radian step,
/// which still lands well within a micro-degree
#[test]
fn test_default_ellipsoidal_inverse_is_close() {
    for point in sample_points() {
        let pixel = EPSG3395.lat_lng_to_point(point, 10.0).unwrap();
        let back = EPSG3395.point_to_lat_lng(pixel, 10.0).unwrap();
        assert!(back.equals(&point, Some(1e-6)), "{point} came back as {back}");
    }
}

#[test]
fn test_scale_strictly_increases() {
    for crs in [&EPSG3857, &EPSG3395, &EPSG4326, &SIMPLE, &*PRECISE_3395] {
        let mut zoom = -3.0;
        while zoom < 22.0 {
            assert!(
                crs.scale(zoom + 0.25) > crs.scale(zoom),
                "{} scale not increasing at {zoom}",
                crs.code()
            );
            assert!((crs.zoom(crs.scale(zoom)) - zoom).abs() < 1e-9);
            zoom += 0.25;
        }
    }
}

#[test]
fn test_wrap_is_idempotent() {
    for lng in [-1000.0, -540.0, -180.0, -179.0, 0.0, 179.99, 180.0, 360.0, 725.5] {
        let point = LatLng::new(10.0, lng);
        let once = EPSG3857.wrap_lat_lng(point);
        let twice = EPSG3857.wrap_lat_lng(once);
        assert_eq!(once, twice);
        assert!(once.lng >= -180.0 && once.lng < 180.0, "{lng} wrapped to {}", once.lng);
    }

    // nothing wraps on a flat plane
    let far = LatLng::new(5000.0, -9000.0);
    assert_eq!(SIMPLE.wrap_lat_lng(far), far);
}

#[test]
fn test_include_max_wrap_only_for_bounds() {
    assert_eq!(wrap_num(180.0, (-180.0, 180.0), false), -180.0);
    assert_eq!(wrap_num(180.0, (-180.0, 180.0), true), 180.0);

    // a tile whose center sits on the antimeridian keeps its position
    let edge = LatLngBounds::from_coords(0.0, 170.0, 10.0, 190.0);
    assert_eq!(EPSG3857.wrap_lat_lng_bounds(&edge), edge);

    let beyond = LatLngBounds::from_coords(0.0, 190.0, 10.0, 200.0);
    let wrapped = EPSG3857.wrap_lat_lng_bounds(&beyond);
    assert!((wrapped.west() + 170.0).abs() < 1e-9);
    assert!((wrapped.east() + 160.0).abs() < 1e-9);
}

#[test]
fn test_spherical_mercator_equator_values() {
    let origin = EPSG3857.project(LatLng::new(0.0, 0.0));
    assert_eq!(origin, Point::new(0.0, 0.0));

    let edge = EPSG3857.project(LatLng::new(0.0, 180.0));
    assert!((edge.x - 20_037_508.34).abs() < 0.01);
    assert!(edge.y.abs() < 0.01);

    let projection = SphericalMercator::new();
    assert_eq!(projection.project(LatLng::new(0.0, 180.0)), edge);
}

#[test]
fn test_poles_are_clamped_not_errors() {
    let north = EPSG3857.project(LatLng::new(90.0, 0.0));
    assert!(north.y.is_finite());
    let south = EPSG3857.lat_lng_to_point(LatLng::new(-90.0, 0.0), 3.0).unwrap();
    assert!(south.y.is_finite());
}

#[test]
fn test_non_finite_input_fails_fast() {
    let result = EPSG3857.lat_lng_to_point(LatLng::new(0.0, f64::NAN), 1.0);
    assert!(matches!(result, Err(MapError::InvalidCoordinates(_))));
    assert!(LatLng::try_new(f64::INFINITY, 0.0).is_err());
}

#[test]
fn test_distance_models_differ() {
    let a = LatLng::new(0.0, 0.0);
    let b = LatLng::new(3.0, 4.0);
    assert!((SIMPLE.distance(&a, &b) - 5.0).abs() < 1e-12);

    let meters = EPSG3857.distance(&LatLng::new(0.0, 0.0), &LatLng::new(0.0, 1.0));
    assert!((meters - 111_319.49).abs() < 0.01);
}

#[test]
fn test_projected_bounds() {
    let world = EPSG3857.projected_bounds(2.0).unwrap();
    assert!(world.min.x.abs() < 1e-6 && world.min.y.abs() < 1e-6);
    assert!((world.max.x - 1024.0).abs() < 1e-6 && (world.max.y - 1024.0).abs() < 1e-6);
    assert!(SIMPLE.projected_bounds(2.0).is_none());
}

#[test]
fn test_codes_resolve_to_shared_statics() {
    assert!(Crs::from_code("epsg:3857").unwrap().same_as(&EPSG3857));
    assert!(std::ptr::eq(Crs::from_code("EPSG:900913").unwrap(), EPSG900913));
    assert!(matches!(
        Crs::from_code("EPSG:1234"),
        Err(MapError::InvalidConfig(_))
    ));
}
