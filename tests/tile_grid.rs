use std::sync::{Arc, Mutex};

use futures::channel::oneshot;
use futures::executor::block_on;
use futures::future::{self, FutureExt};
use mapgrid::core::crs::{Crs, EPSG3857, SIMPLE};
use mapgrid::core::projection::LonLat;
use mapgrid::core::transformation::Transformation;
use mapgrid::layers::tile::{
    compute_visible_tile_range, GridOptions, GridState, TileEvent, TileFuture, TileGrid,
    TileLoadError, TileProducer, TileRange, TileStatus,
};
use mapgrid::prelude::{Duration, EasingType, Instant};
use mapgrid::traits::ViewObserver;
use mapgrid::{Bounds, LatLng, MapError, Point, TileCoord, TileKey, Viewport};
use once_cell::sync::Lazy;

static PLATE: LonLat = LonLat;

/// Plate carree whose zoom-0 world is a single 256px tile and whose
/// latitudes wrap around like longitudes usually do
static LAT_WRAPPED: Lazy<Crs> = Lazy::new(|| {
    Crs::custom(
        "PLATE-LAT-WRAPPED",
        &PLATE,
        Transformation::new(1.0 / 360.0, 0.5, -1.0 / 180.0, 0.5),
    )
    .with_wrap_lat(Some((-90.0, 90.0)))
});

type Pending = Vec<(TileCoord, oneshot::Sender<Result<u32, TileLoadError>>)>;

/// Producer whose loads only finish when the test says so
#[derive(Clone, Default)]
struct ManualProducer {
    pending: Arc<Mutex<Pending>>,
    requested: Arc<Mutex<Vec<TileCoord>>>,
}

impl ManualProducer {
    /// Resolves the load for `coord`; false if nobody is listening anymore
    fn complete(&self, coord: TileCoord, result: Result<u32, TileLoadError>) -> bool {
        let mut pending = self.pending.lock().unwrap();
        match pending.iter().position(|(c, _)| *c == coord) {
            Some(index) => {
                let (_, tx) = pending.remove(index);
                tx.send(result).is_ok()
            }
            None => false,
        }
    }

    fn complete_all(&self, value: u32) {
        let drained: Pending = self.pending.lock().unwrap().drain(..).collect();
        for (_, tx) in drained {
            let _ = tx.send(Ok(value));
        }
    }

    fn requested(&self) -> Vec<TileCoord> {
        self.requested.lock().unwrap().clone()
    }
}

impl TileProducer for ManualProducer {
    type Handle = u32;

    fn produce(&self, coord: TileCoord) -> TileFuture<u32> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().push((coord, tx));
        self.requested.lock().unwrap().push(coord);
        rx.map(|r| r.unwrap_or(Err(TileLoadError::Aborted))).boxed()
    }
}

fn ready_producer(coord: TileCoord) -> TileFuture<TileCoord> {
    future::ready(Ok(coord)).boxed()
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn world_view(zoom: f64, size: f64) -> Viewport {
    Viewport::new(&EPSG3857, LatLng::new(0.0, 0.0), zoom, Point::new(size, size)).unwrap()
}

/// 200px view at zoom 5 whose center sits at pixel (900, 900), inside tile (3, 3)
fn tile_three_three_view() -> Viewport {
    let center = EPSG3857.point_to_lat_lng(Point::new(900.0, 900.0), 5.0).unwrap();
    Viewport::new(&EPSG3857, center, 5.0, Point::new(200.0, 200.0)).unwrap()
}

fn count(events: &[TileEvent], pred: impl Fn(&TileEvent) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

#[test]
fn test_exact_tile_edges_admit_four_tiles() {
    init_logger();
    let range = compute_visible_tile_range(&Bounds::from_coords(0.0, 0.0, 512.0, 512.0), 256);
    assert_eq!(range, TileRange::new(0, 0, 1, 1));

    // zoom 1 is exactly 512px wide, so this view covers [0,0]-[512,512]
    let view = world_view(1.0, 512.0);
    assert_eq!(view.pixel_bounds(), Bounds::from_coords(0.0, 0.0, 512.0, 512.0));

    let producer = ManualProducer::default();
    let mut grid = TileGrid::new(&EPSG3857, producer.clone(), GridOptions::default()).unwrap();
    grid.update(&view).unwrap();

    let mut requested = producer.requested();
    requested.sort_by_key(|c| (c.y, c.x));
    assert_eq!(
        requested,
        vec![
            TileCoord::new(0, 0, 1),
            TileCoord::new(1, 0, 1),
            TileCoord::new(0, 1, 1),
            TileCoord::new(1, 1, 1),
        ]
    );
    assert_eq!(grid.tiles_to_load(), 4);
    assert_eq!(grid.tiles_total(), 4);
}

#[test]
fn test_stale_completion_is_ignored() {
    init_logger();
    let producer = ManualProducer::default();
    let mut grid = TileGrid::new(&EPSG3857, producer.clone(), GridOptions::default()).unwrap();
    let mut view = tile_three_three_view();

    grid.update(&view).unwrap();
    assert_eq!(producer.requested(), vec![TileCoord::new(3, 3, 5)]);
    let key: TileKey = "3:3".parse().unwrap();
    assert_eq!(grid.entry(&key).unwrap().status, TileStatus::Loading);

    // ten tiles east; (3, 3) leaves the desired set while still in flight
    let events = view.pan_by(Point::new(2560.0, 0.0)).unwrap();
    grid.on_view_events(&events, &view).unwrap();
    assert!(grid.entry(&key).is_none());
    assert!(grid.entry(&TileKey::new(13, 3)).is_some());
    assert_eq!(grid.tiles_to_load(), 1);

    assert!(producer.complete(TileCoord::new(3, 3, 5), Ok(7)));
    assert_eq!(grid.tick(), 1);

    assert!(grid.entry(&key).is_none());
    assert_eq!(grid.len(), 1);
    assert_eq!(grid.tiles_to_load(), 1);
    assert_eq!(grid.state(), GridState::Populating);

    let events = grid.drain_events();
    let old = TileCoord::new(3, 3, 5);
    assert_eq!(count(&events, |e| *e == TileEvent::Unload { coord: old }), 1);
    assert_eq!(count(&events, |e| *e == TileEvent::Ready { coord: old }), 0);

    assert!(producer.complete(TileCoord::new(13, 3, 5), Ok(8)));
    grid.tick();
    assert_eq!(grid.state(), GridState::Settled);
    assert_eq!(grid.entry(&TileKey::new(13, 3)).unwrap().handle, Some(8));
}

#[test]
fn test_settles_exactly_once_with_errors() {
    init_logger();
    let producer = |coord: TileCoord| -> TileFuture<TileCoord> {
        if coord.x == coord.y {
            future::ready(Err(TileLoadError::Producer("no data".into()))).boxed()
        } else {
            future::ready(Ok(coord)).boxed()
        }
    };
    let mut grid = TileGrid::new(&EPSG3857, producer, GridOptions::default()).unwrap();
    let view = world_view(2.0, 1024.0);
    grid.update(&view).unwrap();
    assert_eq!(grid.tiles_to_load(), 16);

    block_on(grid.settled());
    assert_eq!(grid.tiles_to_load(), 0);
    assert_eq!(grid.state(), GridState::Settled);

    let errored = grid
        .entries()
        .filter(|e| e.status == TileStatus::Errored)
        .count();
    assert_eq!(errored, 4);

    // more ticks and an unchanged update must not settle the batch again
    grid.tick();
    grid.update(&view).unwrap();
    grid.tick();

    let events = grid.drain_events();
    assert_eq!(count(&events, |e| matches!(e, TileEvent::BatchSettled { .. })), 1);
    assert_eq!(count(&events, |e| matches!(e, TileEvent::Loading)), 1);
    assert_eq!(count(&events, |e| matches!(e, TileEvent::Error { .. })), 4);
    assert_eq!(count(&events, |e| matches!(e, TileEvent::Ready { .. })), 12);
}

#[test]
fn test_central_tiles_requested_first() {
    let producer = ManualProducer::default();
    let mut grid = TileGrid::new(&EPSG3857, producer.clone(), GridOptions::default()).unwrap();
    // 3x3 tiles centered on tile (2, 2) at zoom 3
    let center = EPSG3857.point_to_lat_lng(Point::new(640.0, 640.0), 3.0).unwrap();
    let view = Viewport::new(&EPSG3857, center, 3.0, Point::new(700.0, 700.0)).unwrap();
    grid.update(&view).unwrap();

    let requested = producer.requested();
    assert_eq!(requested.len(), 9);
    assert_eq!(requested[0], TileCoord::new(2, 2, 3));
    assert!(requested[1..5].iter().all(|c| (c.x - 2).abs() + (c.y - 2).abs() == 1));
}

#[test]
fn test_wrapped_keys_never_fetch_twice() {
    let producer = ManualProducer::default();
    let mut grid = TileGrid::new(&EPSG3857, producer.clone(), GridOptions::default()).unwrap();
    let mut view = world_view(0.0, 800.0);

    // the view spans several copies of the single zoom-0 tile
    grid.update(&view).unwrap();
    assert_eq!(producer.requested(), vec![TileCoord::new(0, 0, 0)]);

    let events = view.pan_by(Point::new(100.0, 0.0)).unwrap();
    grid.on_view_events(&events, &view).unwrap();
    assert_eq!(producer.requested().len(), 1);
    assert_eq!(grid.tiles_total(), 1);
    assert_eq!(grid.key_for(&TileCoord::new(-2, 0, 0)), TileKey::new(0, 0));
    assert_eq!(grid.key_for(&TileCoord::new(3, 0, 0)), TileKey::new(0, 0));

    producer.complete_all(1);
    grid.tick();
    assert_eq!(grid.state(), GridState::Settled);
}

#[test]
fn test_latitude_wrapping() {
    let crs: &'static Crs = &LAT_WRAPPED;
    assert_eq!(crs.wrap_lat_lng(LatLng::new(100.0, 10.0)), LatLng::new(-80.0, 10.0));
    assert_eq!(crs.wrap_lat_lng(LatLng::new(-90.0, 10.0)), LatLng::new(-90.0, 10.0));
    assert_eq!(crs.wrap_lat_lng(LatLng::new(90.0, 10.0)), LatLng::new(-90.0, 10.0));

    // 800px tall at zoom 0 shows rows -2..=2 of a one-row world
    let producer = ManualProducer::default();
    let mut grid = TileGrid::new(crs, producer.clone(), GridOptions::default()).unwrap();
    let view = Viewport::new(crs, LatLng::new(0.0, 0.0), 0.0, Point::new(256.0, 800.0)).unwrap();
    grid.update(&view).unwrap();

    assert_eq!(grid.key_for(&TileCoord::new(0, -1, 0)), TileKey::new(0, 0));
    assert_eq!(grid.key_for(&TileCoord::new(0, 2, 0)), TileKey::new(0, 0));
    assert_eq!(producer.requested(), vec![TileCoord::new(0, 0, 0)]);
    assert_eq!(grid.tiles_total(), 1);

    // columns do not wrap in this system, so they stay bounded
    assert!(!grid.is_valid_tile(&TileCoord::new(1, 0, 0)).unwrap());
    assert!(grid.is_valid_tile(&TileCoord::new(0, -3, 0)).unwrap());

    let unwrapped_options = GridOptions {
        no_wrap: true,
        ..Default::default()
    };
    let mut grid = TileGrid::new(crs, ready_producer, unwrapped_options).unwrap();
    grid.update(&view).unwrap();
    assert_eq!(grid.key_for(&TileCoord::new(0, -1, 0)), TileKey::new(0, -1));
    assert!(!grid.is_valid_tile(&TileCoord::new(0, -1, 0)).unwrap());
    assert_eq!(grid.tiles_total(), 1);
}

#[test]
fn test_far_away_view_is_rejected() {
    let size = Point::new(512.0, 512.0);
    for lng in [-1e12, 1e12] {
        let view = Viewport::new(&SIMPLE, LatLng::new(0.0, lng), 0.0, size).unwrap();
        let mut grid = TileGrid::new(&SIMPLE, ready_producer, GridOptions::default()).unwrap();
        assert!(matches!(grid.update(&view), Err(MapError::InvalidCoordinates(_))));
        assert_eq!(grid.tiles_total(), 0);
    }

    // millions of pixels out is still fine on an unbounded plane
    let center = LatLng::new(0.0, -11_719.0 * 256.0);
    let view = Viewport::new(&SIMPLE, center, 0.0, size).unwrap();
    let mut grid = TileGrid::new(&SIMPLE, ready_producer, GridOptions::default()).unwrap();
    grid.update(&view).unwrap();
    assert_eq!(grid.tiles_total(), 4);
    assert!(grid.entry(&TileKey::new(-11_720, -1)).is_some());
    assert!(grid.entry(&TileKey::new(-11_719, 0)).is_some());
}

#[test]
fn test_keep_buffer_and_disabled_eviction() {
    let producer = ManualProducer::default();
    let options = GridOptions {
        keep_buffer: 1,
        ..Default::default()
    };
    let mut grid = TileGrid::new(&EPSG3857, producer.clone(), options).unwrap();
    let mut view = tile_three_three_view();
    grid.update(&view).unwrap();

    // one tile east: (3, 3) is inside the keep ring
    let events = view.pan_by(Point::new(256.0, 0.0)).unwrap();
    grid.on_view_events(&events, &view).unwrap();
    assert!(grid.entry(&TileKey::new(3, 3)).is_some());
    assert!(grid.entry(&TileKey::new(4, 3)).is_some());

    let producer = ManualProducer::default();
    let options = GridOptions {
        evict: false,
        ..Default::default()
    };
    let mut grid = TileGrid::new(&EPSG3857, producer.clone(), options).unwrap();
    let mut view = tile_three_three_view();
    grid.update(&view).unwrap();
    let events = view.pan_by(Point::new(2560.0, 0.0)).unwrap();
    grid.on_view_events(&events, &view).unwrap();

    assert_eq!(grid.len(), 2);
    let events = grid.drain_events();
    assert_eq!(count(&events, |e| matches!(e, TileEvent::Unload { .. })), 0);
}

#[test]
fn test_abort_evicted_loads() {
    let producer = ManualProducer::default();
    let options = GridOptions {
        abort_evicted_loads: true,
        ..Default::default()
    };
    let mut grid = TileGrid::new(&EPSG3857, producer.clone(), options).unwrap();
    let mut view = tile_three_three_view();
    grid.update(&view).unwrap();

    let events = view.pan_by(Point::new(2560.0, 0.0)).unwrap();
    grid.on_view_events(&events, &view).unwrap();

    // the aborted load resolves on the next tick without touching the cache
    assert_eq!(grid.tick(), 1);
    assert!(grid.entry(&TileKey::new(3, 3)).is_none());
    assert!(!producer.complete(TileCoord::new(3, 3, 5), Ok(1)));

    let events = grid.drain_events();
    assert_eq!(count(&events, |e| matches!(e, TileEvent::Error { .. })), 0);
}

#[test]
fn test_zoom_animation_double_buffer() {
    init_logger();
    let mut grid = TileGrid::new(&EPSG3857, ready_producer, GridOptions::default()).unwrap();
    let mut view = world_view(1.0, 512.0);
    grid.update(&view).unwrap();
    grid.tick();
    grid.drain_events();

    let events = view.begin_zoom_animation(LatLng::new(0.0, 0.0), 2.0).unwrap();
    grid.on_view_events(&events, &view).unwrap();
    assert!(grid.is_zooming());
    assert_eq!(grid.tile_zoom(), Some(2));

    let background = grid.background().unwrap();
    assert_eq!(background.zoom(), 1);
    assert_eq!(background.level.len(), 4);
    assert_eq!(background.loaded_ratio(), 1.0);
    assert_eq!(background.transform().scale, 2.0);
    assert_eq!(background.transform().translate, Point::new(-256.0, -256.0));

    let front = grid.level().unwrap();
    assert_eq!(front.zoom, 2);
    assert_eq!(front.len(), 4);
    assert_eq!(front.transform.scale, 1.0);

    // the new level settles, but the background stays while zooming
    grid.tick();
    assert_eq!(grid.state(), GridState::Settled);
    assert!(grid.background().is_some());

    let events = view.end_zoom_animation().unwrap();
    grid.on_view_events(&events, &view).unwrap();
    assert!(!grid.is_zooming());
    assert!(grid.background().is_some());

    grid.tick();
    assert!(grid.background().is_none());
    let events = grid.drain_events();
    assert_eq!(count(&events, |e| *e == TileEvent::BackgroundCleared { zoom: 1 }), 1);
    assert_eq!(
        count(&events, |e| matches!(e, TileEvent::Unload { coord } if coord.z == 1)),
        4
    );
}

#[test]
fn test_zoom_without_updates_while_animating() {
    let options = GridOptions {
        update_when_zooming: false,
        ..Default::default()
    };
    let mut grid = TileGrid::new(&EPSG3857, ready_producer, options).unwrap();
    let mut view = world_view(1.0, 512.0);
    grid.update(&view).unwrap();
    grid.tick();
    grid.drain_events();

    let events = view.begin_zoom_animation(LatLng::new(0.0, 0.0), 2.0).unwrap();
    grid.on_view_events(&events, &view).unwrap();

    // only the frozen level is drawn, scaled towards the target zoom
    assert!(grid.is_zooming());
    assert!(grid.level().is_none());
    let background = grid.background().unwrap();
    assert_eq!(background.zoom(), 1);
    assert_eq!(background.transform().scale, 2.0);
    let events = grid.drain_events();
    assert_eq!(count(&events, |e| matches!(e, TileEvent::RequestStart { .. })), 0);
    assert_eq!(grid.tiles_total(), 4);

    let events = view.end_zoom_animation().unwrap();
    grid.on_view_events(&events, &view).unwrap();
    assert_eq!(grid.tile_zoom(), Some(2));
    assert_eq!(grid.tiles_total(), 8);
    assert!(grid.background().is_some());

    grid.tick();
    assert_eq!(grid.state(), GridState::Settled);
    assert!(grid.background().is_none());
}

#[test]
fn test_background_cleared_after_timeout() {
    let producer = ManualProducer::default();
    let mut grid = TileGrid::new(&EPSG3857, producer.clone(), GridOptions::default()).unwrap();
    let mut view = world_view(1.0, 512.0);
    grid.update(&view).unwrap();
    producer.complete_all(1);
    grid.tick();

    let events = view.begin_zoom_animation(LatLng::new(0.0, 0.0), 2.0).unwrap();
    grid.on_view_events(&events, &view).unwrap();
    let events = view.end_zoom_animation().unwrap();
    grid.on_view_events(&events, &view).unwrap();

    // the zoom-2 tiles never arrive
    assert_eq!(grid.state(), GridState::Populating);
    grid.tick_at(Instant::now());
    assert!(grid.background().is_some());

    let later = Instant::now() + grid.options().background_timeout() + Duration::from_millis(50);
    grid.tick_at(later);
    assert!(grid.background().is_none());
    assert_eq!(grid.state(), GridState::Populating);
}

#[test]
fn test_sparse_front_keeps_existing_background() {
    let producer = ManualProducer::default();
    let mut grid = TileGrid::new(&EPSG3857, producer.clone(), GridOptions::default()).unwrap();
    let mut view = world_view(1.0, 512.0);
    grid.update(&view).unwrap();
    producer.complete_all(1);
    grid.tick();

    let events = view.begin_zoom_animation(LatLng::new(0.0, 0.0), 2.0).unwrap();
    grid.on_view_events(&events, &view).unwrap();
    grid.drain_events();

    // a second gesture before any zoom-2 tile loaded
    let events = view.begin_zoom_animation(LatLng::new(0.0, 0.0), 3.0).unwrap();
    grid.on_view_events(&events, &view).unwrap();

    assert_eq!(grid.background().unwrap().zoom(), 1);
    assert_eq!(grid.tile_zoom(), Some(3));
    let events = grid.drain_events();
    assert_eq!(
        count(&events, |e| matches!(e, TileEvent::Unload { coord } if coord.z == 2)),
        4
    );

    // the abandoned zoom-2 loads finish late and change nothing
    for coord in producer.requested().into_iter().filter(|c| c.z == 2) {
        producer.complete(coord, Ok(2));
    }
    grid.tick();
    assert!(grid.entries().all(|e| e.coord.z == 3));
    assert_eq!(grid.tiles_to_load(), 4);
}

#[test]
fn test_sparse_background_is_replaced() {
    let producer = ManualProducer::default();
    let mut grid = TileGrid::new(&EPSG3857, producer.clone(), GridOptions::default()).unwrap();
    let mut view = world_view(1.0, 512.0);
    grid.update(&view).unwrap();
    assert!(producer.complete(TileCoord::new(0, 0, 1), Ok(1)));
    grid.tick();

    let events = view.begin_zoom_animation(LatLng::new(0.0, 0.0), 2.0).unwrap();
    grid.on_view_events(&events, &view).unwrap();
    assert_eq!(grid.background().unwrap().loaded_ratio(), 0.25);
    assert!(producer.complete(TileCoord::new(1, 1, 2), Ok(2)));
    grid.tick();

    // both levels are a quarter loaded; the newer one becomes the background
    let events = view.begin_zoom_animation(LatLng::new(0.0, 0.0), 3.0).unwrap();
    grid.on_view_events(&events, &view).unwrap();
    let background = grid.background().unwrap();
    assert_eq!(background.zoom(), 2);
    assert_eq!(background.level.len(), 1);
    assert_eq!(background.expected, 4);

    let events = grid.drain_events();
    assert_eq!(count(&events, |e| *e == TileEvent::BackgroundCleared { zoom: 1 }), 1);
}

#[test]
fn test_fade_in_opacity() {
    let mut grid = TileGrid::new(&EPSG3857, ready_producer, GridOptions::default()).unwrap();
    grid.update(&world_view(1.0, 512.0)).unwrap();

    let key = TileKey::new(0, 0);
    let now = Instant::now();
    assert_eq!(grid.tile_opacity(&key, now), Some(0.0));

    grid.tick_at(now);
    assert_eq!(grid.tile_opacity(&key, now), Some(0.0));
    let done = now + grid.options().fade_duration();
    assert_eq!(grid.tile_opacity(&key, done), Some(1.0));
    assert_eq!(grid.tile_opacity(&TileKey::new(9, 9), done), None);

    let options = GridOptions {
        fade_easing: EasingType::EaseOut,
        ..Default::default()
    };
    let mut grid = TileGrid::new(&EPSG3857, ready_producer, options).unwrap();
    grid.update(&world_view(1.0, 512.0)).unwrap();
    grid.tick_at(now);
    let halfway = now + grid.options().fade_duration() / 2;
    assert_eq!(grid.tile_opacity(&key, halfway), Some(0.875));
}

#[tokio::test]
async fn test_async_producer_settles() {
    init_logger();
    let producer = |coord: TileCoord| -> TileFuture<TileCoord> {
        async move {
            let delay = 5 * (coord.x + 2 * coord.y + 1) as u64;
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            Ok(coord)
        }
        .boxed()
    };
    let mut grid = TileGrid::new(&EPSG3857, producer, GridOptions::default()).unwrap();
    grid.update(&world_view(1.0, 512.0)).unwrap();

    // nothing is ready yet on an immediate tick
    assert_eq!(grid.tick(), 0);

    grid.settled().await;
    assert_eq!(grid.state(), GridState::Settled);
    assert!(grid.entries().all(|e| e.status == TileStatus::Loaded));
    assert_eq!(
        grid.entry(&TileKey::new(1, 1)).unwrap().handle,
        Some(TileCoord::new(1, 1, 1))
    );
}
