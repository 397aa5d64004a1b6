//! Integer tile-index rectangles and the pixel-to-tile math around them.

use crate::core::bounds::Bounds;
use crate::core::geo::{Point, TileCoord};
use crate::{MapError, Result};

/// Inclusive rectangle of tile indices. Empty when `max < min` on an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl TileRange {
    pub fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.max_x < self.min_x || self.max_y < self.min_y
    }

    pub fn len(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        let width = (self.max_x as i64 - self.min_x as i64 + 1) as usize;
        let height = (self.max_y as i64 - self.min_y as i64 + 1) as usize;
        width * height
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Geometric center in tile-index space
    pub fn center(&self) -> Point {
        Point::new(
            (self.min_x as f64 + self.max_x as f64) / 2.0,
            (self.min_y as f64 + self.max_y as f64) / 2.0,
        )
    }

    /// Grows the range by `amount` tiles on every side
    pub fn pad(&self, amount: u32) -> TileRange {
        let amount = amount.min(i32::MAX as u32) as i32;
        TileRange::new(
            self.min_x.saturating_sub(amount),
            self.min_y.saturating_sub(amount),
            self.max_x.saturating_add(amount),
            self.max_y.saturating_add(amount),
        )
    }

    /// Every coordinate at zoom `z`, row by row
    pub fn coords(&self, z: i32) -> Vec<TileCoord> {
        let mut coords = Vec::with_capacity(self.len());
        for y in self.min_y..=self.max_y {
            for x in self.min_x..=self.max_x {
                coords.push(TileCoord::new(x, y, z));
            }
        }
        coords
    }
}

/// Tiles touched by `pixel_bounds`. A bound ending exactly on a tile edge
/// does not pull in the next tile.
///
/// Edges beyond the `i32` index space saturate; use
/// [`try_visible_tile_range`] to reject them instead.
pub fn compute_visible_tile_range(pixel_bounds: &Bounds, tile_size: u32) -> TileRange {
    let [min_x, min_y, max_x, max_y] = tile_edges(pixel_bounds, tile_size);
    TileRange::new(
        min_x as i32,
        min_y as i32,
        (max_x as i32).saturating_sub(1),
        (max_y as i32).saturating_sub(1),
    )
}

/// Like [`compute_visible_tile_range`], but fails when an edge cannot be
/// expressed as a tile index
pub fn try_visible_tile_range(pixel_bounds: &Bounds, tile_size: u32) -> Result<TileRange> {
    let representable =
        |edge: &f64| edge.is_finite() && *edge >= i32::MIN as f64 && *edge <= i32::MAX as f64;
    if !tile_edges(pixel_bounds, tile_size).iter().all(representable) {
        return Err(MapError::InvalidCoordinates(format!(
            "pixel bounds {:?}..{:?} are outside the tile index range",
            pixel_bounds.min, pixel_bounds.max
        )));
    }
    Ok(compute_visible_tile_range(pixel_bounds, tile_size))
}

/// Floored min and ceiled max edges, in tiles
fn tile_edges(pixel_bounds: &Bounds, tile_size: u32) -> [f64; 4] {
    let tile_size = tile_size as f64;
    [
        (pixel_bounds.min.x / tile_size).floor(),
        (pixel_bounds.min.y / tile_size).floor(),
        (pixel_bounds.max.x / tile_size).ceil(),
        (pixel_bounds.max.y / tile_size).ceil(),
    ]
}

/// Every coordinate in `range` at zoom `z`
pub fn desired_coords(range: &TileRange, z: i32) -> Vec<TileCoord> {
    range.coords(z)
}

/// Stable sort by distance to `center` so the middle of the view loads first
pub fn sort_by_center_distance(coords: &mut [TileCoord], center: Point) {
    coords.sort_by(|a, b| a.distance_to(&center).total_cmp(&b.distance_to(&center)));
}
