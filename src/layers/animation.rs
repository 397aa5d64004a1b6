use serde::{Deserialize, Serialize};

use crate::core::geo::Point;
use crate::prelude::{Duration, Instant};

/// Curve applied to the normalised fade-in progress of a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EasingType {
    #[default]
    Linear,
    /// Cubic, slow start
    EaseIn,
    /// Cubic, slow finish
    EaseOut,
    EaseInOut,
    /// Hermite smooth step
    Smooth,
}

impl EasingType {
    /// Eased value of `t`, clamped to `[0, 1]` first
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            EasingType::Linear => t,
            EasingType::EaseIn => t.powi(3),
            EasingType::EaseOut => 1.0 - (1.0 - t).powi(3),
            EasingType::EaseInOut if t < 0.5 => 4.0 * t.powi(3),
            EasingType::EaseInOut => 1.0 - (2.0 - 2.0 * t).powi(3) / 2.0,
            EasingType::Smooth => t * t * (3.0 - 2.0 * t),
        }
    }
}

/// Scale and translation applied to a whole tile level, in pixels.
///
/// A background level frozen at zoom `z0` is drawn at zoom `z1` by scaling
/// its layer points by `scale` and then offsetting them by `translate`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelTransform {
    pub translate: Point,
    pub scale: f64,
}

impl Default for LevelTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl LevelTransform {
    pub fn new(translate: Point, scale: f64) -> Self {
        Self { translate, scale }
    }

    pub fn identity() -> Self {
        Self {
            translate: Point::default(),
            scale: 1.0,
        }
    }

    pub fn is_identity(&self) -> bool {
        (self.scale - 1.0).abs() < 1e-9 && self.translate == Point::default()
    }

    /// Maps a point of the frozen level into the current layer space
    pub fn apply(&self, point: Point) -> Point {
        point * self.scale + self.translate
    }
}

/// Opacity of a tile `elapsed` after it finished loading, fading in over
/// `duration`. A zero duration shows tiles at full opacity immediately.
pub fn fade_opacity(elapsed: Duration, duration: Duration, easing: EasingType) -> f64 {
    if duration.is_zero() {
        return 1.0;
    }
    easing.apply(elapsed.as_secs_f64() / duration.as_secs_f64())
}

/// Opacity at `now` for something that became visible at `since`
pub fn fade_opacity_at(
    since: Instant,
    now: Instant,
    duration: Duration,
    easing: EasingType,
) -> f64 {
    fade_opacity(now.saturating_duration_since(since), duration, easing)
}
