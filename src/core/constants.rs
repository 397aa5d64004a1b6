//! Core constants derived from Leaflet defaults and common web-map conventions.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Pixel width of the whole world at zoom 0 for the shipped CRSes.
pub const REFERENCE_TILE_SIZE: f64 = 256.0;

/// Equatorial radius in meters (WGS84 semi-major axis).
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Polar radius in meters (WGS84 semi-minor axis), used by ellipsoidal Mercator.
pub const EARTH_RADIUS_MINOR: f64 = 6_356_752.314_245_179;

/// `sin(lat)` is clamped to `[-1 + e, 1 - e]` before the spherical Mercator log.
pub const MERCATOR_SIN_EPSILON: f64 = 1e-15;

/// Iteration cap for the ellipsoidal Mercator inverse.
pub const MERCATOR_MAX_ITERATIONS: u32 = 15;

/// Stop iterating once the latitude correction (radians) drops below this.
pub const MERCATOR_TOLERANCE: f64 = 1e-7;

/// Tolerance used by `LatLng::equals` when no margin is given.
pub const LAT_LNG_MARGIN: f64 = 1e-9;

/// Fade-in duration for freshly loaded tiles.
pub const DEFAULT_FADE_DURATION_MS: u64 = 200;

/// How long a frozen background level survives after a zoom ends.
pub const DEFAULT_BACKGROUND_TIMEOUT_MS: u64 = 500;

/// Ratio of loaded tiles below which a zoom keeps the existing background.
pub const BACKGROUND_KEEP_RATIO: f64 = 0.5;

/// Default zoom limits when none are configured.
pub const DEFAULT_MIN_ZOOM: f64 = 0.0;
pub const DEFAULT_MAX_ZOOM: f64 = 18.0;

/// Zoom limits must stay within `[-MAX_ZOOM_LIMIT, MAX_ZOOM_LIMIT]`.
pub const MAX_ZOOM_LIMIT: f64 = 64.0;
