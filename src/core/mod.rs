pub mod bounds;
pub mod config;
pub mod constants;
pub mod crs;
pub mod geo;
pub mod projection;
pub mod transformation;
pub mod viewport;
