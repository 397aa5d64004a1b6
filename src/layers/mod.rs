pub mod animation;
pub mod tile;
