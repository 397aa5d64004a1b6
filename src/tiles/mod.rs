pub mod loader;
pub mod source;

// Re-exports for convenience
pub use loader::HttpTileProducer;
pub use source::{TemplateSource, TileSource};
