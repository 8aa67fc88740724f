//! # Map Viewer Core
//!
//! Backend-free data for the interactive map viewer: the camera and its
//! input policy, the world catalog, the concatenated geometry pool with its
//! per-world draw table, overlay markers, and the importer seams that turn
//! files into CPU-side data.

pub mod camera;
pub mod error;
pub mod geometry;
pub mod import;
pub mod input;
pub mod mesh;
pub mod overlay;
pub mod world;

pub use error::LoadError;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the core library version.
pub fn init() {
    log::info!("Map Viewer Core v{} initialized", VERSION);
}
