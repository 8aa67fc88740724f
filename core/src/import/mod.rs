//! Importer seams for meshes and images.
//!
//! The viewer never parses file formats itself; it asks a [`MeshImporter`]
//! for a world's sub-meshes and an [`ImageImporter`] for icon pixels. The
//! default implementations (behind the `gltf` feature) read glTF 2.0 with
//! the `gltf` crate and PNG with the `image` crate.

#[cfg(feature = "gltf")]
mod gltf;
#[cfg(feature = "gltf")]
mod png;

#[cfg(feature = "gltf")]
pub use gltf::GltfImporter;
#[cfg(feature = "gltf")]
pub use png::PngImporter;

use std::path::Path;

use crate::error::LoadError;
use crate::mesh::SubMesh;

/// Decoded RGBA8 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Tightly packed RGBA8 rows.
    pub pixels: Vec<u8>,
}

impl ImageData {
    /// A single-color image.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Bytes per row.
    pub fn row_bytes(&self) -> u32 {
        self.width * 4
    }
}

/// Loads one world's geometry.
///
/// Implementations return triangulated sub-meshes in the left-handed
/// convention, in a stable order.
pub trait MeshImporter {
    /// Import the file at `path`.
    fn import_mesh(&self, path: &Path) -> Result<Vec<SubMesh>, LoadError>;
}

/// Loads an image as RGBA8.
pub trait ImageImporter {
    /// Import the file at `path`.
    fn import_image(&self, path: &Path) -> Result<ImageData, LoadError>;
}
