//! Icon image importer.

use std::path::Path;

use super::{ImageData, ImageImporter};
use crate::error::LoadError;

/// Decodes PNG files into RGBA8.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngImporter;

impl PngImporter {
    /// Decode an in-memory image.
    pub fn decode(bytes: &[u8]) -> Result<ImageData, String> {
        let image = image::load_from_memory(bytes).map_err(|e| format!("{e}"))?;
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(ImageData {
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }
}

impl ImageImporter for PngImporter {
    fn import_image(&self, path: &Path) -> Result<ImageData, LoadError> {
        let bytes = std::fs::read(path).map_err(|e| LoadError::io(path, e))?;
        let image = Self::decode(&bytes).map_err(|reason| LoadError::Image {
            path: path.to_path_buf(),
            reason,
        })?;
        log::trace!(
            "Decoded {}x{} image from {}",
            image.width,
            image.height,
            path.display()
        );
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_png(width: u32, height: u32, pixels: &[u8]) -> Vec<u8> {
        let buffer = image::RgbaImage::from_raw(width, height, pixels.to_vec()).unwrap();
        let mut bytes = std::io::Cursor::new(Vec::new());
        buffer
            .write_to(&mut bytes, image::ImageFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let pixels: Vec<u8> = (0..2 * 2 * 4).map(|i| i as u8 * 10).collect();
        let png = encode_png(2, 2, &pixels);
        let image = PngImporter::decode(&png).unwrap();
        assert_eq!((image.width, image.height), (2, 2));
        assert_eq!(image.pixels, pixels);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(PngImporter::decode(b"definitely not a png").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = PngImporter
            .import_image(Path::new("missing/icon.png"))
            .unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
