//! Swapchain and surface management.
//!
//! - [`Surface`] - The presentation images a window displays
//! - [`SurfaceConfiguration`] - Size, format, image count and present mode
//! - [`PresentMode`] - Controls vsync behavior
//!
//! The surface decides which image the next frame renders to; the frame
//! loop uses that index to pick the frame slot, so slot `i` always renders
//! into image `i`.

use std::sync::Arc;

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::Texture;
use crate::sync::Drained;
use crate::types::TextureFormat;

/// Presentation mode for the swapchain.
///
/// Controls how frames are synchronized with the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PresentMode {
    /// No synchronization. May cause tearing but has lowest latency.
    Immediate,
    /// VSync enabled. No tearing, but may have higher latency.
    #[default]
    Fifo,
}

/// Configuration for a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceConfiguration {
    /// The texture format for the swapchain.
    pub format: TextureFormat,
    /// Width of the surface in pixels.
    pub width: u32,
    /// Height of the surface in pixels.
    pub height: u32,
    /// Number of presentation images (frames in flight).
    pub image_count: u32,
    /// Presentation mode (vsync behavior).
    pub present_mode: PresentMode,
}

impl SurfaceConfiguration {
    /// Create a double-buffered RGBA8 configuration.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            format: TextureFormat::Rgba8Unorm,
            width,
            height,
            image_count: 2,
            present_mode: PresentMode::default(),
        }
    }

    /// Set the texture format.
    pub fn with_format(mut self, format: TextureFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the number of presentation images.
    pub fn with_image_count(mut self, count: u32) -> Self {
        self.image_count = count;
        self
    }

    /// Set the present mode.
    pub fn with_present_mode(mut self, present_mode: PresentMode) -> Self {
        self.present_mode = present_mode;
        self
    }
}

/// The presentation images of one window.
pub struct Surface {
    device: Arc<GraphicsDevice>,
    config: SurfaceConfiguration,
    images: Vec<Arc<Texture>>,
}

impl Surface {
    /// Configure the backend's surface and allocate its images.
    pub fn new(device: Arc<GraphicsDevice>, config: SurfaceConfiguration) -> Result<Self, GraphicsError> {
        if !(2..=3).contains(&config.image_count) {
            return Err(GraphicsError::InvalidParameter(format!(
                "surface needs 2 or 3 images, got {}",
                config.image_count
            )));
        }
        if config.width == 0 || config.height == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "surface size {}x{} has a zero dimension",
                config.width, config.height
            )));
        }
        let images = device.configure_surface(&config)?;
        log::info!(
            "Surface configured: {}x{} {:?}, {} images, {:?}",
            config.width,
            config.height,
            config.format,
            config.image_count,
            config.present_mode
        );
        Ok(Self {
            device,
            config,
            images,
        })
    }

    /// Current configuration.
    pub fn config(&self) -> &SurfaceConfiguration {
        &self.config
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.config.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.config.height
    }

    /// Number of presentation images.
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Presentation image `index`.
    pub fn image(&self, index: usize) -> Option<&Arc<Texture>> {
        self.images.get(index)
    }

    /// Index of the image the next frame renders to.
    pub fn current_index(&self) -> usize {
        self.device.backend().current_image_index() as usize
    }

    /// Make the current image available for rendering.
    pub fn acquire(&self) -> Result<usize, GraphicsError> {
        let index = self.device.backend().acquire_image()? as usize;
        if index >= self.images.len() {
            return Err(GraphicsError::Surface(format!(
                "backend returned image {index} of {}",
                self.images.len()
            )));
        }
        Ok(index)
    }

    /// Queue the current image for display and rotate to the next one.
    pub fn present(&self) -> Result<(), GraphicsError> {
        self.device.backend().present()
    }

    /// Recreate the images at a new size. The device must be idle.
    pub fn resize(&mut self, _idle: &Drained<'_>, width: u32, height: u32) -> Result<(), GraphicsError> {
        if width == 0 || height == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "surface size {width}x{height} has a zero dimension"
            )));
        }
        // Old images must be gone before the backend reconfigures.
        self.images.clear();
        self.config.width = width;
        self.config.height = height;
        self.images = self.device.configure_surface(&self.config)?;
        log::info!("Surface resized to {width}x{height}");
        Ok(())
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("config", &self.config)
            .field("images", &self.images.len())
            .finish()
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;

    #[test]
    fn test_surface_rotates() {
        let device = GraphicsDevice::dummy().unwrap();
        let surface = Surface::new(device, SurfaceConfiguration::new(16, 8).with_image_count(3)).unwrap();
        assert_eq!(surface.image_count(), 3);
        assert_eq!(surface.acquire().unwrap(), 0);
        surface.present().unwrap();
        assert_eq!(surface.current_index(), 1);
    }

    #[test]
    fn test_image_count_validated() {
        let device = GraphicsDevice::dummy().unwrap();
        let config = SurfaceConfiguration::new(16, 8).with_image_count(4);
        assert!(Surface::new(device, config).is_err());
    }
}
