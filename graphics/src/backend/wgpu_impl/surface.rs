//! Presentation images for the wgpu backend.
//!
//! With a window, every image id stands for whichever swapchain texture is
//! currently acquired. Headless, the ids are ordinary offscreen textures.

use crate::error::GraphicsError;
use crate::resources::ResourceId;
use crate::swapchain::SurfaceConfiguration;

use super::conversion::{convert_present_mode, convert_texture_format};

/// An acquired swapchain texture and its render view.
struct Acquired {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

/// Swapchain state behind the backend's presentation methods.
pub(super) struct Presentation {
    surface: Option<wgpu::Surface<'static>>,
    images: Vec<ResourceId>,
    current: u32,
    acquired: Option<Acquired>,
}

impl Presentation {
    pub(super) fn new(surface: Option<wgpu::Surface<'static>>) -> Self {
        Self {
            surface,
            images: Vec::new(),
            current: 0,
            acquired: None,
        }
    }

    /// Whether images are backed by a window surface.
    pub(super) fn has_window(&self) -> bool {
        self.surface.is_some()
    }

    pub(super) fn surface(&self) -> Option<&wgpu::Surface<'static>> {
        self.surface.as_ref()
    }

    /// Configure the window surface, if any, and adopt `images`.
    pub(super) fn configure(
        &mut self,
        device: &wgpu::Device,
        config: &SurfaceConfiguration,
        images: &[ResourceId],
    ) {
        // Dropping an acquired texture without presenting is allowed.
        self.acquired = None;
        if let Some(surface) = &self.surface {
            surface.configure(
                device,
                &wgpu::SurfaceConfiguration {
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    format: convert_texture_format(config.format),
                    width: config.width,
                    height: config.height,
                    present_mode: convert_present_mode(config.present_mode),
                    alpha_mode: wgpu::CompositeAlphaMode::Auto,
                    view_formats: vec![],
                    desired_maximum_frame_latency: config.image_count,
                },
            );
        }
        self.images = images.to_vec();
        self.current = 0;
    }

    /// The acquired swapchain view if `id` is a window image.
    pub(super) fn view_for(&self, id: ResourceId) -> Result<Option<&wgpu::TextureView>, GraphicsError> {
        if self.surface.is_none() || !self.images.contains(&id) {
            return Ok(None);
        }
        match &self.acquired {
            Some(acquired) => Ok(Some(&acquired.view)),
            None => Err(GraphicsError::Surface(format!(
                "presentation image {id} used before acquire"
            ))),
        }
    }

    pub(super) fn current_index(&self) -> u32 {
        self.current
    }

    /// Acquire the next swapchain texture. Idempotent until [`present`](Self::present).
    pub(super) fn acquire(&mut self) -> Result<u32, GraphicsError> {
        if self.images.is_empty() {
            return Err(GraphicsError::Surface("surface is not configured".into()));
        }
        if let Some(surface) = &self.surface
            && self.acquired.is_none()
        {
            let texture = surface.get_current_texture().map_err(|e| match e {
                wgpu::SurfaceError::Outdated => GraphicsError::SurfaceOutdated,
                wgpu::SurfaceError::Lost => GraphicsError::SurfaceLost,
                wgpu::SurfaceError::Timeout => GraphicsError::SurfaceTimeout,
                wgpu::SurfaceError::OutOfMemory => {
                    GraphicsError::OutOfMemory("surface texture".into())
                }
                other => GraphicsError::Surface(format!("failed to acquire surface texture: {other}")),
            })?;
            let view = texture
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default());
            self.acquired = Some(Acquired { texture, view });
        }
        Ok(self.current)
    }

    /// Present the acquired texture and rotate to the next image.
    pub(super) fn present(&mut self) -> Result<(), GraphicsError> {
        if self.images.is_empty() {
            return Err(GraphicsError::Surface("surface is not configured".into()));
        }
        if self.surface.is_some() {
            let Some(acquired) = self.acquired.take() else {
                return Err(GraphicsError::Surface("present without acquire".into()));
            };
            acquired.texture.present();
        }
        self.current = (self.current + 1) % self.images.len() as u32;
        Ok(())
    }
}
