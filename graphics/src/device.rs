//! Graphics device.
//!
//! The [`GraphicsDevice`] is the main interface for creating GPU resources
//! and for handing recorded work to the backend's queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::backend::GpuBackend;
use crate::command::CommandStream;
use crate::error::GraphicsError;
use crate::resources::{BindGroup, Buffer, Pipeline, ResourceHandle, ResourceId, Texture};
use crate::state::ResourceState;
use crate::swapchain::SurfaceConfiguration;
use crate::sync::Drained;
use crate::types::{
    BindGroupDescriptor, BufferDescriptor, PipelineDescriptor, PolygonMode, TextureDescriptor,
};

/// Capabilities of a graphics device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceCapabilities {
    /// Maximum texture dimension.
    pub max_texture_dimension: u32,
    /// Maximum buffer size.
    pub max_buffer_size: u64,
    /// Whether line-mode rasterization is available.
    pub wireframe: bool,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            max_texture_dimension: 16384,
            max_buffer_size: 1 << 30, // 1 GB
            wireframe: true,
        }
    }
}

/// A graphics device for creating GPU resources.
///
/// # Thread Safety
///
/// `GraphicsDevice` is `Send + Sync` and can be safely shared across threads.
///
/// # Example
///
/// ```ignore
/// let device = GraphicsDevice::dummy()?;
/// let buffer = device.create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX))?;
/// ```
pub struct GraphicsDevice {
    backend: Arc<dyn GpuBackend>,
    capabilities: DeviceCapabilities,
    next_id: AtomicU64,
}

impl GraphicsDevice {
    /// Wrap a backend.
    pub fn new(backend: Arc<dyn GpuBackend>) -> Arc<Self> {
        let capabilities = DeviceCapabilities {
            wireframe: backend.supports_wireframe(),
            ..DeviceCapabilities::default()
        };
        log::info!("GraphicsDevice: using {} backend", backend.name());
        Arc::new(Self {
            backend,
            capabilities,
            next_id: AtomicU64::new(1),
        })
    }

    /// A device on a fresh simulated backend.
    #[cfg(feature = "dummy")]
    pub fn dummy() -> Result<Arc<Self>, GraphicsError> {
        let backend = crate::backend::dummy::DummyBackend::new()?;
        Ok(Self::new(Arc::new(backend)))
    }

    /// The backend.
    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    /// Get the device capabilities.
    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn allocate_id(&self) -> ResourceId {
        ResourceId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn handle(&self, id: ResourceId) -> ResourceHandle {
        ResourceHandle::new(id, Arc::clone(&self.backend))
    }

    /// Create a GPU buffer.
    ///
    /// Mapped buffers start in [`ResourceState::GenericRead`]; all others
    /// start in [`ResourceState::CopyDest`], waiting for an upload.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer size exceeds device limits or allocation fails.
    pub fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<Arc<Buffer>, GraphicsError> {
        if descriptor.size > self.capabilities.max_buffer_size {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer size {} exceeds maximum {}",
                descriptor.size, self.capabilities.max_buffer_size
            )));
        }

        if descriptor.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size cannot be zero".to_string(),
            ));
        }

        let id = self.allocate_id();
        self.backend.create_buffer(id, descriptor)?;

        log::trace!(
            "GraphicsDevice: created buffer {id} {:?}, size={}",
            descriptor.label,
            descriptor.size
        );

        Ok(Arc::new(Buffer::new(self.handle(id), descriptor.clone())))
    }

    /// Create a GPU texture in `initial_state`.
    ///
    /// # Errors
    ///
    /// Returns an error if the dimensions are invalid or allocation fails.
    pub fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
        initial_state: ResourceState,
    ) -> Result<Arc<Texture>, GraphicsError> {
        let max = self.capabilities.max_texture_dimension;
        let size = descriptor.size;
        if size.width == 0 || size.height == 0 || size.depth == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture {:?} has a zero dimension: {size:?}",
                descriptor.label
            )));
        }

        if size.width > max || size.height > max {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture dimensions {}x{} exceed maximum {max}",
                size.width, size.height
            )));
        }

        let id = self.allocate_id();
        self.backend.create_texture(id, descriptor, initial_state)?;

        log::trace!(
            "GraphicsDevice: created texture {id} {:?}, {}x{}x{} {:?}",
            descriptor.label,
            size.width,
            size.height,
            size.depth,
            descriptor.format
        );

        Ok(Arc::new(Texture::new(self.handle(id), descriptor.clone())))
    }

    /// Create a render pipeline.
    pub fn create_pipeline(
        &self,
        descriptor: &PipelineDescriptor,
    ) -> Result<Arc<Pipeline>, GraphicsError> {
        if descriptor.polygon_mode == PolygonMode::Line && !self.capabilities.wireframe {
            return Err(GraphicsError::FeatureNotSupported(format!(
                "pipeline '{}' needs line rasterization",
                descriptor.label
            )));
        }
        let id = self.allocate_id();
        self.backend.create_pipeline(id, descriptor)?;
        log::debug!("GraphicsDevice: created pipeline {id} '{}'", descriptor.label);
        Ok(Arc::new(Pipeline::new(
            self.handle(id),
            descriptor.label.clone(),
            descriptor.color_formats.clone(),
            descriptor.depth_format,
        )))
    }

    /// Create a bind group.
    pub fn create_bind_group(
        &self,
        descriptor: BindGroupDescriptor,
    ) -> Result<Arc<BindGroup>, GraphicsError> {
        descriptor.validate().map_err(GraphicsError::InvalidParameter)?;
        let id = self.allocate_id();
        self.backend.create_bind_group(id, &descriptor)?;
        Ok(Arc::new(BindGroup::new(self.handle(id), descriptor)))
    }

    /// Allocate presentation images and configure the surface with them.
    pub(crate) fn configure_surface(
        &self,
        config: &SurfaceConfiguration,
    ) -> Result<Vec<Arc<Texture>>, GraphicsError> {
        let images: Vec<(ResourceId, TextureDescriptor)> = (0..config.image_count)
            .map(|index| {
                let descriptor = TextureDescriptor::new_2d(
                    config.width,
                    config.height,
                    config.format,
                    crate::types::TextureUsage::RENDER_ATTACHMENT,
                )
                .with_label(format!("surface image {index}"));
                (self.allocate_id(), descriptor)
            })
            .collect();
        let ids: Vec<ResourceId> = images.iter().map(|(id, _)| *id).collect();
        self.backend.configure_surface(config, &ids)?;
        Ok(images
            .into_iter()
            .map(|(id, descriptor)| Arc::new(Texture::new(self.handle(id), descriptor)))
            .collect())
    }

    /// CPU write into a mapped buffer.
    ///
    /// The caller must know the GPU no longer reads the buffer, normally
    /// because the owning frame slot has retired.
    pub fn write_buffer(&self, buffer: &Buffer, offset: u64, data: &[u8]) -> Result<(), GraphicsError> {
        if !buffer.descriptor().is_mapped() {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer {:?} is not CPU-mapped",
                buffer.label()
            )));
        }
        if offset + data.len() as u64 > buffer.size() {
            return Err(GraphicsError::InvalidParameter(format!(
                "write of {} bytes at offset {offset} exceeds buffer {:?} of {} bytes",
                data.len(),
                buffer.label(),
                buffer.size()
            )));
        }
        self.backend.write_mapped(buffer.id(), offset, data)
    }

    /// Debug readback of a buffer. Requires an idle device.
    pub fn read_buffer(&self, buffer: &Buffer, _idle: &Drained<'_>) -> Result<Vec<u8>, GraphicsError> {
        self.backend.read_buffer(buffer.id())
    }

    /// Debug readback of a texture, tightly packed. Requires an idle device.
    pub fn read_texture(
        &self,
        texture: &Texture,
        _idle: &Drained<'_>,
    ) -> Result<Vec<u8>, GraphicsError> {
        self.backend.read_texture(texture.id())
    }

    /// Hand a closed command stream to the queue.
    pub fn submit(&self, stream: CommandStream) -> Result<(), GraphicsError> {
        log::trace!(
            "GraphicsDevice: submitting '{}' ({} commands)",
            stream.label(),
            stream.commands().len()
        );
        self.backend.submit(stream.into_shared())
    }

    pub(crate) fn signal(&self, value: u64) -> Result<(), GraphicsError> {
        self.backend.signal(value)
    }

    pub(crate) fn completed_value(&self) -> Result<u64, GraphicsError> {
        self.backend.completed_value()
    }

    pub(crate) fn wait_for_value(&self, value: u64, timeout: Duration) -> Result<bool, GraphicsError> {
        self.backend.wait_for_value(value, timeout)
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("backend", &self.backend.name())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

// Ensure GraphicsDevice is Send + Sync
static_assertions::assert_impl_all!(GraphicsDevice: Send, Sync);
