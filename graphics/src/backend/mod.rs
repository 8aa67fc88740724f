//! GPU backend abstraction layer.
//!
//! Every backend executes the same recorded [`Command`] streams on a single
//! in-order queue and exposes one monotonically increasing completion
//! counter. Everything above this trait (slots, gate, stager, graph) is
//! written against it alone.
//!
//! # Available Backends
//!
//! - `dummy` (default): simulated device with a worker-thread queue,
//!   CPU-side memory and strict state validation, for tests and headless runs
//! - `wgpu-backend`: cross-platform backend using wgpu
//!
//! [`Command`]: crate::command::Command

#[cfg(feature = "dummy")]
pub mod dummy;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_impl;

use std::sync::Arc;
use std::time::Duration;

use crate::command::Command;
use crate::error::GraphicsError;
use crate::resources::ResourceId;
use crate::state::ResourceState;
use crate::swapchain::SurfaceConfiguration;
use crate::types::{BindGroupDescriptor, BufferDescriptor, PipelineDescriptor, TextureDescriptor};

/// A GPU device with one queue and one completion counter.
///
/// Ids are allocated by the caller ([`GraphicsDevice`]) and are never reused.
/// All methods take `&self`; backends synchronize internally.
///
/// [`GraphicsDevice`]: crate::GraphicsDevice
pub trait GpuBackend: Send + Sync + std::fmt::Debug {
    /// Human-readable backend name.
    fn name(&self) -> &'static str;

    /// Whether pipelines may use [`PolygonMode::Line`](crate::types::PolygonMode::Line).
    fn supports_wireframe(&self) -> bool;

    /// Create a buffer. Mapped buffers start in [`ResourceState::GenericRead`],
    /// others in [`ResourceState::CopyDest`].
    fn create_buffer(&self, id: ResourceId, descriptor: &BufferDescriptor)
    -> Result<(), GraphicsError>;

    /// Create a texture in `initial_state`.
    fn create_texture(
        &self,
        id: ResourceId,
        descriptor: &TextureDescriptor,
        initial_state: ResourceState,
    ) -> Result<(), GraphicsError>;

    /// Create a render pipeline.
    fn create_pipeline(
        &self,
        id: ResourceId,
        descriptor: &PipelineDescriptor,
    ) -> Result<(), GraphicsError>;

    /// Create a bind group.
    fn create_bind_group(
        &self,
        id: ResourceId,
        descriptor: &BindGroupDescriptor,
    ) -> Result<(), GraphicsError>;

    /// Release a resource of any kind.
    fn destroy(&self, id: ResourceId);

    /// CPU write into a mapped buffer.
    ///
    /// The caller guarantees no unretired submission reads the written range.
    fn write_mapped(&self, id: ResourceId, offset: u64, data: &[u8]) -> Result<(), GraphicsError>;

    /// Debug readback of a buffer. Only valid while the device is idle.
    fn read_buffer(&self, id: ResourceId) -> Result<Vec<u8>, GraphicsError>;

    /// Debug readback of a texture, tightly packed, layers in order.
    /// Only valid while the device is idle.
    fn read_texture(&self, id: ResourceId) -> Result<Vec<u8>, GraphicsError>;

    /// Queue recorded commands. The backend drops its copy of `commands`
    /// before any later signal becomes visible.
    fn submit(&self, commands: Arc<Vec<Command>>) -> Result<(), GraphicsError>;

    /// Queue a counter signal. It becomes visible once all previously
    /// queued work has executed.
    fn signal(&self, value: u64) -> Result<(), GraphicsError>;

    /// Highest signaled value the GPU has reached.
    fn completed_value(&self) -> Result<u64, GraphicsError>;

    /// Block until the counter reaches `value` or `timeout` elapses.
    /// Returns whether the value was reached.
    fn wait_for_value(&self, value: u64, timeout: Duration) -> Result<bool, GraphicsError>;

    /// (Re)configure the presentation surface with `images` as its buffers.
    /// Images start in [`ResourceState::Present`].
    fn configure_surface(
        &self,
        config: &SurfaceConfiguration,
        images: &[ResourceId],
    ) -> Result<(), GraphicsError>;

    /// Make the current presentation image available for rendering and
    /// return its index.
    fn acquire_image(&self) -> Result<u32, GraphicsError>;

    /// Index of the image the next frame renders to.
    fn current_image_index(&self) -> u32;

    /// Queue presentation of the current image and rotate to the next one.
    fn present(&self) -> Result<(), GraphicsError>;
}

/// Which backend to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendKind {
    /// wgpu when compiled in, otherwise the simulated device.
    #[default]
    Auto,
    /// The simulated device.
    Dummy,
    /// wgpu.
    Wgpu,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "dummy" => Ok(Self::Dummy),
            "wgpu" => Ok(Self::Wgpu),
            other => Err(format!("unknown backend '{other}' (expected auto, dummy or wgpu)")),
        }
    }
}

impl BackendKind {
    /// Resolve `Auto` against the compiled-in backends.
    pub fn resolve(self) -> Self {
        match self {
            Self::Auto if cfg!(feature = "wgpu-backend") => Self::Wgpu,
            Self::Auto => Self::Dummy,
            other => other,
        }
    }
}
