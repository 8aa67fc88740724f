//! GPU resources.
//!
//! This module contains the GPU resource types that are created by [`GraphicsDevice`]:
//! - [`Buffer`] - GPU memory buffer
//! - [`Texture`] - GPU texture/image, including presentation images
//! - [`Pipeline`] - Compiled render pipeline
//! - [`BindGroup`] - Resources bound to one pipeline table
//!
//! Resources are reference-counted with [`Arc`] and can be shared across threads.
//! Recorded commands only carry a [`ResourceId`]; dropping the last handle
//! destroys the backend object, so callers keep handles alive until the work
//! that uses them has retired.
//!
//! [`GraphicsDevice`]: crate::GraphicsDevice
//! [`Arc`]: std::sync::Arc

mod buffer;
mod pipeline;
mod texture;

pub use buffer::Buffer;
pub use pipeline::{BindGroup, Pipeline};
pub use texture::Texture;

use std::fmt;
use std::sync::Arc;

use crate::backend::GpuBackend;

/// Backend-side identity of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Wrap a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Destroys the backend object when the owning resource drops.
pub(crate) struct ResourceHandle {
    id: ResourceId,
    backend: Arc<dyn GpuBackend>,
}

impl ResourceHandle {
    pub(crate) fn new(id: ResourceId, backend: Arc<dyn GpuBackend>) -> Self {
        Self { id, backend }
    }

    pub(crate) fn id(&self) -> ResourceId {
        self.id
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        self.backend.destroy(self.id);
    }
}
