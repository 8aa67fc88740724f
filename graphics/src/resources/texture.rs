//! GPU texture resource.

use crate::types::{Extent3d, TextureDescriptor, TextureFormat};

use super::{ResourceHandle, ResourceId};

/// A GPU texture resource.
///
/// Presentation images are textures too; they are owned by the
/// [`Surface`](crate::swapchain::Surface) and never sampled.
pub struct Texture {
    handle: ResourceHandle,
    descriptor: TextureDescriptor,
}

impl Texture {
    pub(crate) fn new(handle: ResourceHandle, descriptor: TextureDescriptor) -> Self {
        Self { handle, descriptor }
    }

    /// Backend identity.
    pub fn id(&self) -> ResourceId {
        self.handle.id()
    }

    /// Get the texture descriptor.
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    /// Get the texture size.
    pub fn size(&self) -> Extent3d {
        self.descriptor.size
    }

    /// Get the texture format.
    pub fn format(&self) -> TextureFormat {
        self.descriptor.format
    }

    /// Get the texture label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id())
            .field("size", &self.descriptor.size)
            .field("format", &self.descriptor.format)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Texture: Send, Sync);
