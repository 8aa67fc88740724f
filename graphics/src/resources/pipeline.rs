//! Pipelines and bind groups.

use crate::types::{BindGroupDescriptor, TextureFormat};

use super::{ResourceHandle, ResourceId};

/// A compiled render pipeline.
pub struct Pipeline {
    handle: ResourceHandle,
    label: String,
    color_formats: Vec<TextureFormat>,
    depth_format: Option<TextureFormat>,
}

impl Pipeline {
    pub(crate) fn new(
        handle: ResourceHandle,
        label: String,
        color_formats: Vec<TextureFormat>,
        depth_format: Option<TextureFormat>,
    ) -> Self {
        Self {
            handle,
            label,
            color_formats,
            depth_format,
        }
    }

    /// Backend identity.
    pub fn id(&self) -> ResourceId {
        self.handle.id()
    }

    /// Debug label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Color formats the pipeline renders to.
    pub fn color_formats(&self) -> &[TextureFormat] {
        &self.color_formats
    }

    /// Depth format, if the pipeline tests depth.
    pub fn depth_format(&self) -> Option<TextureFormat> {
        self.depth_format
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id())
            .field("label", &self.label)
            .finish()
    }
}

/// Resources bound to one pipeline table.
///
/// Holds its buffers and textures alive for as long as the group exists.
pub struct BindGroup {
    handle: ResourceHandle,
    descriptor: BindGroupDescriptor,
}

impl BindGroup {
    pub(crate) fn new(handle: ResourceHandle, descriptor: BindGroupDescriptor) -> Self {
        Self { handle, descriptor }
    }

    /// Backend identity.
    pub fn id(&self) -> ResourceId {
        self.handle.id()
    }

    /// The descriptor the group was created from.
    pub fn descriptor(&self) -> &BindGroupDescriptor {
        &self.descriptor
    }
}

impl std::fmt::Debug for BindGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindGroup")
            .field("id", &self.id())
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Pipeline: Send, Sync);
static_assertions::assert_impl_all!(BindGroup: Send, Sync);
