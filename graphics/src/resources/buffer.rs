//! GPU buffer resource.

use crate::types::BufferDescriptor;

use super::{ResourceHandle, ResourceId};

/// A GPU buffer resource.
///
/// Buffers are created by [`GraphicsDevice::create_buffer`] and are reference-counted.
///
/// [`GraphicsDevice::create_buffer`]: crate::GraphicsDevice::create_buffer
pub struct Buffer {
    handle: ResourceHandle,
    descriptor: BufferDescriptor,
}

impl Buffer {
    /// Create a new buffer (called by GraphicsDevice).
    pub(crate) fn new(handle: ResourceHandle, descriptor: BufferDescriptor) -> Self {
        Self { handle, descriptor }
    }

    /// Backend identity.
    pub fn id(&self) -> ResourceId {
        self.handle.id()
    }

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    /// Get the buffer label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id())
            .field("size", &self.descriptor.size)
            .field("usage", &self.descriptor.usage)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

// Ensure Buffer is Send + Sync
static_assertions::assert_impl_all!(Buffer: Send, Sync);

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use crate::GraphicsDevice;
    use crate::types::{BufferDescriptor, BufferUsage};

    #[test]
    fn test_buffer_debug() {
        let device = GraphicsDevice::dummy().unwrap();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX).with_label("vb"))
            .unwrap();
        let debug = format!("{:?}", buffer);
        assert!(debug.contains("Buffer"));
        assert!(debug.contains("1024"));
        assert_eq!(buffer.label(), Some("vb"));
    }
}
