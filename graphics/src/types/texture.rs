//! Texture types and descriptors.

use super::Extent3d;
use bitflags::bitflags;

/// Texture format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TextureFormat {
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA channels, sRGB.
    Rgba8UnormSrgb,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8Unorm,
    /// 8-bit BGRA channels, sRGB.
    Bgra8UnormSrgb,
    /// 16-bit RGBA channels, float.
    Rgba16Float,
    /// 32-bit RGBA channels, float.
    Rgba32Float,
    /// 32-bit depth, float.
    Depth32Float,
}

impl TextureFormat {
    /// Returns true if this is a depth format.
    pub fn is_depth(&self) -> bool {
        matches!(self, Self::Depth32Float)
    }

    /// Returns the size in bytes per pixel.
    pub fn block_size(&self) -> u32 {
        match self {
            Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::Bgra8UnormSrgb
            | Self::Depth32Float => 4,
            Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
        }
    }
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be copied from.
        const COPY_SRC = 1 << 0;
        /// Texture can be copied to.
        const COPY_DST = 1 << 1;
        /// Texture can be sampled in a shader.
        const TEXTURE_BINDING = 1 << 2;
        /// Texture can be used as a render attachment.
        const RENDER_ATTACHMENT = 1 << 3;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a texture.
///
/// `size.depth` is the array layer count; the viewer never uses volume
/// textures or mip chains.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: Option<String>,
    /// Size of the texture.
    pub size: Extent3d,
    /// Texture format.
    pub format: TextureFormat,
    /// Usage flags.
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Create a new 2D texture descriptor.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            size: Extent3d::new_2d(width, height),
            format,
            usage,
        }
    }

    /// Create a layered 2D texture descriptor.
    pub fn new_2d_array(
        width: u32,
        height: u32,
        layers: u32,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> Self {
        Self {
            label: None,
            size: Extent3d::new(width, height, layers),
            format,
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Tightly packed bytes per row.
    pub fn row_bytes(&self) -> u32 {
        self.size.width * self.format.block_size()
    }

    /// Tightly packed bytes of one array layer.
    pub fn layer_bytes(&self) -> u64 {
        self.row_bytes() as u64 * self.size.height as u64
    }

    /// Tightly packed bytes of the whole texture.
    pub fn total_bytes(&self) -> u64 {
        self.layer_bytes() * self.size.depth as u64
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            size: Extent3d::default(),
            format: TextureFormat::default(),
            usage: TextureUsage::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sizes() {
        assert_eq!(TextureFormat::Rgba8Unorm.block_size(), 4);
        assert_eq!(TextureFormat::Rgba16Float.block_size(), 8);
        assert!(TextureFormat::Depth32Float.is_depth());
        assert!(!TextureFormat::Bgra8Unorm.is_depth());
    }

    #[test]
    fn test_layer_bytes() {
        let desc = TextureDescriptor::new_2d_array(
            32,
            16,
            3,
            TextureFormat::Rgba8Unorm,
            TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        )
        .with_label("icons");
        assert_eq!(desc.row_bytes(), 128);
        assert_eq!(desc.layer_bytes(), 128 * 16);
        assert_eq!(desc.total_bytes(), 128 * 16 * 3);
    }
}
