//! Common types shared across the graphics system.

/// 3D extent (width, height, depth or array layers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent3d {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Depth or array layer count.
    pub depth: u32,
}

impl Extent3d {
    /// Create a new 3D extent.
    pub const fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Create a 2D extent (depth = 1).
    pub const fn new_2d(width: u32, height: u32) -> Self {
        Self::new(width, height, 1)
    }

    /// Texel count of one layer.
    pub fn layer_texels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// What happens to an attachment's previous contents when a pass begins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp<T> {
    /// Keep the existing contents.
    Load,
    /// Overwrite with a constant.
    Clear(T),
}

impl<T> LoadOp<T> {
    /// Whether the pass overwrites the attachment.
    pub fn is_clear(&self) -> bool {
        matches!(self, Self::Clear(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent() {
        let extent = Extent3d::new_2d(800, 600);
        assert_eq!(extent.depth, 1);
        assert_eq!(extent.layer_texels(), 480_000);
    }

    #[test]
    fn test_load_op() {
        assert!(LoadOp::Clear(1.0f32).is_clear());
        assert!(!LoadOp::<f32>::Load.is_clear());
    }
}
