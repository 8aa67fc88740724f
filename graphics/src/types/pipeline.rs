//! Render pipeline descriptors.

use std::sync::Arc;

use super::{BindingLayout, TextureFormat};

/// Vertex attribute format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    /// Three 32-bit floats.
    Float32x3,
    /// Four 32-bit floats.
    Float32x4,
    /// One 32-bit unsigned integer.
    Uint32,
}

impl VertexFormat {
    /// Size in bytes.
    pub fn size(&self) -> u32 {
        match self {
            Self::Float32x3 => 12,
            Self::Float32x4 => 16,
            Self::Uint32 => 4,
        }
    }
}

/// Whether a vertex buffer advances per vertex or per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexStepMode {
    /// Advance per vertex.
    #[default]
    Vertex,
    /// Advance per instance.
    Instance,
}

/// One attribute inside a vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Attribute format.
    pub format: VertexFormat,
    /// Byte offset inside one element.
    pub offset: u32,
    /// Shader input location.
    pub location: u32,
}

/// Layout of one bound vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    /// Bytes between consecutive elements.
    pub stride: u32,
    /// Step rate.
    pub step_mode: VertexStepMode,
    /// Attributes read from the buffer.
    pub attributes: Vec<VertexAttribute>,
}

/// Rasterizer fill mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolygonMode {
    /// Filled triangles.
    #[default]
    Fill,
    /// Triangle edges only.
    Line,
}

/// Precompiled shader module, consumed opaquely.
///
/// The simulated backend never looks at the code; the wgpu backend expects
/// WGSL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderSource {
    /// Debug label.
    pub label: String,
    /// Module source.
    pub code: Arc<str>,
}

impl ShaderSource {
    /// Wrap module source.
    pub fn new(label: impl Into<String>, code: impl Into<Arc<str>>) -> Self {
        Self {
            label: label.into(),
            code: code.into(),
        }
    }
}

/// Descriptor for creating a render pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineDescriptor {
    /// Debug label.
    pub label: String,
    /// Shader module holding both entry points.
    pub shader: ShaderSource,
    /// Vertex entry point.
    pub vertex_entry: String,
    /// Fragment entry point.
    pub fragment_entry: String,
    /// Vertex buffer layouts, by slot.
    pub vertex_buffers: Vec<VertexBufferLayout>,
    /// Bind group layouts, by index.
    pub bind_layouts: Vec<BindingLayout>,
    /// Color attachment formats.
    pub color_formats: Vec<TextureFormat>,
    /// Depth attachment format.
    pub depth_format: Option<TextureFormat>,
    /// Fill mode.
    pub polygon_mode: PolygonMode,
    /// Whether fragments write depth.
    pub depth_write: bool,
    /// Whether color output is alpha blended.
    pub alpha_blend: bool,
}

impl PipelineDescriptor {
    /// Create a descriptor with `vs_main`/`fs_main` entry points and no targets.
    pub fn new(label: impl Into<String>, shader: ShaderSource) -> Self {
        Self {
            label: label.into(),
            shader,
            vertex_entry: "vs_main".into(),
            fragment_entry: "fs_main".into(),
            vertex_buffers: Vec::new(),
            bind_layouts: Vec::new(),
            color_formats: Vec::new(),
            depth_format: None,
            polygon_mode: PolygonMode::Fill,
            depth_write: false,
            alpha_blend: false,
        }
    }

    /// Set the fragment entry point.
    pub fn with_fragment_entry(mut self, entry: impl Into<String>) -> Self {
        self.fragment_entry = entry.into();
        self
    }

    /// Append a vertex buffer layout.
    pub fn with_vertex_buffer(mut self, layout: VertexBufferLayout) -> Self {
        self.vertex_buffers.push(layout);
        self
    }

    /// Append a bind group layout.
    pub fn with_bind_layout(mut self, layout: BindingLayout) -> Self {
        self.bind_layouts.push(layout);
        self
    }

    /// Append a color target.
    pub fn with_color_target(mut self, format: TextureFormat) -> Self {
        self.color_formats.push(format);
        self
    }

    /// Attach a depth buffer, optionally written.
    pub fn with_depth(mut self, format: TextureFormat, write: bool) -> Self {
        self.depth_format = Some(format);
        self.depth_write = write;
        self
    }

    /// Set the fill mode.
    pub fn with_polygon_mode(mut self, mode: PolygonMode) -> Self {
        self.polygon_mode = mode;
        self
    }

    /// Enable alpha blending on every color target.
    pub fn with_alpha_blend(mut self) -> Self {
        self.alpha_blend = true;
        self
    }
}
