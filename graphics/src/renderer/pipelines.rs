//! Pipeline and binding layouts of the three-pass frame.

use std::sync::Arc;

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::frame::FrameTargetFormats;
use crate::resources::Pipeline;
use crate::types::{
    BindingLayout, BindingType, PipelineDescriptor, PolygonMode, ShaderSource, ShaderStages,
    TextureFormat, VertexAttribute, VertexBufferLayout, VertexFormat, VertexStepMode,
};

/// Shader modules for the three passes, supplied by the application.
///
/// Each module exposes `vs_main` and `fs_main`; the base module also
/// exposes `fs_wire` for the wireframe overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSet {
    /// Geometry pass.
    pub base: ShaderSource,
    /// Full-screen composite.
    pub post: ShaderSource,
    /// Marker quads.
    pub overlay: ShaderSource,
}

/// Scene constants, visible to both stages.
pub fn scene_layout() -> BindingLayout {
    BindingLayout::new().with_label("scene").with_entry(
        0,
        ShaderStages::VERTEX | ShaderStages::FRAGMENT,
        BindingType::UniformBuffer,
    )
}

/// Intermediate color and normal targets plus a sampler.
pub fn post_layout() -> BindingLayout {
    BindingLayout::new()
        .with_label("post inputs")
        .with_entry(0, ShaderStages::FRAGMENT, BindingType::Texture2d)
        .with_entry(1, ShaderStages::FRAGMENT, BindingType::Texture2d)
        .with_entry(2, ShaderStages::FRAGMENT, BindingType::Sampler)
}

/// Scene constants, the icon array and its sampler.
pub fn overlay_layout() -> BindingLayout {
    BindingLayout::new()
        .with_label("overlay")
        .with_entry(0, ShaderStages::VERTEX, BindingType::UniformBuffer)
        .with_entry(1, ShaderStages::FRAGMENT, BindingType::Texture2dArray)
        .with_entry(2, ShaderStages::FRAGMENT, BindingType::Sampler)
}

/// Global vertex buffer: position and normal, both `vec4`.
pub fn mesh_vertex_layout() -> VertexBufferLayout {
    VertexBufferLayout {
        stride: 32,
        step_mode: VertexStepMode::Vertex,
        attributes: vec![
            VertexAttribute {
                format: VertexFormat::Float32x4,
                offset: 0,
                location: 0,
            },
            VertexAttribute {
                format: VertexFormat::Float32x4,
                offset: 16,
                location: 1,
            },
        ],
    }
}

/// Unit quad corner: `(x, y, u, v)`.
pub fn quad_vertex_layout() -> VertexBufferLayout {
    VertexBufferLayout {
        stride: 16,
        step_mode: VertexStepMode::Vertex,
        attributes: vec![VertexAttribute {
            format: VertexFormat::Float32x4,
            offset: 0,
            location: 0,
        }],
    }
}

/// Per-marker position and icon layer.
pub fn marker_instance_layout() -> VertexBufferLayout {
    VertexBufferLayout {
        stride: 16,
        step_mode: VertexStepMode::Instance,
        attributes: vec![
            VertexAttribute {
                format: VertexFormat::Float32x3,
                offset: 0,
                location: 1,
            },
            VertexAttribute {
                format: VertexFormat::Uint32,
                offset: 12,
                location: 2,
            },
        ],
    }
}

/// Every pipeline the frame uses.
#[derive(Debug)]
pub struct ScenePipelines {
    /// Filled geometry into color, normal and depth.
    pub base: Arc<Pipeline>,
    /// Line-mode geometry, when the device supports it.
    pub wire: Option<Arc<Pipeline>>,
    /// Full-screen composite into the presentation image.
    pub post: Arc<Pipeline>,
    /// Instanced marker quads over the composite.
    pub overlay: Arc<Pipeline>,
}

impl ScenePipelines {
    /// Create all pipelines.
    pub fn new(
        device: &GraphicsDevice,
        shaders: &ShaderSet,
        targets: FrameTargetFormats,
        surface_format: TextureFormat,
    ) -> Result<Self, GraphicsError> {
        let base_desc = PipelineDescriptor::new("base", shaders.base.clone())
            .with_vertex_buffer(mesh_vertex_layout())
            .with_bind_layout(scene_layout())
            .with_color_target(targets.color)
            .with_color_target(targets.normal)
            .with_depth(targets.depth, true);
        let base = device.create_pipeline(&base_desc)?;

        let wire = if device.capabilities().wireframe {
            let mut wire_desc = base_desc
                .with_fragment_entry("fs_wire")
                .with_polygon_mode(PolygonMode::Line);
            wire_desc.label = "wire".into();
            wire_desc.depth_write = false;
            Some(device.create_pipeline(&wire_desc)?)
        } else {
            log::warn!("ScenePipelines: line rasterization unavailable, wireframe disabled");
            None
        };

        let post = device.create_pipeline(
            &PipelineDescriptor::new("post", shaders.post.clone())
                .with_bind_layout(post_layout())
                .with_color_target(surface_format),
        )?;

        let overlay = device.create_pipeline(
            &PipelineDescriptor::new("overlay", shaders.overlay.clone())
                .with_vertex_buffer(quad_vertex_layout())
                .with_vertex_buffer(marker_instance_layout())
                .with_bind_layout(overlay_layout())
                .with_color_target(surface_format)
                .with_alpha_blend(),
        )?;

        Ok(Self {
            base,
            wire,
            post,
            overlay,
        })
    }
}
