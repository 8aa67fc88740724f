//! Type conversions between map viewer types and wgpu types.

use crate::swapchain::PresentMode;
use crate::types::{
    AddressMode, BindingType, BufferUsage, FilterMode, LoadOp, PolygonMode, SamplerDescriptor,
    ShaderStages, TextureFormat, TextureUsage, VertexFormat, VertexStepMode,
};

/// Convert BufferUsage flags to wgpu buffer usages.
///
/// Mapped buffers are written through the queue, so `MAP_WRITE` becomes
/// `COPY_DST`. Every buffer can be copied from for debug readback.
pub fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut result = wgpu::BufferUsages::COPY_SRC;

    if usage.contains(BufferUsage::VERTEX) {
        result |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsage::INDEX) {
        result |= wgpu::BufferUsages::INDEX;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        result |= wgpu::BufferUsages::UNIFORM;
    }
    if usage.intersects(BufferUsage::COPY_DST | BufferUsage::MAP_WRITE) {
        result |= wgpu::BufferUsages::COPY_DST;
    }

    result
}

/// Convert TextureFormat to wgpu format.
pub fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

/// Convert a wgpu surface format back, if the viewer can render to it.
pub fn convert_surface_format(format: wgpu::TextureFormat) -> Option<TextureFormat> {
    match format {
        wgpu::TextureFormat::Rgba8Unorm => Some(TextureFormat::Rgba8Unorm),
        wgpu::TextureFormat::Rgba8UnormSrgb => Some(TextureFormat::Rgba8UnormSrgb),
        wgpu::TextureFormat::Bgra8Unorm => Some(TextureFormat::Bgra8Unorm),
        wgpu::TextureFormat::Bgra8UnormSrgb => Some(TextureFormat::Bgra8UnormSrgb),
        _ => None,
    }
}

/// Convert TextureUsage flags to wgpu texture usages.
///
/// `COPY_SRC` is always added for debug readback.
pub fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
    let mut result = wgpu::TextureUsages::COPY_SRC;

    if usage.contains(TextureUsage::COPY_DST) {
        result |= wgpu::TextureUsages::COPY_DST;
    }
    if usage.contains(TextureUsage::TEXTURE_BINDING) {
        result |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
        result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }

    result
}

/// Convert shader stage visibility.
pub fn convert_shader_stages(stages: ShaderStages) -> wgpu::ShaderStages {
    let mut result = wgpu::ShaderStages::NONE;
    if stages.contains(ShaderStages::VERTEX) {
        result |= wgpu::ShaderStages::VERTEX;
    }
    if stages.contains(ShaderStages::FRAGMENT) {
        result |= wgpu::ShaderStages::FRAGMENT;
    }
    result
}

/// Convert a binding slot type to a wgpu binding type.
pub fn convert_binding_type(ty: BindingType) -> wgpu::BindingType {
    match ty {
        BindingType::UniformBuffer => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        BindingType::Texture2d => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        BindingType::Texture2dArray => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2Array,
            multisampled: false,
        },
        BindingType::Sampler => {
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
        }
    }
}

/// Build a wgpu sampler descriptor.
pub fn convert_sampler(descriptor: &SamplerDescriptor) -> wgpu::SamplerDescriptor<'_> {
    let filter = match descriptor.filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    };
    let address = match descriptor.address_mode {
        AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
    };
    wgpu::SamplerDescriptor {
        label: descriptor.label.as_deref(),
        address_mode_u: address,
        address_mode_v: address,
        address_mode_w: address,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::MipmapFilterMode::Nearest,
        ..Default::default()
    }
}

/// Convert vertex attribute format.
pub fn convert_vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
    match format {
        VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
        VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
        VertexFormat::Uint32 => wgpu::VertexFormat::Uint32,
    }
}

/// Convert vertex step mode.
pub fn convert_step_mode(mode: VertexStepMode) -> wgpu::VertexStepMode {
    match mode {
        VertexStepMode::Vertex => wgpu::VertexStepMode::Vertex,
        VertexStepMode::Instance => wgpu::VertexStepMode::Instance,
    }
}

/// Convert rasterization mode.
pub fn convert_polygon_mode(mode: PolygonMode) -> wgpu::PolygonMode {
    match mode {
        PolygonMode::Fill => wgpu::PolygonMode::Fill,
        PolygonMode::Line => wgpu::PolygonMode::Line,
    }
}

/// Convert a color load operation.
pub fn convert_color_load(load: &LoadOp<[f32; 4]>) -> wgpu::LoadOp<wgpu::Color> {
    match load {
        LoadOp::Load => wgpu::LoadOp::Load,
        LoadOp::Clear([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
            r: *r as f64,
            g: *g as f64,
            b: *b as f64,
            a: *a as f64,
        }),
    }
}

/// Convert a depth load operation.
pub fn convert_depth_load(load: &LoadOp<f32>) -> wgpu::LoadOp<f32> {
    match load {
        LoadOp::Load => wgpu::LoadOp::Load,
        LoadOp::Clear(depth) => wgpu::LoadOp::Clear(*depth),
    }
}

/// Convert PresentMode to wgpu present mode.
pub fn convert_present_mode(mode: PresentMode) -> wgpu::PresentMode {
    match mode {
        PresentMode::Immediate => wgpu::PresentMode::AutoNoVsync,
        PresentMode::Fifo => wgpu::PresentMode::AutoVsync,
    }
}
