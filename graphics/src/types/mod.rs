//! Common types and descriptors for graphics resources.
//!
//! This module contains format enums, usage flags, and descriptor structs
//! used throughout the graphics system.

mod binding;
mod buffer;
mod common;
mod pipeline;
mod texture;

pub use binding::{
    AddressMode, BindGroupDescriptor, BindingLayout, BindingLayoutEntry, BindingResource,
    BindingType, FilterMode, SamplerDescriptor, ShaderStages,
};
pub use buffer::{BufferDescriptor, BufferUsage};
pub use common::{Extent3d, LoadOp};
pub use pipeline::{
    PipelineDescriptor, PolygonMode, ShaderSource, VertexAttribute, VertexBufferLayout,
    VertexFormat, VertexStepMode,
};
pub use texture::{TextureDescriptor, TextureFormat, TextureUsage};
