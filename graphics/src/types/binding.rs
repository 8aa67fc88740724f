//! Bind group layouts, resources and samplers.

use std::sync::Arc;

use bitflags::bitflags;

use crate::resources::{Buffer, Texture};

bitflags! {
    /// Shader stages a binding is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        /// Vertex stage.
        const VERTEX = 1 << 0;
        /// Fragment stage.
        const FRAGMENT = 1 << 1;
    }
}

/// Kind of resource a binding slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingType {
    /// Uniform (constant) buffer.
    UniformBuffer,
    /// Sampled 2D texture.
    Texture2d,
    /// Sampled 2D texture array.
    Texture2dArray,
    /// Filtering sampler.
    Sampler,
}

/// One slot of a [`BindingLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingLayoutEntry {
    /// Binding index in the shader.
    pub binding: u32,
    /// Stages that read the binding.
    pub visibility: ShaderStages,
    /// Resource kind.
    pub ty: BindingType,
}

/// Layout of one bind group (root signature table).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BindingLayout {
    /// Debug label.
    pub label: Option<String>,
    /// Slots, in binding order.
    pub entries: Vec<BindingLayoutEntry>,
}

impl BindingLayout {
    /// Create an empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Append a slot.
    pub fn with_entry(mut self, binding: u32, visibility: ShaderStages, ty: BindingType) -> Self {
        self.entries.push(BindingLayoutEntry {
            binding,
            visibility,
            ty,
        });
        self
    }
}

/// Texture filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    /// Nearest texel.
    Nearest,
    /// Bilinear.
    #[default]
    Linear,
}

/// Texture coordinate wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    /// Clamp to the edge texel.
    #[default]
    ClampToEdge,
    /// Repeat.
    Repeat,
}

/// Descriptor for an immutable sampler baked into a bind group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SamplerDescriptor {
    /// Debug label for the sampler.
    pub label: Option<String>,
    /// Min and mag filter.
    pub filter: FilterMode,
    /// Address mode for all coordinates.
    pub address_mode: AddressMode,
}

impl SamplerDescriptor {
    /// Create a linear filtering sampler.
    pub fn linear() -> Self {
        Self::default()
    }

    /// Create a nearest neighbor filtering sampler.
    pub fn nearest() -> Self {
        Self {
            filter: FilterMode::Nearest,
            ..Self::default()
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Resource bound to one slot.
#[derive(Debug, Clone)]
pub enum BindingResource {
    /// A whole buffer.
    Buffer(Arc<Buffer>),
    /// A texture (all layers).
    Texture(Arc<Texture>),
    /// A sampler.
    Sampler(SamplerDescriptor),
}

/// Descriptor for creating a bind group.
#[derive(Debug, Clone)]
pub struct BindGroupDescriptor {
    /// Debug label.
    pub label: Option<String>,
    /// Layout the entries must satisfy.
    pub layout: BindingLayout,
    /// Bound resources, keyed by binding index.
    pub entries: Vec<(u32, BindingResource)>,
}

impl BindGroupDescriptor {
    /// Create a descriptor for `layout` with no resources yet.
    pub fn new(layout: BindingLayout) -> Self {
        Self {
            label: None,
            layout,
            entries: Vec::new(),
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Bind a buffer.
    pub fn with_buffer(mut self, binding: u32, buffer: &Arc<Buffer>) -> Self {
        self.entries
            .push((binding, BindingResource::Buffer(Arc::clone(buffer))));
        self
    }

    /// Bind a texture.
    pub fn with_texture(mut self, binding: u32, texture: &Arc<Texture>) -> Self {
        self.entries
            .push((binding, BindingResource::Texture(Arc::clone(texture))));
        self
    }

    /// Bind a sampler.
    pub fn with_sampler(mut self, binding: u32, sampler: SamplerDescriptor) -> Self {
        self.entries.push((binding, BindingResource::Sampler(sampler)));
        self
    }

    /// Check that every layout slot is filled with a resource of the right kind.
    pub fn validate(&self) -> Result<(), String> {
        if self.entries.len() != self.layout.entries.len() {
            return Err(format!(
                "bind group {:?} has {} entries, layout expects {}",
                self.label,
                self.entries.len(),
                self.layout.entries.len()
            ));
        }
        for slot in &self.layout.entries {
            let Some((_, resource)) = self.entries.iter().find(|(b, _)| *b == slot.binding) else {
                return Err(format!(
                    "bind group {:?} is missing binding {}",
                    self.label, slot.binding
                ));
            };
            let matches = match (slot.ty, resource) {
                (BindingType::UniformBuffer, BindingResource::Buffer(_)) => true,
                (BindingType::Texture2d, BindingResource::Texture(t)) => {
                    t.descriptor().size.depth == 1
                }
                (BindingType::Texture2dArray, BindingResource::Texture(_)) => true,
                (BindingType::Sampler, BindingResource::Sampler(_)) => true,
                _ => false,
            };
            if !matches {
                return Err(format!(
                    "bind group {:?} binding {} does not match {:?}",
                    self.label, slot.binding, slot.ty
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_builder() {
        let layout = BindingLayout::new()
            .with_label("post")
            .with_entry(0, ShaderStages::FRAGMENT, BindingType::Texture2d)
            .with_entry(1, ShaderStages::FRAGMENT, BindingType::Sampler);
        assert_eq!(layout.entries.len(), 2);
        assert_eq!(layout.entries[1].ty, BindingType::Sampler);
    }

    #[test]
    fn test_missing_entry_rejected() {
        let layout = BindingLayout::new().with_entry(
            0,
            ShaderStages::FRAGMENT,
            BindingType::Sampler,
        );
        let desc = BindGroupDescriptor::new(layout);
        assert!(desc.validate().is_err());
        let desc = desc.with_sampler(0, SamplerDescriptor::nearest());
        assert!(desc.validate().is_ok());
    }
}
