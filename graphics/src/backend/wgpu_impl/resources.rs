//! Resource creation for the wgpu backend.

use crate::error::GraphicsError;
use crate::types::{
    BindGroupDescriptor, BindingLayout, BindingResource, BindingType, BufferDescriptor,
    PipelineDescriptor, TextureDescriptor,
};

use super::conversion::{
    convert_binding_type, convert_buffer_usage, convert_polygon_mode, convert_sampler,
    convert_shader_stages, convert_step_mode, convert_texture_format, convert_texture_usage,
    convert_vertex_format,
};
use super::{WgpuBackend, WgpuObject};

impl WgpuBackend {
    pub(super) fn build_buffer(&self, descriptor: &BufferDescriptor) -> WgpuObject {
        // Copies and queue writes work in 4-byte units.
        let size = descriptor.size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: descriptor.label.as_deref(),
            size,
            usage: convert_buffer_usage(descriptor.usage),
            mapped_at_creation: false,
        });
        WgpuObject::Buffer {
            buffer,
            size: descriptor.size,
        }
    }

    pub(super) fn build_texture(&self, descriptor: &TextureDescriptor) -> WgpuObject {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: descriptor.label.as_deref(),
            size: wgpu::Extent3d {
                width: descriptor.size.width,
                height: descriptor.size.height,
                depth_or_array_layers: descriptor.size.depth,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: convert_texture_format(descriptor.format),
            usage: convert_texture_usage(descriptor.usage),
            view_formats: &[],
        });
        // Attachments render into layer 0.
        let attachment = texture.create_view(&wgpu::TextureViewDescriptor {
            label: descriptor.label.as_deref(),
            dimension: Some(wgpu::TextureViewDimension::D2),
            array_layer_count: Some(1),
            ..Default::default()
        });
        WgpuObject::Texture {
            texture,
            attachment,
            descriptor: descriptor.clone(),
        }
    }

    fn build_layout(&self, layout: &BindingLayout) -> wgpu::BindGroupLayout {
        let entries: Vec<wgpu::BindGroupLayoutEntry> = layout
            .entries
            .iter()
            .map(|entry| wgpu::BindGroupLayoutEntry {
                binding: entry.binding,
                visibility: convert_shader_stages(entry.visibility),
                ty: convert_binding_type(entry.ty),
                count: None,
            })
            .collect();
        self.device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: layout.label.as_deref(),
                entries: &entries,
            })
    }

    pub(super) fn build_pipeline(
        &self,
        descriptor: &PipelineDescriptor,
    ) -> Result<WgpuObject, GraphicsError> {
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&descriptor.shader.label),
                source: wgpu::ShaderSource::Wgsl(descriptor.shader.code.as_ref().into()),
            });

        let bind_group_layouts: Vec<wgpu::BindGroupLayout> = descriptor
            .bind_layouts
            .iter()
            .map(|layout| self.build_layout(layout))
            .collect();
        let layout_refs: Vec<&wgpu::BindGroupLayout> = bind_group_layouts.iter().collect();
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&descriptor.label),
                bind_group_layouts: &layout_refs,
                immediate_size: 0,
            });

        let attributes: Vec<Vec<wgpu::VertexAttribute>> = descriptor
            .vertex_buffers
            .iter()
            .map(|buffer| {
                buffer
                    .attributes
                    .iter()
                    .map(|attr| wgpu::VertexAttribute {
                        format: convert_vertex_format(attr.format),
                        offset: attr.offset as u64,
                        shader_location: attr.location,
                    })
                    .collect()
            })
            .collect();
        let vertex_buffers: Vec<wgpu::VertexBufferLayout> = descriptor
            .vertex_buffers
            .iter()
            .zip(&attributes)
            .map(|(buffer, attributes)| wgpu::VertexBufferLayout {
                array_stride: buffer.stride as u64,
                step_mode: convert_step_mode(buffer.step_mode),
                attributes,
            })
            .collect();

        let blend = if descriptor.alpha_blend {
            wgpu::BlendState::ALPHA_BLENDING
        } else {
            wgpu::BlendState::REPLACE
        };
        let targets: Vec<Option<wgpu::ColorTargetState>> = descriptor
            .color_formats
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: convert_texture_format(*format),
                    blend: Some(blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&descriptor.label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some(&descriptor.vertex_entry),
                    buffers: &vertex_buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some(&descriptor.fragment_entry),
                    targets: &targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: convert_polygon_mode(descriptor.polygon_mode),
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: descriptor.depth_format.map(|format| wgpu::DepthStencilState {
                    format: convert_texture_format(format),
                    depth_write_enabled: descriptor.depth_write,
                    depth_compare: wgpu::CompareFunction::LessEqual,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });

        Ok(WgpuObject::Pipeline(pipeline))
    }

    /// Build a bind group. `objects` must hold every referenced buffer and texture.
    pub(super) fn build_bind_group(
        &self,
        descriptor: &BindGroupDescriptor,
        objects: &std::collections::HashMap<crate::resources::ResourceId, WgpuObject>,
    ) -> Result<WgpuObject, GraphicsError> {
        enum Bound {
            Buffer(wgpu::Buffer),
            View(wgpu::TextureView),
            Sampler(wgpu::Sampler),
        }

        let mut bound = Vec::with_capacity(descriptor.entries.len());
        for (binding, resource) in &descriptor.entries {
            let ty = descriptor
                .layout
                .entries
                .iter()
                .find(|entry| entry.binding == *binding)
                .map(|entry| entry.ty);
            let missing = |id| {
                GraphicsError::InvalidParameter(format!(
                    "bind group {:?} references destroyed resource {id}",
                    descriptor.label
                ))
            };
            let resource = match resource {
                BindingResource::Buffer(buffer) => match objects.get(&buffer.id()) {
                    Some(WgpuObject::Buffer { buffer, .. }) => Bound::Buffer(buffer.clone()),
                    _ => return Err(missing(buffer.id())),
                },
                BindingResource::Texture(texture) => match objects.get(&texture.id()) {
                    Some(WgpuObject::Texture { texture, .. }) => {
                        let dimension = match ty {
                            Some(BindingType::Texture2dArray) => wgpu::TextureViewDimension::D2Array,
                            _ => wgpu::TextureViewDimension::D2,
                        };
                        Bound::View(texture.create_view(&wgpu::TextureViewDescriptor {
                            dimension: Some(dimension),
                            ..Default::default()
                        }))
                    }
                    _ => return Err(missing(texture.id())),
                },
                BindingResource::Sampler(sampler) => {
                    Bound::Sampler(self.device.create_sampler(&convert_sampler(sampler)))
                }
            };
            bound.push((*binding, resource));
        }

        let entries: Vec<wgpu::BindGroupEntry> = bound
            .iter()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: match resource {
                    Bound::Buffer(buffer) => buffer.as_entire_binding(),
                    Bound::View(view) => wgpu::BindingResource::TextureView(view),
                    Bound::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
                },
            })
            .collect();

        let layout = self.build_layout(&descriptor.layout);
        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: descriptor.label.as_deref(),
            layout: &layout,
            entries: &entries,
        });
        Ok(WgpuObject::BindGroup(group))
    }

    /// Copy a buffer into a mappable one and read it back. Blocks until done.
    pub(super) fn read_back(
        &self,
        encode: impl FnOnce(&mut wgpu::CommandEncoder, &wgpu::Buffer),
        size: u64,
    ) -> Result<Vec<u8>, GraphicsError> {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback"),
            });
        encode(&mut encoder, &staging);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| GraphicsError::Internal(format!("readback poll failed: {e}")))?;
        rx.recv()
            .map_err(|_| GraphicsError::Internal("readback callback dropped".into()))?
            .map_err(|e| GraphicsError::Internal(format!("readback map failed: {e}")))?;

        let mut data = slice.get_mapped_range().to_vec();
        staging.unmap();
        data.truncate(size as usize);
        Ok(data)
    }
}
