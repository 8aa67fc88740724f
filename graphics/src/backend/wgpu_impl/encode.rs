//! Replay of recorded command streams into wgpu command buffers.
//!
//! wgpu derives its own barriers, so [`Command::Barrier`] only logs.

use std::collections::HashMap;

use crate::command::{Command, RenderPassInfo};
use crate::error::GraphicsError;
use crate::resources::ResourceId;

use super::WgpuObject;
use super::conversion::{convert_color_load, convert_depth_load};
use super::surface::Presentation;

/// Lookup of backend objects for one encoding pass.
pub(super) struct Resolver<'a> {
    pub(super) objects: &'a HashMap<ResourceId, WgpuObject>,
    pub(super) presentation: &'a Presentation,
}

impl Resolver<'_> {
    fn buffer(&self, id: ResourceId) -> Result<&wgpu::Buffer, GraphicsError> {
        match self.objects.get(&id) {
            Some(WgpuObject::Buffer { buffer, .. }) => Ok(buffer),
            _ => Err(unknown("buffer", id)),
        }
    }

    fn texture(&self, id: ResourceId) -> Result<&wgpu::Texture, GraphicsError> {
        match self.objects.get(&id) {
            Some(WgpuObject::Texture { texture, .. }) => Ok(texture),
            _ => Err(unknown("texture", id)),
        }
    }

    fn attachment(&self, id: ResourceId) -> Result<&wgpu::TextureView, GraphicsError> {
        if let Some(view) = self.presentation.view_for(id)? {
            return Ok(view);
        }
        match self.objects.get(&id) {
            Some(WgpuObject::Texture { attachment, .. }) => Ok(attachment),
            _ => Err(unknown("attachment", id)),
        }
    }

    fn pipeline(&self, id: ResourceId) -> Result<&wgpu::RenderPipeline, GraphicsError> {
        match self.objects.get(&id) {
            Some(WgpuObject::Pipeline(pipeline)) => Ok(pipeline),
            _ => Err(unknown("pipeline", id)),
        }
    }

    fn bind_group(&self, id: ResourceId) -> Result<&wgpu::BindGroup, GraphicsError> {
        match self.objects.get(&id) {
            Some(WgpuObject::BindGroup(group)) => Ok(group),
            _ => Err(unknown("bind group", id)),
        }
    }
}

fn unknown(kind: &str, id: ResourceId) -> GraphicsError {
    GraphicsError::Validation(format!("{kind} {id} does not exist"))
}

/// Encode `commands` into one command buffer.
pub(super) fn encode(
    device: &wgpu::Device,
    resolver: &Resolver<'_>,
    commands: &[Command],
) -> Result<wgpu::CommandBuffer, GraphicsError> {
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("frame"),
    });

    let mut iter = commands.iter();
    while let Some(command) = iter.next() {
        match command {
            Command::Barrier(transitions) => {
                log::trace!("wgpu: {} transitions handled implicitly", transitions.len());
            }
            Command::CopyBuffer {
                src,
                src_offset,
                dst,
                dst_offset,
                size,
            } => {
                encoder.copy_buffer_to_buffer(
                    resolver.buffer(*src)?,
                    *src_offset,
                    resolver.buffer(*dst)?,
                    *dst_offset,
                    *size,
                );
            }
            Command::CopyBufferToTexture {
                src,
                src_offset,
                bytes_per_row,
                dst,
                layer,
                width,
                height,
            } => {
                encoder.copy_buffer_to_texture(
                    wgpu::TexelCopyBufferInfo {
                        buffer: resolver.buffer(*src)?,
                        layout: wgpu::TexelCopyBufferLayout {
                            offset: *src_offset,
                            bytes_per_row: Some(*bytes_per_row),
                            rows_per_image: Some(*height),
                        },
                    },
                    wgpu::TexelCopyTextureInfo {
                        texture: resolver.texture(*dst)?,
                        mip_level: 0,
                        origin: wgpu::Origin3d {
                            x: 0,
                            y: 0,
                            z: *layer,
                        },
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::Extent3d {
                        width: *width,
                        height: *height,
                        depth_or_array_layers: 1,
                    },
                );
            }
            Command::BeginRenderPass(info) => {
                encode_pass(&mut encoder, resolver, info, &mut iter)?;
            }
            other => {
                return Err(GraphicsError::Validation(format!(
                    "{other:?} recorded outside a render pass"
                )));
            }
        }
    }

    Ok(encoder.finish())
}

fn encode_pass<'c>(
    encoder: &mut wgpu::CommandEncoder,
    resolver: &Resolver<'_>,
    info: &RenderPassInfo,
    commands: &mut impl Iterator<Item = &'c Command>,
) -> Result<(), GraphicsError> {
    let mut colors = Vec::with_capacity(info.colors.len());
    for color in &info.colors {
        colors.push(Some(wgpu::RenderPassColorAttachment {
            view: resolver.attachment(color.texture)?,
            resolve_target: None,
            ops: wgpu::Operations {
                load: convert_color_load(&color.load),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        }));
    }
    let depth_stencil_attachment = match &info.depth {
        Some(depth) => Some(wgpu::RenderPassDepthStencilAttachment {
            view: resolver.attachment(depth.texture)?,
            depth_ops: Some(wgpu::Operations {
                load: convert_depth_load(&depth.load),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        None => None,
    };

    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(&info.label),
        color_attachments: &colors,
        depth_stencil_attachment,
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });

    for command in commands {
        match command {
            Command::EndRenderPass => return Ok(()),
            Command::SetPipeline(id) => pass.set_pipeline(resolver.pipeline(*id)?),
            Command::SetBindGroup { index, group } => {
                pass.set_bind_group(*index, resolver.bind_group(*group)?, &[]);
            }
            Command::SetVertexBuffer { slot, buffer } => {
                pass.set_vertex_buffer(*slot, resolver.buffer(*buffer)?.slice(..));
            }
            Command::SetIndexBuffer(buffer) => {
                pass.set_index_buffer(resolver.buffer(*buffer)?.slice(..), wgpu::IndexFormat::Uint32);
            }
            Command::Draw {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            } => pass.draw(
                *first_vertex..first_vertex + vertex_count,
                *first_instance..first_instance + instance_count,
            ),
            Command::DrawIndexed {
                index_count,
                instance_count,
                first_index,
                base_vertex,
                first_instance,
            } => pass.draw_indexed(
                *first_index..first_index + index_count,
                *base_vertex,
                *first_instance..first_instance + instance_count,
            ),
            other => {
                return Err(GraphicsError::Validation(format!(
                    "{other:?} recorded inside render pass '{}'",
                    info.label
                )));
            }
        }
    }

    Err(GraphicsError::Validation(format!(
        "render pass '{}' was never ended",
        info.label
    )))
}
