//! Recorded GPU commands and the arenas that hold them.
//!
//! Commands are recorded into a [`CommandArena`], closed into a
//! [`CommandStream`] and submitted. The stream shares the arena's storage;
//! the backend keeps its copy until the GPU has executed it, and the arena
//! refuses to reset while that copy exists.

use std::sync::Arc;

use crate::error::GraphicsError;
use crate::resources::{BindGroup, Buffer, Pipeline, ResourceId, Texture};
use crate::state::{Transition, TransitionBatch};
use crate::types::LoadOp;

/// A color attachment of a render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorAttachment {
    /// Target texture.
    pub texture: ResourceId,
    /// Load behaviour.
    pub load: LoadOp<[f32; 4]>,
}

/// The depth attachment of a render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthAttachment {
    /// Target texture.
    pub texture: ResourceId,
    /// Load behaviour.
    pub load: LoadOp<f32>,
}

/// Attachments of one render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassInfo {
    /// Debug label.
    pub label: String,
    /// Color attachments, in pipeline target order.
    pub colors: Vec<ColorAttachment>,
    /// Optional depth attachment.
    pub depth: Option<DepthAttachment>,
}

/// One recorded GPU command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// State transitions executed as one barrier.
    Barrier(Vec<Transition>),
    /// Buffer to buffer copy.
    CopyBuffer {
        /// Source buffer.
        src: ResourceId,
        /// Source byte offset.
        src_offset: u64,
        /// Destination buffer.
        dst: ResourceId,
        /// Destination byte offset.
        dst_offset: u64,
        /// Byte count.
        size: u64,
    },
    /// Buffer to one texture layer copy.
    CopyBufferToTexture {
        /// Source buffer.
        src: ResourceId,
        /// Source byte offset.
        src_offset: u64,
        /// Source row pitch.
        bytes_per_row: u32,
        /// Destination texture.
        dst: ResourceId,
        /// Destination array layer.
        layer: u32,
        /// Copied width in texels.
        width: u32,
        /// Copied height in texels.
        height: u32,
    },
    /// Begin a render pass.
    BeginRenderPass(RenderPassInfo),
    /// End the current render pass.
    EndRenderPass,
    /// Bind a pipeline.
    SetPipeline(ResourceId),
    /// Bind a bind group.
    SetBindGroup {
        /// Table index.
        index: u32,
        /// Group.
        group: ResourceId,
    },
    /// Bind a vertex buffer.
    SetVertexBuffer {
        /// Vertex buffer slot.
        slot: u32,
        /// Buffer.
        buffer: ResourceId,
    },
    /// Bind a 32-bit index buffer.
    SetIndexBuffer(ResourceId),
    /// Non-indexed draw.
    Draw {
        /// Vertices per instance.
        vertex_count: u32,
        /// Instance count.
        instance_count: u32,
        /// First vertex.
        first_vertex: u32,
        /// First instance.
        first_instance: u32,
    },
    /// Indexed draw.
    DrawIndexed {
        /// Indices per instance.
        index_count: u32,
        /// Instance count.
        instance_count: u32,
        /// First index.
        first_index: u32,
        /// Value added to each index.
        base_vertex: i32,
        /// First instance.
        first_instance: u32,
    },
}

/// Appends commands to a command list.
///
/// Typed wrappers over [`Command`] that take resource handles, so callers
/// cannot name a resource they do not hold.
#[derive(Debug)]
pub struct CommandRecorder<'a> {
    commands: &'a mut Vec<Command>,
}

impl<'a> CommandRecorder<'a> {
    /// Record into `commands`.
    pub fn new(commands: &'a mut Vec<Command>) -> Self {
        Self { commands }
    }

    /// Number of commands recorded so far.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Append a raw command.
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Record a barrier, draining `batch`. Empty batches record nothing.
    pub fn barrier(&mut self, batch: &mut TransitionBatch) {
        if !batch.is_empty() {
            self.commands.push(Command::Barrier(batch.take()));
        }
    }

    /// Record a buffer to buffer copy.
    pub fn copy_buffer(
        &mut self,
        src: &Buffer,
        src_offset: u64,
        dst: &Buffer,
        dst_offset: u64,
        size: u64,
    ) {
        self.commands.push(Command::CopyBuffer {
            src: src.id(),
            src_offset,
            dst: dst.id(),
            dst_offset,
            size,
        });
    }

    /// Record a copy of a whole texture layer from a buffer.
    pub fn copy_buffer_to_texture(
        &mut self,
        src: &Buffer,
        src_offset: u64,
        bytes_per_row: u32,
        dst: &Texture,
        layer: u32,
    ) {
        let size = dst.size();
        self.commands.push(Command::CopyBufferToTexture {
            src: src.id(),
            src_offset,
            bytes_per_row,
            dst: dst.id(),
            layer,
            width: size.width,
            height: size.height,
        });
    }

    /// Begin a render pass.
    pub fn begin_render_pass(&mut self, info: RenderPassInfo) {
        self.commands.push(Command::BeginRenderPass(info));
    }

    /// End the current render pass.
    pub fn end_render_pass(&mut self) {
        self.commands.push(Command::EndRenderPass);
    }

    /// Bind a pipeline.
    pub fn set_pipeline(&mut self, pipeline: &Pipeline) {
        self.commands.push(Command::SetPipeline(pipeline.id()));
    }

    /// Bind a bind group at `index`.
    pub fn set_bind_group(&mut self, index: u32, group: &BindGroup) {
        self.commands.push(Command::SetBindGroup {
            index,
            group: group.id(),
        });
    }

    /// Bind a vertex buffer at `slot`.
    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: &Buffer) {
        self.commands.push(Command::SetVertexBuffer {
            slot,
            buffer: buffer.id(),
        });
    }

    /// Bind a 32-bit index buffer.
    pub fn set_index_buffer(&mut self, buffer: &Buffer) {
        self.commands.push(Command::SetIndexBuffer(buffer.id()));
    }

    /// Non-indexed draw.
    pub fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        self.commands.push(Command::Draw {
            vertex_count,
            instance_count,
            first_vertex: 0,
            first_instance: 0,
        });
    }

    /// Indexed draw of a single instance.
    pub fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32) {
        self.draw_indexed_instanced(index_count, first_index, base_vertex, 1, 0);
    }

    /// Indexed draw of `instance_count` instances starting at `first_instance`.
    pub fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        first_index: u32,
        base_vertex: i32,
        instance_count: u32,
        first_instance: u32,
    ) {
        self.commands.push(Command::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            base_vertex,
            first_instance,
        });
    }
}

/// Lifecycle of a [`CommandArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaState {
    /// Reset and ready to record.
    Ready,
    /// Recording.
    Recording,
    /// Closed and handed to the device.
    Submitted,
}

/// Closed commands ready for submission.
#[derive(Debug, Clone)]
pub struct CommandStream {
    label: String,
    commands: Arc<Vec<Command>>,
}

impl CommandStream {
    /// Debug label of the arena it came from.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The recorded commands.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Share the command storage with a backend.
    pub fn into_shared(self) -> Arc<Vec<Command>> {
        self.commands
    }
}

/// Reusable backing storage for recorded commands.
///
/// Storage is shared with the device on submit and can only be reset once
/// every shared copy is gone, which the backend guarantees only after the
/// GPU finished executing it.
#[derive(Debug)]
pub struct CommandArena {
    label: String,
    commands: Arc<Vec<Command>>,
    state: ArenaState,
    submissions: u64,
}

impl CommandArena {
    /// Create an empty arena.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            commands: Arc::new(Vec::new()),
            state: ArenaState::Ready,
            submissions: 0,
        }
    }

    /// Debug label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ArenaState {
        self.state
    }

    /// Number of streams submitted from this arena.
    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    /// Whether a submitted copy of the storage still exists.
    pub fn is_in_flight(&self) -> bool {
        Arc::strong_count(&self.commands) > 1
    }

    /// Reclaim the storage for recording.
    ///
    /// Fails with [`GraphicsError::ArenaInFlight`] while the device still
    /// holds the previous stream.
    pub fn reset(&mut self) -> Result<(), GraphicsError> {
        let commands = Arc::get_mut(&mut self.commands)
            .ok_or_else(|| GraphicsError::ArenaInFlight(self.label.clone()))?;
        commands.clear();
        self.state = ArenaState::Ready;
        Ok(())
    }

    /// Start recording. The arena must have been reset.
    pub fn begin(&mut self) -> Result<CommandRecorder<'_>, GraphicsError> {
        if self.state == ArenaState::Submitted {
            return Err(GraphicsError::InvalidParameter(format!(
                "command arena '{}' must be reset before recording",
                self.label
            )));
        }
        let commands = Arc::get_mut(&mut self.commands)
            .ok_or_else(|| GraphicsError::ArenaInFlight(self.label.clone()))?;
        self.state = ArenaState::Recording;
        Ok(CommandRecorder::new(commands))
    }

    /// Close recording and produce the stream to submit.
    pub fn close(&mut self) -> Result<CommandStream, GraphicsError> {
        if self.state != ArenaState::Recording {
            return Err(GraphicsError::InvalidParameter(format!(
                "command arena '{}' closed while {:?}",
                self.label, self.state
            )));
        }
        self.state = ArenaState::Submitted;
        self.submissions += 1;
        Ok(CommandStream {
            label: self.label.clone(),
            commands: Arc::clone(&self.commands),
        })
    }

    /// Commands recorded since the last reset.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
}
