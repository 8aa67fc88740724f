//! Render pass declarations.

use crate::command::{Command, CommandRecorder};
use crate::resources::Texture;
use crate::types::LoadOp;

/// A color attachment of a [`GraphicsPass`].
#[derive(Debug, Clone, Copy)]
pub struct ColorTarget<'a> {
    /// Texture written by the pass.
    pub texture: &'a Texture,
    /// What happens to its contents when the pass begins.
    pub load: LoadOp<[f32; 4]>,
}

/// The depth attachment of a [`GraphicsPass`].
#[derive(Debug, Clone, Copy)]
pub struct DepthTarget<'a> {
    /// Depth texture written by the pass.
    pub texture: &'a Texture,
    /// What happens to its contents when the pass begins.
    pub load: LoadOp<f32>,
}

/// One render pass: its attachments, the textures it samples, and the
/// commands recorded inside it.
///
/// Attachments and sampled textures are declared up front so the graph can
/// put every resource into the right state before the pass begins.
///
/// # Example
///
/// ```ignore
/// let mut post = GraphicsPass::new("post")
///     .with_color(&present, LoadOp::Clear([0.0, 0.0, 0.0, 1.0]))
///     .with_read(&targets.color)
///     .with_read(&targets.normal);
/// let mut rec = post.record();
/// rec.set_pipeline(&pipeline);
/// rec.set_bind_group(0, &inputs);
/// rec.draw(3, 1);
/// ```
#[derive(Debug)]
pub struct GraphicsPass<'a> {
    label: String,
    colors: Vec<ColorTarget<'a>>,
    depth: Option<DepthTarget<'a>>,
    reads: Vec<&'a Texture>,
    commands: Vec<Command>,
}

impl<'a> GraphicsPass<'a> {
    /// Create a pass with no attachments.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            colors: Vec::new(),
            depth: None,
            reads: Vec::new(),
            commands: Vec::new(),
        }
    }

    /// Add a color attachment.
    pub fn with_color(mut self, texture: &'a Texture, load: LoadOp<[f32; 4]>) -> Self {
        self.colors.push(ColorTarget { texture, load });
        self
    }

    /// Set the depth attachment.
    pub fn with_depth(mut self, texture: &'a Texture, load: LoadOp<f32>) -> Self {
        self.depth = Some(DepthTarget { texture, load });
        self
    }

    /// Declare a texture the pass samples.
    pub fn with_read(mut self, texture: &'a Texture) -> Self {
        self.reads.push(texture);
        self
    }

    /// Pass label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Color attachments.
    pub fn colors(&self) -> &[ColorTarget<'a>] {
        &self.colors
    }

    /// Depth attachment.
    pub fn depth(&self) -> Option<&DepthTarget<'a>> {
        self.depth.as_ref()
    }

    /// Sampled textures.
    pub fn reads(&self) -> &[&'a Texture] {
        &self.reads
    }

    /// Recorder for the commands inside the pass.
    ///
    /// Barriers are inserted by the graph; recording one here is rejected
    /// at compile time.
    pub fn record(&mut self) -> CommandRecorder<'_> {
        CommandRecorder::new(&mut self.commands)
    }

    /// Commands recorded so far.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of draw calls recorded.
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Draw { .. } | Command::DrawIndexed { .. }))
            .count()
    }

    /// Every attachment, colors first.
    pub(super) fn attachments(&self) -> impl Iterator<Item = &'a Texture> + '_ {
        self.colors
            .iter()
            .map(|c| c.texture)
            .chain(self.depth.iter().map(|d| d.texture))
    }
}
