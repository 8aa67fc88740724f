//! Render graph infrastructure.
//!
//! A [`RenderGraph`] is the ordered list of passes one frame executes. It
//! does not reorder anything: passes run in the order they were added. What
//! it does is derive, from each pass's declared attachments and sampled
//! textures, the state every texture must be in, and record the barrier
//! that gets it there right before the pass.
//!
//! # Architecture
//!
//! | Layer | Type | Purpose |
//! |-------|------|---------|
//! | Loop | [`FrameLoop`](crate::FrameLoop) | Acquire, record, submit, present, advance |
//! | Slot | [`FrameSlot`](crate::FrameSlot) | Per-frame targets, arena, state tracker |
//! | **Graph** | [`RenderGraph`] | Pass order and barriers (this module) |
//! | Pass | [`GraphicsPass`] | Attachments, reads, draw commands |
//!
//! # State Rules
//!
//! | Usage | Required state |
//! |-------|----------------|
//! | Color attachment | [`ResourceState::RenderTarget`] |
//! | Depth attachment | [`ResourceState::DepthWrite`] |
//! | Sampled texture | [`ResourceState::ShaderRead`] |
//!
//! Transitions requested with [`RenderGraph::transition_before`] join the
//! first pass's barrier; those from [`RenderGraph::transition_after`] form
//! one barrier after the last pass.
//!
//! # Example
//!
//! ```ignore
//! let mut graph = RenderGraph::new();
//! graph.transition_before(&present, ResourceState::RenderTarget);
//! graph.add_pass(base_pass);
//! graph.add_pass(post_pass);
//! graph.transition_after(&present, ResourceState::Present);
//!
//! let mut rec = arena.begin()?;
//! let stats = graph.compile(&mut slot_states, &mut rec)?;
//! ```

mod pass;

pub use pass::{ColorTarget, DepthTarget, GraphicsPass};

use crate::command::{ColorAttachment, Command, CommandRecorder, DepthAttachment, RenderPassInfo};
use crate::error::GraphicsError;
use crate::resources::Texture;
use crate::state::{ResourceState, StateTracker, TransitionBatch};
use crate::types::TextureUsage;

/// Handle to a pass in the render graph.
///
/// `PassHandle` is `Copy` and cheap to pass around. It is only valid within
/// the `RenderGraph` that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassHandle(u32);

impl PassHandle {
    fn new(index: u32) -> Self {
        Self(index)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Counts from one compilation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphStats {
    /// Render passes recorded.
    pub passes: usize,
    /// Individual transitions recorded.
    pub transitions: usize,
    /// Barrier commands recorded.
    pub barriers: usize,
    /// Draw calls recorded.
    pub draws: usize,
}

/// The passes of one frame, in execution order.
#[derive(Debug, Default)]
pub struct RenderGraph<'a> {
    passes: Vec<GraphicsPass<'a>>,
    before: Vec<(&'a Texture, ResourceState)>,
    after: Vec<(&'a Texture, ResourceState)>,
}

impl<'a> RenderGraph<'a> {
    /// Create a new empty render graph.
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    /// Append a pass. It runs after every pass added before it.
    pub fn add_pass(&mut self, pass: GraphicsPass<'a>) -> PassHandle {
        let index = self.passes.len() as u32;
        self.passes.push(pass);
        PassHandle::new(index)
    }

    /// Get a pass for further recording.
    pub fn pass_mut(&mut self, handle: PassHandle) -> Option<&mut GraphicsPass<'a>> {
        self.passes.get_mut(handle.index())
    }

    /// Move `texture` to `state` before the first pass.
    pub fn transition_before(&mut self, texture: &'a Texture, state: ResourceState) {
        self.before.push((texture, state));
    }

    /// Move `texture` to `state` after the last pass.
    pub fn transition_after(&mut self, texture: &'a Texture, state: ResourceState) {
        self.after.push((texture, state));
    }

    /// Get all passes in the graph.
    pub fn passes(&self) -> &[GraphicsPass<'a>] {
        &self.passes
    }

    /// Get the number of passes in the graph.
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Validate the graph and record it.
    ///
    /// `states` holds the current state of every texture the graph touches
    /// and is updated to the state the graph leaves them in. Nothing is
    /// recorded if validation fails.
    pub fn compile(
        &self,
        states: &mut StateTracker,
        recorder: &mut CommandRecorder<'_>,
    ) -> Result<GraphStats, GraphError> {
        for pass in &self.passes {
            validate_pass(pass)?;
        }
        // Resolve against a scratch copy so a failure leaves `states` intact.
        let mut scratch = states.clone();
        let mut stats = GraphStats::default();
        let mut out = Vec::new();
        let mut batch = TransitionBatch::new();

        for (texture, state) in &self.before {
            require(&mut scratch, texture, *state, &mut batch, "graph start")?;
        }

        for pass in &self.passes {
            for color in pass.colors() {
                require(&mut scratch, color.texture, ResourceState::RenderTarget, &mut batch, pass.label())?;
            }
            if let Some(depth) = pass.depth() {
                require(&mut scratch, depth.texture, ResourceState::DepthWrite, &mut batch, pass.label())?;
            }
            for texture in pass.reads() {
                require(&mut scratch, texture, ResourceState::ShaderRead, &mut batch, pass.label())?;
            }
            flush(&mut batch, &mut out, &mut stats);

            out.push(Command::BeginRenderPass(RenderPassInfo {
                label: pass.label().to_string(),
                colors: pass
                    .colors()
                    .iter()
                    .map(|c| ColorAttachment {
                        texture: c.texture.id(),
                        load: c.load,
                    })
                    .collect(),
                depth: pass.depth().map(|d| DepthAttachment {
                    texture: d.texture.id(),
                    load: d.load,
                }),
            }));
            out.extend(pass.commands().iter().cloned());
            out.push(Command::EndRenderPass);
            stats.passes += 1;
            stats.draws += pass.draw_count();
        }

        for (texture, state) in &self.after {
            require(&mut scratch, texture, *state, &mut batch, "graph end")?;
        }
        flush(&mut batch, &mut out, &mut stats);

        *states = scratch;
        for command in out {
            recorder.push(command);
        }
        log::trace!(
            "RenderGraph: {} passes, {} barriers, {} draws",
            stats.passes,
            stats.barriers,
            stats.draws
        );
        Ok(stats)
    }
}

fn require(
    states: &mut StateTracker,
    texture: &Texture,
    state: ResourceState,
    batch: &mut TransitionBatch,
    at: &str,
) -> Result<(), GraphError> {
    states
        .require(texture.id(), state, batch)
        .map_err(|reason| GraphError::UntrackedResource {
            at: at.to_string(),
            reason,
        })
}

fn flush(batch: &mut TransitionBatch, out: &mut Vec<Command>, stats: &mut GraphStats) {
    if !batch.is_empty() {
        stats.transitions += batch.len();
        stats.barriers += 1;
        out.push(Command::Barrier(batch.take()));
    }
}

fn texture_name(texture: &Texture) -> String {
    texture
        .label()
        .map_or_else(|| texture.id().to_string(), str::to_string)
}

fn validate_pass(pass: &GraphicsPass<'_>) -> Result<(), GraphError> {
    let label = pass.label();
    let mut attachments = pass.attachments().peekable();
    let Some(first) = attachments.peek().copied() else {
        return Err(GraphError::NoAttachments(label.to_string()));
    };
    let extent = first.size();

    for texture in pass.attachments() {
        if !texture.descriptor().usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            return Err(GraphError::MissingUsage {
                pass: label.to_string(),
                texture: texture_name(texture),
                usage: "RENDER_ATTACHMENT",
            });
        }
        let size = texture.size();
        if size.width != extent.width || size.height != extent.height {
            return Err(GraphError::SizeMismatch {
                pass: label.to_string(),
                texture: texture_name(texture),
            });
        }
        if pass.reads().iter().any(|r| r.id() == texture.id()) {
            return Err(GraphError::ReadWriteConflict {
                pass: label.to_string(),
                texture: texture_name(texture),
            });
        }
    }
    if pass.colors().iter().any(|c| c.texture.format().is_depth()) {
        return Err(GraphError::WrongFormat {
            pass: label.to_string(),
            reason: "depth format used as a color attachment",
        });
    }
    if pass.depth().is_some_and(|d| !d.texture.format().is_depth()) {
        return Err(GraphError::WrongFormat {
            pass: label.to_string(),
            reason: "color format used as the depth attachment",
        });
    }
    for texture in pass.reads() {
        if !texture.descriptor().usage.contains(TextureUsage::TEXTURE_BINDING) {
            return Err(GraphError::MissingUsage {
                pass: label.to_string(),
                texture: texture_name(texture),
                usage: "TEXTURE_BINDING",
            });
        }
    }
    if let Some(command) = pass.commands().iter().find(|c| {
        matches!(
            c,
            Command::Barrier(_)
                | Command::BeginRenderPass(_)
                | Command::EndRenderPass
                | Command::CopyBuffer { .. }
                | Command::CopyBufferToTexture { .. }
        )
    }) {
        return Err(GraphError::IllegalCommand {
            pass: label.to_string(),
            command: format!("{command:?}"),
        });
    }
    Ok(())
}

/// Errors that can occur during graph compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A pass has neither color nor depth attachments.
    NoAttachments(String),
    /// A pass samples a texture it also renders to.
    ReadWriteConflict {
        /// Pass label.
        pass: String,
        /// Offending texture.
        texture: String,
    },
    /// A texture lacks the usage flag its role in the pass needs.
    MissingUsage {
        /// Pass label.
        pass: String,
        /// Offending texture.
        texture: String,
        /// The missing flag.
        usage: &'static str,
    },
    /// Attachments of one pass differ in size.
    SizeMismatch {
        /// Pass label.
        pass: String,
        /// The first attachment that differs.
        texture: String,
    },
    /// An attachment's format does not match its role.
    WrongFormat {
        /// Pass label.
        pass: String,
        /// What is wrong.
        reason: &'static str,
    },
    /// A pass recorded a command only the graph may record.
    IllegalCommand {
        /// Pass label.
        pass: String,
        /// The command.
        command: String,
    },
    /// A texture's current state is unknown.
    UntrackedResource {
        /// Where the state was needed.
        at: String,
        /// Details.
        reason: String,
    },
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAttachments(pass) => write!(f, "pass '{pass}' has no attachments"),
            Self::ReadWriteConflict { pass, texture } => {
                write!(f, "pass '{pass}' both samples and renders to {texture}")
            }
            Self::MissingUsage {
                pass,
                texture,
                usage,
            } => write!(f, "pass '{pass}': {texture} needs {usage} usage"),
            Self::SizeMismatch { pass, texture } => {
                write!(f, "pass '{pass}': attachment {texture} differs in size")
            }
            Self::WrongFormat { pass, reason } => write!(f, "pass '{pass}': {reason}"),
            Self::IllegalCommand { pass, command } => {
                write!(f, "pass '{pass}' recorded {command}, which only the graph may record")
            }
            Self::UntrackedResource { at, reason } => write!(f, "{at}: {reason}"),
        }
    }
}

impl std::error::Error for GraphError {}

impl From<GraphError> for GraphicsError {
    fn from(err: GraphError) -> Self {
        GraphicsError::Validation(err.to_string())
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::device::GraphicsDevice;
    use crate::state::Transition;
    use crate::types::{LoadOp, TextureDescriptor, TextureFormat};

    struct Targets {
        color: Arc<Texture>,
        normal: Arc<Texture>,
        depth: Arc<Texture>,
        present: Arc<Texture>,
    }

    fn targets() -> Targets {
        let device = GraphicsDevice::dummy().unwrap();
        let sampled = TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING;
        let make = |format, usage, state| {
            device
                .create_texture(&TextureDescriptor::new_2d(4, 4, format, usage), state)
                .unwrap()
        };
        Targets {
            color: make(TextureFormat::Rgba8Unorm, sampled, ResourceState::ShaderRead),
            normal: make(TextureFormat::Rgba16Float, sampled, ResourceState::ShaderRead),
            depth: make(
                TextureFormat::Depth32Float,
                TextureUsage::RENDER_ATTACHMENT,
                ResourceState::DepthWrite,
            ),
            present: make(
                TextureFormat::Rgba8Unorm,
                TextureUsage::RENDER_ATTACHMENT,
                ResourceState::Present,
            ),
        }
    }

    fn tracker(t: &Targets) -> StateTracker {
        let mut states = StateTracker::new();
        states.track(t.color.id(), ResourceState::ShaderRead);
        states.track(t.normal.id(), ResourceState::ShaderRead);
        states.track(t.depth.id(), ResourceState::DepthWrite);
        states.track(t.present.id(), ResourceState::Present);
        states
    }

    fn barriers(commands: &[Command]) -> Vec<Vec<Transition>> {
        commands
            .iter()
            .filter_map(|c| match c {
                Command::Barrier(t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_frame_barrier_sequence() {
        let t = targets();
        let mut states = tracker(&t);
        let mut graph = RenderGraph::new();
        graph.transition_before(&t.present, ResourceState::RenderTarget);
        graph.add_pass(
            GraphicsPass::new("base")
                .with_color(&t.color, LoadOp::Clear([0.1, 0.1, 0.1, 1.0]))
                .with_color(&t.normal, LoadOp::Clear([0.0; 4]))
                .with_depth(&t.depth, LoadOp::Clear(1.0)),
        );
        graph.add_pass(
            GraphicsPass::new("post")
                .with_color(&t.present, LoadOp::Clear([0.0, 0.0, 0.0, 1.0]))
                .with_read(&t.color)
                .with_read(&t.normal),
        );
        graph.add_pass(GraphicsPass::new("overlay").with_color(&t.present, LoadOp::Load));
        graph.transition_after(&t.present, ResourceState::Present);

        let mut commands = Vec::new();
        let stats = graph
            .compile(&mut states, &mut CommandRecorder::new(&mut commands))
            .unwrap();
        assert_eq!(stats.passes, 3);
        assert_eq!(stats.barriers, 3);

        let recorded = barriers(&commands);
        assert_eq!(
            recorded[0],
            vec![
                Transition::new(t.present.id(), ResourceState::Present, ResourceState::RenderTarget),
                Transition::new(t.color.id(), ResourceState::ShaderRead, ResourceState::RenderTarget),
                Transition::new(t.normal.id(), ResourceState::ShaderRead, ResourceState::RenderTarget),
            ]
        );
        assert_eq!(
            recorded[1],
            vec![
                Transition::new(t.color.id(), ResourceState::RenderTarget, ResourceState::ShaderRead),
                Transition::new(t.normal.id(), ResourceState::RenderTarget, ResourceState::ShaderRead),
            ]
        );
        assert_eq!(
            recorded[2],
            vec![Transition::new(
                t.present.id(),
                ResourceState::RenderTarget,
                ResourceState::Present
            )]
        );
        assert_eq!(states.state(t.present.id()), Some(ResourceState::Present));
        assert_eq!(states.state(t.color.id()), Some(ResourceState::ShaderRead));
        // First command is the barrier, last is the barrier back to presentable.
        assert!(matches!(commands.first(), Some(Command::Barrier(_))));
        assert!(matches!(commands.last(), Some(Command::Barrier(_))));
    }

    #[test]
    fn test_read_write_conflict_rejected() {
        let t = targets();
        let mut states = tracker(&t);
        let mut graph = RenderGraph::new();
        graph.add_pass(
            GraphicsPass::new("feedback")
                .with_color(&t.color, LoadOp::Load)
                .with_read(&t.color),
        );
        let mut commands = Vec::new();
        let err = graph
            .compile(&mut states, &mut CommandRecorder::new(&mut commands))
            .unwrap_err();
        assert!(matches!(err, GraphError::ReadWriteConflict { .. }));
        assert!(commands.is_empty());
        assert_eq!(states.state(t.color.id()), Some(ResourceState::ShaderRead));
    }

    #[test]
    fn test_missing_sampled_usage_rejected() {
        let t = targets();
        let mut states = tracker(&t);
        let mut graph = RenderGraph::new();
        graph.add_pass(
            GraphicsPass::new("post")
                .with_color(&t.color, LoadOp::Load)
                .with_read(&t.present),
        );
        let mut commands = Vec::new();
        let err = graph
            .compile(&mut states, &mut CommandRecorder::new(&mut commands))
            .unwrap_err();
        assert!(matches!(err, GraphError::MissingUsage { usage: "TEXTURE_BINDING", .. }));
    }

    #[test]
    fn test_barrier_inside_pass_rejected() {
        let t = targets();
        let mut states = tracker(&t);
        let mut graph = RenderGraph::new();
        let handle = graph.add_pass(GraphicsPass::new("base").with_color(&t.color, LoadOp::Load));
        graph
            .pass_mut(handle)
            .unwrap()
            .record()
            .push(Command::Barrier(Vec::new()));
        let mut commands = Vec::new();
        let err = graph
            .compile(&mut states, &mut CommandRecorder::new(&mut commands))
            .unwrap_err();
        assert!(matches!(err, GraphError::IllegalCommand { .. }));
    }

    #[test]
    fn test_untracked_texture_rejected() {
        let t = targets();
        let mut states = StateTracker::new();
        let mut graph = RenderGraph::new();
        graph.add_pass(GraphicsPass::new("base").with_color(&t.color, LoadOp::Load));
        let mut commands = Vec::new();
        assert!(graph
            .compile(&mut states, &mut CommandRecorder::new(&mut commands))
            .is_err());
    }

    #[test]
    fn test_second_frame_starts_from_left_states() {
        let t = targets();
        let mut states = tracker(&t);
        for _ in 0..2 {
            let mut graph = RenderGraph::new();
            graph.add_pass(GraphicsPass::new("base").with_color(&t.color, LoadOp::Load));
            graph.add_pass(
                GraphicsPass::new("post")
                    .with_color(&t.normal, LoadOp::Load)
                    .with_read(&t.color),
            );
            let mut commands = Vec::new();
            graph
                .compile(&mut states, &mut CommandRecorder::new(&mut commands))
                .unwrap();
            let first = &barriers(&commands)[0];
            assert_eq!(first[0].from, ResourceState::ShaderRead);
        }
    }
}
