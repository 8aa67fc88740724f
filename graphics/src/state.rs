//! Resource state tracking for automatic barrier placement.
//!
//! Every texture a frame touches is in exactly one [`ResourceState`] at any
//! point of the command stream. A [`StateTracker`] remembers the state each
//! tracked resource will be in once the recorded work executes, and turns a
//! pass's requirements into a [`TransitionBatch`]: one barrier per resource
//! whose state actually changes, recorded as a single command.
//!
//! ```text
//! frame start   color: ShaderRead   present: Present
//! base pass     color: RenderTarget
//! post pass     color: ShaderRead   present: RenderTarget
//! frame end                         present: Present
//! ```

use std::collections::HashMap;

use crate::resources::ResourceId;

/// Usage state of a GPU resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    /// Contents undefined; only valid as a transition source.
    #[default]
    Undefined,
    /// Generic state, no particular optimization.
    Common,
    /// Owned by the presentation engine.
    Present,
    /// Written as a color attachment.
    RenderTarget,
    /// Written as a depth attachment.
    DepthWrite,
    /// Sampled by shaders.
    ShaderRead,
    /// Source of a copy.
    CopySource,
    /// Destination of a copy.
    CopyDest,
    /// Bound as a vertex buffer.
    VertexBuffer,
    /// Bound as an index buffer.
    IndexBuffer,
    /// CPU-mapped memory the GPU reads directly (upload heap).
    GenericRead,
}

impl ResourceState {
    /// States a render pass writes.
    pub fn is_attachment(self) -> bool {
        matches!(self, Self::RenderTarget | Self::DepthWrite)
    }
}

/// One state change of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transition {
    /// Resource changing state.
    pub resource: ResourceId,
    /// State before the barrier.
    pub from: ResourceState,
    /// State after the barrier.
    pub to: ResourceState,
}

impl Transition {
    /// Create a transition.
    pub fn new(resource: ResourceId, from: ResourceState, to: ResourceState) -> Self {
        Self { resource, from, to }
    }
}

/// Transitions recorded together as one barrier command.
///
/// Adding a same-state transition is a no-op. Adding a second transition for
/// a resource already in the batch folds both into one (`a -> b` then
/// `b -> c` becomes `a -> c`); folding back to the original state drops the
/// entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionBatch {
    transitions: Vec<Transition>,
}

impl TransitionBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transition.
    pub fn add(&mut self, transition: Transition) {
        if transition.from == transition.to {
            return;
        }
        if let Some(index) = self
            .transitions
            .iter()
            .position(|t| t.resource == transition.resource)
        {
            let merged = Transition::new(transition.resource, self.transitions[index].from, transition.to);
            if merged.from == merged.to {
                self.transitions.remove(index);
            } else {
                self.transitions[index] = merged;
            }
            return;
        }
        self.transitions.push(transition);
    }

    /// Check if the batch has any transitions.
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Number of transitions in the batch.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// The transitions, in insertion order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Take the transitions out, leaving the batch empty.
    pub fn take(&mut self) -> Vec<Transition> {
        std::mem::take(&mut self.transitions)
    }

    /// Clear the batch for reuse.
    pub fn clear(&mut self) {
        self.transitions.clear();
    }
}

/// Tracks the state every registered resource will be in after the work
/// recorded so far.
///
/// Each frame slot owns one tracker, so the state its targets are left in
/// by one frame is the state the next frame on that slot starts from.
#[derive(Debug, Default, Clone)]
pub struct StateTracker {
    states: HashMap<ResourceId, ResourceState>,
}

impl StateTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a resource in a known state.
    pub fn track(&mut self, id: ResourceId, state: ResourceState) {
        self.states.insert(id, state);
    }

    /// Stop tracking a resource (e.g., when it is destroyed).
    pub fn forget(&mut self, id: ResourceId) {
        self.states.remove(&id);
    }

    /// Current state, or `None` for untracked resources.
    pub fn state(&self, id: ResourceId) -> Option<ResourceState> {
        self.states.get(&id).copied()
    }

    /// Request `state` for `id`, adding the needed transition to `batch`.
    ///
    /// Fails for resources that were never tracked; guessing their state
    /// would hide a missing barrier.
    pub fn require(
        &mut self,
        id: ResourceId,
        state: ResourceState,
        batch: &mut TransitionBatch,
    ) -> Result<(), String> {
        let current = self
            .states
            .get_mut(&id)
            .ok_or_else(|| format!("resource {id} is not tracked"))?;
        batch.add(Transition::new(id, *current, state));
        *current = state;
        Ok(())
    }

    /// Number of tracked resources.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Check if any resources are being tracked.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Drop all tracking.
    pub fn reset(&mut self) {
        self.states.clear();
    }
}
