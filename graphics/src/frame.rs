//! Per-frame resource sets.
//!
//! A [`FrameSet`] holds N [`FrameSlot`]s (N = 2 or 3), used round-robin in
//! the order the presentation surface hands out its images. Each slot owns
//! everything one in-flight frame writes to:
//!
//! - intermediate color and normal targets plus a depth buffer
//! - the constant buffer the CPU fills once per frame
//! - the command arena the frame is recorded into
//! - the state tracker that remembers how the previous frame on this slot
//!   left its targets
//!
//! A slot may only be reused once the GPU finished the last frame submitted
//! from it. [`FrameSlot::prepare_for_recording`] enforces that: it waits on
//! the slot's `required_completion` before touching the arena.
//!
//! ```text
//! frames_in_flight = 2
//!
//! Slot 0: [frame 0, stamp 1] ──wait 1──► [frame 2, stamp 3] ──wait 3──► ...
//! Slot 1:      [frame 1, stamp 2] ──wait 2──► [frame 3, stamp 4] ──► ...
//! ```

use std::sync::Arc;

use crate::command::CommandArena;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::{Buffer, Texture};
use crate::state::{ResourceState, StateTracker};
use crate::sync::{Drained, SyncGate};
use crate::types::{BufferDescriptor, BufferUsage, TextureDescriptor, TextureFormat, TextureUsage};

/// Size of the per-frame constant buffer: two matrices and a vec4.
pub const CONSTANTS_SIZE: u64 = 144;

/// Formats of the sized per-slot targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameTargetFormats {
    /// Intermediate color.
    pub color: TextureFormat,
    /// Intermediate normals.
    pub normal: TextureFormat,
    /// Depth buffer.
    pub depth: TextureFormat,
}

impl Default for FrameTargetFormats {
    fn default() -> Self {
        Self {
            color: TextureFormat::Rgba8Unorm,
            normal: TextureFormat::Rgba16Float,
            depth: TextureFormat::Depth32Float,
        }
    }
}

/// The window-sized images one slot renders into.
#[derive(Debug)]
pub struct FrameTargets {
    /// Base-pass color output, sampled by the post pass.
    pub color: Arc<Texture>,
    /// Base-pass normal output, sampled by the post pass.
    pub normal: Arc<Texture>,
    /// Base-pass depth buffer.
    pub depth: Arc<Texture>,
}

impl FrameTargets {
    fn new(
        device: &GraphicsDevice,
        slot: usize,
        width: u32,
        height: u32,
        formats: FrameTargetFormats,
    ) -> Result<Self, GraphicsError> {
        let sampled = TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING;
        // Intermediates start shader-readable, the state every frame leaves them in.
        let color = device.create_texture(
            &TextureDescriptor::new_2d(width, height, formats.color, sampled)
                .with_label(format!("slot {slot} color")),
            ResourceState::ShaderRead,
        )?;
        let normal = device.create_texture(
            &TextureDescriptor::new_2d(width, height, formats.normal, sampled)
                .with_label(format!("slot {slot} normal")),
            ResourceState::ShaderRead,
        )?;
        let depth = device.create_texture(
            &TextureDescriptor::new_2d(
                width,
                height,
                formats.depth,
                TextureUsage::RENDER_ATTACHMENT,
            )
            .with_label(format!("slot {slot} depth")),
            ResourceState::DepthWrite,
        )?;
        Ok(Self {
            color,
            normal,
            depth,
        })
    }

    fn track(&self, states: &mut StateTracker) {
        states.track(self.color.id(), ResourceState::ShaderRead);
        states.track(self.normal.id(), ResourceState::ShaderRead);
        states.track(self.depth.id(), ResourceState::DepthWrite);
    }
}

/// One round-robin set of per-frame resources.
#[derive(Debug)]
pub struct FrameSlot {
    index: usize,
    targets: FrameTargets,
    present: Option<Arc<Texture>>,
    constants: Arc<Buffer>,
    arena: CommandArena,
    required_completion: u64,
    states: StateTracker,
}

impl FrameSlot {
    fn new(
        device: &GraphicsDevice,
        index: usize,
        width: u32,
        height: u32,
        formats: FrameTargetFormats,
    ) -> Result<Self, GraphicsError> {
        let targets = FrameTargets::new(device, index, width, height, formats)?;
        let constants = device.create_buffer(
            &BufferDescriptor::new(CONSTANTS_SIZE, BufferUsage::UNIFORM | BufferUsage::MAP_WRITE)
                .with_label(format!("slot {index} constants")),
        )?;
        let mut states = StateTracker::new();
        targets.track(&mut states);
        Ok(Self {
            index,
            targets,
            present: None,
            constants,
            arena: CommandArena::new(format!("frame slot {index}")),
            required_completion: 0,
            states,
        })
    }

    /// Position of this slot in its set.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Color, normal and depth targets.
    pub fn targets(&self) -> &FrameTargets {
        &self.targets
    }

    /// The presentation image this slot renders into.
    pub fn present_target(&self) -> Option<&Arc<Texture>> {
        self.present.as_ref()
    }

    /// The per-frame constant buffer.
    pub fn constants(&self) -> &Arc<Buffer> {
        &self.constants
    }

    /// Gate value that must complete before this slot may be reused.
    pub fn required_completion(&self) -> u64 {
        self.required_completion
    }

    /// The command arena.
    pub fn arena(&self) -> &CommandArena {
        &self.arena
    }

    /// Mutable access to the command arena.
    pub fn arena_mut(&mut self) -> &mut CommandArena {
        &mut self.arena
    }

    /// Resource states as the last frame on this slot left them.
    pub fn states(&self) -> &StateTracker {
        &self.states
    }

    /// Arena and state tracker together, for recording.
    pub fn recording_parts(&mut self) -> (&mut CommandArena, &mut StateTracker) {
        (&mut self.arena, &mut self.states)
    }

    /// Attach the presentation image this slot renders into.
    pub(crate) fn attach_present(&mut self, image: Arc<Texture>) {
        if let Some(old) = self.present.take() {
            self.states.forget(old.id());
        }
        self.states.track(image.id(), ResourceState::Present);
        self.present = Some(image);
    }

    pub(crate) fn detach_present(&mut self) {
        if let Some(old) = self.present.take() {
            self.states.forget(old.id());
        }
    }

    /// Block until the GPU has finished the last frame submitted from this
    /// slot, then reset the arena for recording.
    pub fn prepare_for_recording(&mut self, gate: &mut SyncGate) -> Result<(), GraphicsError> {
        if !gate.is_reached(self.required_completion)? {
            log::debug!(
                "FrameSlot {}: waiting for {} (completed: {})",
                self.index,
                self.required_completion,
                gate.last_completed()
            );
        }
        gate.wait_until(self.required_completion)?;
        self.arena.reset()
    }

    /// Whether the GPU has finished the last frame submitted from this slot.
    pub fn is_ready(&self, gate: &mut SyncGate) -> Result<bool, GraphicsError> {
        gate.is_reached(self.required_completion)
    }

    /// Non-blocking variant of [`prepare_for_recording`](Self::prepare_for_recording).
    ///
    /// Returns `false`, leaving the arena untouched, while the slot's last
    /// frame is still executing.
    pub fn try_prepare(&mut self, gate: &mut SyncGate) -> Result<bool, GraphicsError> {
        if !self.is_ready(gate)? {
            return Ok(false);
        }
        self.arena.reset()?;
        Ok(true)
    }

    /// Record that the frame just submitted from this slot completes at `value`.
    pub fn stamp(&mut self, value: u64) -> Result<(), GraphicsError> {
        if value < self.required_completion {
            return Err(GraphicsError::InvalidParameter(format!(
                "slot {} stamped with {value} after {}",
                self.index, self.required_completion
            )));
        }
        self.required_completion = value;
        Ok(())
    }

    fn recreate_targets(
        &mut self,
        device: &GraphicsDevice,
        width: u32,
        height: u32,
        formats: FrameTargetFormats,
    ) -> Result<(), GraphicsError> {
        self.states.forget(self.targets.color.id());
        self.states.forget(self.targets.normal.id());
        self.states.forget(self.targets.depth.id());
        self.targets = FrameTargets::new(device, self.index, width, height, formats)?;
        self.targets.track(&mut self.states);
        Ok(())
    }
}

/// All frame slots of a viewer.
#[derive(Debug)]
pub struct FrameSet {
    device: Arc<GraphicsDevice>,
    slots: Vec<FrameSlot>,
    formats: FrameTargetFormats,
    width: u32,
    height: u32,
}

impl FrameSet {
    /// Create `count` slots with `width`x`height` targets.
    pub fn new(
        device: Arc<GraphicsDevice>,
        count: usize,
        width: u32,
        height: u32,
        formats: FrameTargetFormats,
    ) -> Result<Self, GraphicsError> {
        if !(2..=3).contains(&count) {
            return Err(GraphicsError::InvalidParameter(format!(
                "frames in flight must be 2 or 3, got {count}"
            )));
        }
        let slots = (0..count)
            .map(|index| FrameSlot::new(&device, index, width, height, formats))
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!("FrameSet: {count} slots at {width}x{height}");
        Ok(Self {
            device,
            slots,
            formats,
            width,
            height,
        })
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false; a set holds at least two slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Target size.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Target formats.
    pub fn formats(&self) -> FrameTargetFormats {
        self.formats
    }

    /// Slot `index`.
    pub fn slot(&self, index: usize) -> Option<&FrameSlot> {
        self.slots.get(index)
    }

    /// Mutable slot `index`.
    pub fn slot_mut(&mut self, index: usize) -> Option<&mut FrameSlot> {
        self.slots.get_mut(index)
    }

    /// Iterate over the slots.
    pub fn iter(&self) -> impl Iterator<Item = &FrameSlot> {
        self.slots.iter()
    }

    /// Give slot `i` presentation image `i`.
    pub(crate) fn attach_present_images(&mut self, images: &[Arc<Texture>]) -> Result<(), GraphicsError> {
        if images.len() != self.slots.len() {
            return Err(GraphicsError::Surface(format!(
                "{} presentation images for {} frame slots",
                images.len(),
                self.slots.len()
            )));
        }
        for (slot, image) in self.slots.iter_mut().zip(images) {
            slot.attach_present(Arc::clone(image));
        }
        Ok(())
    }

    pub(crate) fn detach_present_images(&mut self) {
        for slot in &mut self.slots {
            slot.detach_present();
        }
    }

    /// Recreate every slot's sized targets. The device must be idle.
    pub fn resize(&mut self, _idle: &Drained<'_>, width: u32, height: u32) -> Result<(), GraphicsError> {
        for slot in &mut self.slots {
            slot.recreate_targets(&self.device, width, height, self.formats)?;
        }
        self.width = width;
        self.height = height;
        log::info!("FrameSet: resized {} slots to {width}x{height}", self.slots.len());
        Ok(())
    }
}
