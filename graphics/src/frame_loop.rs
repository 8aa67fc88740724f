//! The per-frame state machine.
//!
//! [`FrameLoop`] owns the gate, the frame slots and the presentation
//! surface, and walks every frame through the same four phases:
//!
//! ```text
//!        begin_frame            submit              present
//! Idle ─────────────► Recording ──────► Submitted ──────► Presented
//!  ▲                                                          │
//!  └──────────────────────────── advance ─────────────────────┘
//! ```
//!
//! - `begin_frame` asks the surface which image is next, picks the slot with
//!   the same index and blocks until that slot's previous frame retired.
//! - `submit` closes the slot's arena, queues it and signals the gate.
//! - `present` queues the image for display.
//! - `advance` stamps the slot with the signaled value and reads the next
//!   image index back from the surface.
//!
//! Calling an operation in the wrong phase fails with
//! [`GraphicsError::InvalidFrameState`] and changes nothing. Any other
//! failure is fatal: the loop is left where it was and the caller is
//! expected to shut down.
//!
//! # Graceful Shutdown
//!
//! [`FrameLoop::shutdown`] drains the gate so every resource can be dropped
//! safely afterwards. Dropping the loop without it drains as a fallback.

use std::sync::Arc;
use std::time::Duration;

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::frame::{FrameSet, FrameSlot, FrameTargetFormats};
use crate::resources::Texture;
use crate::swapchain::{PresentMode, Surface, SurfaceConfiguration};
use crate::sync::{DEFAULT_HANG_THRESHOLD, SyncGate};
use crate::types::TextureFormat;

/// Phase of the frame currently being produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameState {
    /// Between frames.
    #[default]
    Idle,
    /// Commands are being recorded into the active slot.
    Recording,
    /// The active slot's commands are queued.
    Submitted,
    /// The active image is queued for display.
    Presented,
}

/// Settings for a [`FrameLoop`].
#[derive(Debug, Clone, PartialEq)]
pub struct FrameLoopConfig {
    /// Frame slots and presentation images (2 or 3).
    pub frames_in_flight: usize,
    /// How long a GPU wait may block before a hang warning is logged.
    pub hang_threshold: Duration,
    /// Presentation mode.
    pub present_mode: PresentMode,
    /// Presentation image format.
    pub surface_format: TextureFormat,
    /// Formats of the per-slot targets.
    pub targets: FrameTargetFormats,
}

impl Default for FrameLoopConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            hang_threshold: DEFAULT_HANG_THRESHOLD,
            present_mode: PresentMode::Fifo,
            surface_format: TextureFormat::Rgba8Unorm,
            targets: FrameTargetFormats::default(),
        }
    }
}

impl FrameLoopConfig {
    /// Set the number of frames in flight.
    pub fn with_frames_in_flight(mut self, count: usize) -> Self {
        self.frames_in_flight = count;
        self
    }

    /// Set the hang diagnostic threshold.
    pub fn with_hang_threshold(mut self, threshold: Duration) -> Self {
        self.hang_threshold = threshold;
        self
    }

    /// Set the present mode.
    pub fn with_present_mode(mut self, mode: PresentMode) -> Self {
        self.present_mode = mode;
        self
    }

    /// Set the presentation image format.
    pub fn with_surface_format(mut self, format: TextureFormat) -> Self {
        self.surface_format = format;
        self
    }
}

/// Drives acquire, record, submit, present and advance.
#[derive(Debug)]
pub struct FrameLoop {
    device: Arc<GraphicsDevice>,
    gate: SyncGate,
    frames: FrameSet,
    surface: Surface,
    state: FrameState,
    /// Slot of the frame in progress, or of the next frame while idle.
    active: usize,
    /// Gate value signaled for the frame in progress.
    pending: Option<u64>,
    frame_number: u64,
    shut_down: bool,
}

impl FrameLoop {
    /// Create the surface and frame slots, then wait for the device to be idle.
    pub fn new(
        device: Arc<GraphicsDevice>,
        config: &FrameLoopConfig,
        width: u32,
        height: u32,
    ) -> Result<Self, GraphicsError> {
        let gate = SyncGate::new(Arc::clone(&device)).with_hang_threshold(config.hang_threshold);
        let surface = Surface::new(
            Arc::clone(&device),
            SurfaceConfiguration::new(width, height)
                .with_format(config.surface_format)
                .with_image_count(config.frames_in_flight as u32)
                .with_present_mode(config.present_mode),
        )?;
        let mut frames = FrameSet::new(
            Arc::clone(&device),
            config.frames_in_flight,
            width,
            height,
            config.targets,
        )?;
        frames.attach_present_images(&surface_images(&surface))?;

        let mut frame_loop = Self {
            device,
            gate,
            frames,
            surface,
            state: FrameState::Idle,
            active: 0,
            pending: None,
            frame_number: 0,
            shut_down: false,
        };
        frame_loop.gate.drain()?;
        frame_loop.active = frame_loop.surface.current_index();
        log::info!(
            "FrameLoop: {} frames in flight at {width}x{height}",
            config.frames_in_flight
        );
        Ok(frame_loop)
    }

    fn expect(&self, expected: FrameState, operation: &'static str) -> Result<(), GraphicsError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(GraphicsError::InvalidFrameState {
                operation,
                state: self.state,
            })
        }
    }

    fn active_slot_mut(&mut self) -> Result<&mut FrameSlot, GraphicsError> {
        let index = self.active;
        self.frames
            .slot_mut(index)
            .ok_or_else(|| GraphicsError::Internal(format!("no frame slot {index}")))
    }

    /// Acquire the next presentation image and make its slot active.
    fn acquire_slot(&mut self) -> Result<usize, GraphicsError> {
        let index = self.surface.acquire()?;
        if index != self.active {
            log::debug!(
                "FrameLoop: surface handed out image {index}, expected {}",
                self.active
            );
        }
        self.active = index;
        Ok(index)
    }

    /// Idle → Recording. Blocks until the slot is free; returns its index.
    ///
    /// A failed acquire leaves the loop Idle, so the caller may resize and
    /// try again.
    pub fn begin_frame(&mut self) -> Result<usize, GraphicsError> {
        self.expect(FrameState::Idle, "begin a frame")?;
        let index = self.acquire_slot()?;
        let slot = self
            .frames
            .slot_mut(index)
            .ok_or_else(|| GraphicsError::Internal(format!("no frame slot {index}")))?;
        slot.prepare_for_recording(&mut self.gate)?;
        self.state = FrameState::Recording;
        log::trace!("FrameLoop: frame {} recording in slot {index}", self.frame_number);
        Ok(index)
    }

    /// Non-blocking [`begin_frame`](Self::begin_frame): `None` while the
    /// next slot's previous frame is still executing. Nothing is acquired
    /// from the surface until the slot is free.
    pub fn try_begin_frame(&mut self) -> Result<Option<usize>, GraphicsError> {
        self.expect(FrameState::Idle, "begin a frame")?;
        let expected = self.surface.current_index();
        let ready = self
            .frames
            .slot(expected)
            .ok_or_else(|| GraphicsError::Internal(format!("no frame slot {expected}")))?
            .is_ready(&mut self.gate)?;
        if !ready {
            return Ok(None);
        }
        let index = self.acquire_slot()?;
        let slot = self
            .frames
            .slot_mut(index)
            .ok_or_else(|| GraphicsError::Internal(format!("no frame slot {index}")))?;
        if !slot.try_prepare(&mut self.gate)? {
            return Ok(None);
        }
        self.state = FrameState::Recording;
        Ok(Some(index))
    }

    /// The slot being recorded.
    pub fn slot_mut(&mut self) -> Result<&mut FrameSlot, GraphicsError> {
        self.expect(FrameState::Recording, "record")?;
        self.active_slot_mut()
    }

    /// Recording → Submitted. Returns the gate value the frame completes at.
    pub fn submit(&mut self) -> Result<u64, GraphicsError> {
        self.expect(FrameState::Recording, "submit")?;
        let stream = self.active_slot_mut()?.arena_mut().close()?;
        self.device.submit(stream)?;
        let value = self.gate.signal_after_submit()?;
        self.pending = Some(value);
        self.state = FrameState::Submitted;
        Ok(value)
    }

    /// Submitted → Presented.
    pub fn present(&mut self) -> Result<(), GraphicsError> {
        self.expect(FrameState::Submitted, "present")?;
        self.surface.present()?;
        self.state = FrameState::Presented;
        Ok(())
    }

    /// Presented → Idle. Stamps the slot and reads the next image index.
    pub fn advance(&mut self) -> Result<(), GraphicsError> {
        self.expect(FrameState::Presented, "advance")?;
        let value = self
            .pending
            .take()
            .ok_or_else(|| GraphicsError::Internal("presented frame has no signal".into()))?;
        self.active_slot_mut()?.stamp(value)?;
        self.active = self.surface.current_index();
        self.frame_number += 1;
        self.state = FrameState::Idle;
        log::trace!("FrameLoop: advanced to slot {}", self.active);
        Ok(())
    }

    /// Run one whole frame, recording with `record`.
    pub fn render<R>(
        &mut self,
        record: impl FnOnce(&mut FrameSlot) -> Result<R, GraphicsError>,
    ) -> Result<R, GraphicsError> {
        self.begin_frame()?;
        let result = record(self.slot_mut()?)?;
        self.submit()?;
        self.present()?;
        self.advance()?;
        Ok(result)
    }

    /// Recreate every size-dependent resource. Only valid between frames.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), GraphicsError> {
        self.expect(FrameState::Idle, "resize")?;
        if width == 0 || height == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "cannot resize to {width}x{height}"
            )));
        }
        let drained = self.gate.drain()?;
        self.frames.detach_present_images();
        self.surface.resize(&drained, width, height)?;
        self.frames.resize(&drained, width, height)?;
        self.frames.attach_present_images(&surface_images(&self.surface))?;
        self.active = self.surface.current_index();
        Ok(())
    }

    /// Finish every submitted frame. Resources may be dropped afterwards.
    pub fn shutdown(mut self) -> Result<(), GraphicsError> {
        self.shut_down = true;
        if self.state != FrameState::Idle {
            log::warn!("FrameLoop: shutting down mid-frame ({:?})", self.state);
        }
        let drained = self.gate.drain()?;
        log::info!(
            "FrameLoop: shut down after {} frames (drained at {})",
            self.frame_number,
            drained.completed()
        );
        Ok(())
    }

    /// Current phase.
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Frames completed through `advance`.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Slot of the frame in progress, or of the next frame while idle.
    pub fn current_slot(&self) -> usize {
        self.active
    }

    /// The device.
    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    /// The gate, for uploads and explicit waits.
    pub fn gate_mut(&mut self) -> &mut SyncGate {
        &mut self.gate
    }

    /// The frame slots.
    pub fn frames(&self) -> &FrameSet {
        &self.frames
    }

    /// The presentation surface.
    pub fn surface(&self) -> &Surface {
        &self.surface
    }
}

fn surface_images(surface: &Surface) -> Vec<Arc<Texture>> {
    (0..surface.image_count())
        .filter_map(|i| surface.image(i).cloned())
        .collect()
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        if self.shut_down {
            return;
        }
        if let Err(err) = self.gate.drain() {
            log::error!("FrameLoop: drain on drop failed: {err}");
        }
    }
}
