//! # Map Viewer Graphics
//!
//! Frame-lifecycle engine of the map viewer: pacing N frames in flight
//! against one GPU queue without ever touching memory the GPU still reads.
//!
//! ## Overview
//!
//! - [`SyncGate`] - the monotonically increasing completion counter
//! - [`FrameSlot`] / [`FrameSet`] - per-frame targets, constants and command arenas
//! - [`UploadStager`] - batched CPU to device copies through reusable staging memory
//! - [`RenderGraph`] - ordered passes with derived resource barriers
//! - [`FrameLoop`] - acquire, record, submit, present, advance
//! - [`SceneRenderer`] - the base, post and overlay passes of one frame
//! - [`backend`] - the simulated `dummy` device and the optional wgpu device
//!
//! ## Example
//!
//! ```ignore
//! use mapview_graphics::{FrameLoop, FrameLoopConfig, GraphicsDevice};
//!
//! let device = GraphicsDevice::dummy()?;
//! let mut frames = FrameLoop::new(device, &FrameLoopConfig::default(), 800, 600)?;
//! loop {
//!     frames.render(|slot| {
//!         renderer.write_constants(slot, &constants)?;
//!         renderer.record_frame(slot, &inputs)
//!     })?;
//! }
//! frames.shutdown()?;
//! ```

pub mod backend;
pub mod command;
pub mod device;
pub mod error;
pub mod frame;
pub mod frame_loop;
pub mod graph;
pub mod renderer;
pub mod resize;
pub mod resources;
pub mod state;
pub mod swapchain;
pub mod sync;
pub mod types;
pub mod upload;

// Re-export main types for convenience
pub use backend::GpuBackend;
#[cfg(feature = "dummy")]
pub use backend::dummy::{CompletionMode, DummyBackend};
pub use command::{ArenaState, CommandArena, CommandRecorder, CommandStream};
pub use device::{DeviceCapabilities, GraphicsDevice};
pub use error::GraphicsError;
pub use frame::{FrameSet, FrameSlot, FrameTargetFormats, FrameTargets};
pub use frame_loop::{FrameLoop, FrameLoopConfig, FrameState};
pub use graph::{GraphError, GraphStats, GraphicsPass, PassHandle, RenderGraph};
pub use renderer::{FrameInputs, GpuScene, SceneRenderer, ShaderSet};
pub use resize::{ResizeEvent, ResizeManager};
pub use resources::{BindGroup, Buffer, Pipeline, ResourceId, Texture};
pub use state::{ResourceState, StateTracker, Transition, TransitionBatch};
pub use swapchain::{PresentMode, Surface, SurfaceConfiguration};
pub use sync::{Drained, SyncGate};
pub use types::{
    BufferDescriptor, BufferUsage, Extent3d, LoadOp, SamplerDescriptor, ShaderSource,
    TextureDescriptor, TextureFormat, TextureUsage,
};
pub use upload::{UploadBatch, UploadStager, UploadTicket};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
///
/// This should be called before using any graphics functionality.
pub fn init() {
    log::info!("Map Viewer Graphics v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_render_graph_creation() {
        let graph = RenderGraph::new();
        assert_eq!(graph.pass_count(), 0);
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_dummy_device() {
        let device = GraphicsDevice::dummy().unwrap();
        assert_eq!(device.name(), "Dummy");
    }
}
