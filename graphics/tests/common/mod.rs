//! Shared fixtures for the graphics integration tests.
//!
//! Everything runs on the simulated backend, so no GPU is needed. The
//! backend handle is kept next to the device so tests can step GPU
//! progress and inspect the execution log.

#![allow(dead_code)]

use std::sync::Arc;

use mapview_core::geometry::GeometryPool;
use mapview_core::mesh::SubMesh;
use mapview_core::mesh::generators::{generate_grid, generate_quad, generate_sphere};
use mapview_core::overlay::OverlayCatalog;
use mapview_core::world::{WORLD_COUNT, WORLD_NAMES};
use mapview_graphics::backend::dummy::{CompletionMode, DummyBackend};
use mapview_graphics::{
    FrameLoop, FrameLoopConfig, FrameSlot, GpuScene, GraphicsDevice, GraphicsError, GraphicsPass,
    LoadOp, RenderGraph, ResourceState, SceneRenderer, ShaderSet, ShaderSource, UploadStager,
};

/// A simulated device and its backend.
pub struct TestContext {
    pub backend: Arc<DummyBackend>,
    pub device: Arc<GraphicsDevice>,
}

impl TestContext {
    /// Create a context whose GPU completes work as soon as it executes.
    pub fn new() -> Self {
        Self::with_mode(CompletionMode::Immediate)
    }

    /// Create a context with the given completion mode.
    pub fn with_mode(mode: CompletionMode) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let backend = Arc::new(DummyBackend::with_mode(mode).unwrap());
        let device = GraphicsDevice::new(backend.clone());
        Self { backend, device }
    }

    /// A frame loop at 64x48. In manual mode the startup drain is released
    /// first.
    pub fn frame_loop(&self, frames_in_flight: usize) -> FrameLoop {
        self.backend.release_until(1);
        FrameLoop::new(
            self.device.clone(),
            &FrameLoopConfig::default().with_frames_in_flight(frames_in_flight),
            64,
            48,
        )
        .unwrap()
    }

    /// Upload `pool` and `catalog` and build a renderer over `fl`'s slots.
    pub fn renderer(
        &self,
        fl: &mut FrameLoop,
        pool: GeometryPool,
        catalog: &OverlayCatalog,
    ) -> SceneRenderer {
        let mut stager = UploadStager::new(self.device.clone());
        let (scene, ticket) =
            GpuScene::upload(&self.device, &mut stager, fl.gate_mut(), pool, catalog, &[]).unwrap();
        ticket.wait(fl.gate_mut()).unwrap();
        SceneRenderer::new(
            self.device.clone(),
            &shaders(),
            fl.frames(),
            FrameLoopConfig::default().surface_format,
            scene,
        )
        .unwrap()
    }
}

/// Empty shader modules; the simulated backend does not compile them.
pub fn shaders() -> ShaderSet {
    ShaderSet {
        base: ShaderSource::new("base", ""),
        post: ShaderSource::new("post", ""),
        overlay: ShaderSource::new("overlay", ""),
    }
}

/// Sub-meshes of world `index`: `index + 1` pieces of varying size.
pub fn world_submeshes(index: usize) -> Vec<SubMesh> {
    (0..=index)
        .map(|piece| match piece % 3 {
            0 => generate_quad(1.0 + piece as f32, 1.0),
            1 => generate_grid(piece as u32 + 1, 2, 8.0),
            _ => generate_sphere(4.0, 6 + piece as u32, 4),
        })
        .collect()
}

/// All seven worlds with [`world_submeshes`] geometry.
pub fn seven_worlds() -> GeometryPool {
    let mut builder = GeometryPool::builder();
    for (index, name) in WORLD_NAMES.iter().enumerate() {
        builder.push_world(*name, &world_submeshes(index)).unwrap();
    }
    assert_eq!(builder.world_count(), WORLD_COUNT);
    builder.build()
}

/// A few markers in worlds 2 and 4 (1-based in the file).
pub fn sample_markers() -> OverlayCatalog {
    OverlayCatalog::parse(
        "# itemType worldIndex roomIndex x,y,z\n\
         chest 2 0 1,2,3\n\
         shrine 4 1 -10,0,5\n\
         chest 4 2 0,0,0\n",
        WORLD_COUNT,
    )
    .unwrap()
}

/// Record a frame that only clears the presentation image.
pub fn record_clear(slot: &mut FrameSlot) -> Result<(), GraphicsError> {
    let Some(present) = slot.present_target().cloned() else {
        return Err(GraphicsError::Internal("no present image".into()));
    };
    let (arena, states) = slot.recording_parts();
    let mut graph = RenderGraph::new();
    graph.add_pass(
        GraphicsPass::new("clear").with_color(&present, LoadOp::Clear([0.0, 0.0, 0.0, 1.0])),
    );
    graph.transition_after(&present, ResourceState::Present);
    let mut recorder = arena.begin()?;
    graph.compile(states, &mut recorder)?;
    Ok(())
}

/// Byte pattern `0, 1, ..., 255, 0, ...` of length `len`.
pub fn test_pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}
