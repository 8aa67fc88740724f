//! The viewer's three-pass frame.
//!
//! ```text
//! base     world geometry  -> color, normal, depth   (optional wire overlay)
//! post     color + normal  -> presentation image     (full-screen triangle)
//! overlay  marker quads    -> presentation image     (alpha blended, skipped
//!                                                     when the world has none)
//! ```
//!
//! [`SceneRenderer`] holds the pipelines, the scene and one set of bind
//! groups per frame slot. It only records; the [`FrameLoop`](crate::FrameLoop)
//! owns pacing, submission and presentation.

mod pipelines;
mod scene;

pub use pipelines::{
    ScenePipelines, ShaderSet, marker_instance_layout, mesh_vertex_layout, overlay_layout,
    post_layout, quad_vertex_layout, scene_layout,
};
pub use scene::{GpuGeometry, GpuOverlay, GpuScene, QUAD_INDEX_COUNT};

use std::sync::Arc;

use mapview_core::camera::SceneConstants;
use mapview_core::geometry::DrawEntry;
use mapview_core::world::WorldId;

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::frame::{FrameSet, FrameSlot};
use crate::graph::{GraphStats, GraphicsPass, RenderGraph};
use crate::resources::BindGroup;
use crate::state::ResourceState;
use crate::types::{BindGroupDescriptor, LoadOp, SamplerDescriptor, TextureFormat};

/// Clear color of the intermediate color target.
pub const CLEAR_COLOR: [f32; 4] = [0.1, 0.1, 0.1, 1.0];

/// What to draw this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInputs {
    /// The world whose draws are recorded.
    pub world: WorldId,
    /// Draw the wire overlay over the filled geometry.
    pub wireframe: bool,
}

#[derive(Debug)]
struct SlotBindings {
    scene: Arc<BindGroup>,
    post: Arc<BindGroup>,
    overlay: Arc<BindGroup>,
}

/// Records the base, post and overlay passes into a frame slot.
#[derive(Debug)]
pub struct SceneRenderer {
    device: Arc<GraphicsDevice>,
    pipelines: ScenePipelines,
    scene: GpuScene,
    bindings: Vec<SlotBindings>,
}

impl SceneRenderer {
    /// Create pipelines and per-slot bindings for `frames`.
    pub fn new(
        device: Arc<GraphicsDevice>,
        shaders: &ShaderSet,
        frames: &FrameSet,
        surface_format: TextureFormat,
        scene: GpuScene,
    ) -> Result<Self, GraphicsError> {
        let pipelines = ScenePipelines::new(&device, shaders, frames.formats(), surface_format)?;
        let mut renderer = Self {
            device,
            pipelines,
            scene,
            bindings: Vec::new(),
        };
        renderer.rebuild_targets(frames)?;
        Ok(renderer)
    }

    /// Recreate the per-slot bindings.
    ///
    /// Bindings reference the slots' targets, so this must follow every
    /// [`FrameLoop::resize`](crate::FrameLoop::resize).
    pub fn rebuild_targets(&mut self, frames: &FrameSet) -> Result<(), GraphicsError> {
        let bindings = frames
            .iter()
            .map(|slot| self.slot_bindings(slot))
            .collect::<Result<Vec<_>, _>>()?;
        self.bindings = bindings;
        log::debug!("SceneRenderer: bindings for {} slots", self.bindings.len());
        Ok(())
    }

    fn slot_bindings(&self, slot: &FrameSlot) -> Result<SlotBindings, GraphicsError> {
        let label = |name: &str| format!("{name} (slot {})", slot.index());
        let scene = self.device.create_bind_group(
            BindGroupDescriptor::new(scene_layout())
                .with_label(label("scene"))
                .with_buffer(0, slot.constants()),
        )?;
        let targets = slot.targets();
        let post = self.device.create_bind_group(
            BindGroupDescriptor::new(post_layout())
                .with_label(label("post inputs"))
                .with_texture(0, &targets.color)
                .with_texture(1, &targets.normal)
                .with_sampler(2, SamplerDescriptor::linear()),
        )?;
        let overlay = self.device.create_bind_group(
            BindGroupDescriptor::new(overlay_layout())
                .with_label(label("overlay"))
                .with_buffer(0, slot.constants())
                .with_texture(1, &self.scene.overlay.icons)
                .with_sampler(2, SamplerDescriptor::linear()),
        )?;
        Ok(SlotBindings {
            scene,
            post,
            overlay,
        })
    }

    /// The uploaded scene.
    pub fn scene(&self) -> &GpuScene {
        &self.scene
    }

    /// The pipelines.
    pub fn pipelines(&self) -> &ScenePipelines {
        &self.pipelines
    }

    /// Whether the wire overlay can be drawn on this device.
    pub fn supports_wireframe(&self) -> bool {
        self.pipelines.wire.is_some()
    }

    /// Fill the slot's constant buffer.
    ///
    /// Only valid between [`FrameLoop::begin_frame`](crate::FrameLoop::begin_frame)
    /// and submission, when the slot's previous frame has retired.
    pub fn write_constants(
        &self,
        slot: &FrameSlot,
        constants: &SceneConstants,
    ) -> Result<(), GraphicsError> {
        self.device
            .write_buffer(slot.constants(), 0, bytemuck::bytes_of(constants))
    }

    /// Record the frame for `inputs.world` into the slot's arena.
    pub fn record_frame(
        &self,
        slot: &mut FrameSlot,
        inputs: &FrameInputs,
    ) -> Result<GraphStats, GraphicsError> {
        let bindings = self.bindings.get(slot.index()).ok_or_else(|| {
            GraphicsError::Internal(format!("no bindings for slot {}", slot.index()))
        })?;
        let Some(present) = slot.present_target().cloned() else {
            return Err(GraphicsError::Surface(format!(
                "slot {} has no presentation image",
                slot.index()
            )));
        };
        let color = Arc::clone(&slot.targets().color);
        let normal = Arc::clone(&slot.targets().normal);
        let depth = Arc::clone(&slot.targets().depth);

        let geometry = &self.scene.geometry;
        let overlay = &self.scene.overlay;
        let draws = geometry.table.draws(inputs.world);
        let markers = overlay.instance_range(inputs.world);

        let mut graph = RenderGraph::new();
        graph.transition_before(&present, ResourceState::RenderTarget);

        let mut base = GraphicsPass::new("base")
            .with_color(&color, LoadOp::Clear(CLEAR_COLOR))
            .with_color(&normal, LoadOp::Clear([0.0; 4]))
            .with_depth(&depth, LoadOp::Clear(1.0));
        {
            let mut rec = base.record();
            rec.set_pipeline(&self.pipelines.base);
            rec.set_bind_group(0, &bindings.scene);
            rec.set_vertex_buffer(0, &geometry.vertices);
            rec.set_index_buffer(&geometry.indices);
            for draw in draws {
                rec.draw_indexed(draw.index_count, draw.index_start, base_vertex(draw)?);
            }
            if inputs.wireframe
                && let Some(wire) = &self.pipelines.wire
            {
                rec.set_pipeline(wire);
                for draw in draws {
                    rec.draw_indexed(draw.index_count, draw.index_start, base_vertex(draw)?);
                }
            }
        }
        graph.add_pass(base);

        let mut post = GraphicsPass::new("post")
            .with_color(&present, LoadOp::Clear([0.0, 0.0, 0.0, 1.0]))
            .with_read(&color)
            .with_read(&normal);
        {
            let mut rec = post.record();
            rec.set_pipeline(&self.pipelines.post);
            rec.set_bind_group(0, &bindings.post);
            rec.draw(3, 1);
        }
        graph.add_pass(post);

        if !markers.is_empty() {
            let mut marks = GraphicsPass::new("overlay").with_color(&present, LoadOp::Load);
            {
                let mut rec = marks.record();
                rec.set_pipeline(&self.pipelines.overlay);
                rec.set_bind_group(0, &bindings.overlay);
                rec.set_vertex_buffer(0, &overlay.quad_vertices);
                rec.set_vertex_buffer(1, &overlay.instances);
                rec.set_index_buffer(&overlay.quad_indices);
                rec.draw_indexed_instanced(
                    QUAD_INDEX_COUNT,
                    0,
                    0,
                    markers.end - markers.start,
                    markers.start,
                );
            }
            graph.add_pass(marks);
        }

        graph.transition_after(&present, ResourceState::Present);

        let (arena, states) = slot.recording_parts();
        let mut recorder = arena.begin()?;
        let stats = graph.compile(states, &mut recorder)?;
        log::trace!(
            "SceneRenderer: world {} recorded {} draws, {} markers",
            inputs.world,
            stats.draws,
            markers.len()
        );
        Ok(stats)
    }
}

fn base_vertex(draw: &DrawEntry) -> Result<i32, GraphicsError> {
    draw.base_vertex().ok_or_else(|| {
        GraphicsError::InvalidParameter(format!(
            "base vertex {} does not fit an indexed draw",
            draw.vertex_start
        ))
    })
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::frame_loop::{FrameLoop, FrameLoopConfig};
    use crate::types::ShaderSource;
    use crate::upload::UploadStager;
    use mapview_core::camera::ViewState;
    use mapview_core::geometry::GeometryPool;
    use mapview_core::mesh::generators::{generate_grid, generate_quad};
    use mapview_core::overlay::OverlayCatalog;

    fn shaders() -> ShaderSet {
        ShaderSet {
            base: ShaderSource::new("base", ""),
            post: ShaderSource::new("post", ""),
            overlay: ShaderSource::new("overlay", ""),
        }
    }

    fn setup(backend: &Arc<DummyBackend>) -> (FrameLoop, SceneRenderer) {
        let device = GraphicsDevice::new(backend.clone());
        let mut fl = FrameLoop::new(device.clone(), &FrameLoopConfig::default(), 16, 16).unwrap();

        let mut builder = GeometryPool::builder();
        builder.push_world("A", &[generate_quad(1.0, 1.0)]).unwrap();
        builder
            .push_world("B", &[generate_grid(2, 2, 4.0), generate_quad(1.0, 1.0)])
            .unwrap();
        let catalog = OverlayCatalog::parse("chest 2 0 1,2,3\nkey 2 0 4,5,6\n", 2).unwrap();

        let mut stager = UploadStager::new(device.clone());
        let (scene, ticket) =
            GpuScene::upload(&device, &mut stager, fl.gate_mut(), builder.build(), &catalog, &[])
                .unwrap();
        ticket.wait(fl.gate_mut()).unwrap();

        let renderer = SceneRenderer::new(
            device,
            &shaders(),
            fl.frames(),
            FrameLoopConfig::default().surface_format,
            scene,
        )
        .unwrap();
        backend.take_records();
        (fl, renderer)
    }

    fn render(fl: &mut FrameLoop, renderer: &SceneRenderer, inputs: FrameInputs) -> GraphStats {
        let constants = ViewState::default().constants(16, 16, 32.0);
        fl.render(|slot| {
            renderer.write_constants(slot, &constants)?;
            renderer.record_frame(slot, &inputs)
        })
        .unwrap()
    }

    #[test]
    fn test_base_vertex_out_of_range_is_rejected() {
        let draw = DrawEntry {
            index_start: 0,
            vertex_start: u32::MAX,
            index_count: 3,
        };
        assert!(matches!(base_vertex(&draw), Err(GraphicsError::InvalidParameter(_))));
        let draw = DrawEntry {
            vertex_start: 12,
            ..draw
        };
        assert_eq!(base_vertex(&draw).unwrap(), 12);
    }

    #[test]
    fn test_world_with_markers() {
        let backend = Arc::new(DummyBackend::new().unwrap());
        let (mut fl, renderer) = setup(&backend);
        let stats = render(
            &mut fl,
            &renderer,
            FrameInputs {
                world: WorldId::new(1),
                wireframe: false,
            },
        );
        assert_eq!(stats.passes, 3);
        assert_eq!(stats.draws, 4);
        fl.shutdown().unwrap();

        let records = backend.take_records();
        let frame = records.last().unwrap();
        let labels: Vec<&str> = frame.passes.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, ["base", "post", "overlay"]);
        let base = &frame.passes[0].draws;
        assert_eq!(base.len(), 2);
        assert_eq!(base[0].first, 6);
        assert_eq!(base[0].base_vertex, 4);
        let marker = &frame.passes[2].draws[0];
        assert_eq!(marker.instance_count, 2);
        assert_eq!(marker.first_instance, 0);
        assert!(backend.lost_reason().is_none());
    }

    #[test]
    fn test_overlay_skipped_without_markers() {
        let backend = Arc::new(DummyBackend::new().unwrap());
        let (mut fl, renderer) = setup(&backend);
        let stats = render(
            &mut fl,
            &renderer,
            FrameInputs {
                world: WorldId::new(0),
                wireframe: false,
            },
        );
        assert_eq!(stats.passes, 2);
        assert_eq!(stats.draws, 2);
        fl.shutdown().unwrap();
    }

    #[test]
    fn test_wireframe_repeats_draws() {
        let backend = Arc::new(DummyBackend::new().unwrap());
        let (mut fl, renderer) = setup(&backend);
        assert!(renderer.supports_wireframe());
        let stats = render(
            &mut fl,
            &renderer,
            FrameInputs {
                world: WorldId::new(1),
                wireframe: true,
            },
        );
        assert_eq!(stats.draws, 6);
        fl.shutdown().unwrap();

        let records = backend.take_records();
        let base = &records.last().unwrap().passes[0];
        assert_eq!(base.draws[2].pipeline, "wire");
    }

    #[test]
    fn test_resize_rebuilds_bindings() {
        let backend = Arc::new(DummyBackend::new().unwrap());
        let (mut fl, mut renderer) = setup(&backend);
        let inputs = FrameInputs {
            world: WorldId::new(1),
            wireframe: false,
        };
        render(&mut fl, &renderer, inputs);
        fl.resize(32, 24).unwrap();
        renderer.rebuild_targets(fl.frames()).unwrap();
        for _ in 0..3 {
            render(&mut fl, &renderer, inputs);
        }
        fl.shutdown().unwrap();
        assert!(backend.lost_reason().is_none());
    }
}
