//! The viewer session: input state, per-frame update and render.
//!
//! [`ViewerState`] is the only state input touches. [`Viewer`] owns the
//! frame loop and the renderer, and turns the state into one recorded
//! frame per call to [`Viewer::frame`].

use std::sync::Arc;
use std::time::Duration;

use mapview_core::camera::{CameraController, CameraPolicy, ViewState};
use mapview_core::input::{InputEvent, world_for_key};
use mapview_core::world::{WORLD_COUNT, WorldCatalog, WorldId};
use mapview_graphics::resize::DEFAULT_DEBOUNCE;
use mapview_graphics::{
    FrameInputs, FrameLoop, FrameLoopConfig, FrameState, GpuScene, GraphicsDevice, GraphicsError,
    ResizeManager, SceneRenderer, ShaderSet, ShaderSource, TextureFormat, UploadStager,
};

use crate::args::ViewerConfig;
use crate::assets::{SceneAssets, demo_assets, load_assets};
use crate::error::AppError;

/// World-space edge length of a marker quad.
pub const MARKER_SIZE: f32 = 24.0;

/// Key toggling the wire overlay.
pub const WIREFRAME_KEY: u8 = b'W';

/// The viewer's shader modules.
pub fn shader_set() -> ShaderSet {
    ShaderSet {
        base: ShaderSource::new("base", include_str!("../shaders/base.wgsl")),
        post: ShaderSource::new("post", include_str!("../shaders/post.wgsl")),
        overlay: ShaderSource::new("overlay", include_str!("../shaders/overlay.wgsl")),
    }
}

/// Load the scene named by `config`: generated worlds, or the data directory.
pub fn load_scene(config: &ViewerConfig) -> Result<SceneAssets, AppError> {
    if config.demo {
        log::info!("Using generated placeholder worlds");
        return Ok(demo_assets()?);
    }
    let worlds = WorldCatalog::new(&config.data_dir);
    log::info!("Loading worlds from {}", config.data_dir.display());
    Ok(load_assets(
        &worlds,
        &mapview_core::import::GltfImporter,
        &mapview_core::import::PngImporter,
    )?)
}

/// Camera, world selection and render toggles.
#[derive(Debug, Clone)]
pub struct ViewerState {
    /// Camera parameters.
    pub view: ViewState,
    /// World drawn by the next frame.
    pub world: WorldId,
    /// Whether the wire overlay is drawn.
    pub wireframe: bool,
    camera: CameraController,
    world_count: usize,
}

impl ViewerState {
    /// State for `world_count` worlds, showing `world` first.
    pub fn new(world: WorldId, world_count: usize, policy: CameraPolicy) -> Self {
        Self {
            view: ViewState::default(),
            world,
            wireframe: false,
            camera: CameraController::new(policy),
            world_count,
        }
    }

    /// Apply one input event. Returns `true` if the next frame changes.
    ///
    /// The wire overlay only toggles when `wireframe_supported`.
    pub fn handle_input(&mut self, event: &InputEvent, wireframe_supported: bool) -> bool {
        match *event {
            InputEvent::KeyDown { code } => {
                if let Some(index) = world_for_key(code, self.world_count) {
                    let world = WorldId::new(index as u32);
                    if world == self.world {
                        return false;
                    }
                    log::info!("Selected world {}", index + 1);
                    self.world = world;
                    true
                } else if code == WIREFRAME_KEY {
                    if !wireframe_supported {
                        log::warn!("Wireframe overlay is not supported by this device");
                        return false;
                    }
                    self.wireframe = !self.wireframe;
                    log::debug!("Wireframe overlay {}", if self.wireframe { "on" } else { "off" });
                    true
                } else {
                    false
                }
            }
            _ => self.camera.handle(&mut self.view, event),
        }
    }

    /// What the renderer draws this frame.
    pub fn frame_inputs(&self) -> FrameInputs {
        FrameInputs {
            world: self.world,
            wireframe: self.wireframe,
        }
    }
}

/// A running viewer session.
#[derive(Debug)]
pub struct Viewer {
    // Declared first: dropping the loop drains the GPU before the renderer's
    // resources go.
    frame_loop: FrameLoop,
    renderer: SceneRenderer,
    resize: ResizeManager,
    state: ViewerState,
    max_frames: Option<u64>,
    frames_rendered: u64,
}

impl Viewer {
    /// Create the frame loop, upload `assets` and build the renderer.
    ///
    /// Returns once the upload has completed on the GPU.
    pub fn new(
        device: Arc<GraphicsDevice>,
        config: &ViewerConfig,
        assets: SceneAssets,
        surface_format: TextureFormat,
        size: (u32, u32),
    ) -> Result<Self, AppError> {
        if !(2..=3).contains(&config.frames_in_flight) {
            return Err(AppError::Config(format!(
                "{} frames in flight requested, expected 2 or 3",
                config.frames_in_flight
            )));
        }
        let world_count = assets.pool.table().world_count();
        if config.initial_world.index() >= world_count {
            return Err(AppError::Config(format!(
                "world {} requested but only {world_count} loaded",
                config.initial_world.index() + 1
            )));
        }

        let (width, height) = (size.0.max(1), size.1.max(1));
        let loop_config = FrameLoopConfig::default()
            .with_frames_in_flight(config.frames_in_flight)
            .with_hang_threshold(config.hang_timeout)
            .with_present_mode(config.present_mode())
            .with_surface_format(surface_format);
        let mut frame_loop = FrameLoop::new(Arc::clone(&device), &loop_config, width, height)?;

        let mut stager = UploadStager::new(Arc::clone(&device));
        let (scene, ticket) = GpuScene::upload(
            &device,
            &mut stager,
            frame_loop.gate_mut(),
            assets.pool,
            &assets.catalog,
            &assets.icons,
        )?;
        ticket.wait(frame_loop.gate_mut())?;
        log::info!(
            "Uploaded {} bytes in {} copies",
            ticket.bytes,
            ticket.uploads
        );

        let renderer = SceneRenderer::new(
            device,
            &shader_set(),
            frame_loop.frames(),
            surface_format,
            scene,
        )?;

        let mut state = ViewerState::new(config.initial_world, world_count, CameraPolicy::default());
        if config.wireframe {
            if renderer.supports_wireframe() {
                state.wireframe = true;
            } else {
                log::warn!("Wireframe overlay requested but not supported by this device");
            }
        }

        Ok(Self {
            frame_loop,
            renderer,
            resize: ResizeManager::new(size, DEFAULT_DEBOUNCE),
            state,
            max_frames: config.max_frames,
            frames_rendered: 0,
        })
    }

    /// Apply an input event between frames.
    pub fn handle_input(&mut self, event: &InputEvent) -> bool {
        let supported = self.renderer.supports_wireframe();
        self.state.handle_input(event, supported)
    }

    /// Record a window size change. Applied by a later [`frame`](Self::frame).
    pub fn on_resize_event(&mut self, width: u32, height: u32) {
        self.resize.on_resize_event(width, height);
    }

    /// Time until a pending resize may be applied.
    pub fn resize_pending_for(&self) -> Option<Duration> {
        self.resize.remaining_debounce()
    }

    /// Update and render one frame.
    ///
    /// Returns `false` without rendering while the window is minimised, or
    /// when the surface could not hand out an image. An outdated or lost
    /// surface is reconfigured before returning.
    pub fn frame(&mut self) -> Result<bool, AppError> {
        if let Some(event) = self.resize.update() {
            self.apply_resize(event.width, event.height)?;
        }
        if !self.resize.can_render() {
            return Ok(false);
        }

        let (width, height) = self.resize.current_size();
        let constants = self.state.view.constants(width, height, MARKER_SIZE);
        let inputs = self.state.frame_inputs();
        let renderer = &self.renderer;
        let result = self.frame_loop.render(|slot| {
            renderer.write_constants(slot, &constants)?;
            renderer.record_frame(slot, &inputs)
        });
        let stats = match result {
            Ok(stats) => stats,
            Err(error)
                if error.is_frame_skippable() && self.frame_loop.state() == FrameState::Idle =>
            {
                self.recover_surface(&error)?;
                return Ok(false);
            }
            Err(error) => return Err(error.into()),
        };
        self.frames_rendered += 1;
        log::trace!("Frame {}: {stats:?}", self.frames_rendered);
        Ok(true)
    }

    /// Skip a frame the surface refused. Outdated and lost surfaces are
    /// reconfigured at the pending size, or the current one if none is
    /// pending.
    fn recover_surface(&mut self, error: &GraphicsError) -> Result<(), AppError> {
        if !error.needs_reconfigure() {
            log::debug!("Skipping frame: {error}");
            return Ok(());
        }
        log::info!("Reconfiguring surface: {error}");
        let (width, height) = match self.resize.force_resize() {
            Some(event) => (event.width, event.height),
            None => self.resize.current_size(),
        };
        if self.resize.can_render() {
            self.apply_resize(width, height)?;
        }
        Ok(())
    }

    fn apply_resize(&mut self, width: u32, height: u32) -> Result<(), AppError> {
        self.frame_loop.resize(width, height)?;
        self.renderer.rebuild_targets(self.frame_loop.frames())?;
        Ok(())
    }

    /// Whether the configured frame limit has been reached.
    pub fn finished(&self) -> bool {
        self.max_frames
            .is_some_and(|max| self.frames_rendered >= max)
    }

    /// Frames rendered so far.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// The input-driven state.
    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    /// The frame loop.
    pub fn frame_loop(&self) -> &FrameLoop {
        &self.frame_loop
    }

    /// The renderer.
    pub fn renderer(&self) -> &SceneRenderer {
        &self.renderer
    }

    /// Wait for the GPU to finish every frame, then release everything.
    pub fn shutdown(self) -> Result<(), AppError> {
        let Self {
            frame_loop,
            renderer,
            frames_rendered,
            ..
        } = self;
        frame_loop.shutdown()?;
        drop(renderer);
        log::info!("Viewer shut down after {frames_rendered} frames");
        Ok(())
    }
}

/// Run `config.max_frames` frames on the simulated device without a window.
pub fn run_headless(config: &ViewerConfig) -> Result<u64, AppError> {
    let Some(max_frames) = config.max_frames else {
        return Err(AppError::Config(
            "the dummy backend has no window; pass --max-frames".into(),
        ));
    };
    let assets = load_scene(config)?;
    let device = GraphicsDevice::dummy()?;
    log::info!("Running {max_frames} frames headless on {}", device.name());

    let mut viewer = Viewer::new(
        device,
        config,
        assets,
        TextureFormat::Rgba8Unorm,
        (config.width, config.height),
    )?;
    while !viewer.finished() {
        viewer.frame()?;
    }
    let frames = viewer.frames_rendered();
    viewer.shutdown()?;
    Ok(frames)
}
