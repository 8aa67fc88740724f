//! Viewer sessions on the simulated backend.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rstest::{fixture, rstest};

use mapview_app::{AppError, Viewer, ViewerConfig, demo_assets, run_headless};
use mapview_core::input::{InputEvent, MouseButtons};
use mapview_core::world::WorldId;
use mapview_graphics::backend::BackendKind;
use mapview_graphics::backend::dummy::DummyBackend;
use mapview_graphics::{GraphicsDevice, GraphicsError, TextureFormat};

struct Session {
    backend: Arc<DummyBackend>,
    viewer: Viewer,
}

fn session(config: &ViewerConfig) -> Session {
    let _ = env_logger::builder().is_test(true).try_init();
    let backend = Arc::new(DummyBackend::new().unwrap());
    let device = GraphicsDevice::new(backend.clone());
    let viewer = Viewer::new(
        device,
        config,
        demo_assets().unwrap(),
        TextureFormat::Rgba8Unorm,
        (config.width, config.height),
    )
    .unwrap();
    Session { backend, viewer }
}

#[fixture]
fn config() -> ViewerConfig {
    ViewerConfig::default()
        .with_size(64, 48)
        .with_backend(BackendKind::Dummy)
        .with_demo()
}

fn base_draws(backend: &DummyBackend) -> usize {
    let records = backend.take_records();
    let frame = records.last().unwrap();
    frame
        .passes
        .iter()
        .find(|pass| pass.label == "base")
        .unwrap()
        .draws
        .len()
}

#[rstest]
#[case(2)]
#[case(3)]
fn test_frames_render_and_present(config: ViewerConfig, #[case] frames_in_flight: usize) {
    let Session { backend, mut viewer } =
        session(&config.with_frames_in_flight(frames_in_flight).with_max_frames(6));
    while !viewer.finished() {
        assert!(viewer.frame().unwrap());
    }
    assert_eq!(viewer.frames_rendered(), 6);
    viewer.shutdown().unwrap();
    assert_eq!(backend.presents(), 6);
    assert!(backend.lost_reason().is_none());
}

#[rstest]
fn test_world_key_changes_recorded_draws(config: ViewerConfig) {
    let Session { backend, mut viewer } = session(&config);
    viewer.frame().unwrap();
    // Demo world n has a floor and n + 1 spheres.
    assert_eq!(base_draws(&backend), 2);

    assert!(viewer.handle_input(&InputEvent::KeyDown { code: b'4' }));
    viewer.frame().unwrap();
    assert_eq!(viewer.state().world, WorldId::new(3));
    assert_eq!(base_draws(&backend), 5);

    // Wireframe repeats every draw with the line pipeline.
    assert!(viewer.handle_input(&InputEvent::KeyDown { code: b'W' }));
    viewer.frame().unwrap();
    assert_eq!(base_draws(&backend), 10);
    viewer.shutdown().unwrap();
}

#[rstest]
fn test_camera_input_between_frames(config: ViewerConfig) {
    let Session { mut viewer, .. } = session(&config);
    let drag = |x| InputEvent::MouseMove {
        x,
        y: 0,
        buttons: MouseButtons::LEFT,
        ctrl: false,
    };
    viewer.handle_input(&drag(50));
    viewer.frame().unwrap();
    assert!(viewer.handle_input(&drag(20)));
    assert_eq!(viewer.state().view.yaw, 30.0);
    assert!(viewer.handle_input(&InputEvent::MouseWheel { delta: -120 }));
    assert_eq!(viewer.state().view.field_of_view, 47.0);
    viewer.frame().unwrap();
    viewer.shutdown().unwrap();
}

#[rstest]
fn test_resize_rebuilds_targets(config: ViewerConfig) {
    let Session { backend, mut viewer } = session(&config);
    viewer.frame().unwrap();

    viewer.on_resize_event(100, 80);
    thread::sleep(Duration::from_millis(80));
    assert!(viewer.frame().unwrap());
    assert_eq!(viewer.frame_loop().frames().size(), (100, 80));
    assert_eq!(viewer.frame_loop().surface().width(), 100);

    viewer.frame().unwrap();
    viewer.shutdown().unwrap();
    assert!(backend.lost_reason().is_none());
}

#[rstest]
#[case::outdated(GraphicsError::SurfaceOutdated)]
#[case::lost(GraphicsError::SurfaceLost)]
fn test_stale_surface_applies_pending_resize(config: ViewerConfig, #[case] error: GraphicsError) {
    let Session { backend, mut viewer } = session(&config);
    assert!(viewer.frame().unwrap());

    // Still inside the debounce window when the surface goes stale.
    viewer.on_resize_event(100, 80);
    backend.fail_next_acquire(error);
    assert!(!viewer.frame().unwrap());
    assert_eq!(viewer.frames_rendered(), 1);
    assert_eq!(viewer.frame_loop().frames().size(), (100, 80));
    assert_eq!(viewer.frame_loop().surface().width(), 100);
    assert_eq!(viewer.resize_pending_for(), None);

    assert!(viewer.frame().unwrap());
    assert!(viewer.frame().unwrap());
    viewer.shutdown().unwrap();
    assert_eq!(backend.presents(), 3);
    assert!(backend.lost_reason().is_none());
}

#[rstest]
fn test_stale_surface_without_resize_reconfigures_in_place(config: ViewerConfig) {
    let Session { backend, mut viewer } = session(&config);
    backend.fail_next_acquire(GraphicsError::SurfaceOutdated);
    assert!(!viewer.frame().unwrap());
    assert_eq!(viewer.frame_loop().frames().size(), (64, 48));
    assert!(viewer.frame().unwrap());
    viewer.shutdown().unwrap();
    assert!(backend.lost_reason().is_none());
}

#[rstest]
fn test_acquire_timeout_skips_frame(config: ViewerConfig) {
    let Session { backend, mut viewer } = session(&config);
    backend.fail_next_acquire(GraphicsError::SurfaceTimeout);
    assert!(!viewer.frame().unwrap());
    assert_eq!(viewer.frames_rendered(), 0);
    assert!(viewer.frame().unwrap());
    viewer.shutdown().unwrap();
    assert_eq!(backend.presents(), 1);
}

#[rstest]
fn test_other_surface_errors_are_fatal(config: ViewerConfig) {
    let Session { backend, mut viewer } = session(&config);
    backend.fail_next_acquire(GraphicsError::Surface("window destroyed".into()));
    let err = viewer.frame().unwrap_err();
    assert!(matches!(err, AppError::Graphics(GraphicsError::Surface(_))), "{err:?}");
    viewer.shutdown().unwrap();
}

#[rstest]
fn test_minimised_window_skips_frames(config: ViewerConfig) {
    let Session { backend, mut viewer } = session(&config);
    viewer.on_resize_event(0, 0);
    assert!(!viewer.frame().unwrap());
    assert_eq!(viewer.frames_rendered(), 0);

    viewer.on_resize_event(64, 48);
    assert!(viewer.frame().unwrap());
    viewer.shutdown().unwrap();
    assert_eq!(backend.presents(), 1);
}

#[rstest]
fn test_wireframe_flag_starts_enabled(config: ViewerConfig) {
    let mut config = config;
    config.wireframe = true;
    let Session { viewer, .. } = session(&config);
    assert!(viewer.state().wireframe);
    viewer.shutdown().unwrap();
}

#[rstest]
fn test_invalid_frames_in_flight_rejected(config: ViewerConfig) {
    let device = GraphicsDevice::dummy().unwrap();
    let result = Viewer::new(
        device,
        &config.with_frames_in_flight(4),
        demo_assets().unwrap(),
        TextureFormat::Rgba8Unorm,
        (64, 48),
    );
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[rstest]
fn test_headless_run_needs_frame_limit(config: ViewerConfig) {
    assert!(matches!(run_headless(&config), Err(AppError::Config(_))));
    assert_eq!(run_headless(&config.with_max_frames(3)).unwrap(), 3);
}
