//! # Map Viewer App
//!
//! The `mapview` executable: CLI parsing, asset loading, the winit event
//! loop and the [`Viewer`] that turns input into frames.
//!
//! ## Overview
//!
//! - [`ViewerConfig`] - session settings, parsed from the command line
//! - [`load_assets`] / [`demo_assets`] - CPU-side scene data
//! - [`Viewer`] - owns the frame loop and renderer, one frame per call
//! - [`App`] - the windowed event loop (wgpu)
//! - [`run`] - pick windowed or headless from the configured backend

#[cfg(feature = "wgpu")]
mod app;
mod args;
mod assets;
mod error;
pub mod input;
mod viewer;

#[cfg(feature = "wgpu")]
pub use app::App;
pub use args::{CliArgs, CliBackend, DEFAULT_TITLE, ViewerConfig};
pub use assets::{SceneAssets, demo_assets, load_assets};
pub use error::AppError;
pub use viewer::{MARKER_SIZE, Viewer, ViewerState, load_scene, run_headless, shader_set};

use mapview_graphics::backend::BackendKind;

/// App library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the app version.
pub fn init() {
    log::info!("Map Viewer App v{} initialized", VERSION);
}

/// Run a viewer session with `config`.
///
/// The dummy backend runs headless for `config.max_frames` frames; wgpu
/// opens a window.
pub fn run(config: ViewerConfig) -> Result<(), AppError> {
    let backend = config.backend.resolve();
    log::info!("Backend: {backend:?}");
    match backend {
        BackendKind::Dummy => run_headless(&config).map(|frames| {
            log::info!("Rendered {frames} frames");
        }),
        #[cfg(feature = "wgpu")]
        BackendKind::Wgpu | BackendKind::Auto => App::run(config),
        #[cfg(not(feature = "wgpu"))]
        BackendKind::Wgpu | BackendKind::Auto => Err(AppError::Config(
            "this build has no wgpu support; use --backend dummy".into(),
        )),
    }
}
