//! Command line arguments and the viewer configuration they map into.
//!
//! Uses clap for CLI parsing with:
//! - Help text (`--help`)
//! - Validation and clear error messages
//! - Defaults matching the fixed viewer window

use std::path::PathBuf;
use std::time::Duration;

use mapview_core::world::{WORLD_COUNT, WorldId};
use mapview_graphics::PresentMode;
use mapview_graphics::backend::BackendKind;

/// Default window title.
pub const DEFAULT_TITLE: &str = "MP - Interactive Map";

/// Settings of one viewer session.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    /// Initial window width in physical pixels.
    pub width: u32,
    /// Initial window height in physical pixels.
    pub height: u32,
    /// Window title.
    pub title: String,
    /// Directory holding world meshes, `items.txt` and `icons/`.
    pub data_dir: PathBuf,
    /// Generate placeholder worlds instead of reading `data_dir`.
    pub demo: bool,
    /// Frame slots in flight (2 or 3).
    pub frames_in_flight: usize,
    /// Which GPU backend to use.
    pub backend: BackendKind,
    /// Exit after this many rendered frames.
    pub max_frames: Option<u64>,
    /// Wait for vertical blank when presenting.
    pub vsync: bool,
    /// GPU waits longer than this log a hang warning.
    pub hang_timeout: Duration,
    /// World shown first.
    pub initial_world: WorldId,
    /// Start with the wire overlay enabled.
    pub wireframe: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: DEFAULT_TITLE.to_string(),
            data_dir: PathBuf::from("data"),
            demo: false,
            frames_in_flight: 2,
            backend: BackendKind::Auto,
            max_frames: None,
            vsync: true,
            hang_timeout: Duration::from_secs(2),
            initial_world: WorldId::new(0),
            wireframe: false,
        }
    }
}

impl ViewerConfig {
    /// Parse the process arguments.
    pub fn parse() -> Self {
        use clap::Parser;
        CliArgs::parse().into()
    }

    /// Set the window size.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the backend.
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Set the frame limit.
    pub fn with_max_frames(mut self, max_frames: u64) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    /// Set the number of frames in flight.
    pub fn with_frames_in_flight(mut self, count: usize) -> Self {
        self.frames_in_flight = count;
        self
    }

    /// Use generated placeholder worlds.
    pub fn with_demo(mut self) -> Self {
        self.demo = true;
        self
    }

    /// Presentation mode for the configured vsync setting.
    pub fn present_mode(&self) -> PresentMode {
        if self.vsync {
            PresentMode::Fifo
        } else {
            PresentMode::Immediate
        }
    }
}

/// Graphics backend selection for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CliBackend {
    /// wgpu when compiled in, otherwise the simulated device.
    #[default]
    Auto,
    /// Cross-platform backend via wgpu.
    Wgpu,
    /// Simulated device, runs headless (needs --max-frames).
    Dummy,
}

impl From<CliBackend> for BackendKind {
    fn from(cli: CliBackend) -> Self {
        match cli {
            CliBackend::Auto => BackendKind::Auto,
            CliBackend::Wgpu => BackendKind::Wgpu,
            CliBackend::Dummy => BackendKind::Dummy,
        }
    }
}

/// Interactive map viewer arguments.
///
/// # Examples
///
/// ```bash
/// # View the worlds under ./assets with triple buffering
/// mapview --data-dir assets --frames-in-flight 3
///
/// # Render 100 frames of generated worlds on the simulated device, then exit
/// mapview --backend dummy --demo --max-frames 100
/// ```
#[derive(clap::Parser, Debug)]
#[command(
    name = "mapview",
    about = "Interactive 3D map viewer",
    long_about = "Renders one of seven world meshes with a post-process pass and an icon overlay.\n\n\
        CONTROLS:\n\
          1..7          select world\n\
          W             toggle wireframe overlay\n\
          left drag     orbit\n\
          right drag    pan (hold Ctrl to move along depth)\n\
          wheel         zoom",
    version
)]
pub struct CliArgs {
    /// Initial window width in pixels.
    #[arg(long, default_value_t = 800)]
    pub width: u32,

    /// Initial window height in pixels.
    #[arg(long, default_value_t = 600)]
    pub height: u32,

    /// Window title.
    #[arg(long, default_value = DEFAULT_TITLE)]
    pub title: String,

    /// Directory with world meshes, items.txt and icons/.
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Generate placeholder worlds instead of reading --data-dir.
    #[arg(long)]
    pub demo: bool,

    /// Frames in flight.
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(2..=3))]
    pub frames_in_flight: u8,

    /// Graphics backend to use.
    #[arg(long, default_value = "auto", value_enum)]
    pub backend: CliBackend,

    /// Exit after rendering N frames (useful for testing).
    #[arg(long)]
    pub max_frames: Option<u64>,

    /// Disable vertical sync (may cause tearing).
    #[arg(long)]
    pub no_vsync: bool,

    /// Log a warning when a GPU wait exceeds this many milliseconds.
    #[arg(long, default_value_t = 2000)]
    pub hang_timeout_ms: u64,

    /// World shown first (1-based).
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=WORLD_COUNT as i64))]
    pub world: u32,

    /// Start with the wireframe overlay on.
    #[arg(long)]
    pub wireframe: bool,
}

impl From<CliArgs> for ViewerConfig {
    fn from(args: CliArgs) -> Self {
        Self {
            width: args.width,
            height: args.height,
            title: args.title,
            data_dir: args.data_dir,
            demo: args.demo,
            frames_in_flight: usize::from(args.frames_in_flight),
            backend: args.backend.into(),
            max_frames: args.max_frames,
            vsync: !args.no_vsync,
            hang_timeout: Duration::from_millis(args.hang_timeout_ms),
            initial_world: WorldId::new(args.world - 1),
            wireframe: args.wireframe,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults() {
        let config: ViewerConfig = CliArgs::parse_from(["mapview"]).into();
        assert_eq!(config, ViewerConfig::default());
    }

    #[test]
    fn test_world_is_one_based() {
        let config: ViewerConfig = CliArgs::parse_from(["mapview", "--world", "4"]).into();
        assert_eq!(config.initial_world, WorldId::new(3));
        assert!(CliArgs::try_parse_from(["mapview", "--world", "0"]).is_err());
        assert!(CliArgs::try_parse_from(["mapview", "--world", "8"]).is_err());
    }

    #[test]
    fn test_frames_in_flight_range() {
        let config: ViewerConfig =
            CliArgs::parse_from(["mapview", "--frames-in-flight", "3"]).into();
        assert_eq!(config.frames_in_flight, 3);
        assert!(CliArgs::try_parse_from(["mapview", "--frames-in-flight", "4"]).is_err());
        assert!(CliArgs::try_parse_from(["mapview", "--frames-in-flight", "1"]).is_err());
    }

    #[test]
    fn test_backend_and_vsync() {
        let config: ViewerConfig =
            CliArgs::parse_from(["mapview", "--backend", "dummy", "--no-vsync"]).into();
        assert_eq!(config.backend, BackendKind::Dummy);
        assert_eq!(config.present_mode(), PresentMode::Immediate);
    }
}
