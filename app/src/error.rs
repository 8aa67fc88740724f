//! Application error type.

use mapview_core::LoadError;
use mapview_graphics::GraphicsError;

/// Everything that can end a viewer session.
#[derive(Debug)]
pub enum AppError {
    /// Startup asset loading failed.
    Load(LoadError),
    /// A GPU operation failed. Always fatal.
    Graphics(GraphicsError),
    /// The event loop could not be created or run.
    EventLoop(winit::error::EventLoopError),
    /// The window could not be created.
    Window(winit::error::OsError),
    /// The command line asked for something this build cannot do.
    Config(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Load(e) => write!(f, "asset loading failed: {e}"),
            Self::Graphics(e) => write!(f, "graphics error: {e}"),
            Self::EventLoop(e) => write!(f, "event loop error: {e}"),
            Self::Window(e) => write!(f, "window creation failed: {e}"),
            Self::Config(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Load(e) => Some(e),
            Self::Graphics(e) => Some(e),
            Self::EventLoop(e) => Some(e),
            Self::Window(e) => Some(e),
            Self::Config(_) => None,
        }
    }
}

impl From<LoadError> for AppError {
    fn from(e: LoadError) -> Self {
        Self::Load(e)
    }
}

impl From<GraphicsError> for AppError {
    fn from(e: GraphicsError) -> Self {
        Self::Graphics(e)
    }
}

impl From<winit::error::EventLoopError> for AppError {
    fn from(e: winit::error::EventLoopError) -> Self {
        Self::EventLoop(e)
    }
}

impl From<winit::error::OsError> for AppError {
    fn from(e: winit::error::OsError) -> Self {
        Self::Window(e)
    }
}
