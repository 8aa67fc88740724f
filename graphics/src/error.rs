//! Graphics error types.

use std::fmt;

use crate::frame_loop::FrameState;

/// Errors that can occur in the graphics system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// Failed to initialize the graphics system.
    InitializationFailed(String),
    /// Failed to create a resource.
    ResourceCreationFailed(String),
    /// A requested feature is not supported.
    FeatureNotSupported(String),
    /// Out of GPU memory.
    OutOfMemory(String),
    /// The GPU device was lost. Nothing submitted afterwards will complete.
    DeviceLost(String),
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// The device rejected recorded work (bad barrier, wrong resource state,
    /// CPU write into memory the GPU still reads).
    Validation(String),
    /// A frame-loop operation was called in the wrong phase.
    InvalidFrameState {
        /// The operation that was attempted.
        operation: &'static str,
        /// The phase the loop was in.
        state: FrameState,
    },
    /// A command arena was reset while the GPU still held its commands.
    ArenaInFlight(String),
    /// The presentation surface failed.
    Surface(String),
    /// The surface no longer matches the window and must be reconfigured.
    SurfaceOutdated,
    /// The surface was lost and must be reconfigured.
    SurfaceLost,
    /// No presentation image became available in time.
    SurfaceTimeout,
    /// An internal error occurred.
    Internal(String),
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitializationFailed(msg) => write!(f, "initialization failed: {msg}"),
            Self::ResourceCreationFailed(msg) => write!(f, "resource creation failed: {msg}"),
            Self::FeatureNotSupported(msg) => write!(f, "feature not supported: {msg}"),
            Self::OutOfMemory(msg) => write!(f, "out of GPU memory: {msg}"),
            Self::DeviceLost(msg) => write!(f, "GPU device lost: {msg}"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::Validation(msg) => write!(f, "validation error: {msg}"),
            Self::InvalidFrameState { operation, state } => {
                write!(f, "cannot {operation} while the frame is {state:?}")
            }
            Self::ArenaInFlight(label) => {
                write!(f, "command arena '{label}' is still in use by the GPU")
            }
            Self::Surface(msg) => write!(f, "surface error: {msg}"),
            Self::SurfaceOutdated => write!(f, "surface outdated, needs reconfiguration"),
            Self::SurfaceLost => write!(f, "surface lost, needs reconfiguration"),
            Self::SurfaceTimeout => write!(f, "timed out acquiring a surface image"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for GraphicsError {}

impl GraphicsError {
    /// Whether the device can no longer make progress.
    pub fn is_device_lost(&self) -> bool {
        matches!(self, Self::DeviceLost(_))
    }

    /// Whether the surface must be reconfigured before the next frame.
    pub fn needs_reconfigure(&self) -> bool {
        matches!(self, Self::SurfaceOutdated | Self::SurfaceLost)
    }

    /// Whether the frame can be skipped and the session continue.
    pub fn is_frame_skippable(&self) -> bool {
        self.needs_reconfigure() || matches!(self, Self::SurfaceTimeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::OutOfMemory("256 MiB heap".to_string());
        assert_eq!(err.to_string(), "out of GPU memory: 256 MiB heap");

        let err = GraphicsError::InitializationFailed("no GPU found".to_string());
        assert_eq!(err.to_string(), "initialization failed: no GPU found");
    }

    #[test]
    fn test_frame_state_display() {
        let err = GraphicsError::InvalidFrameState {
            operation: "present",
            state: FrameState::Recording,
        };
        assert_eq!(err.to_string(), "cannot present while the frame is Recording");
        assert!(!err.is_device_lost());
        assert!(GraphicsError::DeviceLost("hang".into()).is_device_lost());
    }

    #[test]
    fn test_surface_errors_are_recoverable() {
        assert!(GraphicsError::SurfaceOutdated.needs_reconfigure());
        assert!(GraphicsError::SurfaceLost.needs_reconfigure());
        assert!(!GraphicsError::SurfaceTimeout.needs_reconfigure());
        assert!(GraphicsError::SurfaceTimeout.is_frame_skippable());
        assert!(!GraphicsError::Surface("gone".into()).is_frame_skippable());
        assert!(!GraphicsError::DeviceLost("reset".into()).is_frame_skippable());
    }
}
