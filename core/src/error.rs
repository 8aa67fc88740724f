//! Error types for scene loading.

use std::path::PathBuf;

/// Errors raised while turning files on disk into scene data.
///
/// Load-time failures are fatal for the viewer: a world that cannot be read
/// or a metadata record that cannot be parsed stops startup with the location
/// of the offending input.
#[derive(Debug)]
pub enum LoadError {
    /// A file could not be read.
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The mesh importer rejected a file.
    Mesh {
        /// Path of the mesh file.
        path: PathBuf,
        /// Importer message.
        reason: String,
    },
    /// The image importer rejected a file.
    Image {
        /// Path of the image file.
        path: PathBuf,
        /// Importer message.
        reason: String,
    },
    /// A metadata record is malformed.
    Metadata {
        /// 1-based line number of the record.
        line: usize,
        /// What is wrong with it.
        reason: String,
    },
    /// Imported geometry violates the triangle-list contract.
    Geometry {
        /// Name of the world the geometry belongs to.
        world: String,
        /// Sub-mesh index within the world.
        submesh: usize,
        /// What is wrong with it.
        reason: String,
    },
}

impl LoadError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn metadata(line: usize, reason: impl Into<String>) -> Self {
        Self::Metadata {
            line,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to read {}: {source}", path.display()),
            Self::Mesh { path, reason } => {
                write!(f, "failed to import mesh {}: {reason}", path.display())
            }
            Self::Image { path, reason } => {
                write!(f, "failed to import image {}: {reason}", path.display())
            }
            Self::Metadata { line, reason } => write!(f, "metadata line {line}: {reason}"),
            Self::Geometry {
                world,
                submesh,
                reason,
            } => write!(f, "world '{world}' sub-mesh {submesh}: {reason}"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
