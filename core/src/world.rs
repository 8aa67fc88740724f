//! The fixed catalog of worlds the viewer loads.

use std::path::{Path, PathBuf};

/// World names in load order. Key `'1'` selects the first.
pub const WORLD_NAMES: [&str; 7] = [
    "IntroWorld",
    "RuinsWorld",
    "IceWorld",
    "OverWorld",
    "MinesWorld",
    "LavaWorld",
    "CraterWorld",
];

/// Number of worlds in the default catalog.
pub const WORLD_COUNT: usize = WORLD_NAMES.len();

/// Mesh file extensions tried, in order, for each world.
pub const WORLD_EXTENSIONS: [&str; 2] = ["glb", "gltf"];

/// Index of a loaded world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct WorldId(u32);

impl WorldId {
    /// Create an id from a 0-based index.
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// The 0-based index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for WorldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "world#{}", self.0)
    }
}

/// Names and file locations of the worlds to load.
#[derive(Debug, Clone)]
pub struct WorldCatalog {
    data_dir: PathBuf,
    names: Vec<String>,
}

impl WorldCatalog {
    /// The seven default worlds under `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self::with_names(data_dir, WORLD_NAMES.iter().map(|name| name.to_string()))
    }

    /// A custom list of worlds under `data_dir`.
    pub fn with_names(data_dir: impl Into<PathBuf>, names: impl IntoIterator<Item = String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            names: names.into_iter().collect(),
        }
    }

    /// Directory holding the world files.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Number of worlds.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate `(id, name)` pairs in load order.
    pub fn iter(&self) -> impl Iterator<Item = (WorldId, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(index, name)| (WorldId::new(index as u32), name.as_str()))
    }

    /// Name of a world.
    pub fn name(&self, id: WorldId) -> Option<&str> {
        self.names.get(id.index()).map(String::as_str)
    }

    /// Candidate mesh paths for a world, in preference order.
    pub fn mesh_candidates(&self, id: WorldId) -> Vec<PathBuf> {
        let Some(name) = self.name(id) else {
            return Vec::new();
        };
        WORLD_EXTENSIONS
            .iter()
            .map(|extension| self.data_dir.join(format!("{name}.{extension}")))
            .collect()
    }

    /// Path of the overlay metadata file.
    pub fn metadata_path(&self) -> PathBuf {
        self.data_dir.join("items.txt")
    }

    /// Path of the icon image for an item kind.
    pub fn icon_path(&self, kind: &str) -> PathBuf {
        self.data_dir.join("icons").join(format!("{kind}.png"))
    }
}
