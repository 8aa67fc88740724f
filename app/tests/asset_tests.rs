//! Asset loading from a data directory.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use rstest::rstest;

use mapview_app::load_assets;
use mapview_core::LoadError;
use mapview_core::import::{ImageData, ImageImporter, MeshImporter};
use mapview_core::mesh::SubMesh;
use mapview_core::mesh::generators::generate_quad;
use mapview_core::world::{WorldCatalog, WorldId};

/// Returns one quad per file and remembers what was asked for.
#[derive(Default)]
struct StubImporter {
    requested: RefCell<Vec<PathBuf>>,
}

impl MeshImporter for StubImporter {
    fn import_mesh(&self, path: &Path) -> Result<Vec<SubMesh>, LoadError> {
        self.requested.borrow_mut().push(path.to_path_buf());
        Ok(vec![generate_quad(1.0, 1.0)])
    }
}

impl ImageImporter for StubImporter {
    fn import_image(&self, path: &Path) -> Result<ImageData, LoadError> {
        if !path.is_file() {
            return Err(LoadError::Image {
                path: path.to_path_buf(),
                reason: "missing".into(),
            });
        }
        self.requested.borrow_mut().push(path.to_path_buf());
        Ok(ImageData::solid(4, 4, [255, 0, 0, 255]))
    }
}

/// A fresh directory under the system temp dir, removed on drop.
struct DataDir(PathBuf);

impl DataDir {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!("mapview-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).unwrap();
        Self(path)
    }

    fn touch(&self, relative: &str) -> &Self {
        self.write(relative, "")
    }

    fn write(&self, relative: &str, contents: &str) -> &Self {
        let path = self.0.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
        self
    }

    fn catalog(&self) -> WorldCatalog {
        WorldCatalog::with_names(&self.0, ["Alpha".to_string(), "Beta".to_string()])
    }
}

impl Drop for DataDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

#[test]
fn test_gltf_fallback_and_no_metadata() {
    let dir = DataDir::new("fallback");
    dir.touch("Alpha.glb").touch("Beta.gltf");
    let importer = StubImporter::default();

    let assets = load_assets(&dir.catalog(), &importer, &importer).unwrap();
    assert_eq!(assets.pool.table().world_count(), 2);
    assert!(assets.catalog.items().is_empty());
    assert!(assets.icons.is_empty());
    let requested = importer.requested.borrow();
    assert!(requested[0].ends_with("Alpha.glb"));
    assert!(requested[1].ends_with("Beta.gltf"));
}

#[test]
fn test_missing_world_mesh_fails() {
    let dir = DataDir::new("missing");
    dir.touch("Alpha.glb");
    let importer = StubImporter::default();

    match load_assets(&dir.catalog(), &importer, &importer) {
        Err(LoadError::Io { path, source }) => {
            assert!(path.ends_with("Beta.glb"));
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("expected a missing mesh error, got {other:?}"),
    }
}

#[test]
fn test_markers_and_icons() {
    let dir = DataDir::new("markers");
    dir.touch("Alpha.glb")
        .touch("Beta.glb")
        .write(
            "items.txt",
            "# kind world room x,y,z\nchest 2 0 1,2,3\n\nshrine 1 4 0,0,0\nchest 1 1 5,5,5\n",
        )
        .touch("icons/chest.png")
        .touch("icons/shrine.png");
    let importer = StubImporter::default();

    let assets = load_assets(&dir.catalog(), &importer, &importer).unwrap();
    assert_eq!(assets.catalog.kinds(), ["chest", "shrine"]);
    assert_eq!(assets.icons.len(), 2);
    assert_eq!(assets.catalog.world_items(WorldId::new(0)).len(), 2);
    assert_eq!(assets.catalog.world_items(WorldId::new(1)).len(), 1);
    assert!(importer.requested.borrow().last().unwrap().ends_with("shrine.png"));
}

#[rstest]
#[case("chest 3 0 1,2,3\n", 1)]
#[case("# header\nchest 1 0 1,2\n", 2)]
#[case("chest 1 0 1,2,3\n\nshrine one 0 0,0,0\n", 3)]
fn test_bad_metadata_reports_line(#[case] metadata: &str, #[case] line: usize) {
    let dir = DataDir::new(&format!("metadata-{line}"));
    dir.touch("Alpha.glb").touch("Beta.glb").write("items.txt", metadata);
    let importer = StubImporter::default();

    match load_assets(&dir.catalog(), &importer, &importer) {
        Err(LoadError::Metadata { line: reported, .. }) => assert_eq!(reported, line),
        other => panic!("expected a metadata error, got {other:?}"),
    }
}

#[test]
fn test_missing_icon_with_icon_dir_fails() {
    let dir = DataDir::new("icons");
    dir.touch("Alpha.glb")
        .touch("Beta.glb")
        .write("items.txt", "chest 1 0 0,0,0\n")
        .touch("icons/other.png");
    let importer = StubImporter::default();

    assert!(matches!(
        load_assets(&dir.catalog(), &importer, &importer),
        Err(LoadError::Image { .. })
    ));
}
