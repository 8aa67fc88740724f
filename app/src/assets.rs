//! Startup asset loading.
//!
//! Everything the viewer draws is read once, before the first frame: every
//! world's mesh, the marker metadata and the marker icons. Any failure stops
//! startup.

use std::path::Path;

use mapview_core::LoadError;
use mapview_core::geometry::GeometryPool;
use mapview_core::import::{ImageData, ImageImporter, MeshImporter};
use mapview_core::mesh::SubMesh;
use mapview_core::mesh::generators::{generate_grid, generate_sphere};
use mapview_core::overlay::OverlayCatalog;
use mapview_core::world::{WORLD_COUNT, WorldCatalog};

/// CPU-side scene data ready for upload.
#[derive(Debug)]
pub struct SceneAssets {
    /// All worlds' geometry and the per-world draw table.
    pub pool: GeometryPool,
    /// Markers grouped by world.
    pub catalog: OverlayCatalog,
    /// One icon per marker kind, in kind order. Empty when no icons exist.
    pub icons: Vec<ImageData>,
}

/// Load every world, the marker metadata and the icons under `worlds`.
///
/// A world without a mesh file fails the load. A missing `items.txt` means
/// no markers; a missing `icons/` directory means no icons.
pub fn load_assets(
    worlds: &WorldCatalog,
    meshes: &dyn MeshImporter,
    images: &dyn ImageImporter,
) -> Result<SceneAssets, LoadError> {
    let mut builder = GeometryPool::builder();
    for (id, name) in worlds.iter() {
        let candidates = worlds.mesh_candidates(id);
        let Some(path) = candidates.iter().find(|path| path.is_file()) else {
            let path = candidates
                .into_iter()
                .next()
                .unwrap_or_else(|| worlds.data_dir().join(name));
            return Err(LoadError::Io {
                path,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "world mesh not found"),
            });
        };
        let submeshes = meshes.import_mesh(path)?;
        log::info!(
            "Loaded {name} from {}: {} sub-meshes",
            path.display(),
            submeshes.len()
        );
        builder.push_world(name, &submeshes)?;
    }
    let pool = builder.build();

    let catalog = load_catalog(&worlds.metadata_path(), worlds.len())?;

    let icons = if worlds.data_dir().join("icons").is_dir() {
        catalog
            .kinds()
            .iter()
            .map(|kind| images.import_image(&worlds.icon_path(kind)))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        log::info!("No icon directory under {}", worlds.data_dir().display());
        Vec::new()
    };

    log::info!(
        "Assets: {} worlds, {} markers of {} kinds, {} icons",
        pool.table().world_count(),
        catalog.items().len(),
        catalog.kinds().len(),
        icons.len()
    );
    Ok(SceneAssets {
        pool,
        catalog,
        icons,
    })
}

fn load_catalog(path: &Path, world_count: usize) -> Result<OverlayCatalog, LoadError> {
    match std::fs::read_to_string(path) {
        Ok(text) => OverlayCatalog::parse(&text, world_count),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("No marker metadata at {}", path.display());
            Ok(OverlayCatalog::empty(world_count))
        }
        Err(source) => Err(LoadError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Marker kinds of the generated scene and their icon colors.
const DEMO_KINDS: [(&str, [u8; 4]); 2] = [("chest", [230, 190, 40, 255]), ("shrine", [60, 160, 230, 255])];

/// Placeholder worlds built from generated geometry.
///
/// World `n` (0-based) is a grid floor with `n + 1` spheres around the
/// origin and two markers per sphere.
pub fn demo_assets() -> Result<SceneAssets, LoadError> {
    let worlds = WorldCatalog::new("");
    let mut builder = GeometryPool::builder();
    let mut metadata = String::new();

    for (id, name) in worlds.iter() {
        let count = id.index() + 1;
        let mut submeshes = vec![generate_grid(16, 16, 1200.0)];
        for i in 0..count {
            let angle = i as f32 / count as f32 * std::f32::consts::TAU;
            let (x, z) = (angle.cos() * 300.0, angle.sin() * 300.0);
            submeshes.push(translated(generate_sphere(60.0, 24, 12), [x, 60.0, z]));
            for (kind, _) in DEMO_KINDS {
                metadata.push_str(&format!("{kind} {} {i} {x},140,{z}\n", id.index() + 1));
            }
        }
        builder.push_world(name, &submeshes)?;
    }

    let catalog = OverlayCatalog::parse(&metadata, WORLD_COUNT)?;
    let icons = catalog
        .kinds()
        .iter()
        .map(|kind| {
            let color = DEMO_KINDS
                .iter()
                .find(|(name, _)| name == kind)
                .map_or([255; 4], |(_, color)| *color);
            ImageData::solid(16, 16, color)
        })
        .collect();

    Ok(SceneAssets {
        pool: builder.build(),
        catalog,
        icons,
    })
}

fn translated(mut mesh: SubMesh, offset: [f32; 3]) -> SubMesh {
    for vertex in &mut mesh.vertices {
        for (axis, delta) in offset.iter().enumerate() {
            vertex.position[axis] += delta;
        }
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapview_core::world::WorldId;

    #[test]
    fn test_demo_assets_cover_every_world() {
        let assets = demo_assets().unwrap();
        assert_eq!(assets.pool.table().world_count(), WORLD_COUNT);
        assert_eq!(assets.catalog.kinds().len(), DEMO_KINDS.len());
        assert_eq!(assets.icons.len(), DEMO_KINDS.len());
        for index in 0..WORLD_COUNT {
            let world = WorldId::new(index as u32);
            assert_eq!(assets.pool.table().draws(world).len(), index + 2);
            assert_eq!(assets.catalog.world_items(world).len(), (index + 1) * 2);
        }
    }
}
