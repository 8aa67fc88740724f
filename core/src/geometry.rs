//! The global geometry pool and its per-world draw table.
//!
//! Every loaded world is appended to one vertex array and one index array.
//! The draw table records, per world, one [`DrawEntry`] per sub-mesh. It is
//! built once while loading and never changes afterwards, so renderers can
//! share it freely.
//!
//! ```text
//! vertices: [ world 0 ........ | world 1 .... | world 2 ...... ]
//! indices:  [ w0 s0 | w0 s1    | w1 s0        | w2 s0 | w2 s1  ]
//!             ^ draw(index_start, vertex_start, index_count)
//! ```
//!
//! Indices stay local to their sub-mesh; `vertex_start` is applied as the
//! base vertex of the indexed draw.

use std::ops::Range;

use crate::error::LoadError;
use crate::mesh::{INDEX_SIZE, SubMesh, Vertex};
use crate::world::WorldId;

/// One indexed draw, covering one sub-mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawEntry {
    /// First index in the global index buffer.
    pub index_start: u32,
    /// Base vertex added to every index.
    pub vertex_start: u32,
    /// Number of indices to draw.
    pub index_count: u32,
}

/// Largest base vertex an indexed draw can take.
pub const MAX_BASE_VERTEX: usize = i32::MAX as usize;

impl DrawEntry {
    /// The base vertex as the signed value indexed draws take.
    pub fn base_vertex(&self) -> Option<i32> {
        i32::try_from(self.vertex_start).ok()
    }
}

/// First sub-mesh whose base vertex would pass [`MAX_BASE_VERTEX`] when
/// appended after `existing` vertices, with that base.
fn first_unaddressable(
    existing: usize,
    vertex_counts: impl IntoIterator<Item = usize>,
) -> Option<(usize, usize)> {
    let mut start = existing;
    for (index, count) in vertex_counts.into_iter().enumerate() {
        if start > MAX_BASE_VERTEX {
            return Some((index, start));
        }
        start = start.saturating_add(count);
    }
    None
}

/// The draws and buffer ranges that belong to one world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldDraws {
    id: WorldId,
    name: String,
    draws: Vec<DrawEntry>,
    index_range: Range<u32>,
    vertex_range: Range<u32>,
}

impl WorldDraws {
    /// World id.
    pub fn id(&self) -> WorldId {
        self.id
    }

    /// World name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Draw entries in storage order.
    pub fn draws(&self) -> &[DrawEntry] {
        &self.draws
    }

    /// Range of the global index buffer owned by this world.
    pub fn index_range(&self) -> Range<u32> {
        self.index_range.clone()
    }

    /// Range of the global vertex buffer owned by this world.
    pub fn vertex_range(&self) -> Range<u32> {
        self.vertex_range.clone()
    }

    /// Total indices contributed by this world.
    pub fn index_count(&self) -> u32 {
        self.index_range.end - self.index_range.start
    }

    /// Total triangles contributed by this world.
    pub fn triangle_count(&self) -> u32 {
        self.index_count() / 3
    }
}

/// Immutable `(world, draws)` table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrawTable {
    worlds: Vec<WorldDraws>,
}

impl DrawTable {
    /// All worlds in load order.
    pub fn worlds(&self) -> &[WorldDraws] {
        &self.worlds
    }

    /// Number of worlds.
    pub fn world_count(&self) -> usize {
        self.worlds.len()
    }

    /// Look up one world.
    pub fn world(&self, id: WorldId) -> Option<&WorldDraws> {
        self.worlds.get(id.index())
    }

    /// Draws of one world. Unknown worlds have no draws.
    pub fn draws(&self, id: WorldId) -> &[DrawEntry] {
        self.world(id).map(WorldDraws::draws).unwrap_or(&[])
    }
}

/// Concatenated geometry of every loaded world.
#[derive(Debug, Clone, Default)]
pub struct GeometryPool {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    table: DrawTable,
}

impl GeometryPool {
    /// Start building a pool.
    pub fn builder() -> GeometryPoolBuilder {
        GeometryPoolBuilder::default()
    }

    /// All vertices.
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// All indices.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Vertex data as bytes.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Index data as bytes.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Size of the index data in bytes.
    pub fn index_byte_len(&self) -> u64 {
        self.indices.len() as u64 * INDEX_SIZE
    }

    /// The draw table.
    pub fn table(&self) -> &DrawTable {
        &self.table
    }

    /// Drop the CPU copies once uploaded, keeping the draw table.
    pub fn into_table(self) -> DrawTable {
        self.table
    }
}

/// Appends worlds to a [`GeometryPool`] in load order.
#[derive(Debug, Default)]
pub struct GeometryPoolBuilder {
    pool: GeometryPool,
}

impl GeometryPoolBuilder {
    /// Append one world. Its draws follow every previously added world.
    ///
    /// Each sub-mesh is validated against the triangle-list contract first;
    /// a violation rejects the whole world.
    pub fn push_world(
        &mut self,
        name: impl Into<String>,
        submeshes: &[SubMesh],
    ) -> Result<WorldId, LoadError> {
        let name = name.into();
        let geometry_error = |submesh: usize, reason: String| LoadError::Geometry {
            world: name.clone(),
            submesh,
            reason,
        };

        for (index, submesh) in submeshes.iter().enumerate() {
            submesh
                .validate()
                .map_err(|reason| geometry_error(index, reason))?;
        }

        if let Some((index, base)) = first_unaddressable(
            self.pool.vertices.len(),
            submeshes.iter().map(|s| s.vertices.len()),
        ) {
            return Err(geometry_error(
                index,
                format!("base vertex {base} exceeds {MAX_BASE_VERTEX}"),
            ));
        }

        let added_vertices: usize = submeshes.iter().map(|s| s.vertices.len()).sum();
        let added_indices: usize = submeshes.iter().map(|s| s.indices.len()).sum();
        let to_u32 = |count: usize| u32::try_from(count).ok();
        let (Some(vertex_end), Some(index_end)) = (
            to_u32(self.pool.vertices.len() + added_vertices),
            to_u32(self.pool.indices.len() + added_indices),
        ) else {
            return Err(geometry_error(
                0,
                "geometry pool exceeds 32-bit addressing".to_string(),
            ));
        };

        let id = WorldId::new(self.pool.table.worlds.len() as u32);
        let vertex_begin = self.pool.vertices.len() as u32;
        let index_begin = self.pool.indices.len() as u32;
        let mut draws = Vec::with_capacity(submeshes.len());

        self.pool.vertices.reserve(added_vertices);
        self.pool.indices.reserve(added_indices);
        for submesh in submeshes {
            let entry = DrawEntry {
                index_start: self.pool.indices.len() as u32,
                vertex_start: self.pool.vertices.len() as u32,
                index_count: submesh.indices.len() as u32,
            };
            self.pool.vertices.extend_from_slice(&submesh.vertices);
            self.pool.indices.extend_from_slice(&submesh.indices);
            draws.push(entry);
        }

        log::debug!(
            "Pooled world '{}' as {}: {} draws, {} vertices, {} indices",
            name,
            id,
            draws.len(),
            added_vertices,
            added_indices
        );

        self.pool.table.worlds.push(WorldDraws {
            id,
            name,
            draws,
            index_range: index_begin..index_end,
            vertex_range: vertex_begin..vertex_end,
        });
        Ok(id)
    }

    /// Number of worlds added so far.
    pub fn world_count(&self) -> usize {
        self.pool.table.worlds.len()
    }

    /// Finish building.
    pub fn build(self) -> GeometryPool {
        self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::generators::{generate_grid, generate_quad, generate_sphere};

    fn sample_pool() -> GeometryPool {
        let mut builder = GeometryPool::builder();
        builder
            .push_world("A", &[generate_quad(1.0, 1.0), generate_grid(2, 2, 4.0)])
            .unwrap();
        builder.push_world("B", &[]).unwrap();
        builder
            .push_world("C", &[generate_sphere(1.0, 6, 3)])
            .unwrap();
        builder.build()
    }

    #[test]
    fn test_draw_entries_follow_load_order() {
        let pool = sample_pool();
        let a = pool.table().draws(WorldId::new(0));
        assert_eq!(
            a,
            &[
                DrawEntry {
                    index_start: 0,
                    vertex_start: 0,
                    index_count: 6,
                },
                DrawEntry {
                    index_start: 6,
                    vertex_start: 4,
                    index_count: 24,
                },
            ]
        );
        let c = pool.table().draws(WorldId::new(2));
        assert_eq!(c[0].index_start, 30);
        assert_eq!(c[0].vertex_start, 4 + 9);
    }

    #[test]
    fn test_empty_world_has_no_draws() {
        let pool = sample_pool();
        let b = pool.table().world(WorldId::new(1)).unwrap();
        assert!(b.draws().is_empty());
        assert_eq!(b.index_range(), 30..30);
        assert_eq!(b.index_count(), 0);
    }

    #[test]
    fn test_unknown_world_has_no_draws() {
        let pool = sample_pool();
        assert!(pool.table().draws(WorldId::new(42)).is_empty());
    }

    #[test]
    fn test_world_ranges_do_not_overlap() {
        let pool = sample_pool();
        let worlds = pool.table().worlds();
        for pair in worlds.windows(2) {
            assert!(pair[0].index_range().end <= pair[1].index_range().start);
            assert!(pair[0].vertex_range().end <= pair[1].vertex_range().start);
        }
        let last = worlds.last().unwrap();
        assert_eq!(last.index_range().end as usize, pool.indices().len());
        assert_eq!(last.vertex_range().end as usize, pool.vertices().len());
    }

    #[test]
    fn test_invalid_submesh_rejects_world() {
        let mut builder = GeometryPool::builder();
        let mut broken = generate_quad(1.0, 1.0);
        broken.indices.push(0);
        let err = builder.push_world("Broken", &[broken]).unwrap_err();
        assert!(matches!(err, LoadError::Geometry { submesh: 0, .. }));
        assert_eq!(builder.world_count(), 0);
    }

    #[test]
    fn test_base_vertex_limit() {
        assert_eq!(first_unaddressable(0, [4, 6, 8]), None);
        assert_eq!(first_unaddressable(MAX_BASE_VERTEX, [1]), None);
        assert_eq!(
            first_unaddressable(MAX_BASE_VERTEX - 1, [1, 5, 3]),
            Some((2, MAX_BASE_VERTEX + 5))
        );

        let draw = DrawEntry {
            index_start: 0,
            vertex_start: i32::MAX as u32,
            index_count: 3,
        };
        assert_eq!(draw.base_vertex(), Some(i32::MAX));
        let draw = DrawEntry {
            vertex_start: i32::MAX as u32 + 1,
            ..draw
        };
        assert_eq!(draw.base_vertex(), None);
    }

    #[test]
    fn test_byte_views() {
        let pool = sample_pool();
        assert_eq!(pool.vertex_bytes().len(), pool.vertices().len() * 32);
        assert_eq!(pool.index_bytes().len() as u64, pool.index_byte_len());
    }
}
