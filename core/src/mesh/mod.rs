//! CPU-side mesh data.
//!
//! Importers deliver each world as an ordered list of [`SubMesh`] values.
//! Vertices carry a homogeneous position (`w = 1`) and normal (`w = 0`) so the
//! GPU layout is two `vec4` attributes, 32 bytes per vertex. Indices are
//! 32-bit and local to their sub-mesh.

pub mod generators;

/// Interleaved vertex uploaded to the global vertex buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    /// Position, `w = 1`.
    pub position: [f32; 4],
    /// Normal, `w = 0`.
    pub normal: [f32; 4],
}

impl Vertex {
    /// Size of one vertex in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Build a vertex from a 3D position and normal.
    pub fn new(position: [f32; 3], normal: [f32; 3]) -> Self {
        Self {
            position: [position[0], position[1], position[2], 1.0],
            normal: [normal[0], normal[1], normal[2], 0.0],
        }
    }
}

/// Size of one index in bytes.
pub const INDEX_SIZE: u64 = std::mem::size_of::<u32>() as u64;

/// One triangulated piece of a world.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubMesh {
    /// Vertex data.
    pub vertices: Vec<Vertex>,
    /// Triangle-list indices into `vertices`.
    pub indices: Vec<u32>,
}

impl SubMesh {
    /// Create a sub-mesh from vertices and indices.
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Check the triangle-list contract.
    ///
    /// Returns a description of the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        if self.indices.len() % 3 != 0 {
            return Err(format!(
                "index count {} is not a multiple of 3",
                self.indices.len()
            ));
        }
        let vertex_count = self.vertices.len();
        if let Some(position) = self
            .indices
            .iter()
            .position(|&index| index as usize >= vertex_count)
        {
            return Err(format!(
                "index {} at position {position} is out of range for {vertex_count} vertices",
                self.indices[position]
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout() {
        assert_eq!(Vertex::SIZE, 32);
        let vertex = Vertex::new([1.0, 2.0, 3.0], [0.0, 1.0, 0.0]);
        assert_eq!(vertex.position, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(vertex.normal, [0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_validate_accepts_triangles() {
        let mesh = generators::generate_quad(1.0, 1.0);
        assert!(mesh.validate().is_ok());
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn test_validate_rejects_partial_triangle() {
        let mesh = SubMesh::new(vec![Vertex::new([0.0; 3], [0.0; 3]); 3], vec![0, 1]);
        assert!(mesh.validate().unwrap_err().contains("multiple of 3"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_index() {
        let mesh = SubMesh::new(vec![Vertex::new([0.0; 3], [0.0; 3]); 3], vec![0, 1, 3]);
        assert!(mesh.validate().unwrap_err().contains("out of range"));
    }
}
