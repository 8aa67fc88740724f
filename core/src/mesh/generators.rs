//! Procedural sub-meshes.
//!
//! Used for placeholder worlds, overlay geometry and tests. All generators
//! emit counter-clockwise triangle lists in the left-handed convention the
//! importers produce.

use std::f32::consts::PI;

use super::{SubMesh, Vertex};

/// Generate a UV sphere.
///
/// Produces `(rings + 1) * (segments + 1)` vertices and
/// `rings * segments * 6` indices.
pub fn generate_sphere(radius: f32, segments: u32, rings: u32) -> SubMesh {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let mut vertices = Vec::with_capacity(((rings + 1) * (segments + 1)) as usize);
    let mut indices = Vec::with_capacity((rings * segments * 6) as usize);

    for ring in 0..=rings {
        let theta = ring as f32 * PI / rings as f32;
        let (sin_theta, cos_theta) = theta.sin_cos();

        for segment in 0..=segments {
            let phi = segment as f32 * 2.0 * PI / segments as f32;
            let (sin_phi, cos_phi) = phi.sin_cos();
            let normal = [sin_theta * cos_phi, cos_theta, sin_theta * sin_phi];
            vertices.push(Vertex::new(
                [normal[0] * radius, normal[1] * radius, normal[2] * radius],
                normal,
            ));
        }
    }

    for ring in 0..rings {
        for segment in 0..segments {
            let current = ring * (segments + 1) + segment;
            let next = current + segments + 1;
            indices.extend_from_slice(&[current, next, current + 1]);
            indices.extend_from_slice(&[current + 1, next, next + 1]);
        }
    }

    SubMesh::new(vertices, indices)
}

/// Generate a quad on the XY plane facing -Z.
pub fn generate_quad(half_width: f32, half_height: f32) -> SubMesh {
    let normal = [0.0, 0.0, -1.0];
    let vertices = vec![
        Vertex::new([-half_width, -half_height, 0.0], normal),
        Vertex::new([half_width, -half_height, 0.0], normal),
        Vertex::new([half_width, half_height, 0.0], normal),
        Vertex::new([-half_width, half_height, 0.0], normal),
    ];
    SubMesh::new(vertices, vec![0, 1, 2, 2, 3, 0])
}

/// Generate a flat grid on the XZ plane facing +Y.
///
/// Produces `2 * cells_x * cells_z` triangles spanning `size` units along
/// each axis, centered on the origin.
pub fn generate_grid(cells_x: u32, cells_z: u32, size: f32) -> SubMesh {
    let cells_x = cells_x.max(1);
    let cells_z = cells_z.max(1);
    let step_x = size / cells_x as f32;
    let step_z = size / cells_z as f32;
    let half = size * 0.5;

    let mut vertices = Vec::with_capacity(((cells_x + 1) * (cells_z + 1)) as usize);
    for z in 0..=cells_z {
        for x in 0..=cells_x {
            vertices.push(Vertex::new(
                [x as f32 * step_x - half, 0.0, z as f32 * step_z - half],
                [0.0, 1.0, 0.0],
            ));
        }
    }

    let mut indices = Vec::with_capacity((cells_x * cells_z * 6) as usize);
    let row = cells_x + 1;
    for z in 0..cells_z {
        for x in 0..cells_x {
            let corner = z * row + x;
            indices.extend_from_slice(&[corner, corner + row, corner + 1]);
            indices.extend_from_slice(&[corner + 1, corner + row, corner + row + 1]);
        }
    }

    SubMesh::new(vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_sphere() {
        let mesh = generate_sphere(1.0, 8, 4);
        // (rings+1) * (segments+1) = 5 * 9 = 45 vertices
        assert_eq!(mesh.vertices.len(), 45);
        // rings * segments * 6 = 4 * 8 * 6 = 192 indices
        assert_eq!(mesh.indices.len(), 192);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_generate_quad() {
        let mesh = generate_quad(0.5, 0.5);
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices.len(), 6);
    }

    #[test]
    fn test_generate_grid() {
        let mesh = generate_grid(4, 3, 10.0);
        assert_eq!(mesh.vertices.len(), 5 * 4);
        assert_eq!(mesh.triangle_count(), 2 * 4 * 3);
        assert!(mesh.validate().is_ok());
        assert!(mesh.vertices.iter().all(|v| v.position[1] == 0.0));
    }
}
