//! glTF 2.0 world importer.
//!
//! Walks the default scene (or the first one, or every mesh when the file
//! has no scenes), turning each triangle primitive into one [`SubMesh`] with
//! node transforms baked in. Positions and normals are converted from glTF's
//! right-handed frame to the viewer's left-handed one by negating Z and
//! flipping the triangle winding. Missing normals are generated by averaging
//! face normals.

use std::path::Path;

use glam::{Mat3, Mat4, Vec3};

use super::MeshImporter;
use crate::error::LoadError;
use crate::mesh::{SubMesh, Vertex};

/// Imports `.glb` and `.gltf` files.
///
/// Buffers may be embedded (GLB blob or base64 data URI) or stored next to
/// the `.gltf` file.
#[derive(Debug, Clone, Copy, Default)]
pub struct GltfImporter;

impl MeshImporter for GltfImporter {
    fn import_mesh(&self, path: &Path) -> Result<Vec<SubMesh>, LoadError> {
        let bytes = std::fs::read(path).map_err(|e| LoadError::io(path, e))?;
        let submeshes = import_slice(&bytes, path.parent())
            .map_err(|reason| LoadError::Mesh {
                path: path.to_path_buf(),
                reason,
            })?;
        log::info!(
            "Imported {} sub-meshes ({} triangles) from {}",
            submeshes.len(),
            submeshes.iter().map(SubMesh::triangle_count).sum::<usize>(),
            path.display()
        );
        Ok(submeshes)
    }
}

/// Import from memory. External buffers resolve against `base_dir`.
pub(crate) fn import_slice(bytes: &[u8], base_dir: Option<&Path>) -> Result<Vec<SubMesh>, String> {
    let gltf_dep::Gltf { document, blob } =
        gltf_dep::Gltf::from_slice(bytes).map_err(|e| format!("glTF parse error: {e}"))?;
    let buffers = resolve_buffers(&document, blob, base_dir)?;

    let mut submeshes = Vec::new();
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next());
    match scene {
        Some(scene) => {
            for node in scene.nodes() {
                visit_node(&node, Mat4::IDENTITY, &buffers, &mut submeshes)?;
            }
        }
        None => {
            for mesh in document.meshes() {
                import_primitives(&mesh, Mat4::IDENTITY, &buffers, &mut submeshes)?;
            }
        }
    }
    Ok(submeshes)
}

fn visit_node(
    node: &gltf_dep::Node<'_>,
    parent: Mat4,
    buffers: &[Vec<u8>],
    out: &mut Vec<SubMesh>,
) -> Result<(), String> {
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        import_primitives(&mesh, world, buffers, out)?;
    }
    for child in node.children() {
        visit_node(&child, world, buffers, out)?;
    }
    Ok(())
}

fn import_primitives(
    mesh: &gltf_dep::Mesh<'_>,
    transform: Mat4,
    buffers: &[Vec<u8>],
    out: &mut Vec<SubMesh>,
) -> Result<(), String> {
    let normal_matrix = Mat3::from_mat4(transform).inverse().transpose();

    for (prim_idx, primitive) in mesh.primitives().enumerate() {
        if primitive.mode() != gltf_dep::mesh::Mode::Triangles {
            return Err(format!(
                "mesh {} primitive {prim_idx}: unsupported topology {:?}",
                mesh.index(),
                primitive.mode()
            ));
        }

        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
        let positions: Vec<Vec3> = reader
            .read_positions()
            .ok_or_else(|| {
                format!(
                    "mesh {} primitive {prim_idx} has no POSITION attribute",
                    mesh.index()
                )
            })?
            .map(|p| transform.transform_point3(Vec3::from(p)))
            .collect();

        let mut indices: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..positions.len() as u32).collect(),
        };
        if indices.len() % 3 != 0 {
            return Err(format!(
                "mesh {} primitive {prim_idx}: {} indices do not form triangles",
                mesh.index(),
                indices.len()
            ));
        }

        let normals: Vec<Vec3> = match reader.read_normals() {
            Some(normals) => normals
                .map(|n| (normal_matrix * Vec3::from(n)).normalize_or_zero())
                .collect(),
            None => generate_normals(&positions, &indices),
        };

        // Right-handed to left-handed.
        for triangle in indices.chunks_exact_mut(3) {
            triangle.swap(1, 2);
        }
        let vertices = positions
            .iter()
            .zip(normals.iter().chain(std::iter::repeat(&Vec3::ZERO)))
            .map(|(p, n)| Vertex::new([p.x, p.y, -p.z], [n.x, n.y, -n.z]))
            .collect();

        out.push(SubMesh::new(vertices, indices));
    }
    Ok(())
}

fn generate_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for triangle in indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        if a >= positions.len() || b >= positions.len() || c >= positions.len() {
            continue;
        }
        let face = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
        normals[a] += face;
        normals[b] += face;
        normals[c] += face;
    }
    normals.iter().map(|n| n.normalize_or_zero()).collect()
}

fn resolve_buffers(
    document: &gltf_dep::Document,
    blob: Option<Vec<u8>>,
    base_dir: Option<&Path>,
) -> Result<Vec<Vec<u8>>, String> {
    let mut blob = blob;
    let mut buffers = Vec::new();

    for buffer in document.buffers() {
        let data = match buffer.source() {
            gltf_dep::buffer::Source::Bin => blob
                .take()
                .ok_or_else(|| "binary buffer referenced but no blob present".to_string())?,
            gltf_dep::buffer::Source::Uri(uri) => match parse_data_uri(uri) {
                Some(data) => data,
                None if uri.starts_with("data:") => {
                    return Err(format!("malformed data URI in buffer {}", buffer.index()));
                }
                None => {
                    let base = base_dir.ok_or_else(|| {
                        format!("external buffer '{uri}' needs a base directory")
                    })?;
                    std::fs::read(base.join(uri))
                        .map_err(|e| format!("failed to read buffer '{uri}': {e}"))?
                }
            },
        };
        if data.len() < buffer.length() {
            return Err(format!(
                "buffer {} holds {} bytes, expected {}",
                buffer.index(),
                data.len(),
                buffer.length()
            ));
        }
        buffers.push(data);
    }

    Ok(buffers)
}

/// Decode a base64 `data:` URI.
fn parse_data_uri(uri: &str) -> Option<Vec<u8>> {
    let rest = uri.strip_prefix("data:")?;
    let (_, encoded) = rest.split_once(";base64,")?;
    base64_decode(encoded)
}

fn base64_decode(input: &str) -> Option<Vec<u8>> {
    fn sextet(c: u8) -> Option<u8> {
        match c {
            b'A'..=b'Z' => Some(c - b'A'),
            b'a'..=b'z' => Some(c - b'a' + 26),
            b'0'..=b'9' => Some(c - b'0' + 52),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }

    let symbols: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let mut out = Vec::with_capacity(symbols.len() / 4 * 3);

    for chunk in symbols.chunks(4) {
        let padding = chunk.iter().rev().take_while(|&&b| b == b'=').count();
        let mut quad = [0u8; 4];
        for (slot, &symbol) in quad.iter_mut().zip(&chunk[..chunk.len() - padding]) {
            *slot = sextet(symbol)?;
        }
        let bytes = [
            (quad[0] << 2) | (quad[1] >> 4),
            (quad[1] << 4) | (quad[2] >> 2),
            (quad[2] << 6) | quad[3],
        ];
        let produced = (chunk.len() - padding).saturating_sub(1);
        out.extend_from_slice(&bytes[..produced.min(3)]);
    }

    Some(out)
}
