//! Device-resident scene data.
//!
//! [`GpuScene::upload`] turns the CPU-side geometry pool, overlay catalog
//! and icon images into GPU buffers and an icon texture array with one
//! [`UploadStager`] batch. The returned ticket must be reached before the
//! scene is rendered.

use std::ops::Range;
use std::sync::Arc;

use mapview_core::geometry::{DrawTable, GeometryPool};
use mapview_core::import::ImageData;
use mapview_core::overlay::OverlayCatalog;
use mapview_core::world::WorldId;

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::{Buffer, Texture};
use crate::state::ResourceState;
use crate::sync::SyncGate;
use crate::types::{BufferDescriptor, BufferUsage, TextureDescriptor, TextureFormat, TextureUsage};
use crate::upload::{UploadBatch, UploadStager, UploadTicket};

/// Corners of the marker quad: `(x, y, u, v)`.
const QUAD_VERTICES: [[f32; 4]; 4] = [
    [-0.5, -0.5, 0.0, 1.0],
    [0.5, -0.5, 1.0, 1.0],
    [0.5, 0.5, 1.0, 0.0],
    [-0.5, 0.5, 0.0, 0.0],
];

const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

/// Index count of one marker quad.
pub const QUAD_INDEX_COUNT: u32 = QUAD_INDICES.len() as u32;

/// Stand-in for empty uploads; buffers cannot be zero-sized.
const EMPTY_WORD: [u8; 16] = [0; 16];

fn non_empty(bytes: &[u8]) -> &[u8] {
    if bytes.is_empty() { &EMPTY_WORD } else { bytes }
}

/// The global vertex and index buffers and the per-world draw table.
#[derive(Debug)]
pub struct GpuGeometry {
    /// Concatenated vertices of every world.
    pub vertices: Arc<Buffer>,
    /// Concatenated indices of every world.
    pub indices: Arc<Buffer>,
    /// Draw entries per world.
    pub table: DrawTable,
}

/// Marker quad, per-marker instances and icons.
#[derive(Debug)]
pub struct GpuOverlay {
    /// Unit quad corners.
    pub quad_vertices: Arc<Buffer>,
    /// Unit quad indices.
    pub quad_indices: Arc<Buffer>,
    /// One [`MarkerInstance`](mapview_core::overlay::MarkerInstance) per marker.
    pub instances: Arc<Buffer>,
    /// One icon per layer, indexed by marker kind.
    pub icons: Arc<Texture>,
    ranges: Vec<Range<u32>>,
}

impl GpuOverlay {
    /// Instance range of one world's markers.
    pub fn instance_range(&self, world: WorldId) -> Range<u32> {
        self.ranges.get(world.index()).cloned().unwrap_or(0..0)
    }
}

/// Everything the frame draws.
#[derive(Debug)]
pub struct GpuScene {
    /// World geometry.
    pub geometry: GpuGeometry,
    /// Marker overlay.
    pub overlay: GpuOverlay,
}

fn device_buffer(
    device: &GraphicsDevice,
    size: u64,
    usage: BufferUsage,
    label: &str,
) -> Result<Arc<Buffer>, GraphicsError> {
    device.create_buffer(&BufferDescriptor::new(size, usage | BufferUsage::COPY_DST).with_label(label))
}

impl GpuScene {
    /// Create the scene's resources and upload them in one batch.
    ///
    /// `icons` are the layers of the icon array, in kind order; they must
    /// share dimensions. Without icons a single white layer is used.
    pub fn upload(
        device: &GraphicsDevice,
        stager: &mut UploadStager,
        gate: &mut SyncGate,
        pool: GeometryPool,
        overlay: &OverlayCatalog,
        icons: &[ImageData],
    ) -> Result<(Self, UploadTicket), GraphicsError> {
        let fallback = [ImageData::solid(1, 1, [255; 4])];
        let icons = if icons.is_empty() { &fallback[..] } else { icons };
        let (icon_width, icon_height) = (icons[0].width, icons[0].height);
        if let Some(odd) = icons
            .iter()
            .find(|icon| icon.width != icon_width || icon.height != icon_height)
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "icon of {}x{} differs from the first icon's {icon_width}x{icon_height}",
                odd.width, odd.height
            )));
        }

        let vertex_bytes = non_empty(pool.vertex_bytes());
        let index_bytes = non_empty(pool.index_bytes());
        let instances = overlay.instances();
        let instance_bytes = non_empty(bytemuck::cast_slice(&instances));
        let quad_vertex_bytes: &[u8] = bytemuck::cast_slice(&QUAD_VERTICES);
        let quad_index_bytes: &[u8] = bytemuck::cast_slice(&QUAD_INDICES);

        let vertices = device_buffer(device, vertex_bytes.len() as u64, BufferUsage::VERTEX, "world vertices")?;
        let indices = device_buffer(device, index_bytes.len() as u64, BufferUsage::INDEX, "world indices")?;
        let quad_vertices =
            device_buffer(device, quad_vertex_bytes.len() as u64, BufferUsage::VERTEX, "marker quad")?;
        let quad_indices =
            device_buffer(device, quad_index_bytes.len() as u64, BufferUsage::INDEX, "marker quad indices")?;
        let instance_buffer =
            device_buffer(device, instance_bytes.len() as u64, BufferUsage::VERTEX, "marker instances")?;
        let icon_texture = device.create_texture(
            &TextureDescriptor::new_2d_array(
                icon_width,
                icon_height,
                icons.len() as u32,
                TextureFormat::Rgba8Unorm,
                TextureUsage::COPY_DST | TextureUsage::TEXTURE_BINDING,
            )
            .with_label("marker icons"),
            ResourceState::CopyDest,
        )?;

        let mut batch = UploadBatch::new();
        batch
            .buffer(&vertices, vertex_bytes, ResourceState::VertexBuffer)
            .buffer(&indices, index_bytes, ResourceState::IndexBuffer)
            .buffer(&quad_vertices, quad_vertex_bytes, ResourceState::VertexBuffer)
            .buffer(&quad_indices, quad_index_bytes, ResourceState::IndexBuffer)
            .buffer(&instance_buffer, instance_bytes, ResourceState::VertexBuffer);
        for (layer, icon) in icons.iter().enumerate() {
            batch.texture_layer(&icon_texture, layer as u32, &icon.pixels, ResourceState::ShaderRead);
        }
        let ticket = stager.submit(gate, batch)?;

        let ranges = (0..pool.table().world_count())
            .map(|i| overlay.instance_range(WorldId::new(i as u32)))
            .collect();
        log::info!(
            "GpuScene: {} worlds, {} vertices, {} indices, {} markers, {} icon layers",
            pool.table().world_count(),
            pool.vertices().len(),
            pool.indices().len(),
            instances.len(),
            icons.len()
        );

        let scene = Self {
            geometry: GpuGeometry {
                vertices,
                indices,
                table: pool.into_table(),
            },
            overlay: GpuOverlay {
                quad_vertices,
                quad_indices,
                instances: instance_buffer,
                icons: icon_texture,
                ranges,
            },
        };
        Ok((scene, ticket))
    }
}
