//! Moving CPU-authored bytes into device-local resources.
//!
//! Uploads are collected into an [`UploadBatch`] and handed to the
//! [`UploadStager`], which lays every payload out in one CPU-mapped staging
//! buffer, records a copy per payload plus the transitions into each
//! destination's steady state, and submits the lot as a single command
//! stream followed by one gate signal.
//!
//! ```ignore
//! let mut batch = UploadBatch::new();
//! batch.buffer(&vertices, pool.vertex_bytes(), ResourceState::VertexBuffer);
//! batch.buffer(&indices, pool.index_bytes(), ResourceState::IndexBuffer);
//! let ticket = stager.submit(&mut gate, batch)?;
//! ticket.wait(&mut gate)?; // before any pass reads the buffers
//! ```
//!
//! Destinations the stager has not seen before are assumed to be in
//! [`ResourceState::CopyDest`], the state device-local buffers are created
//! in. Textures must be created in that state too. A destination uploaded
//! to again later is first moved back to `CopyDest`.

use std::sync::Arc;

use crate::command::CommandArena;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::{Buffer, ResourceId, Texture};
use crate::state::{ResourceState, StateTracker, TransitionBatch};
use crate::sync::SyncGate;
use crate::types::{BufferDescriptor, BufferUsage, TextureUsage};

/// Alignment of buffer copies within the staging buffer.
pub const COPY_ALIGNMENT: u64 = 4;

/// Alignment of texture row pitch and texture copy offsets.
pub const ROW_PITCH_ALIGNMENT: u32 = 256;

/// Smallest staging buffer ever allocated.
const MIN_STAGING_SIZE: u64 = 64 * 1024;

fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

enum Destination {
    Buffer(Arc<Buffer>),
    TextureLayer { texture: Arc<Texture>, layer: u32 },
}

impl Destination {
    fn id(&self) -> ResourceId {
        match self {
            Self::Buffer(buffer) => buffer.id(),
            Self::TextureLayer { texture, .. } => texture.id(),
        }
    }
}

struct PendingUpload<'a> {
    destination: Destination,
    bytes: &'a [u8],
    final_state: ResourceState,
}

/// Uploads to be submitted together.
#[derive(Default)]
pub struct UploadBatch<'a> {
    uploads: Vec<PendingUpload<'a>>,
}

impl<'a> UploadBatch<'a> {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload `bytes` to the start of `dst`, leaving it in `final_state`.
    pub fn buffer(&mut self, dst: &Arc<Buffer>, bytes: &'a [u8], final_state: ResourceState) -> &mut Self {
        self.uploads.push(PendingUpload {
            destination: Destination::Buffer(Arc::clone(dst)),
            bytes,
            final_state,
        });
        self
    }

    /// Upload one tightly packed layer of `dst`, leaving it in `final_state`.
    pub fn texture_layer(
        &mut self,
        dst: &Arc<Texture>,
        layer: u32,
        bytes: &'a [u8],
        final_state: ResourceState,
    ) -> &mut Self {
        self.uploads.push(PendingUpload {
            destination: Destination::TextureLayer {
                texture: Arc::clone(dst),
                layer,
            },
            bytes,
            final_state,
        });
        self
    }

    /// Number of uploads in the batch.
    pub fn len(&self) -> usize {
        self.uploads.len()
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty()
    }

    fn validate(&self) -> Result<(), GraphicsError> {
        for upload in &self.uploads {
            match &upload.destination {
                Destination::Buffer(buffer) => {
                    if !buffer.descriptor().usage.contains(BufferUsage::COPY_DST) {
                        return Err(GraphicsError::InvalidParameter(format!(
                            "upload target {:?} lacks COPY_DST usage",
                            buffer.label()
                        )));
                    }
                    let len = upload.bytes.len() as u64;
                    if len == 0 || len % COPY_ALIGNMENT != 0 {
                        return Err(GraphicsError::InvalidParameter(format!(
                            "upload of {len} bytes to {:?} is not a non-empty multiple of {COPY_ALIGNMENT}",
                            buffer.label()
                        )));
                    }
                    if len > buffer.size() {
                        return Err(GraphicsError::InvalidParameter(format!(
                            "upload of {len} bytes overflows {:?} ({} bytes)",
                            buffer.label(),
                            buffer.size()
                        )));
                    }
                }
                Destination::TextureLayer { texture, layer } => {
                    let descriptor = texture.descriptor();
                    if !descriptor.usage.contains(TextureUsage::COPY_DST) {
                        return Err(GraphicsError::InvalidParameter(format!(
                            "upload target {:?} lacks COPY_DST usage",
                            texture.label()
                        )));
                    }
                    if descriptor.format.is_depth() {
                        return Err(GraphicsError::InvalidParameter(format!(
                            "cannot upload into depth texture {:?}",
                            texture.label()
                        )));
                    }
                    if *layer >= descriptor.size.depth {
                        return Err(GraphicsError::InvalidParameter(format!(
                            "layer {layer} out of range for {:?} with {} layers",
                            texture.label(),
                            descriptor.size.depth
                        )));
                    }
                    if upload.bytes.len() as u64 != descriptor.layer_bytes() {
                        return Err(GraphicsError::InvalidParameter(format!(
                            "layer upload to {:?} has {} bytes, expected {}",
                            texture.label(),
                            upload.bytes.len(),
                            descriptor.layer_bytes()
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Receipt for a submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadTicket {
    /// Gate value signaled after the batch.
    pub value: u64,
    /// Staging bytes used, including padding.
    pub bytes: u64,
    /// Number of copies recorded.
    pub uploads: usize,
}

impl UploadTicket {
    /// Block until the batch has executed.
    pub fn wait(&self, gate: &mut SyncGate) -> Result<(), GraphicsError> {
        gate.wait_until(self.value)
    }
}

/// Where each payload lands in the staging buffer.
struct Placement {
    offset: u64,
    row_pitch: u32,
}

/// Batched uploader with a reusable staging buffer.
pub struct UploadStager {
    device: Arc<GraphicsDevice>,
    staging: Option<Arc<Buffer>>,
    /// Gate value of the last batch that read the staging buffer.
    in_use_until: u64,
    arena: CommandArena,
    residency: StateTracker,
}

impl UploadStager {
    /// Create a stager; staging memory is allocated on first use.
    pub fn new(device: Arc<GraphicsDevice>) -> Self {
        Self {
            device,
            staging: None,
            in_use_until: 0,
            arena: CommandArena::new("upload"),
            residency: StateTracker::new(),
        }
    }

    /// Current staging capacity in bytes.
    pub fn staging_capacity(&self) -> u64 {
        self.staging.as_ref().map_or(0, |b| b.size())
    }

    /// Gate value the staging buffer is busy until.
    pub fn in_use_until(&self) -> u64 {
        self.in_use_until
    }

    /// State an uploaded resource was left in.
    pub fn state_of(&self, id: ResourceId) -> Option<ResourceState> {
        self.residency.state(id)
    }

    /// Stop tracking a destroyed destination.
    pub fn forget(&mut self, id: ResourceId) {
        self.residency.forget(id);
    }

    fn layout(batch: &UploadBatch<'_>) -> (Vec<Placement>, u64) {
        let mut cursor = 0;
        let placements = batch
            .uploads
            .iter()
            .map(|upload| match &upload.destination {
                Destination::Buffer(_) => {
                    let offset = align_up(cursor, COPY_ALIGNMENT);
                    cursor = offset + upload.bytes.len() as u64;
                    Placement {
                        offset,
                        row_pitch: 0,
                    }
                }
                Destination::TextureLayer { texture, .. } => {
                    let descriptor = texture.descriptor();
                    let row_pitch = descriptor.row_bytes().div_ceil(ROW_PITCH_ALIGNMENT)
                        * ROW_PITCH_ALIGNMENT;
                    let offset = align_up(cursor, ROW_PITCH_ALIGNMENT as u64);
                    cursor = offset + row_pitch as u64 * descriptor.size.height as u64;
                    Placement { offset, row_pitch }
                }
            })
            .collect();
        (placements, cursor)
    }

    /// Staging buffer of at least `size` bytes that no in-flight batch reads.
    fn acquire_staging(&mut self, gate: &mut SyncGate, size: u64) -> Result<Arc<Buffer>, GraphicsError> {
        gate.wait_until(self.in_use_until)?;
        if let Some(staging) = &self.staging
            && staging.size() >= size
        {
            return Ok(Arc::clone(staging));
        }
        let capacity = size.next_power_of_two().max(MIN_STAGING_SIZE);
        log::debug!(
            "UploadStager: growing staging from {} to {capacity} bytes",
            self.staging_capacity()
        );
        // The old buffer is idle: the wait above covered its last batch.
        self.staging = None;
        let staging = self.device.create_buffer(
            &BufferDescriptor::new(capacity, BufferUsage::MAP_WRITE | BufferUsage::COPY_SRC)
                .with_label("upload staging"),
        )?;
        self.staging = Some(Arc::clone(&staging));
        Ok(staging)
    }

    /// Copy every payload of `batch` through staging memory and submit.
    ///
    /// Returns once the work is queued; wait on the ticket before any pass
    /// reads the destinations.
    pub fn submit(&mut self, gate: &mut SyncGate, batch: UploadBatch<'_>) -> Result<UploadTicket, GraphicsError> {
        batch.validate()?;
        if batch.is_empty() {
            return Ok(UploadTicket {
                value: 0,
                bytes: 0,
                uploads: 0,
            });
        }

        let (placements, total) = Self::layout(&batch);
        let staging = self.acquire_staging(gate, total)?;

        let mut image = vec![0u8; total as usize];
        for (upload, placement) in batch.uploads.iter().zip(&placements) {
            let start = placement.offset as usize;
            match &upload.destination {
                Destination::Buffer(_) => {
                    image[start..start + upload.bytes.len()].copy_from_slice(upload.bytes);
                }
                Destination::TextureLayer { texture, .. } => {
                    let row_bytes = texture.descriptor().row_bytes() as usize;
                    for (row, src) in upload.bytes.chunks_exact(row_bytes).enumerate() {
                        let at = start + row * placement.row_pitch as usize;
                        image[at..at + row_bytes].copy_from_slice(src);
                    }
                }
            }
        }
        self.device.write_buffer(&staging, 0, &image)?;

        self.arena.reset()?;
        let mut before = TransitionBatch::new();
        let mut after = TransitionBatch::new();
        for upload in &batch.uploads {
            let id = upload.destination.id();
            if self.residency.state(id).is_none() {
                self.residency.track(id, ResourceState::CopyDest);
            }
            self.residency
                .require(id, ResourceState::CopyDest, &mut before)
                .map_err(GraphicsError::Internal)?;
        }
        {
            let mut recorder = self.arena.begin()?;
            recorder.barrier(&mut before);
            for (upload, placement) in batch.uploads.iter().zip(&placements) {
                match &upload.destination {
                    Destination::Buffer(buffer) => {
                        recorder.copy_buffer(
                            &staging,
                            placement.offset,
                            buffer,
                            0,
                            upload.bytes.len() as u64,
                        );
                    }
                    Destination::TextureLayer { texture, layer } => {
                        recorder.copy_buffer_to_texture(
                            &staging,
                            placement.offset,
                            placement.row_pitch,
                            texture,
                            *layer,
                        );
                    }
                }
            }
            for upload in &batch.uploads {
                self.residency
                    .require(upload.destination.id(), upload.final_state, &mut after)
                    .map_err(GraphicsError::Internal)?;
            }
            recorder.barrier(&mut after);
        }

        let stream = self.arena.close()?;
        self.device.submit(stream)?;
        let value = gate.signal_after_submit()?;
        self.in_use_until = value;

        log::info!(
            "UploadStager: submitted {} uploads ({total} staging bytes), completes at {value}",
            batch.uploads.len()
        );
        Ok(UploadTicket {
            value,
            bytes: total,
            uploads: batch.uploads.len(),
        })
    }
}

impl std::fmt::Debug for UploadStager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadStager")
            .field("staging_capacity", &self.staging_capacity())
            .field("in_use_until", &self.in_use_until)
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::types::{TextureDescriptor, TextureFormat};

    fn setup() -> (Arc<GraphicsDevice>, SyncGate, UploadStager) {
        let device = GraphicsDevice::dummy().unwrap();
        let gate = SyncGate::new(device.clone());
        let stager = UploadStager::new(device.clone());
        (device, gate, stager)
    }

    fn vertex_buffer(device: &GraphicsDevice, size: u64) -> Arc<Buffer> {
        device
            .create_buffer(&BufferDescriptor::new(
                size,
                BufferUsage::VERTEX | BufferUsage::COPY_DST,
            ))
            .unwrap()
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 4), 0);
        assert_eq!(align_up(5, 4), 8);
        assert_eq!(align_up(256, 256), 256);
    }

    #[test]
    fn test_empty_batch_submits_nothing() {
        let (_device, mut gate, mut stager) = setup();
        let ticket = stager.submit(&mut gate, UploadBatch::new()).unwrap();
        assert_eq!(ticket.uploads, 0);
        assert_eq!(gate.current_value(), 1);
        ticket.wait(&mut gate).unwrap();
    }

    #[test]
    fn test_buffer_round_trip() {
        let (device, mut gate, mut stager) = setup();
        let dst = vertex_buffer(&device, 16);
        let payload: Vec<u8> = (0..16).collect();

        let mut batch = UploadBatch::new();
        batch.buffer(&dst, &payload, ResourceState::VertexBuffer);
        let ticket = stager.submit(&mut gate, batch).unwrap();
        ticket.wait(&mut gate).unwrap();

        let drained = gate.drain().unwrap();
        assert_eq!(device.read_buffer(&dst, &drained).unwrap(), payload);
        assert_eq!(stager.state_of(dst.id()), Some(ResourceState::VertexBuffer));
    }

    #[test]
    fn test_texture_rows_are_padded() {
        let (device, mut gate, mut stager) = setup();
        let texture = device
            .create_texture(
                &TextureDescriptor::new_2d_array(
                    3,
                    2,
                    2,
                    TextureFormat::Rgba8Unorm,
                    TextureUsage::COPY_DST | TextureUsage::TEXTURE_BINDING,
                ),
                ResourceState::CopyDest,
            )
            .unwrap();
        let first = vec![7u8; 24];
        let second: Vec<u8> = (0..24).collect();

        let mut batch = UploadBatch::new();
        batch
            .texture_layer(&texture, 0, &first, ResourceState::ShaderRead)
            .texture_layer(&texture, 1, &second, ResourceState::ShaderRead);
        let ticket = stager.submit(&mut gate, batch).unwrap();
        assert_eq!(ticket.uploads, 2);
        assert_eq!(ticket.bytes, 256 * 2 + 256 * 2);

        let drained = gate.drain().unwrap();
        let data = device.read_texture(&texture, &drained).unwrap();
        assert_eq!(&data[..24], &first[..]);
        assert_eq!(&data[24..], &second[..]);
    }

    #[test]
    fn test_single_submission_per_batch() {
        let backend = Arc::new(DummyBackend::new().unwrap());
        let device = GraphicsDevice::new(backend.clone());
        let mut gate = SyncGate::new(device.clone());
        let mut stager = UploadStager::new(device.clone());
        let a = vertex_buffer(&device, 8);
        let b = vertex_buffer(&device, 12);

        let mut batch = UploadBatch::new();
        batch
            .buffer(&a, &[1; 8], ResourceState::VertexBuffer)
            .buffer(&b, &[2; 12], ResourceState::IndexBuffer);
        stager.submit(&mut gate, batch).unwrap().wait(&mut gate).unwrap();

        let records = backend.take_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].copies, 2);
        assert_eq!(records[0].transitions.len(), 2);
        assert_eq!(backend.resource_state(b.id()), Some(ResourceState::IndexBuffer));
    }

    #[test]
    fn test_staging_reuse_waits_for_previous_batch() {
        let backend = Arc::new(DummyBackend::manual().unwrap());
        let device = GraphicsDevice::new(backend.clone());
        let mut gate = SyncGate::new(device.clone());
        let mut stager = UploadStager::new(device.clone());
        let dst = vertex_buffer(&device, 8);

        let mut batch = UploadBatch::new();
        batch.buffer(&dst, &[1; 8], ResourceState::VertexBuffer);
        let first = stager.submit(&mut gate, batch).unwrap();
        assert_eq!(stager.in_use_until(), first.value);

        let releaser = {
            let backend = Arc::clone(&backend);
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(20));
                backend.release_all();
            })
        };
        // Re-upload: staging and the destination are both reused.
        let mut batch = UploadBatch::new();
        batch.buffer(&dst, &[2; 8], ResourceState::VertexBuffer);
        let second = stager.submit(&mut gate, batch).unwrap();
        releaser.join().unwrap();
        second.wait(&mut gate).unwrap();

        assert!(gate.last_completed() >= first.value);
        assert!(backend.lost_reason().is_none());
        let drained = gate.drain().unwrap();
        assert_eq!(device.read_buffer(&dst, &drained).unwrap(), vec![2; 8]);
    }

    #[test]
    fn test_invalid_uploads_rejected() {
        let (device, mut gate, mut stager) = setup();
        let dst = vertex_buffer(&device, 8);
        let mut batch = UploadBatch::new();
        batch.buffer(&dst, &[0; 12], ResourceState::VertexBuffer);
        assert!(stager.submit(&mut gate, batch).is_err());

        let mut batch = UploadBatch::new();
        batch.buffer(&dst, &[0; 3], ResourceState::VertexBuffer);
        assert!(stager.submit(&mut gate, batch).is_err());

        let no_copy = device
            .create_buffer(&BufferDescriptor::new(8, BufferUsage::VERTEX))
            .unwrap();
        let mut batch = UploadBatch::new();
        batch.buffer(&no_copy, &[0; 8], ResourceState::VertexBuffer);
        assert!(stager.submit(&mut gate, batch).is_err());
    }
}
