//! Simulated GPU backend for testing and headless runs.
//!
//! The device executes submissions on a worker thread in queue order, keeps
//! every resource in CPU memory and validates what real drivers only check
//! under a debug layer:
//!
//! - every barrier's `from` state matches the resource's actual state
//! - attachments, sampled textures, vertex/index buffers and copy endpoints
//!   are in the state their use requires
//! - no resource is used after it was destroyed
//! - the CPU never writes or destroys memory an unretired submission uses
//!
//! Any violation loses the device: later waits fail with
//! [`GraphicsError::DeviceLost`] and the reason is kept for inspection.
//!
//! In [`CompletionMode::Manual`] queued signals are held back until the test
//! releases them, which makes "the GPU is slow" reproducible.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::GpuBackend;
use crate::command::{Command, RenderPassInfo};
use crate::error::GraphicsError;
use crate::resources::ResourceId;
use crate::state::{ResourceState, Transition};
use crate::swapchain::SurfaceConfiguration;
use crate::types::{
    BindGroupDescriptor, BindingResource, BufferDescriptor, LoadOp, PipelineDescriptor,
    TextureDescriptor, TextureFormat, TextureUsage,
};

/// When queued signals become visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// As soon as the worker reaches them.
    #[default]
    Immediate,
    /// Only up to the value passed to [`DummyBackend::release_until`].
    Manual,
}

/// One executed draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawRecord {
    /// Label of the bound pipeline.
    pub pipeline: String,
    /// Whether the draw was indexed.
    pub indexed: bool,
    /// Index count (indexed) or vertex count.
    pub count: u32,
    /// First index (indexed) or first vertex.
    pub first: u32,
    /// Base vertex of indexed draws.
    pub base_vertex: i32,
    /// Instance count.
    pub instance_count: u32,
    /// First instance.
    pub first_instance: u32,
}

/// One executed render pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PassRecord {
    /// Pass label.
    pub label: String,
    /// Draws in execution order.
    pub draws: Vec<DrawRecord>,
}

/// What one submission did on the simulated GPU.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubmissionRecord {
    /// Submission sequence number, starting at 1.
    pub sequence: u64,
    /// Barrier transitions in execution order.
    pub transitions: Vec<Transition>,
    /// Number of copy commands.
    pub copies: usize,
    /// Render passes in execution order.
    pub passes: Vec<PassRecord>,
}

enum QueueEntry {
    Submit {
        sequence: u64,
        commands: Arc<Vec<Command>>,
    },
    Signal(u64),
    Present(ResourceId),
}

struct Memory {
    data: Vec<u8>,
    state: ResourceState,
    /// Sequence of the last submission that referenced the resource.
    last_use: u64,
}

struct BufferEntry {
    descriptor: BufferDescriptor,
    memory: Memory,
}

struct TextureEntry {
    descriptor: TextureDescriptor,
    memory: Memory,
}

struct PipelineEntry {
    label: String,
    color_formats: Vec<TextureFormat>,
    depth_format: Option<TextureFormat>,
}

struct SurfaceEntry {
    images: Vec<ResourceId>,
    current: u32,
}

struct DeviceState {
    queue: VecDeque<QueueEntry>,
    mode: CompletionMode,
    release_limit: u64,
    completed: u64,
    submitted: u64,
    executed: u64,
    retired: u64,
    lost: Option<String>,
    shutdown: bool,
    allocated: u64,
    memory_budget: Option<u64>,
    buffers: HashMap<ResourceId, BufferEntry>,
    textures: HashMap<ResourceId, TextureEntry>,
    pipelines: HashMap<ResourceId, PipelineEntry>,
    bind_groups: HashMap<ResourceId, Vec<ResourceId>>,
    surface: Option<SurfaceEntry>,
    acquire_failures: VecDeque<GraphicsError>,
    records: Vec<SubmissionRecord>,
    presents: u64,
}

impl DeviceState {
    fn new(mode: CompletionMode) -> Self {
        Self {
            queue: VecDeque::new(),
            mode,
            release_limit: 0,
            completed: 0,
            submitted: 0,
            executed: 0,
            retired: 0,
            lost: None,
            shutdown: false,
            allocated: 0,
            memory_budget: None,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            pipelines: HashMap::new(),
            bind_groups: HashMap::new(),
            surface: None,
            acquire_failures: VecDeque::new(),
            records: Vec::new(),
            presents: 0,
        }
    }

    fn lose(&mut self, reason: String) {
        if self.lost.is_none() {
            log::error!("DummyBackend: device lost: {reason}");
            self.lost = Some(reason);
        }
    }

    fn check_alive(&self) -> Result<(), GraphicsError> {
        match &self.lost {
            Some(reason) => Err(GraphicsError::DeviceLost(reason.clone())),
            None => Ok(()),
        }
    }

    fn memory_mut(&mut self, id: ResourceId) -> Result<&mut Memory, String> {
        if let Some(buffer) = self.buffers.get_mut(&id) {
            return Ok(&mut buffer.memory);
        }
        self.textures
            .get_mut(&id)
            .map(|texture| &mut texture.memory)
            .ok_or_else(|| format!("resource {id} does not exist or was destroyed"))
    }

    fn memory(&self, id: ResourceId) -> Option<&Memory> {
        self.buffers
            .get(&id)
            .map(|b| &b.memory)
            .or_else(|| self.textures.get(&id).map(|t| &t.memory))
    }

    fn in_flight(&self, id: ResourceId) -> bool {
        self.memory(id).is_some_and(|m| m.last_use > self.retired)
    }

    fn allocate(&mut self, bytes: u64, what: &str) -> Result<(), GraphicsError> {
        if let Some(budget) = self.memory_budget
            && self.allocated + bytes > budget
        {
            return Err(GraphicsError::OutOfMemory(format!(
                "{what} needs {bytes} bytes, {} of {budget} in use",
                self.allocated
            )));
        }
        self.allocated += bytes;
        Ok(())
    }

    /// Stamp every resource `commands` reference with `sequence`.
    fn mark_uses(&mut self, commands: &[Command], sequence: u64) {
        let mut touched = Vec::new();
        for command in commands {
            match command {
                Command::Barrier(transitions) => {
                    touched.extend(transitions.iter().map(|t| t.resource));
                }
                Command::CopyBuffer { src, dst, .. }
                | Command::CopyBufferToTexture { src, dst, .. } => {
                    touched.push(*src);
                    touched.push(*dst);
                }
                Command::BeginRenderPass(info) => {
                    touched.extend(info.colors.iter().map(|c| c.texture));
                    touched.extend(info.depth.iter().map(|d| d.texture));
                }
                Command::SetBindGroup { group, .. } => {
                    if let Some(members) = self.bind_groups.get(group) {
                        touched.extend(members.iter().copied());
                    }
                }
                Command::SetVertexBuffer { buffer, .. } | Command::SetIndexBuffer(buffer) => {
                    touched.push(*buffer);
                }
                Command::EndRenderPass
                | Command::SetPipeline(_)
                | Command::Draw { .. }
                | Command::DrawIndexed { .. } => {}
            }
        }
        for id in touched {
            if let Ok(memory) = self.memory_mut(id) {
                memory.last_use = sequence;
            }
        }
    }
}

struct Shared {
    state: Mutex<DeviceState>,
    /// Wakes the worker: new queue entries, releases, shutdown.
    work: Condvar,
    /// Wakes CPU waiters: completed value moved or device lost.
    progress: Condvar,
}

/// Simulated GPU backend.
pub struct DummyBackend {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for DummyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("DummyBackend")
            .field("mode", &state.mode)
            .field("completed", &state.completed)
            .field("submitted", &state.submitted)
            .field("lost", &state.lost)
            .finish_non_exhaustive()
    }
}

impl DummyBackend {
    /// Create a backend whose signals complete as soon as they execute.
    pub fn new() -> Result<Self, GraphicsError> {
        Self::with_mode(CompletionMode::Immediate)
    }

    /// Create a backend whose signals wait for [`release_until`](Self::release_until).
    pub fn manual() -> Result<Self, GraphicsError> {
        Self::with_mode(CompletionMode::Manual)
    }

    /// Create a backend with the given completion mode.
    pub fn with_mode(mode: CompletionMode) -> Result<Self, GraphicsError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(DeviceState::new(mode)),
            work: Condvar::new(),
            progress: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("dummy-gpu-queue".into())
            .spawn(move || worker_loop(&worker_shared))
            .map_err(|e| {
                GraphicsError::InitializationFailed(format!("failed to spawn GPU worker: {e}"))
            })?;
        log::debug!("DummyBackend: created ({mode:?} completion)");
        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Limit total simulated allocation; exceeding it fails creation with
    /// [`GraphicsError::OutOfMemory`].
    pub fn with_memory_budget(self, bytes: u64) -> Self {
        self.shared.state.lock().memory_budget = Some(bytes);
        self
    }

    /// Let queued signals up to `value` complete.
    ///
    /// Returns once every such signal already queued has been published.
    pub fn release_until(&self, value: u64) {
        let mut state = self.shared.state.lock();
        state.release_limit = state.release_limit.max(value);
        self.shared.work.notify_all();
        while state.lost.is_none()
            && !state.shutdown
            && state
                .queue
                .iter()
                .any(|entry| matches!(entry, QueueEntry::Signal(v) if *v <= value))
        {
            self.shared.progress.wait(&mut state);
        }
    }

    /// Switch to immediate completion, releasing everything queued.
    pub fn release_all(&self) {
        let mut state = self.shared.state.lock();
        state.mode = CompletionMode::Immediate;
        self.shared.work.notify_all();
    }

    /// Signal values queued but not yet visible.
    pub fn pending_signals(&self) -> Vec<u64> {
        self.shared
            .state
            .lock()
            .queue
            .iter()
            .filter_map(|entry| match entry {
                QueueEntry::Signal(value) => Some(*value),
                _ => None,
            })
            .collect()
    }

    /// Drain the log of executed submissions.
    pub fn take_records(&self) -> Vec<SubmissionRecord> {
        std::mem::take(&mut self.shared.state.lock().records)
    }

    /// Why the device was lost, if it was.
    pub fn lost_reason(&self) -> Option<String> {
        self.shared.state.lock().lost.clone()
    }

    /// Lose the device, as a driver reset would.
    pub fn lose_device(&self, reason: impl Into<String>) {
        let mut state = self.shared.state.lock();
        state.lose(reason.into());
        self.shared.progress.notify_all();
    }

    /// Fail the next surface acquire with `error`, as a window system does
    /// after the window changed under the swapchain.
    pub fn fail_next_acquire(&self, error: GraphicsError) {
        self.shared.state.lock().acquire_failures.push_back(error);
    }

    /// State of a resource as of the last executed command.
    pub fn resource_state(&self, id: ResourceId) -> Option<ResourceState> {
        self.shared.state.lock().memory(id).map(|m| m.state)
    }

    /// Number of live resources of every kind.
    pub fn live_resources(&self) -> usize {
        let state = self.shared.state.lock();
        state.buffers.len() + state.textures.len() + state.pipelines.len() + state.bind_groups.len()
    }

    /// Number of presents the queue has executed.
    pub fn presents(&self) -> u64 {
        self.shared.state.lock().presents
    }

    fn enqueue(&self, state: &mut DeviceState, entry: QueueEntry) {
        state.queue.push_back(entry);
        self.shared.work.notify_all();
    }
}

impl Drop for DummyBackend {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.work.notify_all();
        }
        if let Some(worker) = self.worker.lock().take()
            && worker.join().is_err()
        {
            log::error!("DummyBackend: GPU worker panicked");
        }
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn supports_wireframe(&self) -> bool {
        true
    }

    fn create_buffer(
        &self,
        id: ResourceId,
        descriptor: &BufferDescriptor,
    ) -> Result<(), GraphicsError> {
        let mut state = self.shared.state.lock();
        state.check_alive()?;
        state.allocate(descriptor.size, "buffer")?;
        let initial = if descriptor.is_mapped() {
            ResourceState::GenericRead
        } else {
            ResourceState::CopyDest
        };
        log::trace!(
            "DummyBackend: creating buffer {id} {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        state.buffers.insert(
            id,
            BufferEntry {
                descriptor: descriptor.clone(),
                memory: Memory {
                    data: vec![0; descriptor.size as usize],
                    state: initial,
                    last_use: 0,
                },
            },
        );
        Ok(())
    }

    fn create_texture(
        &self,
        id: ResourceId,
        descriptor: &TextureDescriptor,
        initial_state: ResourceState,
    ) -> Result<(), GraphicsError> {
        let mut state = self.shared.state.lock();
        state.check_alive()?;
        let bytes = descriptor.total_bytes();
        state.allocate(bytes, "texture")?;
        log::trace!(
            "DummyBackend: creating texture {id} {:?} ({}x{}x{})",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.size.depth
        );
        state.textures.insert(
            id,
            TextureEntry {
                descriptor: descriptor.clone(),
                memory: Memory {
                    data: vec![0; bytes as usize],
                    state: initial_state,
                    last_use: 0,
                },
            },
        );
        Ok(())
    }

    fn create_pipeline(
        &self,
        id: ResourceId,
        descriptor: &PipelineDescriptor,
    ) -> Result<(), GraphicsError> {
        let mut state = self.shared.state.lock();
        state.check_alive()?;
        log::trace!("DummyBackend: creating pipeline {id} '{}'", descriptor.label);
        state.pipelines.insert(
            id,
            PipelineEntry {
                label: descriptor.label.clone(),
                color_formats: descriptor.color_formats.clone(),
                depth_format: descriptor.depth_format,
            },
        );
        Ok(())
    }

    fn create_bind_group(
        &self,
        id: ResourceId,
        descriptor: &BindGroupDescriptor,
    ) -> Result<(), GraphicsError> {
        let mut state = self.shared.state.lock();
        state.check_alive()?;
        let mut members = Vec::new();
        for (_, resource) in &descriptor.entries {
            let member = match resource {
                BindingResource::Buffer(buffer) => buffer.id(),
                BindingResource::Texture(texture) => texture.id(),
                BindingResource::Sampler(_) => continue,
            };
            if state.memory(member).is_none() {
                return Err(GraphicsError::InvalidParameter(format!(
                    "bind group {:?} references destroyed resource {member}",
                    descriptor.label
                )));
            }
            members.push(member);
        }
        state.bind_groups.insert(id, members);
        Ok(())
    }

    fn destroy(&self, id: ResourceId) {
        let mut state = self.shared.state.lock();
        if state.in_flight(id) {
            let reason = format!(
                "resource {id} destroyed while submission {} still uses it",
                state.memory(id).map_or(0, |m| m.last_use)
            );
            state.lose(reason);
            self.shared.progress.notify_all();
        }
        if let Some(buffer) = state.buffers.remove(&id) {
            state.allocated -= buffer.descriptor.size;
        } else if let Some(texture) = state.textures.remove(&id) {
            state.allocated -= texture.descriptor.total_bytes();
        } else if state.pipelines.remove(&id).is_none() {
            state.bind_groups.remove(&id);
        }
    }

    fn write_mapped(&self, id: ResourceId, offset: u64, data: &[u8]) -> Result<(), GraphicsError> {
        let mut state = self.shared.state.lock();
        state.check_alive()?;
        let retired = state.retired;
        let Some(buffer) = state.buffers.get_mut(&id) else {
            return Err(GraphicsError::InvalidParameter(format!(
                "write to unknown buffer {id}"
            )));
        };
        if !buffer.descriptor.is_mapped() {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer {id} {:?} is not CPU-mapped",
                buffer.descriptor.label
            )));
        }
        let end = offset + data.len() as u64;
        if end > buffer.descriptor.size {
            return Err(GraphicsError::InvalidParameter(format!(
                "write of {} bytes at {offset} overflows buffer {id} of {} bytes",
                data.len(),
                buffer.descriptor.size
            )));
        }
        if buffer.memory.last_use > retired {
            let reason = format!(
                "CPU write into buffer {id} {:?} while submission {} may still read it (retired: {retired})",
                buffer.descriptor.label, buffer.memory.last_use
            );
            state.lose(reason.clone());
            self.shared.progress.notify_all();
            return Err(GraphicsError::Validation(reason));
        }
        buffer.memory.data[offset as usize..end as usize].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, id: ResourceId) -> Result<Vec<u8>, GraphicsError> {
        let state = self.shared.state.lock();
        if state.in_flight(id) {
            return Err(GraphicsError::Validation(format!(
                "readback of buffer {id} while the GPU still uses it"
            )));
        }
        state
            .buffers
            .get(&id)
            .map(|b| b.memory.data.clone())
            .ok_or_else(|| GraphicsError::InvalidParameter(format!("unknown buffer {id}")))
    }

    fn read_texture(&self, id: ResourceId) -> Result<Vec<u8>, GraphicsError> {
        let state = self.shared.state.lock();
        if state.in_flight(id) {
            return Err(GraphicsError::Validation(format!(
                "readback of texture {id} while the GPU still uses it"
            )));
        }
        state
            .textures
            .get(&id)
            .map(|t| t.memory.data.clone())
            .ok_or_else(|| GraphicsError::InvalidParameter(format!("unknown texture {id}")))
    }

    fn submit(&self, commands: Arc<Vec<Command>>) -> Result<(), GraphicsError> {
        let mut state = self.shared.state.lock();
        state.check_alive()?;
        state.submitted += 1;
        let sequence = state.submitted;
        state.mark_uses(&commands, sequence);
        log::trace!(
            "DummyBackend: queued submission {sequence} ({} commands)",
            commands.len()
        );
        self.enqueue(&mut state, QueueEntry::Submit { sequence, commands });
        Ok(())
    }

    fn signal(&self, value: u64) -> Result<(), GraphicsError> {
        let mut state = self.shared.state.lock();
        state.check_alive()?;
        self.enqueue(&mut state, QueueEntry::Signal(value));
        Ok(())
    }

    fn completed_value(&self) -> Result<u64, GraphicsError> {
        let state = self.shared.state.lock();
        state.check_alive()?;
        Ok(state.completed)
    }

    fn wait_for_value(&self, value: u64, timeout: Duration) -> Result<bool, GraphicsError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            state.check_alive()?;
            if state.completed >= value {
                return Ok(true);
            }
            if self
                .shared
                .progress
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                state.check_alive()?;
                return Ok(state.completed >= value);
            }
        }
    }

    fn configure_surface(
        &self,
        config: &SurfaceConfiguration,
        images: &[ResourceId],
    ) -> Result<(), GraphicsError> {
        let mut state = self.shared.state.lock();
        state.check_alive()?;
        if let Some(old) = state.surface.take() {
            for image in old.images {
                if state.in_flight(image) {
                    let reason = format!("surface image {image} replaced while still in use");
                    state.lose(reason.clone());
                    self.shared.progress.notify_all();
                    return Err(GraphicsError::Validation(reason));
                }
                if let Some(texture) = state.textures.remove(&image) {
                    state.allocated -= texture.descriptor.total_bytes();
                }
            }
        }
        for (index, &image) in images.iter().enumerate() {
            let descriptor = TextureDescriptor::new_2d(
                config.width,
                config.height,
                config.format,
                TextureUsage::RENDER_ATTACHMENT,
            )
            .with_label(format!("surface image {index}"));
            let bytes = descriptor.total_bytes();
            state.allocate(bytes, "surface image")?;
            state.textures.insert(
                image,
                TextureEntry {
                    descriptor,
                    memory: Memory {
                        data: vec![0; bytes as usize],
                        state: ResourceState::Present,
                        last_use: 0,
                    },
                },
            );
        }
        state.surface = Some(SurfaceEntry {
            images: images.to_vec(),
            current: 0,
        });
        log::debug!(
            "DummyBackend: surface configured {}x{} with {} images",
            config.width,
            config.height,
            images.len()
        );
        Ok(())
    }

    fn acquire_image(&self) -> Result<u32, GraphicsError> {
        let mut state = self.shared.state.lock();
        state.check_alive()?;
        if let Some(error) = state.acquire_failures.pop_front() {
            log::debug!("DummyBackend: acquire failed: {error}");
            return Err(error);
        }
        state
            .surface
            .as_ref()
            .map(|s| s.current)
            .ok_or_else(|| GraphicsError::Surface("surface not configured".into()))
    }

    fn current_image_index(&self) -> u32 {
        self.shared
            .state
            .lock()
            .surface
            .as_ref()
            .map_or(0, |s| s.current)
    }

    fn present(&self) -> Result<(), GraphicsError> {
        let mut state = self.shared.state.lock();
        state.check_alive()?;
        let surface = state
            .surface
            .as_mut()
            .ok_or_else(|| GraphicsError::Surface("surface not configured".into()))?;
        let image = surface.images[surface.current as usize];
        surface.current = (surface.current + 1) % surface.images.len() as u32;
        self.enqueue(&mut state, QueueEntry::Present(image));
        Ok(())
    }
}

fn worker_loop(shared: &Shared) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            break;
        }
        let ready = match state.queue.front() {
            None => false,
            Some(QueueEntry::Signal(value)) => {
                state.mode == CompletionMode::Immediate || *value <= state.release_limit
            }
            Some(_) => true,
        };
        if !ready {
            shared.work.wait(&mut state);
            continue;
        }
        let Some(entry) = state.queue.pop_front() else {
            continue;
        };
        match entry {
            QueueEntry::Submit { sequence, commands } => {
                if state.lost.is_none() {
                    let mut record = SubmissionRecord {
                        sequence,
                        ..SubmissionRecord::default()
                    };
                    if let Err(reason) = execute(&mut state, &commands, &mut record) {
                        state.lose(format!("submission {sequence}: {reason}"));
                        shared.progress.notify_all();
                    }
                    state.records.push(record);
                }
                // The stream is released before any later signal publishes.
                drop(commands);
                state.executed = sequence;
            }
            QueueEntry::Signal(value) => {
                state.retired = state.executed;
                state.completed = state.completed.max(value);
                shared.progress.notify_all();
            }
            QueueEntry::Present(image) => {
                if state.lost.is_none() {
                    match state.memory(image).map(|m| m.state) {
                        Some(ResourceState::Present) => {}
                        Some(other) => {
                            state.lose(format!("presented image {image} is in {other:?}"));
                            shared.progress.notify_all();
                        }
                        None => {
                            state.lose(format!("presented image {image} does not exist"));
                            shared.progress.notify_all();
                        }
                    }
                }
                state.presents += 1;
            }
        }
    }
}

#[derive(Default)]
struct ActivePass {
    label: String,
    attachments: Vec<ResourceId>,
    color_formats: Vec<TextureFormat>,
    depth_format: Option<TextureFormat>,
    pipeline: Option<String>,
    index_count: Option<u64>,
    draws: Vec<DrawRecord>,
}

fn execute(
    state: &mut DeviceState,
    commands: &[Command],
    record: &mut SubmissionRecord,
) -> Result<(), String> {
    let mut pass: Option<ActivePass> = None;

    for command in commands {
        match command {
            Command::Barrier(transitions) => {
                if pass.is_some() {
                    return Err("barrier recorded inside a render pass".into());
                }
                for transition in transitions {
                    let memory = state.memory_mut(transition.resource)?;
                    if memory.state != transition.from {
                        return Err(format!(
                            "barrier on {} expects {:?} but the resource is {:?}",
                            transition.resource, transition.from, memory.state
                        ));
                    }
                    memory.state = transition.to;
                    record.transitions.push(*transition);
                }
            }
            Command::CopyBuffer {
                src,
                src_offset,
                dst,
                dst_offset,
                size,
            } => {
                if pass.is_some() {
                    return Err("copy recorded inside a render pass".into());
                }
                let bytes = read_copy_source(state, *src, *src_offset, *size)?;
                let target = state
                    .buffers
                    .get_mut(dst)
                    .ok_or_else(|| format!("copy into missing buffer {dst}"))?;
                expect_state(*dst, &target.memory, ResourceState::CopyDest)?;
                let end = dst_offset + size;
                if end > target.descriptor.size {
                    return Err(format!("copy overflows buffer {dst}"));
                }
                target.memory.data[*dst_offset as usize..end as usize].copy_from_slice(&bytes);
                record.copies += 1;
            }
            Command::CopyBufferToTexture {
                src,
                src_offset,
                bytes_per_row,
                dst,
                layer,
                width,
                height,
            } => {
                if pass.is_some() {
                    return Err("copy recorded inside a render pass".into());
                }
                let (row_bytes, layer_bytes) = {
                    let target = state
                        .textures
                        .get(dst)
                        .ok_or_else(|| format!("copy into missing texture {dst}"))?;
                    expect_state(*dst, &target.memory, ResourceState::CopyDest)?;
                    let desc = &target.descriptor;
                    if *layer >= desc.size.depth
                        || *width != desc.size.width
                        || *height != desc.size.height
                    {
                        return Err(format!(
                            "copy region {width}x{height} layer {layer} does not fit texture {dst}"
                        ));
                    }
                    (desc.row_bytes() as u64, desc.layer_bytes())
                };
                if (*bytes_per_row as u64) < row_bytes {
                    return Err(format!(
                        "row pitch {bytes_per_row} is smaller than {row_bytes} bytes"
                    ));
                }
                let span = *bytes_per_row as u64 * (*height as u64 - 1) + row_bytes;
                let source = read_copy_source(state, *src, *src_offset, span)?;
                let target = state
                    .textures
                    .get_mut(dst)
                    .ok_or_else(|| format!("copy into missing texture {dst}"))?;
                let base = *layer as u64 * layer_bytes;
                for row in 0..*height as u64 {
                    let from = (row * *bytes_per_row as u64) as usize;
                    let to = (base + row * row_bytes) as usize;
                    target.memory.data[to..to + row_bytes as usize]
                        .copy_from_slice(&source[from..from + row_bytes as usize]);
                }
                record.copies += 1;
            }
            Command::BeginRenderPass(info) => {
                if pass.is_some() {
                    return Err(format!("pass '{}' begins inside another pass", info.label));
                }
                pass = Some(begin_pass(state, info)?);
            }
            Command::EndRenderPass => {
                let finished = pass.take().ok_or("end of a pass that never began")?;
                record.passes.push(PassRecord {
                    label: finished.label,
                    draws: finished.draws,
                });
            }
            Command::SetPipeline(id) => {
                let active = pass.as_mut().ok_or("pipeline bound outside a pass")?;
                let pipeline = state
                    .pipelines
                    .get(id)
                    .ok_or_else(|| format!("pipeline {id} does not exist"))?;
                if pipeline.color_formats != active.color_formats {
                    return Err(format!(
                        "pipeline '{}' targets {:?} but pass '{}' has {:?}",
                        pipeline.label, pipeline.color_formats, active.label, active.color_formats
                    ));
                }
                if pipeline.depth_format.is_some() && pipeline.depth_format != active.depth_format
                {
                    return Err(format!(
                        "pipeline '{}' needs depth {:?} but pass '{}' has {:?}",
                        pipeline.label, pipeline.depth_format, active.label, active.depth_format
                    ));
                }
                active.pipeline = Some(pipeline.label.clone());
            }
            Command::SetBindGroup { group, .. } => {
                let active = pass.as_ref().ok_or("bind group set outside a pass")?;
                let members = state
                    .bind_groups
                    .get(group)
                    .ok_or_else(|| format!("bind group {group} does not exist"))?;
                for member in members {
                    if active.attachments.contains(member) {
                        return Err(format!(
                            "pass '{}' samples {member} while rendering to it",
                            active.label
                        ));
                    }
                    if let Some(buffer) = state.buffers.get(member) {
                        expect_state(*member, &buffer.memory, ResourceState::GenericRead)?;
                    } else if let Some(texture) = state.textures.get(member) {
                        expect_state(*member, &texture.memory, ResourceState::ShaderRead)?;
                    } else {
                        return Err(format!("bind group {group} uses destroyed {member}"));
                    }
                }
            }
            Command::SetVertexBuffer { buffer, .. } => {
                pass.as_ref().ok_or("vertex buffer set outside a pass")?;
                let entry = state
                    .buffers
                    .get(buffer)
                    .ok_or_else(|| format!("vertex buffer {buffer} does not exist"))?;
                expect_state(*buffer, &entry.memory, ResourceState::VertexBuffer)?;
            }
            Command::SetIndexBuffer(buffer) => {
                let active = pass.as_mut().ok_or("index buffer set outside a pass")?;
                let entry = state
                    .buffers
                    .get(buffer)
                    .ok_or_else(|| format!("index buffer {buffer} does not exist"))?;
                expect_state(*buffer, &entry.memory, ResourceState::IndexBuffer)?;
                active.index_count = Some(entry.descriptor.size / 4);
            }
            Command::Draw {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            } => {
                let active = pass.as_mut().ok_or("draw outside a pass")?;
                let pipeline = active.pipeline.clone().ok_or("draw without a pipeline")?;
                active.draws.push(DrawRecord {
                    pipeline,
                    indexed: false,
                    count: *vertex_count,
                    first: *first_vertex,
                    base_vertex: 0,
                    instance_count: *instance_count,
                    first_instance: *first_instance,
                });
            }
            Command::DrawIndexed {
                index_count,
                instance_count,
                first_index,
                base_vertex,
                first_instance,
            } => {
                let active = pass.as_mut().ok_or("draw outside a pass")?;
                let pipeline = active.pipeline.clone().ok_or("draw without a pipeline")?;
                let available = active.index_count.ok_or("indexed draw without an index buffer")?;
                if *first_index as u64 + *index_count as u64 > available {
                    return Err(format!(
                        "indices {first_index}..{} exceed the {available} bound",
                        first_index + index_count
                    ));
                }
                active.draws.push(DrawRecord {
                    pipeline,
                    indexed: true,
                    count: *index_count,
                    first: *first_index,
                    base_vertex: *base_vertex,
                    instance_count: *instance_count,
                    first_instance: *first_instance,
                });
            }
        }
    }

    if let Some(open) = pass {
        return Err(format!("submission ends inside pass '{}'", open.label));
    }
    Ok(())
}

fn expect_state(id: ResourceId, memory: &Memory, expected: ResourceState) -> Result<(), String> {
    if memory.state == expected {
        Ok(())
    } else {
        Err(format!(
            "resource {id} is {:?}, its use requires {expected:?}",
            memory.state
        ))
    }
}

fn read_copy_source(
    state: &DeviceState,
    src: ResourceId,
    offset: u64,
    size: u64,
) -> Result<Vec<u8>, String> {
    let source = state
        .buffers
        .get(&src)
        .ok_or_else(|| format!("copy from missing buffer {src}"))?;
    if !matches!(
        source.memory.state,
        ResourceState::GenericRead | ResourceState::CopySource
    ) {
        return Err(format!(
            "copy source {src} is {:?}, expected GenericRead or CopySource",
            source.memory.state
        ));
    }
    let end = offset + size;
    if end > source.descriptor.size {
        return Err(format!("copy reads past the end of buffer {src}"));
    }
    Ok(source.memory.data[offset as usize..end as usize].to_vec())
}

fn begin_pass(state: &mut DeviceState, info: &RenderPassInfo) -> Result<ActivePass, String> {
    let mut active = ActivePass {
        label: info.label.clone(),
        ..ActivePass::default()
    };

    for color in &info.colors {
        let texture = state
            .textures
            .get_mut(&color.texture)
            .ok_or_else(|| format!("pass '{}' targets missing {}", info.label, color.texture))?;
        expect_state(color.texture, &texture.memory, ResourceState::RenderTarget)?;
        if let LoadOp::Clear(rgba) = color.load {
            let texel = encode_color(texture.descriptor.format, rgba);
            fill(&mut texture.memory.data, &texel);
        }
        active.attachments.push(color.texture);
        active.color_formats.push(texture.descriptor.format);
    }

    if let Some(depth) = &info.depth {
        let texture = state
            .textures
            .get_mut(&depth.texture)
            .ok_or_else(|| format!("pass '{}' targets missing {}", info.label, depth.texture))?;
        expect_state(depth.texture, &texture.memory, ResourceState::DepthWrite)?;
        if let LoadOp::Clear(value) = depth.load {
            fill(&mut texture.memory.data, &value.to_le_bytes());
        }
        active.attachments.push(depth.texture);
        active.depth_format = Some(texture.descriptor.format);
    }

    Ok(active)
}

fn fill(data: &mut [u8], texel: &[u8]) {
    for chunk in data.chunks_exact_mut(texel.len()) {
        chunk.copy_from_slice(texel);
    }
}

fn encode_color(format: TextureFormat, rgba: [f32; 4]) -> Vec<u8> {
    let unorm = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    match format {
        TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => rgba.map(unorm).to_vec(),
        TextureFormat::Bgra8Unorm | TextureFormat::Bgra8UnormSrgb => {
            [rgba[2], rgba[1], rgba[0], rgba[3]].map(unorm).to_vec()
        }
        TextureFormat::Rgba16Float => rgba
            .iter()
            .flat_map(|v| half::f16::from_f32(*v).to_le_bytes())
            .collect(),
        TextureFormat::Rgba32Float => rgba.iter().flat_map(|v| v.to_le_bytes()).collect(),
        TextureFormat::Depth32Float => rgba[0].to_le_bytes().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BufferUsage;
    use rstest::rstest;

    fn id(raw: u64) -> ResourceId {
        ResourceId::new(raw)
    }

    #[test]
    fn test_signal_completes_in_order() {
        let backend = DummyBackend::new().unwrap();
        backend.submit(Arc::new(Vec::new())).unwrap();
        backend.signal(1).unwrap();
        assert!(backend.wait_for_value(1, Duration::from_secs(5)).unwrap());
        assert_eq!(backend.completed_value().unwrap(), 1);
    }

    #[test]
    fn test_manual_mode_holds_signals() {
        let backend = DummyBackend::manual().unwrap();
        backend.signal(1).unwrap();
        backend.signal(2).unwrap();
        assert!(!backend.wait_for_value(1, Duration::from_millis(20)).unwrap());
        assert_eq!(backend.pending_signals(), vec![1, 2]);

        backend.release_until(1);
        assert!(backend.wait_for_value(1, Duration::from_secs(5)).unwrap());
        assert_eq!(backend.completed_value().unwrap(), 1);

        backend.release_all();
        assert!(backend.wait_for_value(2, Duration::from_secs(5)).unwrap());
    }

    #[test]
    fn test_wrong_barrier_source_loses_device() {
        let backend = DummyBackend::new().unwrap();
        let desc = TextureDescriptor::new_2d(
            4,
            4,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_ATTACHMENT,
        );
        backend
            .create_texture(id(1), &desc, ResourceState::ShaderRead)
            .unwrap();
        let commands = vec![Command::Barrier(vec![Transition::new(
            id(1),
            ResourceState::Present,
            ResourceState::RenderTarget,
        )])];
        backend.submit(Arc::new(commands)).unwrap();
        backend.signal(1).unwrap();

        let err = backend
            .wait_for_value(1, Duration::from_secs(5))
            .unwrap_err();
        assert!(err.is_device_lost());
        assert!(backend.lost_reason().unwrap().contains("expects Present"));
    }

    #[test]
    fn test_copy_and_readback() {
        let backend = DummyBackend::new().unwrap();
        let staging = BufferDescriptor::new(8, BufferUsage::MAP_WRITE | BufferUsage::COPY_SRC);
        let target = BufferDescriptor::new(8, BufferUsage::VERTEX | BufferUsage::COPY_DST);
        backend.create_buffer(id(1), &staging).unwrap();
        backend.create_buffer(id(2), &target).unwrap();
        backend.write_mapped(id(1), 0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

        let commands = vec![
            Command::CopyBuffer {
                src: id(1),
                src_offset: 4,
                dst: id(2),
                dst_offset: 0,
                size: 4,
            },
            Command::Barrier(vec![Transition::new(
                id(2),
                ResourceState::CopyDest,
                ResourceState::VertexBuffer,
            )]),
        ];
        backend.submit(Arc::new(commands)).unwrap();
        backend.signal(1).unwrap();
        assert!(backend.wait_for_value(1, Duration::from_secs(5)).unwrap());

        assert_eq!(&backend.read_buffer(id(2)).unwrap()[..4], &[5, 6, 7, 8]);
        assert_eq!(backend.resource_state(id(2)), Some(ResourceState::VertexBuffer));
        assert_eq!(backend.take_records()[0].copies, 1);
    }

    #[test]
    fn test_cpu_write_into_in_flight_buffer_detected() {
        let backend = DummyBackend::manual().unwrap();
        let desc = BufferDescriptor::new(16, BufferUsage::MAP_WRITE | BufferUsage::COPY_SRC);
        backend.create_buffer(id(1), &desc).unwrap();
        backend
            .create_buffer(id(2), &BufferDescriptor::new(16, BufferUsage::COPY_DST))
            .unwrap();
        let copy = Command::CopyBuffer {
            src: id(1),
            src_offset: 0,
            dst: id(2),
            dst_offset: 0,
            size: 16,
        };
        backend.submit(Arc::new(vec![copy])).unwrap();
        backend.signal(1).unwrap();

        let err = backend.write_mapped(id(1), 0, &[0; 4]).unwrap_err();
        assert!(matches!(err, GraphicsError::Validation(_)));
        assert!(backend.lost_reason().is_some());
    }

    #[test]
    fn test_write_after_retire_is_fine() {
        let backend = DummyBackend::manual().unwrap();
        let desc = BufferDescriptor::new(16, BufferUsage::MAP_WRITE | BufferUsage::COPY_SRC);
        backend.create_buffer(id(1), &desc).unwrap();
        backend
            .create_buffer(id(2), &BufferDescriptor::new(16, BufferUsage::COPY_DST))
            .unwrap();
        let copy = Command::CopyBuffer {
            src: id(1),
            src_offset: 0,
            dst: id(2),
            dst_offset: 0,
            size: 16,
        };
        backend.submit(Arc::new(vec![copy])).unwrap();
        backend.signal(1).unwrap();
        backend.release_until(1);
        assert!(backend.wait_for_value(1, Duration::from_secs(5)).unwrap());

        backend.write_mapped(id(1), 0, &[9; 4]).unwrap();
        assert!(backend.lost_reason().is_none());
    }

    #[test]
    fn test_memory_budget() {
        let backend = DummyBackend::new().unwrap().with_memory_budget(64);
        backend
            .create_buffer(id(1), &BufferDescriptor::new(48, BufferUsage::VERTEX))
            .unwrap();
        let err = backend
            .create_buffer(id(2), &BufferDescriptor::new(32, BufferUsage::VERTEX))
            .unwrap_err();
        assert!(matches!(err, GraphicsError::OutOfMemory(_)));

        backend.destroy(id(1));
        backend
            .create_buffer(id(2), &BufferDescriptor::new(32, BufferUsage::VERTEX))
            .unwrap();
    }

    #[test]
    fn test_release_publishes_before_returning() {
        let backend = DummyBackend::manual().unwrap();
        backend.submit(Arc::new(Vec::new())).unwrap();
        backend.signal(1).unwrap();
        backend.signal(2).unwrap();
        backend.release_until(1);
        assert_eq!(backend.completed_value().unwrap(), 1);
        assert_eq!(backend.pending_signals(), vec![2]);
        backend.release_all();
    }

    #[test]
    fn test_injected_acquire_failure_is_one_shot() {
        let backend = DummyBackend::new().unwrap();
        backend
            .configure_surface(&SurfaceConfiguration::new(8, 8), &[id(10), id(11)])
            .unwrap();
        backend.fail_next_acquire(GraphicsError::SurfaceTimeout);
        assert_eq!(backend.acquire_image().unwrap_err(), GraphicsError::SurfaceTimeout);
        assert_eq!(backend.acquire_image().unwrap(), 0);
    }

    #[test]
    fn test_present_rotates_images() {
        let backend = DummyBackend::new().unwrap();
        let config = SurfaceConfiguration::new(8, 8);
        backend.configure_surface(&config, &[id(10), id(11)]).unwrap();
        assert_eq!(backend.acquire_image().unwrap(), 0);
        backend.present().unwrap();
        assert_eq!(backend.current_image_index(), 1);
        backend.present().unwrap();
        assert_eq!(backend.current_image_index(), 0);

        backend.signal(1).unwrap();
        assert!(backend.wait_for_value(1, Duration::from_secs(5)).unwrap());
        assert_eq!(backend.presents(), 2);
        assert!(backend.lost_reason().is_none());
    }

    #[rstest]
    #[case::one(1.0, 0x3c00)]
    #[case::negative(-2.0, 0xc000)]
    #[case::overflow(65520.0, 0x7c00)]
    #[case::denormal(1e-5, 0x00a8)]
    #[case::tie_to_even_down(1.000_488_281_25, 0x3c00)]
    #[case::tie_to_even_up(1.001_464_843_75, 0x3c02)]
    fn test_rgba16_float_texels(#[case] value: f32, #[case] bits: u16) {
        let texel = encode_color(TextureFormat::Rgba16Float, [value, 0.0, 0.0, 1.0]);
        assert_eq!(texel.len(), 8);
        assert_eq!(u16::from_le_bytes([texel[0], texel[1]]), bits);
        assert_eq!(u16::from_le_bytes([texel[6], texel[7]]), 0x3c00);
    }

    #[test]
    fn test_rgba16_float_keeps_nan() {
        let texel = encode_color(TextureFormat::Rgba16Float, [f32::NAN, 0.0, 0.0, 0.0]);
        let bits = u16::from_le_bytes([texel[0], texel[1]]);
        assert_eq!(bits & 0x7c00, 0x7c00);
        assert_ne!(bits & 0x03ff, 0);
    }

    #[test]
    fn test_encode_bgra() {
        let texel = encode_color(TextureFormat::Bgra8Unorm, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(texel, vec![0, 0, 255, 255]);
    }
}
