//! wgpu GPU backend implementation.
//!
//! This backend uses wgpu for cross-platform GPU access, supporting
//! Vulkan, Metal, DX12 and GL.
//!
//! wgpu has no timeline semaphore. The completion counter is emulated: each
//! [`signal`](GpuBackend::signal) registers an `on_submitted_work_done`
//! callback that raises the counter, and waiting polls the device until the
//! callback has run.

mod conversion;
mod encode;
mod resources;
mod surface;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::command::Command;
use crate::error::GraphicsError;
use crate::resources::ResourceId;
use crate::state::ResourceState;
use crate::swapchain::SurfaceConfiguration;
use crate::types::{
    BindGroupDescriptor, BufferDescriptor, PipelineDescriptor, TextureDescriptor, TextureFormat,
    TextureUsage,
};

use super::GpuBackend;
use encode::Resolver;
use surface::Presentation;

/// A backend object.
pub(crate) enum WgpuObject {
    Buffer {
        buffer: wgpu::Buffer,
        /// Requested size; the allocation is rounded up to 4 bytes.
        size: u64,
    },
    Texture {
        texture: wgpu::Texture,
        attachment: wgpu::TextureView,
        descriptor: TextureDescriptor,
    },
    Pipeline(wgpu::RenderPipeline),
    BindGroup(wgpu::BindGroup),
}

/// wgpu-based GPU backend.
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    objects: Mutex<HashMap<ResourceId, WgpuObject>>,
    presentation: Mutex<Presentation>,
    completed: Arc<AtomicU64>,
    lost: Arc<Mutex<Option<String>>>,
    wireframe: bool,
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("adapter", &self.adapter.get_info().name)
            .field("completed", &self.completed.load(Ordering::Acquire))
            .finish()
    }
}

impl WgpuBackend {
    /// Create a backend without a window. Presentation images are offscreen
    /// textures.
    pub fn headless() -> Result<Self, GraphicsError> {
        let instance = Self::create_instance();
        Self::from_instance(instance, None)
    }

    /// Create a backend presenting to `window`.
    pub fn with_window<W>(window: W) -> Result<Self, GraphicsError>
    where
        W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
    {
        let instance = Self::create_instance();
        let surface = instance.create_surface(window).map_err(|e| {
            GraphicsError::InitializationFailed(format!("surface creation failed: {e}"))
        })?;
        Self::from_instance(instance, Some(surface))
    }

    fn create_instance() -> wgpu::Instance {
        let mut flags = wgpu::InstanceFlags::default();
        if cfg!(debug_assertions) {
            flags |= wgpu::InstanceFlags::VALIDATION;
        }
        wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags,
            backend_options: wgpu::BackendOptions::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        })
    }

    fn from_instance(
        instance: wgpu::Instance,
        surface: Option<wgpu::Surface<'static>>,
    ) -> Result<Self, GraphicsError> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface.as_ref(),
            force_fallback_adapter: false,
        }))
        .map_err(|e| {
            GraphicsError::InitializationFailed(format!("no compatible GPU adapter: {e}"))
        })?;

        log::info!("wgpu adapter: {:?}", adapter.get_info());

        let wireframe = adapter.features().contains(wgpu::Features::POLYGON_MODE_LINE);
        let required_features = if wireframe {
            wgpu::Features::POLYGON_MODE_LINE
        } else {
            log::warn!("Adapter has no line rasterization; wireframe is unavailable");
            wgpu::Features::empty()
        };

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Map Viewer Device"),
            required_features,
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| GraphicsError::InitializationFailed(format!("device creation failed: {e}")))?;

        let lost = Arc::new(Mutex::new(None::<String>));
        {
            let lost = Arc::clone(&lost);
            device.set_device_lost_callback(move |reason, message| {
                log::error!("wgpu device lost ({reason:?}): {message}");
                lost.lock().get_or_insert(format!("{reason:?}: {message}"));
            });
        }
        {
            let lost = Arc::clone(&lost);
            device.on_uncaptured_error(Arc::new(move |error: wgpu::Error| {
                log::error!("wgpu error: {error}");
                lost.lock().get_or_insert(format!("validation: {error}"));
            }));
        }

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            objects: Mutex::new(HashMap::new()),
            presentation: Mutex::new(Presentation::new(surface)),
            completed: Arc::new(AtomicU64::new(0)),
            lost,
            wireframe,
        })
    }

    /// The first window surface format the renderer can target, if a window
    /// is attached.
    pub fn preferred_surface_format(&self) -> Option<TextureFormat> {
        let presentation = self.presentation.lock();
        let surface = presentation.surface()?;
        surface
            .get_capabilities(&self.adapter)
            .formats
            .into_iter()
            .find_map(conversion::convert_surface_format)
    }

    /// Get the wgpu device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    fn check_alive(&self) -> Result<(), GraphicsError> {
        match self.lost.lock().as_ref() {
            Some(reason) => Err(GraphicsError::DeviceLost(reason.clone())),
            None => Ok(()),
        }
    }

    fn insert(&self, id: ResourceId, object: WgpuObject) {
        self.objects.lock().insert(id, object);
    }
}

impl GpuBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn supports_wireframe(&self) -> bool {
        self.wireframe
    }

    fn create_buffer(
        &self,
        id: ResourceId,
        descriptor: &BufferDescriptor,
    ) -> Result<(), GraphicsError> {
        self.check_alive()?;
        let object = self.build_buffer(descriptor);
        self.insert(id, object);
        Ok(())
    }

    fn create_texture(
        &self,
        id: ResourceId,
        descriptor: &TextureDescriptor,
        _initial_state: ResourceState,
    ) -> Result<(), GraphicsError> {
        self.check_alive()?;
        let object = self.build_texture(descriptor);
        self.insert(id, object);
        Ok(())
    }

    fn create_pipeline(
        &self,
        id: ResourceId,
        descriptor: &PipelineDescriptor,
    ) -> Result<(), GraphicsError> {
        self.check_alive()?;
        let object = self.build_pipeline(descriptor)?;
        self.insert(id, object);
        Ok(())
    }

    fn create_bind_group(
        &self,
        id: ResourceId,
        descriptor: &BindGroupDescriptor,
    ) -> Result<(), GraphicsError> {
        self.check_alive()?;
        let mut objects = self.objects.lock();
        let object = self.build_bind_group(descriptor, &objects)?;
        objects.insert(id, object);
        Ok(())
    }

    fn destroy(&self, id: ResourceId) {
        // wgpu keeps objects alive while queued work references them.
        self.objects.lock().remove(&id);
    }

    fn write_mapped(&self, id: ResourceId, offset: u64, data: &[u8]) -> Result<(), GraphicsError> {
        self.check_alive()?;
        let objects = self.objects.lock();
        let Some(WgpuObject::Buffer { buffer, .. }) = objects.get(&id) else {
            return Err(GraphicsError::InvalidParameter(format!("buffer {id} does not exist")));
        };
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "mapped write at offset {offset} is not 4-byte aligned"
            )));
        }
        if data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT == 0 {
            self.queue.write_buffer(buffer, offset, data);
        } else {
            // The allocation is rounded up, so the padded tail still fits.
            let mut padded = data.to_vec();
            padded.resize(
                (data.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT) as usize,
                0,
            );
            self.queue.write_buffer(buffer, offset, &padded);
        }
        Ok(())
    }

    fn read_buffer(&self, id: ResourceId) -> Result<Vec<u8>, GraphicsError> {
        self.check_alive()?;
        let (buffer, size) = match self.objects.lock().get(&id) {
            Some(WgpuObject::Buffer { buffer, size }) => (buffer.clone(), *size),
            _ => return Err(GraphicsError::InvalidParameter(format!("buffer {id} does not exist"))),
        };
        let aligned = size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        self.read_back(
            |encoder, staging| encoder.copy_buffer_to_buffer(&buffer, 0, staging, 0, aligned),
            size,
        )
    }

    fn read_texture(&self, id: ResourceId) -> Result<Vec<u8>, GraphicsError> {
        self.check_alive()?;
        let (texture, descriptor) = match self.objects.lock().get(&id) {
            Some(WgpuObject::Texture {
                texture,
                descriptor,
                ..
            }) => (texture.clone(), descriptor.clone()),
            _ => {
                return Err(GraphicsError::InvalidParameter(format!(
                    "texture {id} does not exist"
                )));
            }
        };
        let size = descriptor.size;
        let row = descriptor.row_bytes();
        let padded_row = row.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let padded_layer = padded_row as u64 * size.height as u64;
        let padded = self.read_back(
            |encoder, staging| {
                encoder.copy_texture_to_buffer(
                    wgpu::TexelCopyTextureInfo {
                        texture: &texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::TexelCopyBufferInfo {
                        buffer: staging,
                        layout: wgpu::TexelCopyBufferLayout {
                            offset: 0,
                            bytes_per_row: Some(padded_row),
                            rows_per_image: Some(size.height),
                        },
                    },
                    wgpu::Extent3d {
                        width: size.width,
                        height: size.height,
                        depth_or_array_layers: size.depth,
                    },
                );
            },
            padded_layer * size.depth as u64,
        )?;

        let mut data = Vec::with_capacity(descriptor.total_bytes() as usize);
        for padded_row_bytes in padded.chunks(padded_row as usize) {
            data.extend_from_slice(&padded_row_bytes[..row as usize]);
        }
        Ok(data)
    }

    fn submit(&self, commands: Arc<Vec<Command>>) -> Result<(), GraphicsError> {
        self.check_alive()?;
        let buffer = {
            let objects = self.objects.lock();
            let presentation = self.presentation.lock();
            let resolver = Resolver {
                objects: &objects,
                presentation: &presentation,
            };
            encode::encode(&self.device, &resolver, &commands)
        };
        let buffer = match buffer {
            Ok(buffer) => buffer,
            Err(e) => {
                let reason = format!("encoding failed: {e}");
                *self.lost.lock() = Some(reason.clone());
                return Err(GraphicsError::DeviceLost(reason));
            }
        };
        self.queue.submit(std::iter::once(buffer));
        Ok(())
    }

    fn signal(&self, value: u64) -> Result<(), GraphicsError> {
        self.check_alive()?;
        let completed = Arc::clone(&self.completed);
        self.queue.on_submitted_work_done(move || {
            completed.fetch_max(value, Ordering::AcqRel);
        });
        Ok(())
    }

    fn completed_value(&self) -> Result<u64, GraphicsError> {
        self.check_alive()?;
        match self.device.poll(wgpu::PollType::Poll) {
            Ok(_) | Err(wgpu::PollError::Timeout) => {}
            Err(e) => return Err(GraphicsError::DeviceLost(format!("device poll failed: {e}"))),
        }
        Ok(self.completed.load(Ordering::Acquire))
    }

    fn wait_for_value(&self, value: u64, timeout: Duration) -> Result<bool, GraphicsError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.check_alive()?;
            if self.completed.load(Ordering::Acquire) >= value {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            match self.device.poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: Some(deadline - now),
            }) {
                Ok(_) | Err(wgpu::PollError::Timeout) => {}
                Err(e) => return Err(GraphicsError::DeviceLost(format!("device poll failed: {e}"))),
            }
        }
    }

    fn configure_surface(
        &self,
        config: &SurfaceConfiguration,
        images: &[ResourceId],
    ) -> Result<(), GraphicsError> {
        self.check_alive()?;
        let has_window = {
            let mut presentation = self.presentation.lock();
            presentation.configure(&self.device, config, images);
            presentation.has_window()
        };
        if !has_window {
            for (index, &id) in images.iter().enumerate() {
                let descriptor = TextureDescriptor::new_2d(
                    config.width,
                    config.height,
                    config.format,
                    TextureUsage::RENDER_ATTACHMENT,
                )
                .with_label(format!("offscreen image {index}"));
                let object = self.build_texture(&descriptor);
                self.insert(id, object);
            }
        }
        Ok(())
    }

    fn acquire_image(&self) -> Result<u32, GraphicsError> {
        self.check_alive()?;
        self.presentation.lock().acquire()
    }

    fn current_image_index(&self) -> u32 {
        self.presentation.lock().current_index()
    }

    fn present(&self) -> Result<(), GraphicsError> {
        self.check_alive()?;
        self.presentation.lock().present()
    }
}

static_assertions::assert_impl_all!(WgpuBackend: Send, Sync);
