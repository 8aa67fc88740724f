//! The same scenarios against every available backend.
//!
//! Each test is parameterized with `rstest` over the simulated device and,
//! when the `wgpu-backend` feature is enabled, a headless wgpu device.
//! Backends that cannot be created on this machine are skipped.
//!
//! ```bash
//! cargo test -p mapview-graphics --features wgpu-backend --test gpu_tests
//! ```

#![cfg(feature = "dummy")]

mod common;

use std::sync::Arc;

use rstest::rstest;

use common::{record_clear, test_pattern};
use mapview_graphics::{
    BufferDescriptor, BufferUsage, FrameLoop, FrameLoopConfig, GraphicsDevice, ResourceState,
    SyncGate, TextureDescriptor, TextureFormat, TextureUsage, UploadBatch, UploadStager,
};

#[derive(Debug, Clone, Copy)]
enum Backend {
    Dummy,
    Wgpu,
}

fn device_for(backend: Backend) -> Option<Arc<GraphicsDevice>> {
    let _ = env_logger::builder().is_test(true).try_init();
    match backend {
        Backend::Dummy => GraphicsDevice::dummy().ok(),
        Backend::Wgpu => wgpu_device(),
    }
}

#[cfg(feature = "wgpu-backend")]
fn wgpu_device() -> Option<Arc<GraphicsDevice>> {
    use mapview_graphics::backend::wgpu_impl::WgpuBackend;
    match WgpuBackend::headless() {
        Ok(backend) => Some(GraphicsDevice::new(Arc::new(backend))),
        Err(e) => {
            eprintln!("wgpu unavailable: {e}");
            None
        }
    }
}

#[cfg(not(feature = "wgpu-backend"))]
fn wgpu_device() -> Option<Arc<GraphicsDevice>> {
    None
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::wgpu(Backend::Wgpu)]
fn test_buffer_upload_round_trip(#[case] backend: Backend) {
    let Some(device) = device_for(backend) else {
        eprintln!("Backend {backend:?} not available, skipping");
        return;
    };
    let mut gate = SyncGate::new(device.clone());
    let mut stager = UploadStager::new(device.clone());

    // Not a multiple of the copy alignment.
    let data = test_pattern(1022);
    let buffer = device
        .create_buffer(&BufferDescriptor::new(1022, BufferUsage::VERTEX | BufferUsage::COPY_DST))
        .unwrap();
    let mut batch = UploadBatch::new();
    batch.buffer(&buffer, &data, ResourceState::VertexBuffer);
    stager.submit(&mut gate, batch).unwrap().wait(&mut gate).unwrap();

    let drained = gate.drain().unwrap();
    let read = device.read_buffer(&buffer, &drained).unwrap();
    assert_eq!(&read[..data.len()], &data[..]);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::wgpu(Backend::Wgpu)]
fn test_icon_array_upload_round_trip(#[case] backend: Backend) {
    let Some(device) = device_for(backend) else {
        eprintln!("Backend {backend:?} not available, skipping");
        return;
    };
    let mut gate = SyncGate::new(device.clone());
    let mut stager = UploadStager::new(device.clone());

    // 5 * 4 bytes per row forces padded staging rows.
    let (width, height, layers) = (5, 3, 2);
    let texture = device
        .create_texture(
            &TextureDescriptor::new_2d_array(
                width,
                height,
                layers,
                TextureFormat::Rgba8Unorm,
                TextureUsage::COPY_DST | TextureUsage::TEXTURE_BINDING,
            ),
            ResourceState::CopyDest,
        )
        .unwrap();
    let layer_bytes = (width * height * 4) as usize;
    let first = test_pattern(layer_bytes);
    let second: Vec<u8> = first.iter().map(|b| !b).collect();

    let mut batch = UploadBatch::new();
    batch
        .texture_layer(&texture, 0, &first, ResourceState::ShaderRead)
        .texture_layer(&texture, 1, &second, ResourceState::ShaderRead);
    stager.submit(&mut gate, batch).unwrap().wait(&mut gate).unwrap();

    let drained = gate.drain().unwrap();
    assert_eq!(
        device.read_texture(&texture, &drained).unwrap(),
        [first, second].concat()
    );
}

#[rstest]
#[case::dummy_double(Backend::Dummy, 2)]
#[case::dummy_triple(Backend::Dummy, 3)]
#[case::wgpu_double(Backend::Wgpu, 2)]
fn test_clear_frames_reach_presentation_images(
    #[case] backend: Backend,
    #[case] frames_in_flight: usize,
) {
    let Some(device) = device_for(backend) else {
        eprintln!("Backend {backend:?} not available, skipping");
        return;
    };
    let mut fl = FrameLoop::new(
        device.clone(),
        &FrameLoopConfig::default().with_frames_in_flight(frames_in_flight),
        16,
        8,
    )
    .unwrap();

    for _ in 0..5 {
        fl.render(record_clear).unwrap();
    }
    assert_eq!(fl.frame_number(), 5);

    let image = fl.surface().image(0).cloned().unwrap();
    let drained = fl.gate_mut().drain().unwrap();
    let pixels = device.read_texture(&image, &drained).unwrap();
    assert_eq!(pixels.len(), 16 * 8 * 4);
    assert!(pixels.chunks(4).all(|p| p == [0, 0, 0, 255]));
    fl.shutdown().unwrap();
}
