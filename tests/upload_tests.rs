//! Upload Worker Tests
//!
//! Tests for:
//! - UploadCommand execution on the secondary stream
//! - The worker's ledger signaling upload fences
//! - Queue backpressure and shutdown

mod common;

use std::sync::Arc;

use myth_streaming::upload::{UploadCommand, UploadFailure, UploadWorker};
use myth_streaming::{
    CommandStream, Extent, Fence, GpuBackend, HeadlessGpu, RetireMode, StreamError,
    StreamingSettings, TransferLayout,
};

use common::{init_logger, share};

/// A published 4×4 upload source and its destination texture.
fn staged(gpu: &HeadlessGpu, mip_levels: u32, fill: u8) -> UploadCommand {
    let extent = Extent::new(4, 4);
    let layout = TransferLayout::tight(extent);
    let buffer = gpu.create_buffer(layout.size(), true).unwrap();
    gpu.write_mapped(buffer, 0, &vec![fill; extent.byte_len()]).unwrap();
    gpu.flush_mapped(CommandStream::Primary, buffer).unwrap();

    UploadCommand {
        name: format!("staged-{fill}"),
        buffer,
        texture: gpu.create_texture(extent, mip_levels).unwrap(),
        layout,
        generate_mipmaps: mip_levels > 1,
        fence: Fence::pending(CommandStream::Secondary),
        failure: UploadFailure::new(),
    }
}

#[test]
fn execute_copies_generates_mips_and_submits() {
    init_logger();
    let gpu = HeadlessGpu::new(RetireMode::Manual);
    let command = staged(&gpu, 3, 80);
    let texture = command.texture;

    let fence = command.execute(&gpu).unwrap();
    assert!(fence.is_submitted());
    assert!(!fence.is_signaled());
    assert_eq!(gpu.read_texture(texture, 0).unwrap(), vec![80; 64]);
    assert_eq!(gpu.read_texture(texture, 2).unwrap(), vec![80; 4]);
    // copy + mipmaps + fence
    assert_eq!(gpu.submitted(CommandStream::Secondary), 3);
}

#[test]
fn worker_signals_upload_fences() {
    init_logger();
    let (gpu, backend) = share(HeadlessGpu::new(RetireMode::Immediate));
    let settings = StreamingSettings {
        upload_tick_ms: 1,
        ..Default::default()
    };
    let worker = UploadWorker::spawn(backend, &settings).unwrap();

    let command = staged(&gpu, 1, 5);
    let fence = command.fence.clone();
    let texture = command.texture;
    worker.submit(command).unwrap();

    assert!(common::wait_until(|| fence.is_signaled()));
    assert_eq!(gpu.read_texture(texture, 0).unwrap(), vec![5; 64]);
}

#[test]
fn worker_reports_failed_uploads() {
    init_logger();
    let (gpu, backend) = share(HeadlessGpu::new(RetireMode::Immediate));
    let settings = StreamingSettings {
        upload_tick_ms: 1,
        ..Default::default()
    };
    let worker = UploadWorker::spawn(backend, &settings).unwrap();

    let command = staged(&gpu, 1, 9);
    gpu.delete_texture(command.texture);
    let fence = command.fence.clone();
    let failure = command.failure.clone();
    worker.submit(command).unwrap();

    assert!(common::wait_until(|| failure.get().is_some()));
    assert!(failure.get().unwrap().contains("texture"));
    assert!(!fence.is_submitted());
}

#[test]
fn full_queue_pushes_back() {
    init_logger();
    let (gpu, backend) = share(HeadlessGpu::new(RetireMode::Immediate));
    let settings = StreamingSettings {
        upload_queue_capacity: 1,
        upload_tick_ms: 500,
        ..Default::default()
    };
    let worker = UploadWorker::spawn(backend, &settings).unwrap();

    let results: Vec<_> = (0..3).map(|i| worker.submit(staged(&gpu, 1, i))).collect();
    assert!(results[0].is_ok());
    assert!(
        results.iter().any(|r| matches!(r, Err(StreamError::UploadQueueFull))),
        "{results:?}"
    );
}

#[test]
fn shutdown_stops_the_worker_and_releases_fences() {
    init_logger();
    let (gpu, backend) = share(HeadlessGpu::new(RetireMode::Manual));
    let settings = StreamingSettings {
        upload_tick_ms: 1,
        ..Default::default()
    };
    let mut worker = UploadWorker::spawn(Arc::clone(&backend), &settings).unwrap();

    let command = staged(&gpu, 1, 1);
    let fence = command.fence.clone();
    worker.submit(command).unwrap();
    assert!(common::wait_until(|| fence.is_submitted()));
    assert_eq!(gpu.live_fences(), 1);

    worker.shutdown();
    assert_eq!(gpu.live_fences(), 0, "unsignaled fences are released on shutdown");
    assert!(matches!(
        worker.submit(staged(&gpu, 1, 2)),
        Err(StreamError::UploadWorkerDisconnected)
    ));
}
