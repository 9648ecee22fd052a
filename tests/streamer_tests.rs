//! Texture Streamer Tests
//!
//! Tests for:
//! - Steady-state streaming: one request per frame, pools stop growing
//! - bind_latest / recycle_stale frame protocol
//! - Abandoning failed requests, including failed uploads
//! - Retrying uploads while the upload queue is full
//! - File-backed decoding through the `image` crate

mod common;

use std::sync::Arc;

use myth_streaming::{
    FileImageDecoder, HeadlessGpu, ImageDecoder, LoadState, MemoryImageDecoder, PixelLayout,
    RetireMode, StreamError, StreamingSettings, TextureStreamer,
};

use common::{fast_settings, init_logger, share, solid};

fn streamer_with(decoder: MemoryImageDecoder, settings: &StreamingSettings) -> (Arc<HeadlessGpu>, TextureStreamer) {
    init_logger();
    let (gpu, backend) = share(HeadlessGpu::new(RetireMode::Immediate));
    let streamer = TextureStreamer::new(backend, Arc::new(decoder), settings).unwrap();
    (gpu, streamer)
}

fn ground() -> MemoryImageDecoder {
    MemoryImageDecoder::new()
        .with_image("ground", solid(64, 64, PixelLayout::Rgb8, &[90, 140, 60]))
        .with_image("sky", solid(32, 32, PixelLayout::Rgba8, &[40, 80, 200, 255]))
}

// ============================================================================
// Frame Protocol Tests
// ============================================================================

#[test]
fn streaming_every_frame_reaches_steady_state() {
    let (gpu, mut streamer) = streamer_with(ground(), &fast_settings());

    let reached = common::wait_until(|| {
        streamer.begin_frame();
        streamer.request("ground");
        streamer.update();
        streamer.bind_latest(0);
        streamer.recycle_stale();
        streamer.end_frame();
        streamer.stats().pools.textures.hits >= 3
    });
    assert!(reached, "pooled textures were never reused: {:?}", streamer.stats());

    let stats = streamer.stats();
    assert!(stats.recycled >= 3);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.pools.textures.allocated, gpu.live_textures());
    assert!(stats.pools.textures.in_use() <= stats.in_flight);
}

#[test]
fn recycle_needs_a_bound_texture() {
    let (_gpu, mut streamer) = streamer_with(ground(), &fast_settings());
    let id = streamer.request("ground");

    assert!(common::wait_until(|| {
        streamer.begin_frame();
        streamer.update();
        streamer.end_frame();
        streamer.state(id) == Some(LoadState::Ready)
    }));

    streamer.begin_frame();
    assert_eq!(streamer.recycle_stale(), 0);
    assert_eq!(streamer.state(id), Some(LoadState::Ready));
    streamer.end_frame();
}

#[test]
fn newest_ready_request_is_bound_and_older_ones_recycled() {
    let (_gpu, mut streamer) = streamer_with(ground(), &fast_settings());
    let older = streamer.request("ground");
    let newer = streamer.request("sky");

    assert!(common::wait_until(|| {
        streamer.begin_frame();
        streamer.update();
        streamer.end_frame();
        streamer.stats().ready == 2
    }));

    streamer.begin_frame();
    streamer.update();
    let bound = streamer.bind_latest(3).unwrap();
    assert_eq!(bound.id, newer);
    assert_eq!(bound.unit, 3);
    assert_eq!(Some(bound.texture), streamer.find(newer).and_then(|r| r.texture()));

    assert_eq!(streamer.recycle_stale(), 1);
    assert_eq!(streamer.state(older), None);
    assert_eq!(streamer.state(newer), Some(LoadState::Rendering));
    streamer.end_frame();

    // Still bound: it keeps rendering until a newer texture takes over
    streamer.begin_frame();
    streamer.update();
    assert_eq!(streamer.state(newer), Some(LoadState::Recyclable));
    assert_eq!(streamer.bind_latest(0).map(|b| b.id), Some(newer));
    assert_eq!(streamer.recycle_stale(), 0);
    streamer.end_frame();
}

#[test]
fn failed_requests_are_abandoned() {
    let (_gpu, mut streamer) = streamer_with(ground(), &fast_settings());
    let id = streamer.request("nowhere");

    assert!(common::wait_until(|| {
        streamer.begin_frame();
        streamer.update();
        streamer.end_frame();
        streamer.stats().failed == 1
    }));
    assert_eq!(streamer.state(id), None);
    assert_eq!(streamer.stats().in_flight, 0);
}

#[test]
fn failed_uploads_are_abandoned_with_their_resources() {
    init_logger();
    let (_gpu, backend) = common::share_failing(HeadlessGpu::new(RetireMode::Immediate));
    let mut streamer = TextureStreamer::new(backend, Arc::new(ground()), &fast_settings()).unwrap();
    let id = streamer.request("ground");

    assert!(common::wait_until(|| {
        streamer.begin_frame();
        streamer.update();
        streamer.end_frame();
        streamer.stats().failed == 1
    }));

    let stats = streamer.stats();
    assert_eq!(streamer.state(id), None);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.pools.textures.in_use(), 0);
    assert_eq!(stats.pools.transfers.in_use(), 0);
    assert_eq!(stats.pools.raw.in_use(), 0);
}

#[test]
fn requests_retry_while_the_upload_queue_is_full() {
    let settings = StreamingSettings {
        upload_queue_capacity: 1,
        upload_tick_ms: 20,
        ..fast_settings()
    };
    let (_gpu, mut streamer) = streamer_with(ground(), &settings);
    let ids: Vec<_> = ["ground", "sky", "ground", "sky"]
        .into_iter()
        .map(|name| streamer.request(name))
        .collect();

    assert!(common::wait_until(|| {
        streamer.begin_frame();
        streamer.update();
        streamer.end_frame();
        streamer.stats().ready == ids.len()
    }));

    let stats = streamer.stats();
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.pools.textures.in_use(), ids.len());
    assert!(ids.iter().all(|&id| streamer.state(id) == Some(LoadState::Ready)));
}

#[test]
fn frame_counter_follows_end_frame() {
    let (_gpu, mut streamer) = streamer_with(ground(), &fast_settings());
    for _ in 0..3 {
        streamer.begin_frame();
        streamer.end_frame();
    }
    assert_eq!(streamer.frame(), 3);
    assert_eq!(streamer.stats().frame, 3);
}

// ============================================================================
// File Decoder Tests
// ============================================================================

fn scratch_dir(test: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("myth-streaming-{}-{test}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn file_decoder_reports_missing_sources() {
    let decoder = FileImageDecoder::new(scratch_dir("missing"), "png");
    assert!(matches!(decoder.decode("absent"), Err(StreamError::SourceNotFound(_))));
}

#[test]
fn png_sources_stream_into_textures() {
    init_logger();
    let dir = scratch_dir("png");
    let tile = image::RgbaImage::from_pixel(16, 8, image::Rgba([12, 34, 56, 78]));
    tile.save(dir.join("tile.png")).unwrap();

    let settings = StreamingSettings {
        source_root: dir.clone(),
        brightness_period: None,
        ..fast_settings()
    };
    let (gpu, backend) = share(HeadlessGpu::new(RetireMode::Immediate));
    let mut streamer = TextureStreamer::with_file_decoder(backend, &settings).unwrap();
    let id = streamer.request("tile");

    assert!(common::wait_until(|| {
        streamer.begin_frame();
        streamer.update();
        streamer.end_frame();
        streamer.state(id) == Some(LoadState::Ready)
    }));

    let request = streamer.find(id).unwrap();
    let texels = gpu.read_texture(request.texture().unwrap(), 0).unwrap();
    assert_eq!(texels, [12u8, 34, 56, 78].repeat(16 * 8));

    drop(streamer);
    std::fs::remove_dir_all(dir).unwrap();
}
