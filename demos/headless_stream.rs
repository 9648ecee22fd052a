//! Headless Streaming Demo
//!
//! Streams the same image every frame, the way a scene reloads its ground
//! texture, through the software GPU backend:
//!
//! ```text
//! cargo run --example headless_stream
//! ```
//!
//! Every second the streamer statistics are logged; after warm-up the
//! pools stop growing and every new request reuses recycled resources.

use std::sync::Arc;
use std::time::{Duration, Instant};

use myth_streaming::{HeadlessGpu, RetireMode, StreamingSettings, TextureStreamer};

const FRAMES: u64 = 600;
const FRAME_TIME: Duration = Duration::from_millis(16);

fn write_ground(dir: &std::path::Path) -> anyhow::Result<()> {
    let ground = image::RgbImage::from_fn(256, 256, |x, y| {
        let checker = ((x / 32) + (y / 32)) % 2 == 0;
        if checker {
            image::Rgb([96, 140, 64])
        } else {
            image::Rgb([72, 110, 48])
        }
    });
    ground.save(dir.join("ground.png"))?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let dir = std::env::temp_dir().join("myth-streaming-demo");
    std::fs::create_dir_all(&dir)?;
    write_ground(&dir)?;

    let settings = StreamingSettings {
        source_root: dir.clone(),
        ..Default::default()
    };
    let gpu = Arc::new(HeadlessGpu::new(RetireMode::Immediate));
    let mut streamer = TextureStreamer::with_file_decoder(gpu, &settings)?;

    let mut last_report = Instant::now();
    let mut first_bind = None;
    for _ in 0..FRAMES {
        let frame_start = Instant::now();

        streamer.begin_frame();
        streamer.request("ground");
        streamer.update();
        if let Some(bound) = streamer.bind_latest(0) {
            first_bind.get_or_insert(streamer.frame());
            log::trace!("Frame {} samples {:?}", streamer.frame(), bound.texture);
        }
        streamer.recycle_stale();
        streamer.end_frame();

        if last_report.elapsed() >= Duration::from_secs(1) {
            let stats = streamer.stats();
            log::info!(
                "frame {:>4} | in flight {:>3} | ready {:>2} | recycled {:>4} | textures {} ({} hits)",
                stats.frame,
                stats.in_flight,
                stats.ready,
                stats.recycled,
                stats.pools.textures.allocated,
                stats.pools.textures.hits,
            );
            last_report = Instant::now();
        }

        std::thread::sleep(FRAME_TIME.saturating_sub(frame_start.elapsed()));
    }

    match first_bind {
        Some(frame) => log::info!("First texture bound on frame {frame}"),
        None => log::warn!("No texture became ready"),
    }
    log::info!("Final stats: {:#?}", streamer.stats());
    Ok(())
}
