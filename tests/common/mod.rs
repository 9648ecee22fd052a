//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use myth_streaming::{
    BufferId, CommandStream, DecodedImage, Extent, FenceId, FenceStatus, GpuBackend, HeadlessGpu,
    PixelLayout, Result, StreamError, StreamingSettings, TextureId, TransferLayout,
};

pub const DEADLINE: Duration = Duration::from_secs(10);

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Settings tuned for quick test turnaround.
pub fn fast_settings() -> StreamingSettings {
    StreamingSettings {
        worker_threads: 2,
        upload_tick_ms: 1,
        ..Default::default()
    }
}

/// A uniformly colored image.
pub fn solid(width: u32, height: u32, layout: PixelLayout, pixel: &[u8]) -> DecodedImage {
    assert_eq!(pixel.len(), layout.channels());
    DecodedImage {
        width,
        height,
        layout,
        pixels: pixel.repeat(width as usize * height as usize),
    }
}

/// The same backend as a concrete handle and as a trait object.
pub fn share(gpu: HeadlessGpu) -> (Arc<HeadlessGpu>, Arc<dyn GpuBackend>) {
    let gpu = Arc::new(gpu);
    let backend: Arc<dyn GpuBackend> = gpu.clone();
    (gpu, backend)
}

/// Polls `condition` every millisecond until it holds or the deadline passes.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + DEADLINE;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// A headless backend whose buffer-to-texture copies always fail.
pub struct FailingUploads {
    pub inner: HeadlessGpu,
}

impl GpuBackend for FailingUploads {
    fn name(&self) -> &'static str {
        "failing-uploads"
    }

    fn supports_persistent_mapping(&self) -> bool {
        self.inner.supports_persistent_mapping()
    }

    fn transfer_layout(&self, extent: Extent) -> TransferLayout {
        self.inner.transfer_layout(extent)
    }

    fn create_buffer(&self, size: u64, persistent: bool) -> Result<BufferId> {
        self.inner.create_buffer(size, persistent)
    }

    fn map_buffer(&self, buffer: BufferId) -> Result<()> {
        self.inner.map_buffer(buffer)
    }

    fn write_mapped(&self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<()> {
        self.inner.write_mapped(buffer, offset, data)
    }

    fn flush_mapped(&self, stream: CommandStream, buffer: BufferId) -> Result<()> {
        self.inner.flush_mapped(stream, buffer)
    }

    fn unmap_buffer(&self, buffer: BufferId) -> Result<()> {
        self.inner.unmap_buffer(buffer)
    }

    fn delete_buffer(&self, buffer: BufferId) {
        self.inner.delete_buffer(buffer);
    }

    fn create_texture(&self, extent: Extent, mip_levels: u32) -> Result<TextureId> {
        self.inner.create_texture(extent, mip_levels)
    }

    fn delete_texture(&self, texture: TextureId) {
        self.inner.delete_texture(texture);
    }

    fn copy_buffer_to_texture(
        &self,
        _stream: CommandStream,
        _buffer: BufferId,
        _texture: TextureId,
        _layout: &TransferLayout,
    ) -> Result<()> {
        Err(StreamError::UnknownHandle { kind: "texture" })
    }

    fn generate_mipmaps(&self, stream: CommandStream, texture: TextureId) -> Result<()> {
        self.inner.generate_mipmaps(stream, texture)
    }

    fn create_fence(&self, stream: CommandStream) -> FenceId {
        self.inner.create_fence(stream)
    }

    fn poll_fence(&self, stream: CommandStream, fence: FenceId, timeout: Duration) -> FenceStatus {
        self.inner.poll_fence(stream, fence, timeout)
    }

    fn delete_fence(&self, stream: CommandStream, fence: FenceId) {
        self.inner.delete_fence(stream, fence);
    }
}

/// [`FailingUploads`] as a concrete handle and as a trait object.
pub fn share_failing(inner: HeadlessGpu) -> (Arc<FailingUploads>, Arc<dyn GpuBackend>) {
    let gpu = Arc::new(FailingUploads { inner });
    let backend: Arc<dyn GpuBackend> = gpu.clone();
    (gpu, backend)
}
