//! wgpu Backend
//!
//! Maps the pipeline's GL-style primitives onto `wgpu`:
//!
//! | Primitive             | wgpu                                                  |
//! |-----------------------|-------------------------------------------------------|
//! | map (orphan)          | fresh `mapped_at_creation` buffer replaces the old one |
//! | unmap                 | `Buffer::unmap`                                       |
//! | persistent mapping    | unsupported (mapped buffers cannot be read by the GPU) |
//! | copy / mipmaps        | recorded into the stream's pending encoder            |
//! | create fence          | submit the pending encoder, keep the `SubmissionIndex` |
//! | poll fence            | `device.poll(Wait { submission_index, timeout })`     |
//!
//! Both command streams share the device, so buffers and textures are
//! visible to both. Each stream records into its own encoder and only the
//! thread driving that stream submits it.

use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use super::mipmap::{MipmapGenerator, STREAM_TEXTURE_FORMAT};
use super::{
    BufferId, CommandStream, Extent, FenceId, FenceStatus, GpuBackend, TextureId,
    TransferLayout,
};
use crate::errors::{Result, StreamError};

struct WgpuBuffer {
    buffer: wgpu::Buffer,
    size: u64,
    mapped: bool,
}

/// `wgpu` implementation of [`GpuBackend`].
pub struct WgpuGpu {
    device: wgpu::Device,
    queue: wgpu::Queue,
    mipmaps: MipmapGenerator,
    buffers: Mutex<SlotMap<BufferId, WgpuBuffer>>,
    textures: Mutex<SlotMap<TextureId, wgpu::Texture>>,
    fences: Mutex<SlotMap<FenceId, wgpu::SubmissionIndex>>,
    encoders: Mutex<FxHashMap<CommandStream, wgpu::CommandEncoder>>,
}

impl WgpuGpu {
    /// Wraps an existing device, e.g. the renderer's own.
    #[must_use]
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let mipmaps = MipmapGenerator::new(&device);
        Self {
            device,
            queue,
            mipmaps,
            buffers: Mutex::new(SlotMap::with_key()),
            textures: Mutex::new(SlotMap::with_key()),
            fences: Mutex::new(SlotMap::with_key()),
            encoders: Mutex::new(FxHashMap::default()),
        }
    }

    /// Requests a surface-less adapter and device.
    pub async fn request(power_preference: wgpu::PowerPreference) -> Result<Self> {
        let instance = wgpu::Instance::default();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| StreamError::AdapterRequestFailed(e.to_string()))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Streaming Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;

        log::info!("Streaming device ready on {:?}", adapter.get_info().backend);
        Ok(Self::new(device, queue))
    }

    /// Blocking variant of [`WgpuGpu::request`].
    pub fn request_blocking(power_preference: wgpu::PowerPreference) -> Result<Self> {
        pollster::block_on(Self::request(power_preference))
    }

    #[inline]
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// The `wgpu` texture behind a streamed texture id, for binding.
    #[must_use]
    pub fn texture(&self, texture: TextureId) -> Option<wgpu::Texture> {
        self.textures.lock().get(texture).cloned()
    }

    fn buffer(&self, buffer: BufferId) -> Result<wgpu::Buffer> {
        self.buffers
            .lock()
            .get(buffer)
            .map(|b| b.buffer.clone())
            .ok_or(StreamError::UnknownHandle { kind: "buffer" })
    }

    fn texture_or_err(&self, texture: TextureId) -> Result<wgpu::Texture> {
        self.texture(texture)
            .ok_or(StreamError::UnknownHandle { kind: "texture" })
    }

    fn create_raw_buffer(&self, size: u64, mapped_at_creation: bool) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Stream Transfer Buffer"),
            size,
            usage: wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation,
        })
    }

    fn record<F>(&self, stream: CommandStream, f: F)
    where
        F: FnOnce(&mut wgpu::CommandEncoder),
    {
        let mut encoders = self.encoders.lock();
        let encoder = encoders.entry(stream).or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some(match stream {
                        CommandStream::Primary => "Stream Primary Encoder",
                        CommandStream::Secondary => "Stream Upload Encoder",
                    }),
                })
        });
        f(encoder);
    }
}

impl GpuBackend for WgpuGpu {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn supports_persistent_mapping(&self) -> bool {
        false
    }

    fn transfer_layout(&self, extent: Extent) -> TransferLayout {
        TransferLayout::aligned(extent, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
    }

    fn create_buffer(&self, size: u64, persistent: bool) -> Result<BufferId> {
        if persistent {
            return Err(StreamError::Unsupported("persistent mapping"));
        }
        let buffer = self.create_raw_buffer(size, false);
        Ok(self.buffers.lock().insert(WgpuBuffer {
            buffer,
            size,
            mapped: false,
        }))
    }

    fn map_buffer(&self, buffer: BufferId) -> Result<()> {
        let mut buffers = self.buffers.lock();
        let entry = buffers
            .get_mut(buffer)
            .ok_or(StreamError::UnknownHandle { kind: "buffer" })?;
        assert!(!entry.mapped, "buffer is already mapped");

        // Orphan: in-flight copies keep the old storage alive
        entry.buffer = self.create_raw_buffer(entry.size, true);
        entry.mapped = true;
        Ok(())
    }

    fn write_mapped(&self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<()> {
        let (raw, mapped, size) = {
            let buffers = self.buffers.lock();
            let entry = buffers
                .get(buffer)
                .ok_or(StreamError::UnknownHandle { kind: "buffer" })?;
            (entry.buffer.clone(), entry.mapped, entry.size)
        };
        if !mapped {
            return Err(StreamError::Mapping("write to an unmapped buffer".to_string()));
        }
        let end = offset + data.len() as u64;
        if end > size {
            return Err(StreamError::Mapping(format!(
                "write of {} bytes at {offset} overruns a {size} byte buffer",
                data.len()
            )));
        }

        let mut view = raw.slice(offset..end).get_mapped_range_mut();
        view.copy_from_slice(data);
        Ok(())
    }

    fn flush_mapped(&self, _stream: CommandStream, _buffer: BufferId) -> Result<()> {
        Err(StreamError::Unsupported("persistent mapping"))
    }

    fn unmap_buffer(&self, buffer: BufferId) -> Result<()> {
        let mut buffers = self.buffers.lock();
        let entry = buffers
            .get_mut(buffer)
            .ok_or(StreamError::UnknownHandle { kind: "buffer" })?;
        assert!(entry.mapped, "buffer unmapped twice");

        entry.buffer.unmap();
        entry.mapped = false;
        Ok(())
    }

    fn delete_buffer(&self, buffer: BufferId) {
        if let Some(entry) = self.buffers.lock().remove(buffer) {
            entry.buffer.destroy();
        }
    }

    fn create_texture(&self, extent: Extent, mip_levels: u32) -> Result<TextureId> {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Streamed Texture"),
            size: wgpu::Extent3d {
                width: extent.width,
                height: extent.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: mip_levels.max(1),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: STREAM_TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        Ok(self.textures.lock().insert(texture))
    }

    fn delete_texture(&self, texture: TextureId) {
        if let Some(texture) = self.textures.lock().remove(texture) {
            texture.destroy();
        }
    }

    fn copy_buffer_to_texture(
        &self,
        stream: CommandStream,
        buffer: BufferId,
        texture: TextureId,
        layout: &TransferLayout,
    ) -> Result<()> {
        let raw = self.buffer(buffer)?;
        let texture = self.texture_or_err(texture)?;

        self.record(stream, |encoder| {
            encoder.copy_buffer_to_texture(
                wgpu::TexelCopyBufferInfo {
                    buffer: &raw,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(layout.bytes_per_row),
                        rows_per_image: Some(layout.extent.height),
                    },
                },
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::Extent3d {
                    width: layout.extent.width,
                    height: layout.extent.height,
                    depth_or_array_layers: 1,
                },
            );
        });
        Ok(())
    }

    fn generate_mipmaps(&self, stream: CommandStream, texture: TextureId) -> Result<()> {
        let texture = self.texture_or_err(texture)?;
        self.record(stream, |encoder| {
            self.mipmaps.generate(&self.device, encoder, &texture);
        });
        Ok(())
    }

    fn create_fence(&self, stream: CommandStream) -> FenceId {
        let pending = self.encoders.lock().remove(&stream);
        let index = self.queue.submit(pending.map(wgpu::CommandEncoder::finish));
        self.fences.lock().insert(index)
    }

    fn poll_fence(&self, _stream: CommandStream, fence: FenceId, timeout: Duration) -> FenceStatus {
        let Some(index) = self.fences.lock().get(fence).cloned() else {
            return FenceStatus::WaitFailed;
        };

        match self.device.poll(wgpu::PollType::Wait {
            submission_index: Some(index),
            timeout: Some(timeout),
        }) {
            Ok(_) => FenceStatus::Signaled,
            Err(wgpu::PollError::Timeout) => FenceStatus::TimeoutExpired,
            Err(e) => {
                log::warn!("Fence wait failed: {e}");
                FenceStatus::WaitFailed
            }
        }
    }

    fn delete_fence(&self, _stream: CommandStream, fence: FenceId) {
        self.fences.lock().remove(fence);
    }
}
