//! Headless GPU
//!
//! A deterministic software implementation of [`GpuBackend`]. Every object
//! lives in one namespace shared by both command streams, exactly like two
//! GL contexts created with a shared context.
//!
//! # Execution Model
//!
//! ```text
//!   command issued ──► executes immediately (copy, flush, mip chain)
//!                      └─► stream.submitted += 1
//!   create_fence   ──► point = ++stream.submitted
//!   poll_fence     ──► signaled once stream.retired ≥ point
//! ```
//!
//! Retirement is what makes a fence signal, and it is controlled by
//! [`RetireMode`]: `Immediate` retires the whole stream on every poll,
//! `Manual` only when the test calls [`HeadlessGpu::retire`].
//!
//! Buffers keep the CPU-visible mapping separate from GPU-visible storage.
//! Only a flush (persistent) or unmap (non-persistent) publishes CPU writes,
//! so a missing flush shows up as wrong texture contents.

use std::time::Duration;

use parking_lot::Mutex;
use slotmap::SlotMap;

use super::{
    BufferId, CommandStream, Extent, FenceId, FenceStatus, GpuBackend, TextureId,
    TransferLayout, BYTES_PER_PIXEL,
};
use crate::errors::{Result, StreamError};

/// Fill pattern of freshly orphaned storage. Callers must not assume zeroes.
const ORPHAN_FILL: u8 = 0xCD;

/// How submitted commands retire on the headless GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetireMode {
    /// Every poll retires all commands submitted on the polled stream.
    Immediate,
    /// Commands only retire through [`HeadlessGpu::retire`].
    Manual,
}

struct HeadlessBuffer {
    persistent: bool,
    mapped: bool,
    /// CPU-visible mapping.
    mapping: Vec<u8>,
    /// Contents the GPU reads from.
    storage: Vec<u8>,
    orphan_count: u32,
}

struct HeadlessTexture {
    extent: Extent,
    levels: Vec<Vec<u8>>,
}

#[derive(Default, Clone, Copy)]
struct StreamClock {
    submitted: u64,
    retired: u64,
}

struct HeadlessFence {
    stream: CommandStream,
    point: u64,
}

struct State {
    buffers: SlotMap<BufferId, HeadlessBuffer>,
    textures: SlotMap<TextureId, HeadlessTexture>,
    fences: SlotMap<FenceId, HeadlessFence>,
    primary: StreamClock,
    secondary: StreamClock,
}

impl State {
    fn clock(&mut self, stream: CommandStream) -> &mut StreamClock {
        match stream {
            CommandStream::Primary => &mut self.primary,
            CommandStream::Secondary => &mut self.secondary,
        }
    }

    fn buffer_mut(&mut self, id: BufferId) -> Result<&mut HeadlessBuffer> {
        self.buffers
            .get_mut(id)
            .ok_or(StreamError::UnknownHandle { kind: "buffer" })
    }
}

/// Software GPU with test-controlled retirement.
pub struct HeadlessGpu {
    state: Mutex<State>,
    retire_mode: RetireMode,
    persistent_mapping: bool,
    row_alignment: u32,
}

impl HeadlessGpu {
    #[must_use]
    pub fn new(retire_mode: RetireMode) -> Self {
        Self {
            state: Mutex::new(State {
                buffers: SlotMap::with_key(),
                textures: SlotMap::with_key(),
                fences: SlotMap::with_key(),
                primary: StreamClock::default(),
                secondary: StreamClock::default(),
            }),
            retire_mode,
            persistent_mapping: true,
            row_alignment: 1,
        }
    }

    /// Reports persistent mapping support (enabled by default).
    #[must_use]
    pub fn with_persistent_mapping(mut self, supported: bool) -> Self {
        self.persistent_mapping = supported;
        self
    }

    /// Pads transfer rows to `alignment` bytes, like a real copy engine.
    #[must_use]
    pub fn with_row_alignment(mut self, alignment: u32) -> Self {
        self.row_alignment = alignment.max(1);
        self
    }

    // ========================================================================
    // Test Controls
    // ========================================================================

    /// Retires every command submitted on `stream` so far.
    pub fn retire(&self, stream: CommandStream) {
        let mut state = self.state.lock();
        let clock = state.clock(stream);
        clock.retired = clock.submitted;
    }

    /// Retires at most `count` further commands on `stream`.
    pub fn retire_steps(&self, stream: CommandStream, count: u64) {
        let mut state = self.state.lock();
        let clock = state.clock(stream);
        clock.retired = (clock.retired + count).min(clock.submitted);
    }

    /// Number of commands submitted on `stream`.
    #[must_use]
    pub fn submitted(&self, stream: CommandStream) -> u64 {
        self.state.lock().clock(stream).submitted
    }

    /// Reads back one mip level of a texture (tightly packed RGBA8).
    #[must_use]
    pub fn read_texture(&self, texture: TextureId, level: usize) -> Option<Vec<u8>> {
        let state = self.state.lock();
        state.textures.get(texture)?.levels.get(level).cloned()
    }

    #[must_use]
    pub fn texture_extent(&self, texture: TextureId) -> Option<Extent> {
        self.state.lock().textures.get(texture).map(|t| t.extent)
    }

    #[must_use]
    pub fn is_mapped(&self, buffer: BufferId) -> bool {
        self.state
            .lock()
            .buffers
            .get(buffer)
            .is_some_and(|b| b.mapped)
    }

    /// How many times a buffer's storage has been orphaned.
    #[must_use]
    pub fn orphan_count(&self, buffer: BufferId) -> u32 {
        self.state
            .lock()
            .buffers
            .get(buffer)
            .map_or(0, |b| b.orphan_count)
    }

    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    #[must_use]
    pub fn live_textures(&self) -> usize {
        self.state.lock().textures.len()
    }

    #[must_use]
    pub fn live_fences(&self) -> usize {
        self.state.lock().fences.len()
    }
}

impl GpuBackend for HeadlessGpu {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn supports_persistent_mapping(&self) -> bool {
        self.persistent_mapping
    }

    fn transfer_layout(&self, extent: Extent) -> TransferLayout {
        TransferLayout::aligned(extent, self.row_alignment)
    }

    fn create_buffer(&self, size: u64, persistent: bool) -> Result<BufferId> {
        if persistent && !self.persistent_mapping {
            return Err(StreamError::Unsupported("persistent mapping"));
        }
        let size = usize::try_from(size)
            .map_err(|_| StreamError::Mapping(format!("buffer size {size} exceeds host memory")))?;

        let buffer = HeadlessBuffer {
            persistent,
            mapped: persistent,
            mapping: vec![ORPHAN_FILL; if persistent { size } else { 0 }],
            storage: vec![0; size],
            orphan_count: 0,
        };
        Ok(self.state.lock().buffers.insert(buffer))
    }

    fn map_buffer(&self, buffer: BufferId) -> Result<()> {
        let mut state = self.state.lock();
        let buf = state.buffer_mut(buffer)?;

        if buf.persistent {
            assert!(buf.mapped, "persistent buffer lost its mapping");
            return Ok(());
        }
        assert!(!buf.mapped, "buffer is already mapped");

        // Orphan: fresh backing store, old contents are not preserved
        buf.mapping = vec![ORPHAN_FILL; buf.storage.len()];
        buf.mapped = true;
        buf.orphan_count += 1;
        Ok(())
    }

    fn write_mapped(&self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        let buf = state.buffer_mut(buffer)?;

        if !buf.mapped {
            return Err(StreamError::Mapping("write to an unmapped buffer".to_string()));
        }
        let start = offset as usize;
        let end = start + data.len();
        if end > buf.mapping.len() {
            return Err(StreamError::Mapping(format!(
                "write of {} bytes at {start} overruns a {} byte mapping",
                data.len(),
                buf.mapping.len()
            )));
        }
        buf.mapping[start..end].copy_from_slice(data);
        Ok(())
    }

    fn flush_mapped(&self, stream: CommandStream, buffer: BufferId) -> Result<()> {
        let mut state = self.state.lock();
        let buf = state.buffer_mut(buffer)?;

        assert!(buf.persistent, "only persistent buffers are flushed");
        assert!(buf.mapped, "flush of an unmapped buffer");
        buf.storage.copy_from_slice(&buf.mapping);

        state.clock(stream).submitted += 1;
        Ok(())
    }

    fn unmap_buffer(&self, buffer: BufferId) -> Result<()> {
        let mut state = self.state.lock();
        let buf = state.buffer_mut(buffer)?;

        assert!(!buf.persistent, "persistent buffers stay mapped until deleted");
        assert!(buf.mapped, "buffer unmapped twice");

        let mapping = std::mem::take(&mut buf.mapping);
        buf.storage.copy_from_slice(&mapping);
        buf.mapped = false;
        Ok(())
    }

    fn delete_buffer(&self, buffer: BufferId) {
        self.state.lock().buffers.remove(buffer);
    }

    fn create_texture(&self, extent: Extent, mip_levels: u32) -> Result<TextureId> {
        let levels = (0..mip_levels.max(1))
            .map(|level| vec![0; mip_extent(extent, level).byte_len()])
            .collect();
        Ok(self
            .state
            .lock()
            .textures
            .insert(HeadlessTexture { extent, levels }))
    }

    fn delete_texture(&self, texture: TextureId) {
        self.state.lock().textures.remove(texture);
    }

    fn copy_buffer_to_texture(
        &self,
        stream: CommandStream,
        buffer: BufferId,
        texture: TextureId,
        layout: &TransferLayout,
    ) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let buf = state
            .buffers
            .get(buffer)
            .ok_or(StreamError::UnknownHandle { kind: "buffer" })?;
        assert!(
            buf.persistent || !buf.mapped,
            "GPU read from a buffer that is still mapped"
        );

        let tex = state
            .textures
            .get_mut(texture)
            .ok_or(StreamError::UnknownHandle { kind: "texture" })?;
        assert_eq!(tex.extent, layout.extent, "copy extent does not match texture");
        if layout.size() > buf.storage.len() as u64 {
            return Err(StreamError::Mapping(format!(
                "copy of {} bytes from a {} byte buffer",
                layout.size(),
                buf.storage.len()
            )));
        }

        let row_bytes = layout.row_bytes as usize;
        let pitch = layout.bytes_per_row as usize;
        let dst = &mut tex.levels[0];
        for row in 0..layout.extent.height as usize {
            dst[row * row_bytes..(row + 1) * row_bytes]
                .copy_from_slice(&buf.storage[row * pitch..row * pitch + row_bytes]);
        }

        state.clock(stream).submitted += 1;
        Ok(())
    }

    fn generate_mipmaps(&self, stream: CommandStream, texture: TextureId) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let tex = state
            .textures
            .get_mut(texture)
            .ok_or(StreamError::UnknownHandle { kind: "texture" })?;

        for level in 1..tex.levels.len() {
            let src_extent = mip_extent(tex.extent, level as u32 - 1);
            let next = downsample(&tex.levels[level - 1], src_extent);
            tex.levels[level] = next;
        }

        state.clock(stream).submitted += 1;
        Ok(())
    }

    fn create_fence(&self, stream: CommandStream) -> FenceId {
        let mut state = self.state.lock();
        let clock = state.clock(stream);
        clock.submitted += 1;
        let point = clock.submitted;
        state.fences.insert(HeadlessFence { stream, point })
    }

    fn poll_fence(&self, stream: CommandStream, fence: FenceId, _timeout: Duration) -> FenceStatus {
        let mut state = self.state.lock();
        let Some(&HeadlessFence { stream: owner, point }) = state.fences.get(fence) else {
            return FenceStatus::WaitFailed;
        };
        assert_eq!(owner, stream, "fence polled from a foreign command stream");

        let retire_mode = self.retire_mode;
        let clock = state.clock(stream);
        if retire_mode == RetireMode::Immediate {
            clock.retired = clock.submitted;
        }

        if clock.retired >= point {
            FenceStatus::Signaled
        } else {
            FenceStatus::TimeoutExpired
        }
    }

    fn delete_fence(&self, _stream: CommandStream, fence: FenceId) {
        self.state.lock().fences.remove(fence);
    }
}

/// Extent of mip `level` below `base`.
fn mip_extent(base: Extent, level: u32) -> Extent {
    Extent::new((base.width >> level).max(1), (base.height >> level).max(1))
}

/// 2×2 box filter from one RGBA8 level to the next.
fn downsample(src: &[u8], extent: Extent) -> Vec<u8> {
    let bpp = BYTES_PER_PIXEL as usize;
    let (sw, sh) = (extent.width as usize, extent.height as usize);
    let (dw, dh) = ((sw / 2).max(1), (sh / 2).max(1));

    let mut dst = vec![0u8; dw * dh * bpp];
    for y in 0..dh {
        for x in 0..dw {
            let x0 = (x * 2).min(sw - 1);
            let x1 = (x * 2 + 1).min(sw - 1);
            let y0 = (y * 2).min(sh - 1);
            let y1 = (y * 2 + 1).min(sh - 1);

            for c in 0..bpp {
                let sum = u32::from(src[(y0 * sw + x0) * bpp + c])
                    + u32::from(src[(y0 * sw + x1) * bpp + c])
                    + u32::from(src[(y1 * sw + x0) * bpp + c])
                    + u32::from(src[(y1 * sw + x1) * bpp + c]);
                dst[(y * dw + x) * bpp + c] = ((sum + 2) / 4) as u8;
            }
        }
    }
    dst
}
