//! GPU Boundary
//!
//! The streaming pipeline treats the graphics layer as a set of opaque
//! primitives behind [`GpuBackend`]:
//!
//! - buffers: create / map / write-mapped / flush / unmap / delete
//! - textures: create / delete / copy from buffer / generate mipmaps
//! - fences: create / poll / delete
//!
//! Buffers and textures live in one namespace shared by every
//! [`CommandStream`]. Commands and fences are per stream: a fence created on
//! [`CommandStream::Secondary`] must only be polled from the secondary worker.
//!
//! Two backends are provided:
//!
//! - [`HeadlessGpu`]: deterministic software GPU with test-controlled retirement
//! - [`WgpuGpu`]: real GPU through `wgpu`

pub mod headless;
pub mod mipmap;
pub mod wgpu_backend;

use std::time::Duration;

use slotmap::new_key_type;

use crate::errors::Result;

pub use headless::{HeadlessGpu, RetireMode};
pub use wgpu_backend::WgpuGpu;

/// Bytes per pixel of the single supported texture layout (RGBA8).
pub const BYTES_PER_PIXEL: u32 = 4;

// Names of GPU objects in the shared namespace
new_key_type! {
    pub struct BufferId;
    pub struct TextureId;
    pub struct FenceId;
}

/// Identifies a GPU command stream (GL context / submission queue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandStream {
    /// The render thread's stream.
    Primary,
    /// The upload worker's stream, sharing objects with `Primary`.
    Secondary,
}

/// Result of a bounded fence wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// All commands submitted before the fence have retired.
    Signaled,
    /// The wait elapsed before the GPU reached the fence.
    TimeoutExpired,
    /// The wait could not be performed. Treated as not yet signaled.
    WaitFailed,
}

impl FenceStatus {
    #[inline]
    #[must_use]
    pub fn is_signaled(self) -> bool {
        matches!(self, Self::Signaled)
    }
}

/// Width × height of a 2D image in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    #[inline]
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Tightly packed RGBA8 size in bytes.
    #[inline]
    #[must_use]
    pub fn byte_len(self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL as usize
    }

    /// Number of levels in a full mip chain.
    #[inline]
    #[must_use]
    pub fn full_mip_count(self) -> u32 {
        32 - self.width.max(self.height).max(1).leading_zeros()
    }
}

/// Memory layout of one image inside a transfer buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferLayout {
    pub extent: Extent,
    /// Tightly packed bytes per row.
    pub row_bytes: u32,
    /// Distance between rows in the buffer (≥ `row_bytes`).
    pub bytes_per_row: u32,
}

impl TransferLayout {
    /// Layout with rows padded to `alignment` bytes.
    #[must_use]
    pub fn aligned(extent: Extent, alignment: u32) -> Self {
        let row_bytes = extent.width * BYTES_PER_PIXEL;
        let alignment = alignment.max(1);
        let bytes_per_row = row_bytes.div_ceil(alignment) * alignment;
        Self {
            extent,
            row_bytes,
            bytes_per_row,
        }
    }

    /// Layout without row padding.
    #[must_use]
    pub fn tight(extent: Extent) -> Self {
        Self::aligned(extent, 1)
    }

    /// Total buffer size required for the image.
    #[inline]
    #[must_use]
    pub fn size(&self) -> u64 {
        u64::from(self.bytes_per_row) * u64::from(self.extent.height)
    }

    #[inline]
    #[must_use]
    pub fn is_tight(&self) -> bool {
        self.row_bytes == self.bytes_per_row
    }
}

/// Opaque graphics primitives consumed by the pipeline.
///
/// Implementations must be callable from the render thread, background
/// fill tasks (`write_mapped` only) and the secondary worker thread.
pub trait GpuBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Whether buffers can stay mapped while the GPU reads them.
    fn supports_persistent_mapping(&self) -> bool;

    /// Staging layout this backend requires for an image of `extent`.
    fn transfer_layout(&self, extent: Extent) -> TransferLayout;

    // === Buffers ===

    /// Allocates a transfer buffer of `size` bytes. Persistent buffers are
    /// returned already mapped.
    fn create_buffer(&self, size: u64, persistent: bool) -> Result<BufferId>;

    /// Maps a non-persistent buffer, orphaning its previous storage.
    fn map_buffer(&self, buffer: BufferId) -> Result<()>;

    /// Writes into the mapped region. Safe to call without a current context.
    fn write_mapped(&self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<()>;

    /// Makes CPU writes to a persistent mapping visible to the GPU.
    fn flush_mapped(&self, stream: CommandStream, buffer: BufferId) -> Result<()>;

    /// Unmaps a non-persistent buffer, making its contents visible to the GPU.
    fn unmap_buffer(&self, buffer: BufferId) -> Result<()>;

    fn delete_buffer(&self, buffer: BufferId);

    // === Textures ===

    /// Allocates an RGBA8 texture with `mip_levels` levels.
    fn create_texture(&self, extent: Extent, mip_levels: u32) -> Result<TextureId>;

    fn delete_texture(&self, texture: TextureId);

    /// Records a copy of `layout` from `buffer` into mip 0 of `texture`.
    fn copy_buffer_to_texture(
        &self,
        stream: CommandStream,
        buffer: BufferId,
        texture: TextureId,
        layout: &TransferLayout,
    ) -> Result<()>;

    /// Records the downsample chain for every level below mip 0.
    fn generate_mipmaps(&self, stream: CommandStream, texture: TextureId) -> Result<()>;

    // === Fences ===

    /// Inserts a fence after every command issued on `stream` so far.
    fn create_fence(&self, stream: CommandStream) -> FenceId;

    /// Waits at most `timeout` for the fence. Never blocks longer.
    fn poll_fence(&self, stream: CommandStream, fence: FenceId, timeout: Duration) -> FenceStatus;

    fn delete_fence(&self, stream: CommandStream, fence: FenceId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_mip_count_covers_largest_side() {
        assert_eq!(Extent::new(1, 1).full_mip_count(), 1);
        assert_eq!(Extent::new(64, 64).full_mip_count(), 7);
        assert_eq!(Extent::new(128, 32).full_mip_count(), 8);
        assert_eq!(Extent::new(100, 3).full_mip_count(), 7);
    }

    #[test]
    fn aligned_layout_pads_rows() {
        let layout = TransferLayout::aligned(Extent::new(10, 4), 256);
        assert_eq!(layout.row_bytes, 40);
        assert_eq!(layout.bytes_per_row, 256);
        assert_eq!(layout.size(), 1024);
        assert!(!layout.is_tight());

        let tight = TransferLayout::tight(Extent::new(10, 4));
        assert_eq!(tight.size(), 160);
        assert!(tight.is_tight());
    }
}
