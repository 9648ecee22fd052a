//! Resource Pools
//!
//! Keyed recycling of fixed-shape resources so steady-state streaming does
//! not allocate.
//!
//! # Design
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  Pool<R>                     │
//! │                                              │
//! │  idle: HashMap<R::Key, Vec<R>>               │
//! │                                              │
//! │  acquire_with(key, create) → R   (hit / miss)│
//! │  release(R)                      (reset + idle)
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Acquiring moves the instance out of the pool and releasing moves it back,
//! so an instance is either idle or owned by one request, never both.
//! Pools never shrink: they grow to the in-flight high-water mark and stay
//! there until [`ResourcePools::destroy`].

mod raw;
mod texture;
mod transfer;

use std::fmt::Debug;
use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::errors::Result;
use crate::gpu::{Extent, GpuBackend};
use crate::settings::StreamingSettings;

pub use raw::{RawBlock, RawBlockPool};
pub use texture::PooledTexture;
pub use transfer::TransferBuffer;

// ─── Pool ─────────────────────────────────────────────────────────────────────

/// A resource that can be recycled by shape.
pub trait Pooled {
    type Key: Copy + Eq + Hash + Debug;

    fn key(&self) -> Self::Key;

    /// Clears per-use transient state before the instance goes idle.
    fn reset(&mut self) {}
}

/// Allocation counters of one pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Instances ever created.
    pub allocated: usize,
    /// Instances currently idle.
    pub idle: usize,
    pub hits: u64,
    pub misses: u64,
}

impl PoolStats {
    /// Instances currently owned by a request.
    #[inline]
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.allocated - self.idle
    }
}

pub struct Pool<R: Pooled> {
    label: &'static str,
    idle: FxHashMap<R::Key, Vec<R>>,
    stats: PoolStats,
}

impl<R: Pooled> Pool<R> {
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            idle: FxHashMap::default(),
            stats: PoolStats::default(),
        }
    }

    /// Takes an idle instance of `key`, or builds one with `create`.
    ///
    /// Recycled instances keep their previous contents.
    pub fn acquire_with(
        &mut self,
        key: R::Key,
        create: impl FnOnce(R::Key) -> Result<R>,
    ) -> Result<R> {
        if let Some(resource) = self.take_idle(key) {
            return Ok(resource);
        }
        let resource = create(key)?;
        self.record_miss(&resource);
        Ok(resource)
    }

    /// Infallible variant of [`acquire_with`](Self::acquire_with).
    pub fn acquire(&mut self, key: R::Key, create: impl FnOnce(R::Key) -> R) -> R {
        if let Some(resource) = self.take_idle(key) {
            return resource;
        }
        let resource = create(key);
        self.record_miss(&resource);
        resource
    }

    fn take_idle(&mut self, key: R::Key) -> Option<R> {
        let resource = self.idle.get_mut(&key).and_then(Vec::pop)?;
        self.stats.hits += 1;
        self.stats.idle -= 1;
        log::trace!("{} pool hit for {key:?}", self.label);
        Some(resource)
    }

    fn record_miss(&mut self, resource: &R) {
        self.stats.misses += 1;
        self.stats.allocated += 1;
        log::debug!(
            "{} pool miss for {:?}, {} allocated",
            self.label,
            resource.key(),
            self.stats.allocated
        );
    }

    pub fn release(&mut self, mut resource: R) {
        resource.reset();
        self.stats.idle += 1;
        self.idle.entry(resource.key()).or_default().push(resource);
    }

    /// Forgets an instance that will never be released.
    pub fn discard(&mut self, resource: R) {
        log::debug!("{} pool discarded {:?}", self.label, resource.key());
        self.stats.allocated -= 1;
        drop(resource);
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Idle instances of `key`.
    #[must_use]
    pub fn idle_count(&self, key: R::Key) -> usize {
        self.idle.get(&key).map_or(0, Vec::len)
    }

    /// Removes every idle instance.
    pub fn drain(&mut self) -> impl Iterator<Item = R> + '_ {
        self.stats.allocated -= self.stats.idle;
        self.stats.idle = 0;
        self.idle.drain().flat_map(|(_, bucket)| bucket)
    }
}

// ─── ResourcePools ────────────────────────────────────────────────────────────

/// Counters of every pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSetStats {
    pub textures: PoolStats,
    pub transfers: PoolStats,
    pub raw: PoolStats,
}

/// The pools of one streaming pipeline.
///
/// Texture and transfer pools are used from the render thread only. Raw
/// blocks are sized by the decoder, so [`RawBlockPool`] is shared with the
/// decode workers.
pub struct ResourcePools {
    textures: Pool<PooledTexture>,
    transfers: Pool<TransferBuffer>,
    raw: RawBlockPool,
    persistent_mapping: bool,
    generate_mipmaps: bool,
}

impl ResourcePools {
    #[must_use]
    pub fn new(gpu: &dyn GpuBackend, settings: &StreamingSettings) -> Self {
        let persistent_mapping = settings
            .mapping
            .use_persistent(gpu.supports_persistent_mapping());
        log::info!(
            "Transfer buffers on '{}' use {} mapping",
            gpu.name(),
            if persistent_mapping { "persistent" } else { "orphaned" }
        );

        Self {
            textures: Pool::new("Texture"),
            transfers: Pool::new("Transfer buffer"),
            raw: RawBlockPool::new(),
            persistent_mapping,
            generate_mipmaps: settings.generate_mipmaps,
        }
    }

    #[inline]
    #[must_use]
    pub fn persistent_mapping(&self) -> bool {
        self.persistent_mapping
    }

    pub fn acquire_texture(&mut self, gpu: &dyn GpuBackend, extent: Extent) -> Result<PooledTexture> {
        let mip_levels = if self.generate_mipmaps {
            extent.full_mip_count()
        } else {
            1
        };
        self.textures
            .acquire_with(extent, |extent| PooledTexture::create(gpu, extent, mip_levels))
    }

    pub fn release_texture(&mut self, texture: PooledTexture) {
        self.textures.release(texture);
    }

    /// Acquires a transfer buffer of `size` bytes, mapped for writing.
    pub fn acquire_transfer(&mut self, gpu: &dyn GpuBackend, size: u64) -> Result<TransferBuffer> {
        let persistent = self.persistent_mapping;
        let mut buffer = self
            .transfers
            .acquire_with(size, |size| TransferBuffer::create(gpu, size, persistent))?;
        buffer.map(gpu)?;
        Ok(buffer)
    }

    /// Returns a transfer buffer whose flush has completed.
    pub fn release_transfer(&mut self, buffer: TransferBuffer) {
        assert!(
            buffer.flush_complete(),
            "transfer buffer released before its flush completed"
        );
        self.transfers.release(buffer);
    }

    /// Deletes a transfer buffer left in an unknown mapping state.
    pub fn discard_transfer(&mut self, gpu: &dyn GpuBackend, buffer: TransferBuffer) {
        gpu.delete_buffer(buffer.id());
        self.transfers.discard(buffer);
    }

    #[inline]
    #[must_use]
    pub fn raw(&self) -> &RawBlockPool {
        &self.raw
    }

    #[must_use]
    pub fn stats(&self) -> PoolSetStats {
        PoolSetStats {
            textures: self.textures.stats(),
            transfers: self.transfers.stats(),
            raw: self.raw.stats(),
        }
    }

    /// Deletes every idle GPU object. Resources still owned by requests are
    /// not affected.
    pub fn destroy(&mut self, gpu: &dyn GpuBackend) {
        let textures = self.textures.drain().map(|t| gpu.delete_texture(t.id())).count();
        let buffers = self.transfers.drain().map(|b| gpu.delete_buffer(b.id())).count();
        self.raw.clear();
        log::info!("Destroyed {textures} pooled textures and {buffers} transfer buffers");
    }
}
