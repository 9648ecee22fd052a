use super::Pooled;
use crate::errors::Result;
use crate::gpu::{BufferId, CommandStream, GpuBackend};
use crate::sync::Fence;

/// A GPU-visible staging buffer.
///
/// Persistent buffers are mapped once at creation and published with a
/// flush. Other buffers are orphaned on every [`map`](Self::map) and
/// published by unmapping. Either way the publish is tracked by
/// `flush_fence`, and the buffer may only go back to its pool once that
/// fence has signaled.
#[derive(Debug)]
pub struct TransferBuffer {
    id: BufferId,
    size: u64,
    persistent: bool,
    mapped: bool,
    flush_fence: Option<Fence>,
}

impl TransferBuffer {
    pub(crate) fn create(gpu: &dyn GpuBackend, size: u64, persistent: bool) -> Result<Self> {
        let id = gpu.create_buffer(size, persistent)?;
        Ok(Self {
            id,
            size,
            persistent,
            mapped: persistent,
            flush_fence: None,
        })
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> BufferId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    #[inline]
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// Makes the buffer writable from the CPU.
    pub fn map(&mut self, gpu: &dyn GpuBackend) -> Result<()> {
        if self.persistent {
            assert!(self.mapped, "persistent transfer buffer lost its mapping");
            return Ok(());
        }
        gpu.map_buffer(self.id)?;
        self.mapped = true;
        Ok(())
    }

    /// Publishes CPU writes to the GPU.
    ///
    /// `fence` must be the primary stream's current fence: it is submitted
    /// after the flush at the end of the frame. Calling this again once a
    /// flush is underway does nothing.
    pub fn flush_or_unmap(&mut self, gpu: &dyn GpuBackend, fence: &Fence) -> Result<()> {
        if self.flush_fence.is_some() {
            return Ok(());
        }
        debug_assert_eq!(fence.stream(), CommandStream::Primary);
        debug_assert!(!fence.is_submitted());

        if self.persistent {
            gpu.flush_mapped(CommandStream::Primary, self.id)?;
        } else {
            assert!(self.mapped, "transfer buffer unmapped twice");
            gpu.unmap_buffer(self.id)?;
            self.mapped = false;
        }
        self.flush_fence = Some(fence.clone());
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn flush_started(&self) -> bool {
        self.flush_fence.is_some()
    }

    #[must_use]
    pub fn flush_complete(&self) -> bool {
        self.flush_fence.as_ref().is_some_and(Fence::is_signaled)
    }
}

impl Pooled for TransferBuffer {
    type Key = u64;

    fn key(&self) -> u64 {
        self.size
    }

    fn reset(&mut self) {
        self.flush_fence = None;
    }
}
