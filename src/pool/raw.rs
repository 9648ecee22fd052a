use std::sync::Arc;

use parking_lot::Mutex;

use super::{Pool, PoolStats, Pooled};

/// Pooled CPU memory holding one decoded image in canonical RGBA8 order.
#[derive(Debug)]
pub struct RawBlock {
    bytes: Vec<u8>,
}

impl RawBlock {
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl Pooled for RawBlock {
    type Key = usize;

    fn key(&self) -> usize {
        self.bytes.len()
    }
}

/// Raw block pool shared between the render thread and decode workers.
#[derive(Clone)]
pub struct RawBlockPool {
    inner: Arc<Mutex<Pool<RawBlock>>>,
}

impl RawBlockPool {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Pool::new("Raw block"))),
        }
    }

    /// A block of exactly `len` bytes. Contents are unspecified.
    #[must_use]
    pub fn acquire(&self, len: usize) -> RawBlock {
        self.inner.lock().acquire(len, |len| RawBlock {
            bytes: vec![0; len],
        })
    }

    pub fn release(&self, block: RawBlock) {
        self.inner.lock().release(block);
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.inner.lock().stats()
    }

    pub(crate) fn clear(&self) {
        self.inner.lock().drain().for_each(drop);
    }
}

impl Default for RawBlockPool {
    fn default() -> Self {
        Self::new()
    }
}
