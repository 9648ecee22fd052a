use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::gpu::{CommandStream, FenceId, GpuBackend};

struct FenceInner {
    stream: CommandStream,
    /// Backend fence, present between submission and signal.
    handle: Mutex<Option<FenceId>>,
    submitted: AtomicBool,
    signaled: AtomicBool,
}

/// A point in one GPU command stream.
///
/// A fence starts *pending*: it stands for every command issued on its
/// stream from now on. [`submit`](Self::submit) pins it after those
/// commands. Clones share state, which is how a request holds on to the
/// ledger's current fence before the ledger submits it.
#[derive(Clone)]
pub struct Fence {
    inner: Arc<FenceInner>,
}

impl Fence {
    #[must_use]
    pub fn pending(stream: CommandStream) -> Self {
        Self {
            inner: Arc::new(FenceInner {
                stream,
                handle: Mutex::new(None),
                submitted: AtomicBool::new(false),
                signaled: AtomicBool::new(false),
            }),
        }
    }

    #[inline]
    #[must_use]
    pub fn stream(&self) -> CommandStream {
        self.inner.stream
    }

    /// Inserts the backend fence after everything issued on the stream.
    ///
    /// Must be called on the thread driving the fence's stream.
    pub fn submit(&self, gpu: &dyn GpuBackend) {
        let mut handle = self.inner.handle.lock();
        assert!(
            !self.inner.submitted.load(Ordering::Acquire),
            "fence submitted twice"
        );
        *handle = Some(gpu.create_fence(self.inner.stream));
        self.inner.submitted.store(true, Ordering::Release);
    }

    #[inline]
    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.inner.submitted.load(Ordering::Acquire)
    }

    /// Cached result of the last poll. Safe to read from any thread.
    #[inline]
    #[must_use]
    pub fn is_signaled(&self) -> bool {
        self.inner.signaled.load(Ordering::Acquire)
    }

    /// Bounded, non-blocking check of the backend fence.
    ///
    /// Only [`FenceStatus::Signaled`](crate::gpu::FenceStatus::Signaled)
    /// counts; timeouts and failed waits leave the fence pending. The
    /// backend fence is released as soon as it has signaled, later polls
    /// just return the cached flag.
    pub fn poll(&self, gpu: &dyn GpuBackend, timeout: Duration) -> bool {
        if self.is_signaled() {
            return true;
        }
        let mut handle = self.inner.handle.lock();
        let Some(id) = *handle else {
            return false;
        };

        if !gpu.poll_fence(self.inner.stream, id, timeout).is_signaled() {
            return false;
        }
        gpu.delete_fence(self.inner.stream, id);
        *handle = None;
        self.inner.signaled.store(true, Ordering::Release);
        true
    }

    /// Releases the backend fence without waiting for it.
    pub(crate) fn release(&self, gpu: &dyn GpuBackend) {
        if let Some(id) = self.inner.handle.lock().take() {
            gpu.delete_fence(self.inner.stream, id);
        }
    }
}

impl std::fmt::Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fence")
            .field("stream", &self.inner.stream)
            .field("submitted", &self.is_submitted())
            .field("signaled", &self.is_signaled())
            .finish()
    }
}
