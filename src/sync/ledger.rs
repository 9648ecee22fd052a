use std::collections::VecDeque;
use std::time::Duration;

use super::Fence;
use crate::gpu::{CommandStream, GpuBackend};

/// Outstanding fences of one command stream.
///
/// A stream retires commands in submission order, so the sweep walks from
/// the oldest fence and stops at the first one still pending.
///
/// ```text
///   begin_boundary ── sweep, current must be unsignaled
///        ...          commands issued, `current()` handed out
///   end_boundary   ── submit current ─► outstanding, new current
/// ```
pub struct FenceLedger {
    stream: CommandStream,
    current: Fence,
    outstanding: VecDeque<Fence>,
    poll_timeout: Duration,
}

impl FenceLedger {
    #[must_use]
    pub fn new(stream: CommandStream, poll_timeout: Duration) -> Self {
        Self {
            stream,
            current: Fence::pending(stream),
            outstanding: VecDeque::new(),
            poll_timeout,
        }
    }

    #[inline]
    #[must_use]
    pub fn stream(&self) -> CommandStream {
        self.stream
    }

    /// Fence covering the commands issued since the last boundary.
    #[inline]
    #[must_use]
    pub fn current(&self) -> &Fence {
        &self.current
    }

    #[inline]
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn begin_boundary(&mut self, gpu: &dyn GpuBackend) {
        self.sweep(gpu);
        assert!(
            !self.current.is_signaled(),
            "current fence signaled before its boundary ended"
        );
    }

    pub fn end_boundary(&mut self, gpu: &dyn GpuBackend) {
        self.current.submit(gpu);
        let finished = std::mem::replace(&mut self.current, Fence::pending(self.stream));
        self.outstanding.push_back(finished);
    }

    /// Tracks a fence submitted outside the boundary cycle.
    pub fn track(&mut self, fence: Fence) {
        assert_eq!(fence.stream(), self.stream, "fence tracked on a foreign ledger");
        assert!(fence.is_submitted(), "tracked fence was never submitted");
        self.outstanding.push_back(fence);
    }

    /// Removes every leading signaled fence. Returns how many were removed.
    pub fn sweep(&mut self, gpu: &dyn GpuBackend) -> usize {
        let mut retired = 0;
        while let Some(oldest) = self.outstanding.front() {
            if !oldest.poll(gpu, self.poll_timeout) {
                break;
            }
            self.outstanding.pop_front();
            retired += 1;
        }
        retired
    }

    /// Drops every outstanding fence, releasing its backend handle.
    pub fn release(&mut self, gpu: &dyn GpuBackend) {
        for fence in self.outstanding.drain(..) {
            fence.release(gpu);
        }
    }
}
