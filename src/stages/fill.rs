use std::sync::Arc;

use super::runtime::{StageRuntime, StageTask};
use crate::errors::Result;
use crate::gpu::{BufferId, GpuBackend, TransferLayout};
use crate::pool::{RawBlock, TransferBuffer};
use crate::sync::{CompletionLatch, Fence};

/// Copies a decoded block into a mapped transfer buffer off the render
/// thread, then publishes it with a flush or unmap.
///
/// Completion is the conjunction of the copy task finishing and the
/// publish fence signaling on the primary stream.
pub struct BufferFillStage {
    name: String,
    task: StageTask<Result<RawBlock>>,
    block: Option<RawBlock>,
    failure: Option<String>,
    latch: CompletionLatch,
}

impl BufferFillStage {
    /// `transfer` must already be mapped and at least `layout.size()` bytes.
    pub fn start(
        runtime: &StageRuntime,
        gpu: Arc<dyn GpuBackend>,
        transfer: &TransferBuffer,
        layout: TransferLayout,
        block: RawBlock,
        name: impl Into<String>,
    ) -> Self {
        assert!(transfer.is_mapped(), "buffer fill into an unmapped transfer buffer");
        debug_assert!(transfer.size() >= layout.size());

        let buffer = transfer.id();
        let task = runtime.spawn_blocking(move || -> Result<RawBlock> {
            write_rows(&*gpu, buffer, &layout, block.as_slice())?;
            Ok(block)
        });

        Self {
            name: name.into(),
            task,
            block: None,
            failure: None,
            latch: CompletionLatch::new(),
        }
    }

    /// `true` exactly once, after the copy finished and the publish fence
    /// has signaled.
    ///
    /// The publish is issued on the first poll after the copy; `fence` is
    /// the primary stream's current fence at that point.
    pub fn just_completed(
        &mut self,
        gpu: &dyn GpuBackend,
        transfer: &mut TransferBuffer,
        fence: &Fence,
    ) -> bool {
        if let Some(result) = self.task.try_take() {
            match result.and_then(|copied| copied) {
                Ok(block) => self.block = Some(block),
                Err(err) => self.fail(&err),
            }
        }

        if self.block.is_some() && self.failure.is_none() && !transfer.flush_started() {
            if let Err(err) = transfer.flush_or_unmap(gpu, fence) {
                self.fail(&err);
            }
        }

        let copied = self.block.is_some() && self.failure.is_none();
        self.latch.poll(|| copied && transfer.flush_complete())
    }

    fn fail(&mut self, err: &dyn std::fmt::Display) {
        log::error!("Failed to fill the transfer buffer for '{}': {err}", self.name);
        self.failure = Some(err.to_string());
    }

    /// Moves the raw block back out once the copy has finished.
    pub fn take_block(&mut self) -> Option<RawBlock> {
        self.block.take()
    }

    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }
}

/// Writes tightly packed rows into a pitched mapping.
fn write_rows(gpu: &dyn GpuBackend, buffer: BufferId, layout: &TransferLayout, src: &[u8]) -> Result<()> {
    if layout.is_tight() {
        return gpu.write_mapped(buffer, 0, src);
    }

    let row_bytes = layout.row_bytes as usize;
    for (row, data) in src.chunks_exact(row_bytes).enumerate() {
        let offset = row as u64 * u64::from(layout.bytes_per_row);
        gpu.write_mapped(buffer, offset, data)?;
    }
    Ok(())
}
