//! Upload Stage
//!
//! GPU uploads run on a dedicated thread that owns the secondary command
//! stream. The render thread hands each upload over as an
//! [`UploadCommand`] through a bounded queue:
//!
//! ```text
//!   render thread ──try_send──► [ bounded queue ] ──recv_timeout──► UploadWorker
//!                                                                    │ copy buffer → texture
//!                                                                    │ generate mipmaps
//!                                                                    │ submit fence
//!                                                                    └─► secondary ledger
//! ```
//!
//! The request keeps a clone of the command's fence and becomes ready once
//! the worker's ledger has observed it signaled. A failed upload never
//! submits the fence; the worker reports it through the command's
//! [`UploadFailure`] slot instead.

mod worker;

pub use worker::UploadWorker;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::Result;
use crate::gpu::{BufferId, CommandStream, GpuBackend, TextureId, TransferLayout};
use crate::sync::Fence;

/// Why an upload failed, written by the upload thread.
///
/// Clones share the slot.
#[derive(Debug, Clone, Default)]
pub struct UploadFailure {
    message: Arc<Mutex<Option<String>>>,
}

impl UploadFailure {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, message: impl Into<String>) {
        *self.message.lock() = Some(message.into());
    }

    #[must_use]
    pub fn get(&self) -> Option<String> {
        self.message.lock().clone()
    }
}

/// One queued upload.
#[derive(Debug)]
pub struct UploadCommand {
    pub name: String,
    pub buffer: BufferId,
    pub texture: TextureId,
    pub layout: TransferLayout,
    pub generate_mipmaps: bool,
    /// Pending fence on the secondary stream, submitted after the upload.
    pub fence: Fence,
    /// Set by the worker when `execute` fails.
    pub failure: UploadFailure,
}

impl UploadCommand {
    /// Issues the upload on the secondary stream and returns its fence.
    pub fn execute(self, gpu: &dyn GpuBackend) -> Result<Fence> {
        debug_assert_eq!(self.fence.stream(), CommandStream::Secondary);

        gpu.copy_buffer_to_texture(CommandStream::Secondary, self.buffer, self.texture, &self.layout)?;
        if self.generate_mipmaps {
            gpu.generate_mipmaps(CommandStream::Secondary, self.texture)?;
        }
        self.fence.submit(gpu);

        log::trace!("Upload of '{}' submitted", self.name);
        Ok(self.fence)
    }
}
