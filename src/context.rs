//! Stream Context
//!
//! The services a load request runs against, owned explicitly instead of
//! living in globals:
//!
//! - the GPU backend and the primary stream's [`FenceLedger`]
//! - the background [`StageRuntime`], decoder and brightness pulse
//! - the [`ResourcePools`]
//! - the secondary [`UploadWorker`]
//!
//! Everything here except the raw-block pool and the upload queue is used
//! from the render thread only.

use std::sync::Arc;

use crate::errors::Result;
use crate::gpu::{CommandStream, GpuBackend};
use crate::pool::ResourcePools;
use crate::settings::StreamingSettings;
use crate::stages::{BrightnessPulse, ImageDecoder, StageRuntime};
use crate::sync::FenceLedger;
use crate::upload::UploadWorker;

pub struct StreamContext {
    pub(crate) gpu: Arc<dyn GpuBackend>,
    pub(crate) runtime: StageRuntime,
    pub(crate) decoder: Arc<dyn ImageDecoder>,
    pub(crate) pulse: Arc<BrightnessPulse>,
    pub(crate) pools: ResourcePools,
    pub(crate) uploads: UploadWorker,
    pub(crate) primary: FenceLedger,
}

impl StreamContext {
    pub fn new(
        gpu: Arc<dyn GpuBackend>,
        decoder: Arc<dyn ImageDecoder>,
        settings: &StreamingSettings,
    ) -> Result<Self> {
        let runtime = StageRuntime::new(settings.worker_threads)?;
        let pools = ResourcePools::new(&*gpu, settings);
        let uploads = UploadWorker::spawn(Arc::clone(&gpu), settings)?;

        Ok(Self {
            runtime,
            decoder,
            pulse: Arc::new(BrightnessPulse::new(settings.brightness_period)),
            pools,
            uploads,
            primary: FenceLedger::new(CommandStream::Primary, settings.fence_poll_timeout()),
            gpu,
        })
    }

    /// Sweeps the primary ledger. Call before any request is updated.
    pub fn begin_frame(&mut self) {
        self.primary.begin_boundary(&*self.gpu);
    }

    /// Submits the frame's fence. Call after the frame's draws.
    pub fn end_frame(&mut self) {
        self.primary.end_boundary(&*self.gpu);
    }

    #[inline]
    #[must_use]
    pub fn gpu(&self) -> &Arc<dyn GpuBackend> {
        &self.gpu
    }

    #[inline]
    #[must_use]
    pub fn pools(&self) -> &ResourcePools {
        &self.pools
    }

    #[inline]
    pub fn pools_mut(&mut self) -> &mut ResourcePools {
        &mut self.pools
    }

    #[inline]
    #[must_use]
    pub fn primary(&self) -> &FenceLedger {
        &self.primary
    }

    #[inline]
    #[must_use]
    pub fn uploads(&self) -> &UploadWorker {
        &self.uploads
    }

    #[inline]
    #[must_use]
    pub fn pulse(&self) -> &BrightnessPulse {
        &self.pulse
    }
}

impl Drop for StreamContext {
    fn drop(&mut self) {
        self.uploads.shutdown();
        self.pools.destroy(&*self.gpu);
        self.primary.release(&*self.gpu);
    }
}
