//! Texture Streamer
//!
//! The render-loop facade over [`StreamContext`] and its [`LoadRequest`]s.
//!
//! # Frame Protocol
//!
//! ```text
//! begin_frame()          sweep the primary ledger
//!   request(name)        start new loads
//!   update()             advance every request, drop failed ones
//!   bind_latest(unit)    bind the newest ready texture
//!   ... draw ...
//!   recycle_stale()      return older ready textures to the pools
//! end_frame()            submit the frame's fence
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let mut streamer = TextureStreamer::with_file_decoder(gpu, &settings)?;
//! loop {
//!     streamer.begin_frame();
//!     streamer.request("ground");
//!     streamer.update();
//!     if let Some(bound) = streamer.bind_latest(0) {
//!         renderer.draw_with(bound.texture);
//!     }
//!     streamer.recycle_stale();
//!     streamer.end_frame();
//! }
//! ```

use std::sync::Arc;

use crate::context::StreamContext;
use crate::errors::Result;
use crate::gpu::{GpuBackend, TextureId};
use crate::pool::PoolSetStats;
use crate::request::{LoadRequest, LoadState};
use crate::settings::StreamingSettings;
use crate::stages::{FileImageDecoder, ImageDecoder};

/// Identifies a request for the lifetime of the streamer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

/// A texture bound for the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundTexture {
    pub id: RequestId,
    pub unit: u32,
    pub texture: TextureId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamerStats {
    pub frame: u64,
    /// Live requests, excluding recycled and abandoned ones.
    pub in_flight: usize,
    pub ready: usize,
    pub recycled: u64,
    pub failed: u64,
    pub queued_uploads: usize,
    pub outstanding_primary_fences: usize,
    pub pools: PoolSetStats,
}

pub struct TextureStreamer {
    ctx: StreamContext,
    requests: Vec<(RequestId, LoadRequest)>,
    next_id: u64,
    frame: u64,
    bound: Option<BoundTexture>,
    recycled: u64,
    failed: u64,
}

impl TextureStreamer {
    pub fn new(
        gpu: Arc<dyn GpuBackend>,
        decoder: Arc<dyn ImageDecoder>,
        settings: &StreamingSettings,
    ) -> Result<Self> {
        let ctx = StreamContext::new(gpu, decoder, settings)?;
        log::info!("Texture streamer ready on '{}'", ctx.gpu().name());
        Ok(Self {
            ctx,
            requests: Vec::new(),
            next_id: 0,
            frame: 0,
            bound: None,
            recycled: 0,
            failed: 0,
        })
    }

    /// Streams `{source_root}/{name}.{source_extension}` files.
    pub fn with_file_decoder(gpu: Arc<dyn GpuBackend>, settings: &StreamingSettings) -> Result<Self> {
        let decoder = FileImageDecoder::new(&settings.source_root, settings.source_extension.clone());
        Self::new(gpu, Arc::new(decoder), settings)
    }

    pub fn begin_frame(&mut self) {
        self.ctx.begin_frame();
        self.bound = None;
    }

    pub fn end_frame(&mut self) {
        self.ctx.end_frame();
        self.frame += 1;
    }

    pub fn request(&mut self, name: impl Into<String>) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id += 1;
        self.requests.push((id, LoadRequest::new(name, &self.ctx)));
        id
    }

    /// Advances every request. Failed requests are abandoned.
    pub fn update(&mut self) {
        for (_, request) in &mut self.requests {
            request.update(&mut self.ctx);
        }

        let (failed, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.requests)
            .into_iter()
            .partition(|(_, request)| request.is_failed());
        self.requests = live;

        for (_, request) in failed {
            self.failed += 1;
            request.abandon(&mut self.ctx);
        }
    }

    /// Binds the newest request whose texture is complete.
    pub fn bind_latest(&mut self, unit: u32) -> Option<BoundTexture> {
        let (id, request) = self
            .requests
            .iter_mut()
            .rev()
            .find(|(_, request)| request.state().is_bindable())?;

        let texture = request.bind(&self.ctx.primary)?;
        let bound = BoundTexture {
            id: *id,
            unit,
            texture,
        };
        self.bound = Some(bound);
        Some(bound)
    }

    /// Recycles every recyclable request once a texture has been bound
    /// this frame. Returns how many were recycled.
    pub fn recycle_stale(&mut self) -> usize {
        if self.bound.is_none() {
            return 0;
        }

        let pools = &mut self.ctx.pools;
        let before = self.requests.len();
        self.requests.retain_mut(|(_, request)| {
            if !request.state().is_recyclable() {
                return true;
            }
            request.recycle(pools).is_err()
        });

        let recycled = before - self.requests.len();
        self.recycled += recycled as u64;
        recycled
    }

    #[must_use]
    pub fn state(&self, id: RequestId) -> Option<LoadState> {
        self.find(id).map(LoadRequest::state)
    }

    #[must_use]
    pub fn find(&self, id: RequestId) -> Option<&LoadRequest> {
        self.requests
            .iter()
            .find(|(rid, _)| *rid == id)
            .map(|(_, request)| request)
    }

    #[inline]
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> &StreamContext {
        &self.ctx
    }

    #[must_use]
    pub fn stats(&self) -> StreamerStats {
        StreamerStats {
            frame: self.frame,
            in_flight: self.requests.len(),
            ready: self
                .requests
                .iter()
                .filter(|(_, request)| request.state().is_bindable())
                .count(),
            recycled: self.recycled,
            failed: self.failed,
            queued_uploads: self.ctx.uploads().queued(),
            outstanding_primary_fences: self.ctx.primary().outstanding(),
            pools: self.ctx.pools().stats(),
        }
    }
}
