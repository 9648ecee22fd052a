//! Load Request
//!
//! One requested image moving through the pipeline:
//!
//! ```text
//!   Decoding ──► FillingBuffer ──► QueuedForUpload ──► Uploading ──► Ready
//!                                                                    │ bind
//!                                         Recycled ◄── Recyclable ◄── Rendering
//!                                                 recycle       render fence
//! ```
//!
//! | From              | Condition                           | Action                           |
//! |-------------------|-------------------------------------|----------------------------------|
//! | `Decoding`        | decode latch fires                  | acquire texture + transfer, fill |
//! | `FillingBuffer`   | fill latch fires, queue accepts     | enqueue upload                   |
//! | `QueuedForUpload` | upload fence submitted              |                                  |
//! | `Uploading`       | upload fence signaled               |                                  |
//! | `Ready`           | [`LoadRequest::bind`]               | capture primary current fence    |
//! | `Rendering`       | render fence signaled               |                                  |
//! | `Ready`/`Recyclable` | [`LoadRequest::recycle`]         | return resources to the pools    |
//!
//! All transitions happen on the render thread in [`LoadRequest::update`].
//! A stage failure, including a failed upload on the worker thread, leaves
//! the request in its current state for good and is reported through
//! [`LoadRequest::failure`]. [`LoadRequest::abandon`] then returns what it
//! holds to the pools.

use std::sync::Arc;

use crate::context::StreamContext;
use crate::errors::{Result, StreamError};
use crate::gpu::{CommandStream, Extent, TextureId, TransferLayout};
use crate::pool::{PooledTexture, RawBlock, ResourcePools, TransferBuffer};
use crate::stages::{BufferFillStage, DecodeStage, DecodedBitmap};
use crate::sync::{Fence, FenceLedger};
use crate::upload::{UploadCommand, UploadFailure};

/// Lifecycle of a [`LoadRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadState {
    Decoding,
    FillingBuffer,
    QueuedForUpload,
    /// The upload was submitted and its fence has not signaled yet.
    Uploading,
    Ready,
    /// Bound by a frame whose commands have not retired.
    Rendering,
    Recyclable,
    Recycled,
}

impl LoadState {
    /// The texture holds the complete image.
    #[inline]
    #[must_use]
    pub fn is_bindable(self) -> bool {
        matches!(self, Self::Ready | Self::Rendering | Self::Recyclable)
    }

    /// No submitted frame still reads the texture.
    #[inline]
    #[must_use]
    pub fn is_recyclable(self) -> bool {
        matches!(self, Self::Ready | Self::Recyclable)
    }
}

pub struct LoadRequest {
    name: String,
    state: LoadState,

    decode: Option<DecodeStage>,
    fill: Option<BufferFillStage>,
    fill_done: bool,

    layout: Option<TransferLayout>,
    block: Option<RawBlock>,
    transfer: Option<TransferBuffer>,
    texture: Option<PooledTexture>,

    upload_fence: Option<Fence>,
    upload_failure: Option<UploadFailure>,
    render_fence: Option<Fence>,
    failure: Option<String>,
}

impl LoadRequest {
    /// Starts decoding `name` in the background.
    pub fn new(name: impl Into<String>, ctx: &StreamContext) -> Self {
        let name = name.into();
        let decode = DecodeStage::start(
            &ctx.runtime,
            Arc::clone(&ctx.decoder),
            Arc::clone(&ctx.pulse),
            ctx.pools.raw().clone(),
            name.clone(),
        );
        log::debug!("Requested '{name}'");

        Self {
            name,
            state: LoadState::Decoding,
            decode: Some(decode),
            fill: None,
            fill_done: false,
            layout: None,
            block: None,
            transfer: None,
            texture: None,
            upload_fence: None,
            upload_failure: None,
            render_fence: None,
            failure: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Why the request stopped progressing, if it did.
    #[inline]
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    #[must_use]
    pub fn texture(&self) -> Option<TextureId> {
        self.texture.as_ref().map(PooledTexture::id)
    }

    /// The staging buffer while the request owns one.
    #[must_use]
    pub fn transfer(&self) -> Option<&TransferBuffer> {
        self.transfer.as_ref()
    }

    #[must_use]
    pub fn extent(&self) -> Option<Extent> {
        self.texture.as_ref().map(PooledTexture::extent)
    }

    /// Advances the state machine by polling stage latches and fences.
    pub fn update(&mut self, ctx: &mut StreamContext) -> LoadState {
        if self.is_failed() {
            return self.state;
        }

        match self.state {
            LoadState::Decoding => self.poll_decode(ctx),
            LoadState::FillingBuffer => self.poll_fill(ctx),
            LoadState::QueuedForUpload | LoadState::Uploading => self.poll_upload(),
            LoadState::Rendering => {
                if self.render_fence.as_ref().is_some_and(Fence::is_signaled) {
                    self.state = LoadState::Recyclable;
                }
            }
            LoadState::Ready | LoadState::Recyclable | LoadState::Recycled => {}
        }
        self.state
    }

    fn poll_decode(&mut self, ctx: &mut StreamContext) {
        let Some(decode) = self.decode.as_mut() else {
            return;
        };
        if !decode.just_completed() {
            if let Some(failure) = decode.failure() {
                self.failure = Some(failure.to_string());
            }
            return;
        }
        let Some(bitmap) = decode.take_output() else {
            return;
        };
        self.decode = None;

        match self.start_fill(ctx, bitmap) {
            Ok(()) => self.state = LoadState::FillingBuffer,
            Err(err) => {
                log::error!("Failed to allocate GPU resources for '{}': {err}", self.name);
                self.failure = Some(err.to_string());
            }
        }
    }

    fn start_fill(&mut self, ctx: &mut StreamContext, bitmap: DecodedBitmap) -> Result<()> {
        let DecodedBitmap { extent, block } = bitmap;
        let layout = ctx.gpu.transfer_layout(extent);

        let texture = match ctx.pools.acquire_texture(&*ctx.gpu, extent) {
            Ok(texture) => texture,
            Err(err) => {
                ctx.pools.raw().release(block);
                return Err(err);
            }
        };
        let transfer = match ctx.pools.acquire_transfer(&*ctx.gpu, layout.size()) {
            Ok(transfer) => transfer,
            Err(err) => {
                ctx.pools.release_texture(texture);
                ctx.pools.raw().release(block);
                return Err(err);
            }
        };

        self.fill = Some(BufferFillStage::start(
            &ctx.runtime,
            Arc::clone(&ctx.gpu),
            &transfer,
            layout,
            block,
            self.name.clone(),
        ));
        self.layout = Some(layout);
        self.transfer = Some(transfer);
        self.texture = Some(texture);
        Ok(())
    }

    fn poll_fill(&mut self, ctx: &mut StreamContext) {
        if !self.fill_done {
            let (Some(fill), Some(transfer)) = (self.fill.as_mut(), self.transfer.as_mut()) else {
                return;
            };
            if !fill.just_completed(&*ctx.gpu, transfer, ctx.primary.current()) {
                if let Some(failure) = fill.failure() {
                    self.failure = Some(failure.to_string());
                }
                return;
            }
            self.block = fill.take_block();
            self.fill = None;
            self.fill_done = true;
        }

        self.enqueue_upload(ctx);
    }

    fn enqueue_upload(&mut self, ctx: &StreamContext) {
        let (Some(transfer), Some(texture), Some(layout)) =
            (self.transfer.as_ref(), self.texture.as_ref(), self.layout)
        else {
            return;
        };

        let fence = Fence::pending(CommandStream::Secondary);
        let failure = UploadFailure::new();
        let command = UploadCommand {
            name: self.name.clone(),
            buffer: transfer.id(),
            texture: texture.id(),
            layout,
            generate_mipmaps: texture.mip_levels() > 1,
            fence: fence.clone(),
            failure: failure.clone(),
        };

        match ctx.uploads.submit(command) {
            Ok(()) => {
                self.upload_fence = Some(fence);
                self.upload_failure = Some(failure);
                self.state = LoadState::QueuedForUpload;
            }
            Err(StreamError::UploadQueueFull) => {
                log::trace!("Upload queue full, '{}' retries next update", self.name);
            }
            Err(err) => {
                log::error!("Failed to queue the upload of '{}': {err}", self.name);
                self.failure = Some(err.to_string());
            }
        }
    }

    fn poll_upload(&mut self) {
        let Some(fence) = self.upload_fence.as_ref() else {
            return;
        };
        if let Some(failure) = self.upload_failure.as_ref().and_then(UploadFailure::get) {
            self.failure = Some(failure);
            return;
        }
        if self.state == LoadState::QueuedForUpload && fence.is_submitted() {
            self.state = LoadState::Uploading;
        }
        if self.state == LoadState::Uploading && fence.is_signaled() {
            self.state = LoadState::Ready;
            log::debug!("'{}' is ready", self.name);
        }
    }

    /// Marks the texture as used by the frame being recorded.
    ///
    /// The primary stream's current fence becomes the render fence; the
    /// request can be recycled once it has signaled.
    pub fn bind(&mut self, primary: &FenceLedger) -> Option<TextureId> {
        assert!(
            self.state.is_bindable(),
            "request '{}' bound while {:?}",
            self.name,
            self.state
        );
        debug_assert_eq!(primary.stream(), CommandStream::Primary);

        self.render_fence = Some(primary.current().clone());
        self.state = LoadState::Rendering;
        self.texture()
    }

    /// Returns the texture, transfer buffer and raw block to their pools.
    ///
    /// Rejected unless the request is `Ready` or `Recyclable`.
    pub fn recycle(&mut self, pools: &mut ResourcePools) -> Result<()> {
        if !self.state.is_recyclable() {
            return Err(StreamError::RecycleRejected {
                name: self.name.clone(),
                state: self.state,
            });
        }
        assert!(
            self.upload_fence.as_ref().is_some_and(Fence::is_signaled),
            "recycled '{}' before its upload completed",
            self.name
        );

        let (Some(texture), Some(transfer), Some(block)) =
            (self.texture.take(), self.transfer.take(), self.block.take())
        else {
            panic!("ready request '{}' lost its pooled resources", self.name);
        };

        pools.release_transfer(transfer);
        pools.release_texture(texture);
        pools.raw().release(block);

        self.upload_fence = None;
        self.upload_failure = None;
        self.render_fence = None;
        self.state = LoadState::Recycled;
        log::trace!("Recycled '{}'", self.name);
        Ok(())
    }

    /// Releases whatever a failed request still holds.
    ///
    /// The transfer buffer is deleted: a failed fill leaves its mapping in
    /// an unknown state.
    pub fn abandon(mut self, ctx: &mut StreamContext) {
        debug_assert!(self.is_failed());
        if let Some(texture) = self.texture.take() {
            ctx.pools.release_texture(texture);
        }
        if let Some(transfer) = self.transfer.take() {
            ctx.pools.discard_transfer(&*ctx.gpu, transfer);
        }
        if let Some(block) = self.block.take() {
            ctx.pools.raw().release(block);
        }
        log::warn!("Abandoned '{}' after: {}", self.name, self.failure().unwrap_or("unknown failure"));
    }
}

impl std::fmt::Debug for LoadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadRequest")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}
