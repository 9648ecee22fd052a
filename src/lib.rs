#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

//! # Myth Streaming
//!
//! Asynchronous texture streaming for the myth renderer. Images are decoded,
//! staged and uploaded without the render thread ever waiting on I/O,
//! decode or the GPU.
//!
//! ```text
//!   render thread       background pool         upload thread
//!   ─────────────       ───────────────         ─────────────
//!   request(name) ──►   decode + normalize
//!                       copy into mapped buffer
//!   flush / unmap ◄──
//!   primary fence ──►                       ──►  copy + mipmaps
//!                                                secondary fence
//!   ready, bind   ◄─────────────────────────────
//!   render fence, recycle into pools
//! ```
//!
//! The render thread drives everything by polling: stage latches, and
//! fences swept once per frame by the primary [`FenceLedger`]. The upload
//! thread owns the secondary command stream and sweeps its own ledger.
//!
//! Start with [`TextureStreamer`]; the pieces underneath
//! ([`StreamContext`], [`LoadRequest`], [`ResourcePools`]) are public for
//! renderers that schedule requests themselves.

pub mod context;
pub mod errors;
pub mod gpu;
pub mod pool;
pub mod request;
pub mod settings;
pub mod stages;
pub mod streamer;
pub mod sync;
pub mod upload;

pub use context::StreamContext;
pub use errors::{Result, StreamError};
pub use gpu::{
    BufferId, CommandStream, Extent, FenceId, FenceStatus, GpuBackend, HeadlessGpu, RetireMode,
    TextureId, TransferLayout, WgpuGpu,
};
pub use pool::{PoolSetStats, PoolStats, ResourcePools};
pub use request::{LoadRequest, LoadState};
pub use settings::{MappingPolicy, StreamingSettings};
pub use stages::{
    BrightnessPulse, DecodedImage, FileImageDecoder, ImageDecoder, MemoryImageDecoder, PixelLayout,
};
pub use streamer::{BoundTexture, RequestId, StreamerStats, TextureStreamer};
pub use sync::{CompletionLatch, Fence, FenceLedger};
