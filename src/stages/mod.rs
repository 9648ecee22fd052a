//! Background Stages
//!
//! The CPU-side half of a load request:
//!
//! ```text
//!   DecodeStage      name ──► decode + normalize ──► RawBlock (RGBA8)
//!   BufferFillStage  RawBlock ──► mapped TransferBuffer ──► flush/unmap
//! ```
//!
//! Both run on the [`StageRuntime`] blocking pool and are polled from the
//! render thread. Neither touches a command stream from the background;
//! the fill task only writes through the buffer mapping.

mod decode;
mod fill;
mod runtime;
mod transform;

pub use decode::{
    DecodeStage, DecodedBitmap, DecodedImage, FileImageDecoder, ImageDecoder, MemoryImageDecoder,
};
pub use fill::BufferFillStage;
pub use runtime::{StageRuntime, StageTask};
pub use transform::{BrightnessPulse, PixelLayout, normalize_into};
