use std::path::PathBuf;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::runtime::{StageRuntime, StageTask};
use super::transform::{BrightnessPulse, PixelLayout, normalize_into};
use crate::errors::{Result, StreamError};
use crate::gpu::Extent;
use crate::pool::{RawBlock, RawBlockPool};
use crate::sync::CompletionLatch;

// ============================================================================
// Decoders
// ============================================================================

/// An image as produced by a decoder, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    #[must_use]
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.layout.channels()
    }
}

/// Turns a source name into pixels. Called on a background thread.
pub trait ImageDecoder: Send + Sync + 'static {
    fn decode(&self, name: &str) -> Result<DecodedImage>;
}

/// Decodes `{root}/{name}.{extension}` with the `image` crate.
pub struct FileImageDecoder {
    root: PathBuf,
    extension: String,
}

impl FileImageDecoder {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    #[must_use]
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{}", self.extension))
    }
}

impl ImageDecoder for FileImageDecoder {
    fn decode(&self, name: &str) -> Result<DecodedImage> {
        let path = self.path_of(name);
        if !path.exists() {
            return Err(StreamError::SourceNotFound(path.display().to_string()));
        }

        let image = image::open(&path)?;
        let color = image.color();
        let layout = PixelLayout::from_color_type(color)
            .unwrap_or_else(|| panic!("unsupported source pixel layout {color:?} in {name}"));

        Ok(DecodedImage {
            width: image.width(),
            height: image.height(),
            layout,
            pixels: image.into_bytes(),
        })
    }
}

/// Serves pre-decoded images by name.
#[derive(Default)]
pub struct MemoryImageDecoder {
    images: FxHashMap<String, DecodedImage>,
}

impl MemoryImageDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_image(mut self, name: impl Into<String>, image: DecodedImage) -> Self {
        self.insert(name, image);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, image: DecodedImage) {
        self.images.insert(name.into(), image);
    }
}

impl ImageDecoder for MemoryImageDecoder {
    fn decode(&self, name: &str) -> Result<DecodedImage> {
        self.images
            .get(name)
            .cloned()
            .ok_or_else(|| StreamError::SourceNotFound(name.to_string()))
    }
}

// ============================================================================
// Decode Stage
// ============================================================================

/// A normalized RGBA8 image in pooled memory.
#[derive(Debug)]
pub struct DecodedBitmap {
    pub extent: Extent,
    pub block: RawBlock,
}

impl DecodedBitmap {
    #[inline]
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.block.len()
    }
}

/// Decodes one source off the render thread.
///
/// A failed decode is logged and the stage never completes.
pub struct DecodeStage {
    name: String,
    task: StageTask<Result<DecodedBitmap>>,
    output: Option<DecodedBitmap>,
    failure: Option<String>,
    latch: CompletionLatch,
}

impl DecodeStage {
    pub fn start(
        runtime: &StageRuntime,
        decoder: Arc<dyn ImageDecoder>,
        pulse: Arc<BrightnessPulse>,
        raw: RawBlockPool,
        name: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let source = name.clone();
        let task = runtime.spawn_blocking(move || decode_normalized(&*decoder, &pulse, &raw, &source));

        Self {
            name,
            task,
            output: None,
            failure: None,
            latch: CompletionLatch::new(),
        }
    }

    /// `true` exactly once, on the first poll after the bitmap is ready.
    pub fn just_completed(&mut self) -> bool {
        if let Some(result) = self.task.try_take() {
            match result.and_then(|decoded| decoded) {
                Ok(bitmap) => self.output = Some(bitmap),
                Err(err) => {
                    log::error!("Failed to decode '{}': {err}", self.name);
                    self.failure = Some(err.to_string());
                }
            }
        }
        let ready = self.output.is_some();
        self.latch.poll(|| ready)
    }

    /// Moves the bitmap out after completion.
    pub fn take_output(&mut self) -> Option<DecodedBitmap> {
        self.output.take()
    }

    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }
}

fn decode_normalized(
    decoder: &dyn ImageDecoder,
    pulse: &BrightnessPulse,
    raw: &RawBlockPool,
    name: &str,
) -> Result<DecodedBitmap> {
    let image = decoder.decode(name)?;
    let brightness = pulse.advance();

    let expected = image.expected_len();
    if image.pixels.len() != expected {
        return Err(StreamError::PixelSizeMismatch {
            expected,
            actual: image.pixels.len(),
        });
    }

    let extent = Extent::new(image.width, image.height);
    let mut block = raw.acquire(extent.byte_len());
    normalize_into(image.layout, &image.pixels, brightness, block.as_mut_slice());

    log::debug!(
        "Decoded '{name}' ({}x{}, {:?}) at brightness {brightness:.3}",
        image.width,
        image.height,
        image.layout
    );
    Ok(DecodedBitmap { extent, block })
}
