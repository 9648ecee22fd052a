//! Pixel Normalization
//!
//! Decoded images arrive in one of a closed set of [`PixelLayout`]s and are
//! rewritten into canonical RGBA8 while a brightness scalar is applied to
//! every channel, alpha included.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::gpu::BYTES_PER_PIXEL;

/// Channel layout of a decoded source image, 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelLayout {
    Rgba8,
    Bgra8,
    Rgb8,
    Gray8,
    GrayAlpha8,
}

impl PixelLayout {
    #[inline]
    #[must_use]
    pub const fn channels(self) -> usize {
        match self {
            Self::Rgba8 | Self::Bgra8 => 4,
            Self::Rgb8 => 3,
            Self::Gray8 => 1,
            Self::GrayAlpha8 => 2,
        }
    }

    /// Maps an `image` color type onto a supported layout.
    #[must_use]
    pub fn from_color_type(color: image::ColorType) -> Option<Self> {
        match color {
            image::ColorType::Rgba8 => Some(Self::Rgba8),
            image::ColorType::Rgb8 => Some(Self::Rgb8),
            image::ColorType::L8 => Some(Self::Gray8),
            image::ColorType::La8 => Some(Self::GrayAlpha8),
            _ => None,
        }
    }
}

/// Per-decode brightness pulse.
///
/// Each call to [`advance`](Self::advance) advances a counter and returns
/// `(sin(counter / period) + 1) / 2`, so the first image decodes at half
/// brightness. Without a period the pulse is a constant `1.0`.
#[derive(Debug)]
pub struct BrightnessPulse {
    counter: AtomicU64,
    period: Option<f32>,
}

impl BrightnessPulse {
    #[must_use]
    pub fn new(period: Option<f32>) -> Self {
        Self {
            counter: AtomicU64::new(0),
            period: period.filter(|p| *p > 0.0),
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn advance(&self) -> f32 {
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        match self.period {
            Some(period) => ((count as f32 / period).sin() + 1.0) / 2.0,
            None => 1.0,
        }
    }

    /// Number of decodes so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

#[inline]
fn scale(value: u8, brightness: f32) -> u8 {
    (f32::from(value) * brightness) as u8
}

/// Writes `src` into `dst` as RGBA8, scaling every channel by `brightness`.
///
/// `dst` must hold exactly one RGBA8 pixel per source pixel.
pub fn normalize_into(layout: PixelLayout, src: &[u8], brightness: f32, dst: &mut [u8]) {
    let channels = layout.channels();
    let bpp = BYTES_PER_PIXEL as usize;
    assert_eq!(
        src.len() / channels * bpp,
        dst.len(),
        "normalized block does not match the source"
    );

    for (pixel, out) in src.chunks_exact(channels).zip(dst.chunks_exact_mut(bpp)) {
        let rgba = match layout {
            PixelLayout::Rgba8 => [pixel[0], pixel[1], pixel[2], pixel[3]],
            PixelLayout::Bgra8 => [pixel[2], pixel[1], pixel[0], pixel[3]],
            PixelLayout::Rgb8 => [pixel[0], pixel[1], pixel[2], u8::MAX],
            PixelLayout::Gray8 => [pixel[0]; 4],
            PixelLayout::GrayAlpha8 => [pixel[0], pixel[0], pixel[0], pixel[1]],
        };
        for (o, c) in out.iter_mut().zip(rgba) {
            *o = scale(c, brightness);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(layout: PixelLayout, src: &[u8], brightness: f32) -> Vec<u8> {
        let mut dst = vec![0; src.len() / layout.channels() * 4];
        normalize_into(layout, src, brightness, &mut dst);
        dst
    }

    #[test]
    fn pulse_starts_at_half_brightness() {
        let pulse = BrightnessPulse::new(Some(200.0));
        assert!((pulse.advance() - 0.5).abs() < f32::EPSILON);
        let second = pulse.advance();
        assert!(second > 0.5 && second < 0.51);
        assert_eq!(pulse.count(), 2);
    }

    #[test]
    fn disabled_pulse_is_identity() {
        let pulse = BrightnessPulse::disabled();
        assert!((pulse.advance() - 1.0).abs() < f32::EPSILON);
        assert_eq!(normalize(PixelLayout::Rgba8, &[1, 2, 3, 4], 1.0), vec![1, 2, 3, 4]);
    }

    #[test]
    fn bgra_is_swizzled() {
        assert_eq!(
            normalize(PixelLayout::Bgra8, &[10, 20, 30, 40], 1.0),
            vec![30, 20, 10, 40]
        );
    }

    #[test]
    fn rgb_gains_scaled_opaque_alpha() {
        assert_eq!(
            normalize(PixelLayout::Rgb8, &[200, 100, 50], 0.5),
            vec![100, 50, 25, 127]
        );
    }

    #[test]
    fn gray_replicates_into_alpha() {
        assert_eq!(normalize(PixelLayout::Gray8, &[90, 7], 1.0), vec![90, 90, 90, 90, 7, 7, 7, 7]);
        assert_eq!(
            normalize(PixelLayout::GrayAlpha8, &[90, 255], 0.5),
            vec![45, 45, 45, 127]
        );
    }

    #[test]
    fn scaling_truncates() {
        assert_eq!(normalize(PixelLayout::Rgba8, &[3, 3, 3, 3], 0.5), vec![1, 1, 1, 1]);
    }
}
