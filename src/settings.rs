//! Streaming Settings
//!
//! This module defines the runtime configuration of the streaming pipeline.
//!
//! The settings are consumed once when a [`TextureStreamer`](crate::TextureStreamer)
//! (or the individual services) are constructed. They can be built in code or
//! parsed from JSON:
//!
//! ```rust,ignore
//! use myth_streaming::StreamingSettings;
//!
//! let settings = StreamingSettings {
//!     worker_threads: 2,
//!     generate_mipmaps: false,
//!     ..Default::default()
//! };
//!
//! let from_disk = StreamingSettings::from_json_str(r#"{ "upload_queue_capacity": 8 }"#)?;
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::Result;

// ---------------------------------------------------------------------------
// MappingPolicy
// ---------------------------------------------------------------------------

/// Strategy for mapping transfer buffers into CPU address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingPolicy {
    /// Keep transfer buffers persistently mapped when the GPU supports it,
    /// otherwise orphan and remap them on every use.
    #[default]
    Auto,
    /// Always orphan and remap, even when persistent mapping is available.
    Disabled,
}

impl MappingPolicy {
    /// Resolves the policy against the capabilities of the active backend.
    #[inline]
    #[must_use]
    pub fn use_persistent(self, backend_supports_persistent: bool) -> bool {
        match self {
            Self::Auto => backend_supports_persistent,
            Self::Disabled => false,
        }
    }
}

// ---------------------------------------------------------------------------
// StreamingSettings
// ---------------------------------------------------------------------------

/// Global configuration for the streaming pipeline.
///
/// # Fields
///
/// | Field                   | Description                                   | Default   |
/// |-------------------------|-----------------------------------------------|-----------|
/// | `worker_threads`        | Background decode / buffer-fill threads       | `4`       |
/// | `upload_queue_capacity` | Pending uploads before requests back off      | `64`      |
/// | `upload_tick_ms`        | Secondary worker dequeue wait (≈60 Hz)        | `16`      |
/// | `fence_poll_timeout_us` | Bounded wait of a single fence poll           | `1`       |
/// | `brightness_period`     | Decode pulse period (`None` disables it)      | `200.0`   |
/// | `mapping`               | Transfer buffer mapping strategy              | `Auto`    |
/// | `generate_mipmaps`      | Build the mip chain after each upload         | `true`    |
/// | `source_root`           | Directory image names are resolved against    | `.`       |
/// | `source_extension`      | File extension appended to image names        | `png`     |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    // === Background Work ===
    /// Number of threads running decode and buffer-fill tasks.
    pub worker_threads: usize,

    /// Capacity of the render-thread → secondary-worker upload queue.
    ///
    /// When the queue is full, requests stay in `FillingBuffer` and retry
    /// the enqueue on the next update.
    pub upload_queue_capacity: usize,

    /// Bounded dequeue wait of the secondary worker, in milliseconds.
    ///
    /// This also caps the worker loop at roughly `1000 / upload_tick_ms`
    /// iterations per second.
    pub upload_tick_ms: u64,

    // === Synchronization ===
    /// Bounded wait of one fence poll, in microseconds.
    ///
    /// Never zero: a zero wait makes some drivers resubmit needlessly.
    pub fence_poll_timeout_us: u64,

    // === Decode ===
    /// Period (in decode calls per radian) of the brightness pulse applied
    /// while decoding. `None` leaves pixel intensities untouched.
    pub brightness_period: Option<f32>,

    // === GPU Resources ===
    /// Transfer buffer mapping strategy.
    pub mapping: MappingPolicy,

    /// Generate the full mip chain after each upload.
    pub generate_mipmaps: bool,

    // === Sources ===
    /// Directory image names are resolved against.
    pub source_root: PathBuf,

    /// File extension appended to image names.
    pub source_extension: String,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            upload_queue_capacity: 64,
            upload_tick_ms: 16,
            fence_poll_timeout_us: 1,
            brightness_period: Some(200.0),
            mapping: MappingPolicy::Auto,
            generate_mipmaps: true,
            source_root: PathBuf::from("."),
            source_extension: "png".to_string(),
        }
    }
}

impl StreamingSettings {
    /// Parses settings from a JSON document. Missing fields take their
    /// default values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Secondary worker dequeue wait.
    #[inline]
    #[must_use]
    pub fn upload_tick(&self) -> Duration {
        Duration::from_millis(self.upload_tick_ms.max(1))
    }

    /// Bounded wait of a single fence poll.
    #[inline]
    #[must_use]
    pub fn fence_poll_timeout(&self) -> Duration {
        Duration::from_micros(self.fence_poll_timeout_us.max(1))
    }
}
