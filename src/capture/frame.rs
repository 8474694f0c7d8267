use std::time::{Instant, SystemTime};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::tracker::TrackResult;

/// A published frame. Immutable once it reaches the buffer; consumers
/// share it through an `Arc` and never copy the payload.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Image payload - raw RGB24 or an encoded container
    pub payload: Bytes,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Strictly increasing, assigned by the supervisor
    pub sequence: u64,
    /// Wall-clock capture time
    pub captured_at: SystemTime,
    /// Monotonic capture time for latency tracking
    pub timestamp: Instant,
    /// Backend that produced the image
    pub origin: BackendKind,
    /// Tracker output for this frame, when tracking is enabled
    pub tracked: Option<TrackResult>,
}

impl Frame {
    /// MIME type for the multipart chunk header.
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }

    pub fn is_synthetic(&self) -> bool {
        self.origin == BackendKind::Synthetic
    }
}

/// Image as handed over by a frame source, before sequencing.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl RawImage {
    pub fn rgb(data: impl Into<Bytes>, width: u32, height: u32) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            format: PixelFormat::Rgb24,
        }
    }
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Rgb24,
    /// Packed YUV 4:2:2, only ever seen straight off a device
    Yuyv,
    EncodedJpeg,
    EncodedBmp,
}

impl PixelFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            PixelFormat::EncodedJpeg => "image/jpeg",
            PixelFormat::EncodedBmp => "image/bmp",
            PixelFormat::Rgb24 | PixelFormat::Yuyv => "application/octet-stream",
        }
    }
}

/// Closed set of capture backends, in probe priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Device,
    ExternalProcess,
    Synthetic,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackendKind::Device => "device",
            BackendKind::ExternalProcess => "external-process",
            BackendKind::Synthetic => "synthetic",
        };
        f.write_str(name)
    }
}
