//! Image codec: raw RGB24 to a wire image format, and back

pub mod bmp;
pub mod jpeg;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::capture::frame::PixelFormat;
use crate::error::Result;
use crate::CodecConfig;

pub use bmp::RowOrder;

/// Wire container for published frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Bmp,
}

impl OutputFormat {
    pub fn pixel_format(self) -> PixelFormat {
        match self {
            OutputFormat::Jpeg => PixelFormat::EncodedJpeg,
            OutputFormat::Bmp => PixelFormat::EncodedBmp,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageCodec {
    format: OutputFormat,
    quality: u8,
    row_order: RowOrder,
}

impl ImageCodec {
    pub fn new(config: &CodecConfig) -> Self {
        Self {
            format: config.format,
            quality: config.jpeg_quality.clamp(1, 100),
            row_order: config.bmp_row_order,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Encode packed RGB24 pixels into the configured container.
    pub fn encode(&self, pixels: &[u8], width: u32, height: u32) -> Result<Bytes> {
        let encoded = match self.format {
            OutputFormat::Jpeg => jpeg::encode(pixels, width, height, self.quality)?,
            OutputFormat::Bmp => bmp::encode(pixels, width, height, self.row_order)?,
        };
        Ok(Bytes::from(encoded))
    }

    /// Identify an already-encoded payload and read its dimensions.
    pub fn inspect(data: &[u8]) -> Result<(PixelFormat, u32, u32)> {
        if jpeg::is_jpeg(data) {
            let (w, h) = jpeg::dimensions(data)?;
            return Ok((PixelFormat::EncodedJpeg, w, h));
        }
        let header = bmp::parse_header(data)?;
        Ok((PixelFormat::EncodedBmp, header.width, header.height))
    }

    /// Decode an encoded payload to packed RGB24.
    pub fn decode(data: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
        if jpeg::is_jpeg(data) {
            jpeg::decode(data)
        } else {
            bmp::decode(data)
        }
    }
}
