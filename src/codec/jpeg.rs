use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use jpeg_decoder::{Decoder, PixelFormat as JpegPixelFormat};

use crate::error::{CaptureError, Result};

/// Compress raw RGB pixel data to JPEG at the given quality (1-100).
pub fn encode(pixels: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>> {
    let expected = width as usize * height as usize * 3;
    if pixels.len() != expected {
        return Err(CaptureError::DecodeOrEncodeFailure(format!(
            "jpeg: {}x{} needs {} bytes of RGB24, got {}",
            width,
            height,
            expected,
            pixels.len()
        )));
    }

    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .write_image(pixels, width, height, ExtendedColorType::Rgb8)
        .map_err(|e| CaptureError::DecodeOrEncodeFailure(format!("jpeg: {e}")))?;
    Ok(buf)
}

/// Read dimensions from the JPEG header without decoding the scan.
pub fn dimensions(data: &[u8]) -> Result<(u32, u32)> {
    let mut decoder = Decoder::new(data);
    decoder
        .read_info()
        .map_err(|e| CaptureError::DecodeOrEncodeFailure(format!("jpeg: {e}")))?;
    let info = decoder
        .info()
        .ok_or_else(|| CaptureError::DecodeOrEncodeFailure("jpeg: no frame header".into()))?;
    Ok((info.width as u32, info.height as u32))
}

/// Decode to packed RGB24.
pub fn decode(data: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let mut decoder = Decoder::new(data);
    let pixels = decoder
        .decode()
        .map_err(|e| CaptureError::DecodeOrEncodeFailure(format!("jpeg: {e}")))?;
    let info = decoder
        .info()
        .ok_or_else(|| CaptureError::DecodeOrEncodeFailure("jpeg: no frame header".into()))?;

    let rgb = match info.pixel_format {
        JpegPixelFormat::RGB24 => pixels,
        JpegPixelFormat::L8 => pixels.iter().flat_map(|&l| [l, l, l]).collect(),
        other => {
            return Err(CaptureError::DecodeOrEncodeFailure(format!(
                "jpeg: unsupported pixel format {other:?}"
            )))
        }
    };

    Ok((rgb, info.width as u32, info.height as u32))
}

pub fn is_jpeg(data: &[u8]) -> bool {
    data.starts_with(&[0xFF, 0xD8])
}
