//! Uncompressed 24-bit BMP container, written by hand
//!
//! Layout: 14-byte file header, 40-byte BITMAPINFOHEADER, then BGR rows
//! padded to 4 bytes. Output is bit-exact for a given input.

use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, Result};

pub const FILE_HEADER_LEN: usize = 14;
pub const INFO_HEADER_LEN: usize = 40;
pub const PIXEL_DATA_OFFSET: usize = FILE_HEADER_LEN + INFO_HEADER_LEN;

const BITS_PER_PIXEL: u16 = 24;
/// 72 DPI in pixels per metre
const PIXELS_PER_METRE: i32 = 2835;

/// Row storage order. Bottom-up is the classic convention; top-down is
/// signalled with a negative height.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOrder {
    #[default]
    BottomUp,
    TopDown,
}

/// Bytes per stored row, including padding.
pub fn row_size(width: u32) -> usize {
    (width as usize * 3 + 3) / 4 * 4
}

/// Total encoded size for the given dimensions.
pub fn encoded_len(width: u32, height: u32) -> usize {
    PIXEL_DATA_OFFSET + row_size(width) * height as usize
}

/// Encode tightly packed RGB24 pixels.
pub fn encode(pixels: &[u8], width: u32, height: u32, order: RowOrder) -> Result<Vec<u8>> {
    let expected = width as usize * height as usize * 3;
    if width == 0 || height == 0 || pixels.len() != expected {
        return Err(CaptureError::DecodeOrEncodeFailure(format!(
            "bmp: {}x{} needs {} bytes of RGB24, got {}",
            width,
            height,
            expected,
            pixels.len()
        )));
    }
    if width > i32::MAX as u32 || height > i32::MAX as u32 {
        return Err(CaptureError::DecodeOrEncodeFailure(
            "bmp: dimensions out of range".into(),
        ));
    }

    let stride = row_size(width);
    let image_size = stride * height as usize;
    let file_size = PIXEL_DATA_OFFSET + image_size;
    let file_size_u32 = u32::try_from(file_size)
        .map_err(|_| CaptureError::DecodeOrEncodeFailure("bmp: image too large".into()))?;

    let mut out = Vec::with_capacity(file_size);

    // File header
    out.extend_from_slice(b"BM");
    out.extend_from_slice(&file_size_u32.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(PIXEL_DATA_OFFSET as u32).to_le_bytes());

    // Info header
    let stored_height = match order {
        RowOrder::BottomUp => height as i32,
        RowOrder::TopDown => -(height as i32),
    };
    out.extend_from_slice(&(INFO_HEADER_LEN as u32).to_le_bytes());
    out.extend_from_slice(&(width as i32).to_le_bytes());
    out.extend_from_slice(&stored_height.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&BITS_PER_PIXEL.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // BI_RGB
    out.extend_from_slice(&(image_size as u32).to_le_bytes());
    out.extend_from_slice(&PIXELS_PER_METRE.to_le_bytes());
    out.extend_from_slice(&PIXELS_PER_METRE.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // palette colours
    out.extend_from_slice(&0u32.to_le_bytes()); // important colours

    let row_bytes = width as usize * 3;
    let padding = stride - row_bytes;
    let mut write_row = |row: &[u8]| {
        for px in row.chunks_exact(3) {
            out.extend_from_slice(&[px[2], px[1], px[0]]);
        }
        out.extend(std::iter::repeat(0u8).take(padding));
    };

    let rows = pixels.chunks_exact(row_bytes);
    match order {
        RowOrder::BottomUp => rows.rev().for_each(&mut write_row),
        RowOrder::TopDown => rows.for_each(&mut write_row),
    }

    Ok(out)
}

/// Parsed header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BmpHeader {
    pub file_size: u32,
    pub pixel_offset: u32,
    pub width: u32,
    pub height: u32,
    pub order: RowOrder,
    pub bits_per_pixel: u16,
    pub compression: u32,
    pub image_size: u32,
}

fn u16_at(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn u32_at(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

pub fn parse_header(data: &[u8]) -> Result<BmpHeader> {
    if data.len() < PIXEL_DATA_OFFSET || &data[0..2] != b"BM" {
        return Err(CaptureError::DecodeOrEncodeFailure(
            "bmp: missing BM header".into(),
        ));
    }

    let raw_height = u32_at(data, 22) as i32;
    let width = u32_at(data, 18) as i32;
    if width <= 0 || raw_height == 0 {
        return Err(CaptureError::DecodeOrEncodeFailure(
            "bmp: bad dimensions".into(),
        ));
    }

    Ok(BmpHeader {
        file_size: u32_at(data, 2),
        pixel_offset: u32_at(data, 10),
        width: width as u32,
        height: raw_height.unsigned_abs(),
        order: if raw_height < 0 {
            RowOrder::TopDown
        } else {
            RowOrder::BottomUp
        },
        bits_per_pixel: u16_at(data, 28),
        compression: u32_at(data, 30),
        image_size: u32_at(data, 34),
    })
}

/// Decode a 24-bit uncompressed BMP back to packed RGB24.
pub fn decode(data: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let header = parse_header(data)?;
    if header.bits_per_pixel != BITS_PER_PIXEL || header.compression != 0 {
        return Err(CaptureError::DecodeOrEncodeFailure(format!(
            "bmp: unsupported {} bpp, compression {}",
            header.bits_per_pixel, header.compression
        )));
    }

    let stride = row_size(header.width);
    let start = header.pixel_offset as usize;
    let end = start + stride * header.height as usize;
    let body = data.get(start..end).ok_or_else(|| {
        CaptureError::DecodeOrEncodeFailure("bmp: truncated pixel data".into())
    })?;

    let row_bytes = header.width as usize * 3;
    let mut pixels = Vec::with_capacity(row_bytes * header.height as usize);
    let mut read_row = |row: &[u8]| {
        for px in row[..row_bytes].chunks_exact(3) {
            pixels.extend_from_slice(&[px[2], px[1], px[0]]);
        }
    };

    let rows = body.chunks_exact(stride);
    match header.order {
        RowOrder::BottomUp => rows.rev().for_each(&mut read_row),
        RowOrder::TopDown => rows.for_each(&mut read_row),
    }

    Ok((pixels, header.width, header.height))
}
