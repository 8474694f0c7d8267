use crate::capture::frame::{PixelFormat, RawImage};
use crate::codec::ImageCodec;
use crate::error::{CaptureError, Result};

/// Bring any captured image to packed RGB24, returning the pixels and
/// their dimensions.
pub fn decode_frame(image: &RawImage) -> Result<(Vec<u8>, u32, u32)> {
    match image.format {
        PixelFormat::Rgb24 => {
            let expected = image.width as usize * image.height as usize * 3;
            if image.data.len() != expected {
                return Err(CaptureError::DecodeOrEncodeFailure(format!(
                    "rgb24: expected {} bytes, got {}",
                    expected,
                    image.data.len()
                )));
            }
            Ok((image.data.to_vec(), image.width, image.height))
        }
        PixelFormat::Yuyv => Ok((
            yuyv_to_rgb(&image.data, image.width, image.height)?,
            image.width,
            image.height,
        )),
        PixelFormat::EncodedJpeg | PixelFormat::EncodedBmp => ImageCodec::decode(&image.data),
    }
}

/// YUYV 4:2:2 to RGB24 (BT.601, integer math)
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let pixels = width as usize * height as usize;
    if width % 2 != 0 || data.len() < pixels * 2 {
        return Err(CaptureError::DecodeOrEncodeFailure(format!(
            "yuyv: {}x{} needs {} bytes, got {}",
            width,
            height,
            pixels * 2,
            data.len()
        )));
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    for quad in data[..pixels * 2].chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0] as i32, quad[1] as i32, quad[2] as i32, quad[3] as i32);
        for y in [y0, y1] {
            let c = y - 16;
            let d = u - 128;
            let e = v - 128;
            let r = (298 * c + 409 * e + 128) >> 8;
            let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
            let b = (298 * c + 516 * d + 128) >> 8;
            rgb.push(r.clamp(0, 255) as u8);
            rgb.push(g.clamp(0, 255) as u8);
            rgb.push(b.clamp(0, 255) as u8);
        }
    }
    Ok(rgb)
}

/// Mirror an RGB24 buffer in place (front-camera selfie view).
pub fn flip_horizontal(pixels: &mut [u8], width: u32) {
    let row_bytes = width as usize * 3;
    if row_bytes == 0 {
        return;
    }
    for row in pixels.chunks_exact_mut(row_bytes) {
        let (mut left, mut right) = (0, width as usize - 1);
        while left < right {
            for c in 0..3 {
                row.swap(left * 3 + c, right * 3 + c);
            }
            left += 1;
            right -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_mirrors_each_row() {
        let mut px = vec![1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4, 5, 5, 5, 6, 6, 6];
        flip_horizontal(&mut px, 3);
        assert_eq!(px, vec![3, 3, 3, 2, 2, 2, 1, 1, 1, 6, 6, 6, 5, 5, 5, 4, 4, 4]);
    }

    #[test]
    fn yuyv_white_and_black() {
        let data = [235, 128, 16, 128];
        let rgb = yuyv_to_rgb(&data, 2, 1).unwrap();
        assert_eq!(rgb, vec![255, 255, 255, 0, 0, 0]);
    }

    #[test]
    fn yuyv_rejects_short_input() {
        assert!(yuyv_to_rgb(&[0; 3], 2, 1).is_err());
    }

    #[test]
    fn rgb_passthrough_checks_length() {
        let ok = RawImage::rgb(vec![0u8; 12], 2, 2);
        assert_eq!(decode_frame(&ok).unwrap().0.len(), 12);

        let short = RawImage::rgb(vec![0u8; 5], 2, 2);
        assert!(decode_frame(&short).is_err());
    }
}
