//! Synthetic test-pattern source
//!
//! Pure computation: a dark gradient with a marker disk swept across the
//! frame as a function of elapsed time. Used as explicit test mode and as
//! the fallback once every real backend is exhausted.

use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::capture::frame::{BackendKind, RawImage};
use crate::capture::source::FrameSource;
use crate::error::Result;

/// Full left-to-right sweep period
const SWEEP_PERIOD: Duration = Duration::from_secs(4);
const MARKER_COLOR: [u8; 3] = [255, 64, 0];
/// Height of the striped banner identifying synthetic output
const BANNER_ROWS: u32 = 8;

#[derive(Debug, Clone)]
pub struct SyntheticGenerator {
    width: u32,
    height: u32,
    epoch: Instant,
}

impl SyntheticGenerator {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            epoch: Instant::now(),
        }
    }

    /// Render the pattern at a given offset into the sweep. Same input,
    /// same bytes.
    pub fn render_at(&self, elapsed: Duration) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut pixels = vec![0u8; w * h * 3];

        for y in 0..h {
            for x in 0..w {
                let i = (y * w + x) * 3;
                if (y as u32) < BANNER_ROWS.min(self.height) {
                    // Yellow/black stripes
                    let on = (x / 8) % 2 == 0;
                    pixels[i..i + 3].copy_from_slice(if on { &[255, 255, 0] } else { &[0, 0, 0] });
                } else {
                    pixels[i] = (x * 64 / w) as u8;
                    pixels[i + 1] = (y * 64 / h) as u8;
                    pixels[i + 2] = 48;
                }
            }
        }

        let (cx, cy) = self.marker_position(elapsed);
        let radius = (self.width.min(self.height) / 10).max(2) as i64;
        fill_disk(&mut pixels, self.width, self.height, cx, cy, radius, MARKER_COLOR);
        pixels
    }

    /// Marker centre for a given elapsed time.
    pub fn marker_position(&self, elapsed: Duration) -> (i64, i64) {
        let phase = (elapsed.as_millis() % SWEEP_PERIOD.as_millis()) as i64;
        let cx = phase * self.width as i64 / SWEEP_PERIOD.as_millis() as i64;
        (cx, self.height as i64 / 2)
    }

    pub fn frame_at(&self, elapsed: Duration) -> RawImage {
        RawImage::rgb(Bytes::from(self.render_at(elapsed)), self.width, self.height)
    }
}

impl FrameSource for SyntheticGenerator {
    fn kind(&self) -> BackendKind {
        BackendKind::Synthetic
    }

    fn capture(&mut self) -> Result<RawImage> {
        Ok(self.frame_at(self.epoch.elapsed()))
    }
}

/// Fill a disk into an RGB24 buffer, clipped to the frame.
pub(crate) fn fill_disk(
    pixels: &mut [u8],
    width: u32,
    height: u32,
    cx: i64,
    cy: i64,
    radius: i64,
    color: [u8; 3],
) {
    let r2 = radius * radius;
    let y0 = (cy - radius).max(0);
    let y1 = (cy + radius).min(height as i64 - 1);
    let x0 = (cx - radius).max(0);
    let x1 = (cx + radius).min(width as i64 - 1);

    for y in y0..=y1 {
        for x in x0..=x1 {
            let (dx, dy) = (x - cx, y - cy);
            if dx * dx + dy * dy <= r2 {
                let i = ((y as usize) * width as usize + x as usize) * 3;
                if let Some(px) = pixels.get_mut(i..i + 3) {
                    px.copy_from_slice(&color);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_is_deterministic() {
        let gen = SyntheticGenerator::new(64, 48);
        let t = Duration::from_millis(1234);
        assert_eq!(gen.render_at(t), gen.render_at(t));
    }

    #[test]
    fn pattern_changes_over_time() {
        let gen = SyntheticGenerator::new(64, 48);
        assert_ne!(
            gen.render_at(Duration::from_millis(0)),
            gen.render_at(Duration::from_millis(2000))
        );
    }

    #[test]
    fn marker_sweeps_across_width() {
        let gen = SyntheticGenerator::new(100, 50);
        assert_eq!(gen.marker_position(Duration::ZERO), (0, 25));
        assert_eq!(gen.marker_position(Duration::from_secs(2)), (50, 25));
        assert_eq!(gen.marker_position(SWEEP_PERIOD), (0, 25));
    }

    #[test]
    fn capture_never_fails_and_has_rgb_size() {
        let mut gen = SyntheticGenerator::new(32, 24);
        let image = gen.capture().unwrap();
        assert_eq!(image.data.len(), 32 * 24 * 3);
        assert_eq!(gen.kind(), BackendKind::Synthetic);
    }

    #[test]
    fn fill_disk_clips_at_edges() {
        let mut pixels = vec![0u8; 10 * 10 * 3];
        fill_disk(&mut pixels, 10, 10, 0, 0, 3, [1, 2, 3]);
        assert_eq!(&pixels[0..3], &[1, 2, 3]);
        assert_eq!(&pixels[(9 * 10 + 9) * 3..], &[0, 0, 0]);
    }
}
