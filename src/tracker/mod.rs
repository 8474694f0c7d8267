//! Colour-band object tracker
//!
//! Samples the raw RGB24 buffer on a coarse stride, averages the
//! coordinates of every in-band sample and classifies the centroid into
//! a left/centre/right zone. The band is swapped atomically so a single
//! frame always sees one consistent value for detection and annotation.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capture::synthetic::fill_disk;
use crate::TrackerConfig;

/// Inclusive per-channel range of the tracked colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorBand {
    pub r_min: u8,
    pub r_max: u8,
    pub g_min: u8,
    pub g_max: u8,
    pub b_min: u8,
    pub b_max: u8,
}

impl Default for ColorBand {
    /// Bright green
    fn default() -> Self {
        Self {
            r_min: 0,
            r_max: 100,
            g_min: 150,
            g_max: 255,
            b_min: 0,
            b_max: 100,
        }
    }
}

impl ColorBand {
    pub fn contains(&self, r: u8, g: u8, b: u8) -> bool {
        (self.r_min..=self.r_max).contains(&r)
            && (self.g_min..=self.g_max).contains(&g)
            && (self.b_min..=self.b_max).contains(&b)
    }

    /// Widen: accept darker greens and more red/blue contamination.
    pub fn widened(self, step: u8) -> Self {
        Self {
            g_min: self.g_min.saturating_sub(step),
            r_max: self.r_max.saturating_add(step),
            b_max: self.b_max.saturating_add(step),
            ..self
        }
    }

    /// Narrow: the inverse of [`ColorBand::widened`], never crossing the
    /// opposite bound.
    pub fn narrowed(self, step: u8) -> Self {
        Self {
            g_min: self.g_min.saturating_add(step).min(self.g_max),
            r_max: self.r_max.saturating_sub(step).max(self.r_min),
            b_max: self.b_max.saturating_sub(step).max(self.b_min),
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Left,
    Center,
    Right,
    NotDetected,
}

impl Zone {
    /// Thirds of the frame width.
    pub fn classify(x: u32, width: u32) -> Self {
        if x < width / 3 {
            Zone::Left
        } else if x >= width * 2 / 3 {
            Zone::Right
        } else {
            Zone::Center
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackResult {
    pub centroid: Option<(u32, u32)>,
    pub zone: Zone,
}

impl TrackResult {
    pub const NOT_DETECTED: TrackResult = TrackResult {
        centroid: None,
        zone: Zone::NotDetected,
    };
}

/// Threshold adjustment requested at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Adjustment {
    Widen,
    Narrow,
    Reset,
}

impl std::str::FromStr for Adjustment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "widen" => Ok(Adjustment::Widen),
            "narrow" => Ok(Adjustment::Narrow),
            "reset" => Ok(Adjustment::Reset),
            other => Err(format!("unknown adjustment: {other}")),
        }
    }
}

/// Coarse centroid detection over an RGB24 buffer.
pub fn detect(pixels: &[u8], width: u32, height: u32, band: &ColorBand, stride: u32) -> TrackResult {
    let stride = stride.max(1) as usize;
    let (w, h) = (width as usize, height as usize);
    if pixels.len() < w * h * 3 {
        return TrackResult::NOT_DETECTED;
    }

    let (mut sum_x, mut sum_y, mut count) = (0u64, 0u64, 0u64);
    for y in (0..h).step_by(stride) {
        for x in (0..w).step_by(stride) {
            let i = (y * w + x) * 3;
            if band.contains(pixels[i], pixels[i + 1], pixels[i + 2]) {
                sum_x += x as u64;
                sum_y += y as u64;
                count += 1;
            }
        }
    }

    if count == 0 {
        return TrackResult::NOT_DETECTED;
    }

    let cx = (sum_x / count) as u32;
    let cy = (sum_y / count) as u32;
    TrackResult {
        centroid: Some((cx, cy)),
        zone: Zone::classify(cx, width),
    }
}

/// Detector plus shared, runtime-adjustable colour band.
#[derive(Debug)]
pub struct ObjectTracker {
    band: ArcSwap<ColorBand>,
    initial: ColorBand,
    stride: u32,
    marker_radius: u32,
    marker_color: [u8; 3],
    step: u8,
}

impl ObjectTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            band: ArcSwap::from_pointee(config.band),
            initial: config.band,
            stride: config.stride.max(1),
            marker_radius: config.marker_radius,
            marker_color: config.marker_color,
            step: config.adjust_step,
        }
    }

    /// Current band. One load per frame keeps detect and annotate in step.
    pub fn band(&self) -> ColorBand {
        **self.band.load()
    }

    pub fn adjust(&self, adjustment: Adjustment) -> ColorBand {
        let step = self.step;
        let initial = self.initial;
        let previous = self.band.rcu(|band| match adjustment {
            Adjustment::Widen => band.widened(step),
            Adjustment::Narrow => band.narrowed(step),
            Adjustment::Reset => initial,
        });
        let band = self.band();
        debug!(?adjustment, ?band, previous = ?*previous, "Colour band adjusted");
        band
    }

    pub fn detect(&self, pixels: &[u8], width: u32, height: u32, band: &ColorBand) -> TrackResult {
        detect(pixels, width, height, band, self.stride)
    }

    /// Draw the marker disk at the centroid, if there is one.
    pub fn annotate(&self, pixels: &mut [u8], width: u32, height: u32, result: &TrackResult) {
        if let Some((cx, cy)) = result.centroid {
            fill_disk(
                pixels,
                width,
                height,
                cx as i64,
                cy as i64,
                self.marker_radius as i64,
                self.marker_color,
            );
        }
    }

    /// Detect then annotate in place, against a single band snapshot.
    pub fn process(&self, pixels: &mut [u8], width: u32, height: u32) -> TrackResult {
        let band = self.band();
        let result = self.detect(pixels, width, height, &band);
        self.annotate(pixels, width, height, &result);
        result
    }
}
