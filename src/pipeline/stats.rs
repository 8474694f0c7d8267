use std::time::Instant;

use serde::Serialize;

/// Running counters for the capture loop.
pub struct CaptureStats {
    frames_captured: u64,
    frames_dropped: u64,
    total_bytes: u64,
    start_time: Instant,
    width: u32,
    height: u32,
}

/// Serialisable view served on `/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub fps: f64,
    pub resolution: String,
    pub frames_captured: u64,
    pub frames_dropped: u64,
    pub bandwidth_bps: u64,
    pub uptime: f64,
}

impl CaptureStats {
    pub fn new() -> Self {
        Self {
            frames_captured: 0,
            frames_dropped: 0,
            total_bytes: 0,
            start_time: Instant::now(),
            width: 0,
            height: 0,
        }
    }

    pub fn record_frame(&mut self, bytes: usize, width: u32, height: u32) {
        self.frames_captured += 1;
        self.total_bytes += bytes as u64;
        self.width = width;
        self.height = height;
    }

    pub fn record_drop(&mut self) {
        self.frames_dropped += 1;
    }

    /// Average publish rate since start.
    pub fn fps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0.0;
        }
        self.frames_captured as f64 / elapsed
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let uptime = self.start_time.elapsed().as_secs_f64();
        StatsSnapshot {
            fps: (self.fps() * 100.0).round() / 100.0,
            resolution: format!("{}x{}", self.width, self.height),
            frames_captured: self.frames_captured,
            frames_dropped: self.frames_dropped,
            bandwidth_bps: if uptime < 0.001 {
                0
            } else {
                (self.total_bytes as f64 / uptime) as u64
            },
            uptime: (uptime * 100.0).round() / 100.0,
        }
    }
}

impl Default for CaptureStats {
    fn default() -> Self {
        Self::new()
    }
}
