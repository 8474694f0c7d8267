pub mod capture;
pub mod codec;
pub mod error;
pub mod pipeline;
pub mod server;
pub mod stream;
pub mod tracker;
pub mod utils;

use std::path::Path;
use std::time::Duration;

use color_eyre::{eyre::WrapErr, Result};
use serde::{Deserialize, Serialize};

use capture::process::ProcessConfig;
use codec::{OutputFormat, RowOrder};
use tracker::ColorBand;

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub codec: CodecConfig,
    pub stream: StreamConfig,
    pub tracker: TrackerConfig,
    pub supervisor: SupervisorConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Defaults, then an optional TOML file, then `FRAMECAST__*` variables
    /// (`FRAMECAST__STREAM__TARGET_FPS=15`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("FRAMECAST")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .wrap_err("Failed to read configuration")?
            .try_deserialize()
            .wrap_err("Invalid configuration")
    }
}

/// Which backends the supervisor may probe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackendPreference {
    /// Device, then external helper, then synthetic
    #[default]
    Auto,
    Device,
    Process,
    /// Test pattern only; nothing real is probed
    Synthetic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub backend: BackendPreference,
    /// V4L2 node; empty means auto-detect
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub buffer_count: u32,
    #[serde(with = "duration_ms")]
    pub read_timeout: Duration,
    /// Flip real camera frames horizontally
    pub mirror: bool,
    pub process: ProcessConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            device: String::new(),
            width: 640,
            height: 480,
            fps: 30,
            buffer_count: 4,
            read_timeout: Duration::from_secs(3),
            mirror: false,
            process: ProcessConfig::default(),
        }
    }
}

impl CaptureConfig {
    /// Minimum spacing between captures.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub format: OutputFormat,
    pub jpeg_quality: u8,
    pub bmp_row_order: RowOrder,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Jpeg,
            jpeg_quality: 70,
            bmp_row_order: RowOrder::BottomUp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Per-client emission rate, clamped to 1..=60
    pub target_fps: u32,
    /// Wait between polls while no frame exists yet
    #[serde(with = "duration_ms")]
    pub idle_poll: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            target_fps: 10,
            idle_poll: Duration::from_millis(100),
        }
    }
}

impl StreamConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.clamp(1, 60) as f64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub enabled: bool,
    pub band: ColorBand,
    /// Sample every n-th row and column
    pub stride: u32,
    pub marker_radius: u32,
    pub marker_color: [u8; 3],
    pub adjust_step: u8,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            band: ColorBand::default(),
            stride: 2,
            marker_radius: 10,
            marker_color: [255, 0, 0],
            adjust_step: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Sleep after the n-th consecutive failure while degraded
    #[serde(with = "duration_ms_list")]
    pub degraded_backoff: Vec<Duration>,
    /// Consecutive failures tolerated before reinitialising
    pub retry_threshold: u32,
    /// Reinitialisation backoff tiers
    #[serde(with = "duration_ms_list")]
    pub retry_backoff: Vec<Duration>,
    pub max_reinit_attempts: u32,
    pub init_probe_rounds: u32,
    /// How often the synthetic fallback re-probes real backends
    #[serde(with = "duration_ms")]
    pub reprobe_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            degraded_backoff: vec![
                Duration::ZERO,
                Duration::from_millis(100),
                Duration::from_secs(1),
            ],
            retry_threshold: 3,
            retry_backoff: vec![
                Duration::from_millis(100),
                Duration::from_secs(1),
                Duration::from_secs(5),
            ],
            max_reinit_attempts: 3,
            init_probe_rounds: 2,
            reprobe_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5000,
        }
    }
}

/// Durations as integer milliseconds in config files
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

pub(crate) mod duration_ms_list {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(d: &[Duration], s: S) -> Result<S::Ok, S::Error> {
        let millis: Vec<u64> = d.iter().map(|d| d.as_millis() as u64).collect();
        millis.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Duration>, D::Error> {
        Vec::<u64>::deserialize(d).map(|v| v.into_iter().map(Duration::from_millis).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_interval_is_clamped() {
        let mut stream = StreamConfig::default();
        assert_eq!(stream.interval(), Duration::from_millis(100));

        stream.target_fps = 0;
        assert_eq!(stream.interval(), Duration::from_secs(1));

        stream.target_fps = 500;
        assert_eq!(stream.interval(), Duration::from_secs_f64(1.0 / 60.0));
    }

    #[test]
    fn loads_partial_toml_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("framecast.toml");
        std::fs::write(
            &path,
            r#"
[capture]
backend = "synthetic"
width = 320

[codec]
format = "bmp"
bmp_row_order = "top_down"

[stream]
target_fps = 2

[supervisor]
retry_backoff = [10, 20]
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.capture.backend, BackendPreference::Synthetic);
        assert_eq!(config.capture.width, 320);
        assert_eq!(config.capture.height, 480);
        assert_eq!(config.codec.format, OutputFormat::Bmp);
        assert_eq!(config.codec.bmp_row_order, RowOrder::TopDown);
        assert_eq!(config.stream.target_fps, 2);
        assert_eq!(
            config.supervisor.retry_backoff,
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Config::load(Some(Path::new("/nonexistent/framecast.toml"))).is_err());
    }
}
