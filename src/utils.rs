use serde::{Deserialize, Serialize};

use crate::capture::frame::PixelFormat;

// Detected capture device info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoundDevice {
    pub path: String,
    pub format: PixelFormat,
}

impl FoundDevice {
    pub fn new(path: String, format: PixelFormat) -> Self {
        Self { path, format }
    }
}

/// Auto-detect best capture device
#[cfg(feature = "device-v4l")]
pub fn auto_detect_device() -> crate::error::Result<FoundDevice> {
    use std::path::Path;

    use tracing::info;
    use v4l::{capability::Flags, video::Capture, Device};

    use crate::capture::v4l2::pixel_format_from;
    use crate::error::CaptureError;

    info!("Auto-detecting capture devices...");

    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        // Check for capture capability
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            continue;
        }
        let Ok(formats) = dev.enum_formats() else {
            continue;
        };

        // Prefer devices with MJPEG support, then anything we can convert
        let supported: Vec<PixelFormat> = formats
            .iter()
            .filter_map(|fmt| pixel_format_from(fmt.fourcc))
            .collect();
        let best = supported
            .iter()
            .copied()
            .find(|f| *f == PixelFormat::EncodedJpeg)
            .or_else(|| supported.first().copied());

        if let Some(format) = best {
            info!("Found {:?} device: {} - {}", format, path, caps.card);
            return Ok(FoundDevice { path, format });
        }
    }

    Err(CaptureError::BackendUnavailable(
        "No suitable capture device found".into(),
    ))
}
