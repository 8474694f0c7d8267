//! V4L2 device capture over memory-mapped buffers

use std::io;

use bytes::Bytes;
use tracing::{info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::capture::frame::{BackendKind, PixelFormat, RawImage};
use crate::capture::source::FrameSource;
use crate::error::{CaptureError, Result};
use crate::utils::{self, FoundDevice};
use crate::CaptureConfig;

/// Persistent handle on a camera device
pub struct V4l2Capture {
    _device: Box<Device>,
    stream: Option<MmapStream<'static>>,
    path: String,
    width: u32,
    height: u32,
    format: PixelFormat,
    read_timeout: std::time::Duration,
    primed: Option<RawImage>,
}

impl V4l2Capture {
    /// Open the configured (or auto-detected) device, start streaming and
    /// read one trial frame.
    #[instrument(skip(config))]
    pub fn open(config: &CaptureConfig) -> Result<Self> {
        let found = if config.device.is_empty() {
            utils::auto_detect_device()?
        } else {
            FoundDevice::new(config.device.clone(), PixelFormat::EncodedJpeg)
        };

        info!("Initializing V4L2 capture: {}", found.path);
        let device = Device::with_path(&found.path).map_err(|e| unavailable(&found.path, e))?;

        let caps = device.query_caps().map_err(|e| unavailable(&found.path, e))?;
        info!("Device: {} ({})", caps.card, caps.driver);
        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(CaptureError::BackendUnavailable(format!(
                "{} doesn't support video capture",
                found.path
            )));
        }

        let mut fmt = device.format()?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = fourcc_for(found.format);
        let fmt = device.set_format(&fmt)?;

        let format = pixel_format_from(fmt.fourcc).ok_or_else(|| {
            CaptureError::BackendUnavailable(format!("unsupported device format {}", fmt.fourcc))
        })?;
        if (fmt.width, fmt.height) != (config.width, config.height) {
            warn!(
                "Driver adjusted resolution to {}x{} (requested {}x{})",
                fmt.width, fmt.height, config.width, config.height
            );
        }

        let device = Box::new(device);
        let mut stream =
            MmapStream::with_buffers(&device, Type::VideoCapture, config.buffer_count.max(1))?;
        stream.set_timeout(config.read_timeout);
        info!("Capture stream started with {} buffers", config.buffer_count);

        let mut capture = Self {
            _device: device,
            stream: Some(stream),
            path: found.path,
            width: fmt.width,
            height: fmt.height,
            format,
            read_timeout: config.read_timeout,
            primed: None,
        };
        capture.primed = Some(capture.read_frame()?);
        Ok(capture)
    }

    fn read_frame(&mut self) -> Result<RawImage> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| CaptureError::BackendUnavailable("stream released".into()))?;

        let (buf, meta) = stream.next().map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                CaptureError::Timeout(self.read_timeout)
            }
            _ => CaptureError::Io(e),
        })?;

        // MJPEG buffers are sized for the worst case; bytesused is the payload
        let used = (meta.bytesused as usize).min(buf.len());
        let used = if used == 0 { buf.len() } else { used };

        Ok(RawImage {
            data: Bytes::copy_from_slice(&buf[..used]),
            width: self.width,
            height: self.height,
            format: self.format,
        })
    }
}

impl FrameSource for V4l2Capture {
    fn kind(&self) -> BackendKind {
        BackendKind::Device
    }

    #[instrument(skip(self), fields(path = %self.path))]
    fn capture(&mut self) -> Result<RawImage> {
        if let Some(image) = self.primed.take() {
            return Ok(image);
        }
        self.read_frame()
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            info!("Released {}", self.path);
        }
        self.primed = None;
    }
}

fn unavailable(path: &str, e: io::Error) -> CaptureError {
    CaptureError::BackendUnavailable(format!("{path}: {e}"))
}

fn fourcc_for(format: PixelFormat) -> FourCC {
    match format {
        PixelFormat::Yuyv => FourCC::new(b"YUYV"),
        PixelFormat::Rgb24 => FourCC::new(b"RGB3"),
        PixelFormat::EncodedJpeg | PixelFormat::EncodedBmp => FourCC::new(b"MJPG"),
    }
}

pub(crate) fn pixel_format_from(fourcc: FourCC) -> Option<PixelFormat> {
    match &fourcc.repr {
        b"MJPG" | b"JPEG" => Some(PixelFormat::EncodedJpeg),
        b"YUYV" => Some(PixelFormat::Yuyv),
        b"RGB3" => Some(PixelFormat::Rgb24),
        _ => None,
    }
}
