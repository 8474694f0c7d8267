//! External helper capture
//!
//! Runs a short-lived helper per frame (for example `termux-camera-photo`)
//! that writes an image either to a staging file or to stdout. The helper
//! gets a hard wall-clock timeout and is killed when it overruns.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::capture::frame::{BackendKind, RawImage};
use crate::capture::source::FrameSource;
use crate::codec::ImageCodec;
use crate::error::{CaptureError, Result};

/// Placeholder in helper arguments replaced by the staging path
pub const OUTPUT_PLACEHOLDER: &str = "{output}";
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Helper binary, looked up on `PATH` when not a path
    pub command: String,
    pub args: Vec<String>,
    /// Where the helper writes its image. `None` reads stdout instead.
    pub output_path: Option<PathBuf>,
    #[serde(with = "crate::duration_ms")]
    pub timeout: Duration,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            command: "termux-camera-photo".into(),
            args: vec!["-c".into(), "0".into(), OUTPUT_PLACEHOLDER.into()],
            output_path: Some(std::env::temp_dir().join("framecast_capture.jpg")),
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct ProcessCapture {
    config: ProcessConfig,
    program: PathBuf,
    /// Image taken while probing, handed out by the first capture
    primed: Option<RawImage>,
}

impl ProcessCapture {
    /// Resolve the helper and take one trial capture.
    #[instrument(skip(config), fields(command = %config.command))]
    pub fn probe(config: ProcessConfig) -> Result<Self> {
        let program = resolve_program(&config.command).ok_or_else(|| {
            CaptureError::BackendUnavailable(format!("helper not found: {}", config.command))
        })?;

        let mut capture = Self {
            config,
            program,
            primed: None,
        };
        let image = capture.run_once()?;
        info!(
            "External helper ready: {}x{} {:?}",
            image.width, image.height, image.format
        );
        capture.primed = Some(image);
        Ok(capture)
    }

    fn command(&self) -> Command {
        let output = self
            .config
            .output_path
            .as_deref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut cmd = Command::new(&self.program);
        cmd.args(
            self.config
                .args
                .iter()
                .map(|arg| arg.replace(OUTPUT_PLACEHOLDER, &output)),
        )
        .stdin(Stdio::null())
        .stderr(Stdio::piped())
        .stdout(if self.config.output_path.is_some() {
            Stdio::null()
        } else {
            Stdio::piped()
        });
        cmd
    }

    fn run_once(&mut self) -> Result<RawImage> {
        if let Some(path) = &self.config.output_path {
            remove_staging(path);
        }

        let mut child = self.command().spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                CaptureError::BackendUnavailable(format!("{}: {}", self.config.command, e))
            }
            _ => CaptureError::Io(e),
        })?;

        // Both pipes drain on side threads so a large image or chatty
        // diagnostics cannot fill a pipe and stall the helper
        let stdout_reader = child.stdout.take().map(drain);
        let stderr_reader = child.stderr.take().map(drain);

        let status = wait_with_timeout(&mut child, self.config.timeout)?;
        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .and_then(|read| read.ok())
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();

        let data = match stdout_reader {
            Some(reader) => reader
                .join()
                .map_err(|_| io::Error::other("stdout reader panicked"))??,
            None => Vec::new(),
        };

        if !status.success() {
            if let Some(path) = &self.config.output_path {
                remove_staging(path);
            }
            return Err(CaptureError::Io(io::Error::other(format!(
                "{} exited with {}: {}",
                self.config.command,
                status,
                stderr.trim()
            ))));
        }

        let data = match &self.config.output_path {
            Some(path) => {
                let read = std::fs::read(path);
                remove_staging(path);
                read?
            }
            None => data,
        };

        if data.is_empty() {
            return Err(CaptureError::DecodeOrEncodeFailure(
                "helper produced an empty image".into(),
            ));
        }

        let (format, width, height) = ImageCodec::inspect(&data)?;
        debug!("Helper produced {} bytes ({:?})", data.len(), format);
        Ok(RawImage {
            data: Bytes::from(data),
            width,
            height,
            format,
        })
    }
}

impl FrameSource for ProcessCapture {
    fn kind(&self) -> BackendKind {
        BackendKind::ExternalProcess
    }

    fn capture(&mut self) -> Result<RawImage> {
        if let Some(image) = self.primed.take() {
            return Ok(image);
        }
        self.run_once()
    }

    fn release(&mut self) {
        self.primed = None;
        if let Some(path) = &self.config.output_path {
            remove_staging(path);
        }
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            warn!("Helper exceeded {:?}, killing it", timeout);
            let _ = child.kill();
            let _ = child.wait();
            return Err(CaptureError::Timeout(timeout));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf).map(|_| buf)
    })
}

/// Delete the staging file; a missing file is fine.
fn remove_staging(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}

/// Find an executable the way a shell would.
fn resolve_program(command: &str) -> Option<PathBuf> {
    let candidate = Path::new(command);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(command))
            .find(|path| path.is_file())
    })
}
