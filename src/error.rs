//! Capture pipeline error taxonomy

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by frame sources, the codec and the frame buffer.
///
/// None of these reach a streaming session: the supervisor absorbs them
/// and turns them into health transitions.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Binary or device not present. Fatal to that backend only.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Capture exceeded its bound.
    #[error("capture timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed or unencodable pixel data. The frame is dropped.
    #[error("decode/encode failure: {0}")]
    DecodeOrEncodeFailure(String),

    /// Buffer is empty; only possible before the first publish.
    #[error("no frame published yet")]
    NoFrameYet,

    #[error("capture I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialisable discriminant of [`CaptureError`], kept in `CaptureState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BackendUnavailable,
    Timeout,
    DecodeOrEncodeFailure,
    NoFrameYet,
    Io,
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            CaptureError::Timeout(_) => ErrorKind::Timeout,
            CaptureError::DecodeOrEncodeFailure(_) => ErrorKind::DecodeOrEncodeFailure,
            CaptureError::NoFrameYet => ErrorKind::NoFrameYet,
            CaptureError::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether the error says something about the backend itself, as
    /// opposed to a single bad frame.
    pub fn is_backend_failure(&self) -> bool {
        !matches!(self, CaptureError::DecodeOrEncodeFailure(_))
    }
}

pub type Result<T> = std::result::Result<T, CaptureError>;
