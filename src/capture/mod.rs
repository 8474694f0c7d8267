pub mod decoder;
pub mod frame;
pub mod process;
pub mod source;
pub mod synthetic;
#[cfg(feature = "device-v4l")]
pub mod v4l2;

pub use frame::{BackendKind, Frame, PixelFormat, RawImage};
pub use process::ProcessCapture;
pub use source::{BackendChain, FrameSource, Probe};
pub use synthetic::SyntheticGenerator;
#[cfg(feature = "device-v4l")]
pub use v4l2::V4l2Capture;
