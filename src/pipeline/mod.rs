pub mod buffer;
pub mod stats;
pub mod supervisor;

pub use buffer::{BufferError, FrameBuffer};
pub use stats::{CaptureStats, StatsSnapshot};
pub use supervisor::{CaptureState, CaptureSupervisor, Health, SupervisorHandle};
