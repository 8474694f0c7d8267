//! Single-slot latest-frame cache shared by one producer and many readers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use thiserror::Error;

use crate::capture::Frame;
use crate::error::CaptureError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("stale frame: sequence {rejected} is not after {current}")]
    StaleSequence { current: u64, rejected: u64 },
}

#[derive(Default)]
struct Slot {
    current: Option<Arc<Frame>>,
    /// Previously published frame, kept as a fallback
    last_good: Option<Arc<Frame>>,
}

#[derive(Default)]
struct Stats {
    published: AtomicUsize,
    rejected: AtomicUsize,
}

/// Latest-frame cache.
///
/// The lock only guards a swap of `Arc`s; readers clone the reference out
/// and never hold the lock while writing to the network.
#[derive(Default)]
pub struct FrameBuffer {
    slot: Mutex<Slot>,
    stats: CachePadded<Stats>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer: publish a frame. Sequence numbers must strictly increase;
    /// anything else is rejected and leaves the buffer untouched.
    pub fn publish(&self, frame: Frame) -> Result<Arc<Frame>, BufferError> {
        let frame = Arc::new(frame);
        let mut slot = self.slot.lock();

        if let Some(current) = &slot.current {
            if frame.sequence <= current.sequence {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(BufferError::StaleSequence {
                    current: current.sequence,
                    rejected: frame.sequence,
                });
            }
        }

        slot.last_good = slot.current.replace(Arc::clone(&frame));
        self.stats.published.fetch_add(1, Ordering::Relaxed);
        Ok(frame)
    }

    /// Consumer: most recent frame, falling back to the last good one.
    pub fn latest(&self) -> Result<Arc<Frame>, CaptureError> {
        let slot = self.slot.lock();
        slot.current
            .as_ref()
            .or(slot.last_good.as_ref())
            .cloned()
            .ok_or(CaptureError::NoFrameYet)
    }

    /// The frame published before the current one.
    pub fn last_good(&self) -> Option<Arc<Frame>> {
        self.slot.lock().last_good.clone()
    }

    /// Sequence of the current frame, 0 before the first publish.
    pub fn sequence(&self) -> u64 {
        self.slot
            .lock()
            .current
            .as_ref()
            .map_or(0, |frame| frame.sequence)
    }

    /// (published, rejected)
    pub fn stats(&self) -> (usize, usize) {
        (
            self.stats.published.load(Ordering::Relaxed),
            self.stats.rejected.load(Ordering::Relaxed),
        )
    }
}
