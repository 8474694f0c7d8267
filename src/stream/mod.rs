//! Per-client multipart session
//!
//! Each connected client owns a [`MultipartStreamer`]. It pulls the latest
//! frame from the shared buffer at its own pace and frames it as one
//! `multipart/x-mixed-replace` part. Sessions never see capture errors: an
//! empty buffer means idle and retry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::Stream;
use tokio::time::{sleep, Instant};
use tracing::trace;

use crate::capture::Frame;
use crate::pipeline::FrameBuffer;
use crate::StreamConfig;

/// Part boundary used in the response content type
pub const BOUNDARY: &str = "frame";

/// `Content-Type` of the whole response body
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Frame one payload as a multipart part.
pub fn encode_part(frame: &Frame) -> Bytes {
    let header = format!(
        "--{BOUNDARY}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
        frame.content_type(),
        frame.payload.len()
    );
    let mut part = BytesMut::with_capacity(header.len() + frame.payload.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(&frame.payload);
    part.put_slice(b"\r\n");
    part.freeze()
}

pub struct MultipartStreamer {
    buffer: Arc<FrameBuffer>,
    streaming: Arc<AtomicBool>,
    interval: Duration,
    idle_poll: Duration,
    last_emit: Option<Instant>,
    last_sequence: u64,
}

impl MultipartStreamer {
    pub fn new(buffer: Arc<FrameBuffer>, streaming: Arc<AtomicBool>, config: &StreamConfig) -> Self {
        Self {
            buffer,
            streaming,
            interval: config.interval(),
            idle_poll: config.idle_poll,
            last_emit: None,
            last_sequence: 0,
        }
    }

    /// Sequence of the last emitted frame, 0 before the first.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Next frame to send, after the pacing sleep. `None` once streaming
    /// has been switched off.
    pub async fn next_frame(&mut self) -> Option<Arc<Frame>> {
        if let Some(last) = self.last_emit {
            let since = last.elapsed();
            if since < self.interval {
                sleep(self.interval - since).await;
            }
        }

        loop {
            if !self.streaming.load(Ordering::Relaxed) {
                return None;
            }
            match self.buffer.latest() {
                Ok(frame) => {
                    self.last_emit = Some(Instant::now());
                    self.last_sequence = frame.sequence;
                    return Some(frame);
                }
                Err(e) => {
                    trace!("Waiting for first frame: {}", e);
                    sleep(self.idle_poll).await;
                }
            }
        }
    }

    /// Next framed chunk.
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        self.next_frame().await.map(|frame| encode_part(&frame))
    }

    /// Turn the session into a body stream. It ends when streaming is
    /// switched off; a peer disconnect drops it.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send {
        futures_util::stream::unfold(self, |mut session| async move {
            session.next_chunk().await.map(|chunk| (Ok(chunk), session))
        })
    }
}
