//! Supervisor scenarios driven by scripted backends

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use framecast::capture::{
    BackendChain, BackendKind, FrameSource, PixelFormat, RawImage, SyntheticGenerator,
};
use framecast::codec::{bmp, OutputFormat, RowOrder};
use framecast::error::{CaptureError, ErrorKind, Result};
use framecast::pipeline::{CaptureSupervisor, FrameBuffer, Health};
use framecast::{CaptureConfig, CodecConfig, Config, SupervisorConfig};

const W: u32 = 32;
const H: u32 = 24;

/// Camera that times out on every read
struct Stalled;

impl FrameSource for Stalled {
    fn kind(&self) -> BackendKind {
        BackendKind::Device
    }

    fn capture(&mut self) -> Result<RawImage> {
        Err(CaptureError::Timeout(Duration::from_secs(3)))
    }
}

/// Camera that always delivers a flat grey frame
struct Working;

impl FrameSource for Working {
    fn kind(&self) -> BackendKind {
        BackendKind::Device
    }

    fn capture(&mut self) -> Result<RawImage> {
        Ok(RawImage::rgb(vec![128u8; (W * H * 3) as usize], W, H))
    }
}

fn config() -> Config {
    Config {
        capture: CaptureConfig {
            width: W,
            height: H,
            fps: 500,
            ..CaptureConfig::default()
        },
        supervisor: SupervisorConfig {
            degraded_backoff: vec![Duration::ZERO, Duration::from_millis(1)],
            retry_threshold: 4,
            retry_backoff: vec![Duration::from_millis(1), Duration::from_millis(2)],
            max_reinit_attempts: 2,
            init_probe_rounds: 1,
            reprobe_interval: Duration::ZERO,
        },
        ..Config::default()
    }
}

/// First probe hands out a stalled camera; later probes fail until the
/// camera is "plugged back in".
fn flaky_chain(plugged: Arc<AtomicBool>) -> BackendChain {
    let probes = Arc::new(AtomicUsize::new(0));
    BackendChain::new(SyntheticGenerator::new(W, H)).with_probe(
        BackendKind::Device,
        Arc::new(move || {
            if probes.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Box::new(Stalled) as Box<dyn FrameSource>)
            } else if plugged.load(Ordering::SeqCst) {
                Ok(Box::new(Working) as Box<dyn FrameSource>)
            } else {
                Err(CaptureError::BackendUnavailable("/dev/video0 missing".into()))
            }
        }),
    )
}

fn record(sup: &CaptureSupervisor, seen: &mut Vec<Health>) {
    let health = sup.state().health;
    if seen.last() != Some(&health) {
        seen.push(health);
    }
}

#[test]
fn repeated_timeouts_degrade_to_synthetic_then_recover() {
    let plugged = Arc::new(AtomicBool::new(false));
    let buffer = Arc::new(FrameBuffer::new());
    let mut sup = CaptureSupervisor::new(
        &config(),
        flaky_chain(Arc::clone(&plugged)),
        Arc::clone(&buffer),
        None,
    );

    let mut seen = Vec::new();
    // INIT, five timeouts, two failed reinitialisations, then synthetic
    for _ in 0..10 {
        sup.step();
        record(&sup, &mut seen);
    }
    assert_eq!(
        seen,
        [
            Health::Healthy,
            Health::Degraded,
            Health::Retrying,
            Health::Synthetic
        ]
    );

    let state = sup.state();
    assert_eq!(state.backend, Some(BackendKind::Synthetic));
    assert_eq!(state.last_error, Some(ErrorKind::BackendUnavailable));

    let frame = buffer.latest().unwrap();
    assert!(frame.is_synthetic());
    assert_eq!((frame.width, frame.height), (W, H));

    plugged.store(true, Ordering::SeqCst);
    let deadline = Instant::now() + Duration::from_secs(5);
    while sup.state().health != Health::Healthy && Instant::now() < deadline {
        sup.step();
        thread::sleep(Duration::from_millis(2));
    }
    record(&sup, &mut seen);
    assert_eq!(seen.last(), Some(&Health::Healthy));
    assert_eq!(sup.state().consecutive_failures, 0);

    let before = buffer.sequence();
    sup.step();
    let frame = buffer.latest().unwrap();
    assert!(frame.sequence > before);
    assert_eq!(frame.origin, BackendKind::Device);
}

#[test]
fn degraded_stream_keeps_last_good_frame() {
    let plugged = Arc::new(AtomicBool::new(false));
    let buffer = Arc::new(FrameBuffer::new());
    let mut sup = CaptureSupervisor::new(&config(), flaky_chain(plugged), Arc::clone(&buffer), None);

    // Nothing was ever published, so there is no last-good frame either
    sup.step();
    sup.step();
    assert_eq!(sup.state().health, Health::Degraded);
    assert!(matches!(buffer.latest(), Err(CaptureError::NoFrameYet)));
}

#[test]
fn bmp_frames_end_to_end() {
    let mut config = config();
    config.codec = CodecConfig {
        format: OutputFormat::Bmp,
        bmp_row_order: RowOrder::TopDown,
        ..CodecConfig::default()
    };
    let buffer = Arc::new(FrameBuffer::new());
    let chain = BackendChain::synthetic_only(SyntheticGenerator::new(W, H));
    let mut sup = CaptureSupervisor::new(&config, chain, Arc::clone(&buffer), None);

    sup.step();
    sup.step();

    let frame = buffer.latest().unwrap();
    assert_eq!(frame.format, PixelFormat::EncodedBmp);
    assert_eq!(frame.content_type(), "image/bmp");
    assert_eq!(frame.payload.len(), bmp::encoded_len(W, H));

    let header = bmp::parse_header(&frame.payload).unwrap();
    assert_eq!((header.width, header.height), (W, H));
    assert_eq!(header.order, RowOrder::TopDown);

    // Top row is the striped banner of the synthetic pattern
    let (pixels, _, _) = bmp::decode(&frame.payload).unwrap();
    assert_eq!(&pixels[0..3], &[255, 255, 0]);
}

#[test]
fn sequence_strictly_increases_across_backend_switches() {
    let plugged = Arc::new(AtomicBool::new(false));
    let buffer = Arc::new(FrameBuffer::new());
    let mut sup = CaptureSupervisor::new(
        &config(),
        flaky_chain(Arc::clone(&plugged)),
        Arc::clone(&buffer),
        None,
    );

    let mut last = 0;
    for i in 0..40 {
        if i == 20 {
            plugged.store(true, Ordering::SeqCst);
        }
        sup.step();
        let seq = buffer.sequence();
        assert!(seq >= last);
        last = seq;
    }
    let (_, rejected) = buffer.stats();
    assert_eq!(rejected, 0);
}
