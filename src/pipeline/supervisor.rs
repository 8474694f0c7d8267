//! Capture supervisor
//!
//! Owns the active frame source on a dedicated thread and drives the
//! health state machine:
//!
//! ```text
//! INIT -> HEALTHY <-> DEGRADED -> RETRYING -> HEALTHY | SYNTHETIC
//!                                              SYNTHETIC -> INIT (re-probe)
//! ```
//!
//! Backend errors never leave this module; they become transitions. Every
//! successful capture is tracked, encoded and published with the next
//! sequence number.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::capture::decoder::{decode_frame, flip_horizontal};
use crate::capture::{BackendChain, BackendKind, Frame, FrameSource, RawImage, SyntheticGenerator};
use crate::codec::ImageCodec;
use crate::error::{CaptureError, ErrorKind, Result};
use crate::pipeline::buffer::FrameBuffer;
use crate::pipeline::stats::{CaptureStats, StatsSnapshot};
use crate::tracker::{ObjectTracker, TrackResult};
use crate::{Config, SupervisorConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Init,
    Healthy,
    Degraded,
    Retrying,
    Synthetic,
}

/// Health snapshot served on `/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureState {
    pub backend: Option<BackendKind>,
    pub health: Health,
    pub consecutive_failures: u32,
    pub last_error: Option<ErrorKind>,
}

impl Default for CaptureState {
    fn default() -> Self {
        Self {
            backend: None,
            health: Health::Init,
            consecutive_failures: 0,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Restart,
}

/// State readable from outside the capture thread
#[derive(Default)]
struct Shared {
    state: Mutex<CaptureState>,
    stats: Mutex<CaptureStats>,
}

type ProbeResult = Result<Box<dyn FrameSource>>;

pub struct CaptureSupervisor {
    chain: BackendChain,
    buffer: Arc<FrameBuffer>,
    codec: ImageCodec,
    tracker: Option<Arc<ObjectTracker>>,
    config: SupervisorConfig,
    frame_interval: Duration,
    mirror: bool,

    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    commands_tx: flume::Sender<Command>,
    commands: flume::Receiver<Command>,

    source: Option<Box<dyn FrameSource>>,
    synthetic: SyntheticGenerator,
    sequence: u64,
    retry_tier: usize,
    reinit_attempts: u32,
    pending_probe: Option<flume::Receiver<ProbeResult>>,
    last_probe: Instant,
}

impl CaptureSupervisor {
    pub fn new(
        config: &Config,
        chain: BackendChain,
        buffer: Arc<FrameBuffer>,
        tracker: Option<Arc<ObjectTracker>>,
    ) -> Self {
        let (commands_tx, commands) = flume::unbounded();
        let synthetic = chain.synthetic();
        Self {
            chain,
            buffer,
            codec: ImageCodec::new(&config.codec),
            tracker,
            config: config.supervisor.clone(),
            frame_interval: config.capture.frame_interval(),
            mirror: config.capture.mirror,
            shared: Arc::new(Shared::default()),
            running: Arc::new(AtomicBool::new(true)),
            commands_tx,
            commands,
            source: None,
            synthetic,
            sequence: 0,
            retry_tier: 0,
            reinit_attempts: 0,
            pending_probe: None,
            last_probe: Instant::now(),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.shared.state.lock().clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.lock().snapshot()
    }

    /// Ask the loop to drop its backend and probe again from scratch.
    pub fn request_restart(&self) {
        let _ = self.commands_tx.send(Command::Restart);
    }

    /// Run the loop on its own thread.
    pub fn spawn(self) -> io::Result<SupervisorHandle> {
        let running = Arc::clone(&self.running);
        let shared = Arc::clone(&self.shared);
        let commands = self.commands_tx.clone();

        let thread = thread::Builder::new()
            .name("capture-supervisor".into())
            .spawn(move || self.run())?;

        Ok(SupervisorHandle {
            running,
            shared,
            commands,
            thread: Mutex::new(Some(thread)),
        })
    }

    fn run(mut self) {
        info!("Capture supervisor starting");
        while self.running.load(Ordering::Relaxed) {
            self.step();
        }
        self.release_source();
        info!("Capture supervisor stopped");
    }

    /// One iteration of the state machine.
    pub fn step(&mut self) {
        self.drain_commands();
        match self.health() {
            Health::Init => self.initialise(),
            Health::Healthy | Health::Degraded => self.capture_real(),
            Health::Retrying => self.reinitialise(),
            Health::Synthetic => self.capture_synthetic(),
        }
    }

    fn health(&self) -> Health {
        self.shared.state.lock().health
    }

    fn transition(&self, to: Health, backend: Option<BackendKind>) {
        let mut state = self.shared.state.lock();
        if state.health == to && state.backend == backend {
            return;
        }
        let from = state.health;
        state.health = to;
        state.backend = backend;
        drop(state);

        match to {
            Health::Degraded | Health::Retrying | Health::Synthetic => {
                warn!(?from, ?to, backend = ?backend, "Capture health changed")
            }
            _ => info!(?from, ?to, backend = ?backend, "Capture health changed"),
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Restart => {
                    info!("Restart requested");
                    self.release_source();
                    self.reset_counters();
                    self.transition(Health::Init, None);
                }
            }
        }
    }

    fn reset_counters(&mut self) {
        self.retry_tier = 0;
        self.reinit_attempts = 0;
        self.shared.state.lock().consecutive_failures = 0;
    }

    fn record_error(&self, e: &CaptureError) {
        self.shared.state.lock().last_error = Some(e.kind());
    }

    fn install(&mut self, source: Box<dyn FrameSource>) {
        let kind = source.kind();
        self.release_source();
        self.source = Some(source);
        self.reset_counters();
        self.transition(Health::Healthy, Some(kind));
    }

    fn release_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            debug!(backend = %source.kind(), "Releasing backend");
            source.release();
        }
    }

    fn enter_synthetic(&mut self) {
        self.release_source();
        self.last_probe = Instant::now();
        self.transition(Health::Synthetic, Some(BackendKind::Synthetic));
    }

    fn initialise(&mut self) {
        if self.chain.is_synthetic_only() {
            info!("No real backends to probe, using synthetic source");
            self.enter_synthetic();
            return;
        }

        // A background probe may still hold the helper or device
        if let Some(source) = self.finish_pending_probe() {
            self.install(source);
            return;
        }

        let rounds = self.config.init_probe_rounds.max(1);
        for round in 0..rounds {
            if !self.running.load(Ordering::Relaxed) {
                return;
            }
            match self.chain.probe_real() {
                Ok(source) => {
                    self.install(source);
                    return;
                }
                Err(e) => {
                    self.record_error(&e);
                    if round + 1 < rounds {
                        self.sleep(tier(&self.config.retry_backoff, round as usize));
                    }
                }
            }
        }

        warn!("All real backends failed to probe");
        self.enter_synthetic();
    }

    /// Wait for an in-flight background probe so two probes never run
    /// against the same backend at once.
    fn finish_pending_probe(&mut self) -> Option<Box<dyn FrameSource>> {
        let rx = self.pending_probe.take()?;
        debug!("Waiting for background probe to finish");
        match rx.recv() {
            Ok(Ok(source)) => Some(source),
            Ok(Err(e)) => {
                self.record_error(&e);
                None
            }
            Err(_) => None,
        }
    }

    fn capture_real(&mut self) {
        let Some(source) = self.source.as_mut() else {
            self.transition(Health::Retrying, None);
            return;
        };

        let kind = source.kind();
        let started = Instant::now();
        match source.capture() {
            Ok(image) => {
                if self.health() == Health::Degraded {
                    self.transition(Health::Healthy, Some(kind));
                }
                self.retry_tier = 0;
                self.shared.state.lock().consecutive_failures = 0;
                self.process_and_publish(image, kind, started);
                self.pace(started);
            }
            Err(e) if !e.is_backend_failure() => {
                warn!(backend = %kind, "Dropping frame: {}", e);
                self.drop_frame();
                self.pace(started);
            }
            Err(e @ CaptureError::BackendUnavailable(_)) => {
                // Gone for good; no point retrying this handle
                metrics::counter!("capture_failures_total").increment(1);
                warn!(backend = %kind, "Backend lost: {}", e);
                self.record_error(&e);
                self.release_source();
                self.transition(Health::Retrying, Some(kind));
            }
            Err(e) => {
                metrics::counter!("capture_failures_total").increment(1);
                let failures = {
                    let mut state = self.shared.state.lock();
                    state.consecutive_failures += 1;
                    state.last_error = Some(e.kind());
                    state.consecutive_failures
                };
                warn!(backend = %kind, failures, "Capture failed: {}", e);

                if failures > self.config.retry_threshold {
                    self.release_source();
                    self.transition(Health::Retrying, Some(kind));
                    return;
                }
                self.transition(Health::Degraded, Some(kind));
                self.sleep(tier(&self.config.degraded_backoff, failures as usize - 1));
            }
        }
    }

    fn reinitialise(&mut self) {
        if self.reinit_attempts >= self.config.max_reinit_attempts {
            warn!(
                attempts = self.reinit_attempts,
                "Real backends exhausted, falling back to synthetic frames"
            );
            self.enter_synthetic();
            return;
        }

        let delay = tier(&self.config.retry_backoff, self.retry_tier);
        self.retry_tier = (self.retry_tier + 1).min(self.config.retry_backoff.len().saturating_sub(1));
        self.reinit_attempts += 1;
        info!(attempt = self.reinit_attempts, ?delay, "Reinitialising capture backend");
        self.sleep(delay);
        if !self.running.load(Ordering::Relaxed) {
            return;
        }

        match self.chain.probe_real() {
            Ok(source) => self.install(source),
            Err(e) => {
                warn!("Reinitialisation failed: {}", e);
                self.record_error(&e);
            }
        }
    }

    fn capture_synthetic(&mut self) {
        if self.poll_background_probe() {
            return;
        }

        let started = Instant::now();
        match self.synthetic.capture() {
            Ok(image) => self.process_and_publish(image, BackendKind::Synthetic, started),
            Err(e) => error!("Synthetic source failed: {}", e),
        }
        self.pace(started);
    }

    /// Check on, or start, the periodic background re-probe. Returns true
    /// when a real backend came back.
    fn poll_background_probe(&mut self) -> bool {
        if let Some(rx) = &self.pending_probe {
            match rx.try_recv() {
                Ok(Ok(source)) => {
                    self.pending_probe = None;
                    info!(backend = %source.kind(), "Real backend is back");
                    self.transition(Health::Init, None);
                    self.install(source);
                    return true;
                }
                Ok(Err(e)) => {
                    debug!("Background probe failed: {}", e);
                    self.record_error(&e);
                    self.pending_probe = None;
                    self.last_probe = Instant::now();
                }
                Err(flume::TryRecvError::Empty) => {}
                Err(flume::TryRecvError::Disconnected) => {
                    self.pending_probe = None;
                    self.last_probe = Instant::now();
                }
            }
            return false;
        }

        if self.chain.is_synthetic_only() || self.last_probe.elapsed() < self.config.reprobe_interval {
            return false;
        }

        let (tx, rx) = flume::bounded(1);
        let chain = self.chain.clone();
        let spawned = thread::Builder::new()
            .name("capture-reprobe".into())
            .spawn(move || {
                let _ = tx.send(chain.probe_real());
            });
        match spawned {
            Ok(_) => self.pending_probe = Some(rx),
            Err(e) => {
                error!("Could not start background probe: {}", e);
                self.last_probe = Instant::now();
            }
        }
        false
    }

    fn drop_frame(&self) {
        metrics::counter!("frames_dropped_total").increment(1);
        self.shared.stats.lock().record_drop();
    }

    /// Track, encode and publish one image.
    fn process_and_publish(&mut self, image: RawImage, origin: BackendKind, started: Instant) {
        let (payload, width, height, tracked) = match self.encode(image, origin) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(backend = %origin, "Dropping frame: {}", e);
                self.drop_frame();
                return;
            }
        };

        self.sequence += 1;
        let bytes = payload.len();
        let frame = Frame {
            payload,
            width,
            height,
            format: self.codec.format().pixel_format(),
            sequence: self.sequence,
            captured_at: SystemTime::now(),
            timestamp: started,
            origin,
            tracked,
        };

        match self.buffer.publish(frame) {
            Ok(_) => {
                metrics::counter!("frames_published_total").increment(1);
                metrics::histogram!("capture_time_us").record(started.elapsed().as_micros() as f64);
                self.shared.stats.lock().record_frame(bytes, width, height);
            }
            Err(e) => warn!("Publish rejected: {}", e),
        }
    }

    fn encode(
        &self,
        image: RawImage,
        origin: BackendKind,
    ) -> Result<(bytes::Bytes, u32, u32, Option<TrackResult>)> {
        let mirror = self.mirror && origin != BackendKind::Synthetic;

        // Already in the wire format and nothing to draw: pass it through
        if image.format == self.codec.format().pixel_format() && self.tracker.is_none() && !mirror {
            return Ok((image.data, image.width, image.height, None));
        }

        let (mut pixels, width, height) = decode_frame(&image)?;
        if mirror {
            flip_horizontal(&mut pixels, width);
        }
        let tracked = self
            .tracker
            .as_ref()
            .map(|tracker| tracker.process(&mut pixels, width, height));
        let payload = self.codec.encode(&pixels, width, height)?;
        Ok((payload, width, height, tracked))
    }

    /// Hold the loop to the configured capture rate.
    fn pace(&self, started: Instant) {
        let elapsed = started.elapsed();
        if elapsed < self.frame_interval {
            self.sleep(self.frame_interval - elapsed);
        }
    }

    /// Sleep in short slices so a stop request is noticed promptly.
    fn sleep(&self, duration: Duration) {
        const SLICE: Duration = Duration::from_millis(50);
        let deadline = Instant::now() + duration;
        while self.running.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(SLICE));
        }
    }
}

fn tier(tiers: &[Duration], index: usize) -> Duration {
    tiers
        .get(index)
        .or(tiers.last())
        .copied()
        .unwrap_or(Duration::ZERO)
}

/// Control surface for a running supervisor.
pub struct SupervisorHandle {
    running: Arc<AtomicBool>,
    shared: Arc<Shared>,
    commands: flume::Sender<Command>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl SupervisorHandle {
    pub fn state(&self) -> CaptureState {
        self.shared.state.lock().clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.lock().snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Recycle the backend. Returns false once the supervisor has stopped.
    pub fn restart(&self) -> bool {
        self.is_running() && self.commands.send(Command::Restart).is_ok()
    }

    /// Clear the running flag and wait for the loop to release its backend.
    /// Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                error!("Capture thread panicked");
            }
        }
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::capture::PixelFormat;
    use crate::{CaptureConfig, TrackerConfig};

    /// Source that plays back a script of outcomes, then keeps succeeding.
    struct Scripted {
        script: VecDeque<bool>,
    }

    impl FrameSource for Scripted {
        fn kind(&self) -> BackendKind {
            BackendKind::Device
        }

        fn capture(&mut self) -> Result<RawImage> {
            if self.script.pop_front().unwrap_or(true) {
                Ok(RawImage::rgb(vec![10u8; 8 * 6 * 3], 8, 6))
            } else {
                Err(CaptureError::Timeout(Duration::from_millis(1)))
            }
        }
    }

    fn fast_config() -> Config {
        Config {
            capture: CaptureConfig {
                width: 8,
                height: 6,
                fps: 1000,
                ..CaptureConfig::default()
            },
            supervisor: SupervisorConfig {
                degraded_backoff: vec![Duration::ZERO],
                retry_threshold: 2,
                retry_backoff: vec![Duration::ZERO],
                max_reinit_attempts: 1,
                init_probe_rounds: 1,
                reprobe_interval: Duration::from_secs(3600),
            },
            ..Config::default()
        }
    }

    fn chain_with(script: Vec<bool>) -> BackendChain {
        let script = Arc::new(Mutex::new(Some(VecDeque::from(script))));
        BackendChain::new(SyntheticGenerator::new(8, 6)).with_probe(
            BackendKind::Device,
            Arc::new(move || match script.lock().take() {
                Some(script) => Ok(Box::new(Scripted { script }) as Box<dyn FrameSource>),
                None => Err(CaptureError::BackendUnavailable("unplugged".into())),
            }),
        )
    }

    #[test]
    fn tier_caps_at_last_entry() {
        let tiers = [Duration::from_millis(1), Duration::from_millis(2)];
        assert_eq!(tier(&tiers, 0), Duration::from_millis(1));
        assert_eq!(tier(&tiers, 9), Duration::from_millis(2));
        assert_eq!(tier(&[], 3), Duration::ZERO);
    }

    #[test]
    fn init_probe_then_healthy_publish() {
        let buffer = Arc::new(FrameBuffer::new());
        let mut sup = CaptureSupervisor::new(&fast_config(), chain_with(vec![]), buffer.clone(), None);

        sup.step();
        assert_eq!(sup.state().health, Health::Healthy);
        assert_eq!(sup.state().backend, Some(BackendKind::Device));

        sup.step();
        sup.step();
        let frame = buffer.latest().unwrap();
        assert_eq!(frame.sequence, 2);
        assert_eq!(frame.format, PixelFormat::EncodedJpeg);
        assert_eq!(frame.origin, BackendKind::Device);
    }

    #[test]
    fn single_failure_degrades_then_recovers() {
        let buffer = Arc::new(FrameBuffer::new());
        let mut sup =
            CaptureSupervisor::new(&fast_config(), chain_with(vec![false, true]), buffer, None);

        sup.step();
        sup.step();
        let state = sup.state();
        assert_eq!(state.health, Health::Degraded);
        assert_eq!(state.consecutive_failures, 1);
        assert_eq!(state.last_error, Some(ErrorKind::Timeout));

        sup.step();
        assert_eq!(sup.state().health, Health::Healthy);
        assert_eq!(sup.state().consecutive_failures, 0);
    }

    /// Source whose backend has disappeared, counting capture calls
    struct Vanished {
        calls: Arc<AtomicUsize>,
    }

    impl FrameSource for Vanished {
        fn kind(&self) -> BackendKind {
            BackendKind::ExternalProcess
        }

        fn capture(&mut self) -> Result<RawImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CaptureError::BackendUnavailable("helper not found".into()))
        }
    }

    #[test]
    fn lost_backend_skips_degraded_and_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handed_out = Arc::new(AtomicBool::new(false));
        let chain = {
            let calls = Arc::clone(&calls);
            BackendChain::new(SyntheticGenerator::new(8, 6)).with_probe(
                BackendKind::ExternalProcess,
                Arc::new(move || {
                    if handed_out.swap(true, Ordering::SeqCst) {
                        Err(CaptureError::BackendUnavailable("helper not found".into()))
                    } else {
                        Ok(Box::new(Vanished {
                            calls: Arc::clone(&calls),
                        }) as Box<dyn FrameSource>)
                    }
                }),
            )
        };
        let config = Config {
            supervisor: SupervisorConfig {
                degraded_backoff: vec![Duration::from_secs(1)],
                ..fast_config().supervisor
            },
            ..fast_config()
        };
        let mut sup = CaptureSupervisor::new(&config, chain, Arc::new(FrameBuffer::new()), None);

        sup.step();
        assert_eq!(sup.state().health, Health::Healthy);

        let started = Instant::now();
        sup.step();
        let state = sup.state();
        assert_eq!(state.health, Health::Retrying);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.last_error, Some(ErrorKind::BackendUnavailable));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sup.source.is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn retry_backoff_escalates_caps_and_resets() {
        let probes = Arc::new(AtomicUsize::new(0));
        let chain = {
            let probes = Arc::clone(&probes);
            BackendChain::new(SyntheticGenerator::new(8, 6)).with_probe(
                BackendKind::Device,
                Arc::new(move || {
                    if probes.fetch_add(1, Ordering::SeqCst) < 4 {
                        Err(CaptureError::Timeout(Duration::from_millis(1)))
                    } else {
                        Ok(Box::new(Scripted {
                            script: VecDeque::new(),
                        }) as Box<dyn FrameSource>)
                    }
                }),
            )
        };
        let tiers = vec![
            Duration::from_millis(1),
            Duration::from_millis(2),
            Duration::from_millis(3),
        ];
        let config = Config {
            supervisor: SupervisorConfig {
                retry_backoff: tiers.clone(),
                max_reinit_attempts: 10,
                ..fast_config().supervisor
            },
            ..fast_config()
        };
        let mut sup = CaptureSupervisor::new(&config, chain, Arc::new(FrameBuffer::new()), None);
        sup.transition(Health::Retrying, None);

        let mut delays = Vec::new();
        let mut tier_after = Vec::new();
        for _ in 0..4 {
            delays.push(tier(&sup.config.retry_backoff, sup.retry_tier));
            sup.step();
            tier_after.push(sup.retry_tier);
            assert_eq!(sup.state().health, Health::Retrying);
        }
        assert_eq!(delays, [tiers[0], tiers[1], tiers[2], tiers[2]]);
        assert_eq!(tier_after, [1, 2, 2, 2]);
        assert_eq!(sup.reinit_attempts, 4);

        sup.step();
        assert_eq!(sup.state().health, Health::Healthy);
        assert_eq!(sup.retry_tier, 0);
        assert_eq!(sup.reinit_attempts, 0);
    }

    #[test]
    fn restart_waits_for_background_probe() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let probes = Arc::new(AtomicUsize::new(0));
        let chain = {
            let (active, peak, probes) = (Arc::clone(&active), Arc::clone(&peak), Arc::clone(&probes));
            BackendChain::new(SyntheticGenerator::new(8, 6)).with_probe(
                BackendKind::ExternalProcess,
                Arc::new(move || {
                    probes.fetch_add(1, Ordering::SeqCst);
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(50));
                    active.fetch_sub(1, Ordering::SeqCst);
                    Err(CaptureError::BackendUnavailable("helper not found".into()))
                }),
            )
        };
        let config = Config {
            supervisor: SupervisorConfig {
                reprobe_interval: Duration::ZERO,
                ..fast_config().supervisor
            },
            ..fast_config()
        };
        let mut sup = CaptureSupervisor::new(&config, chain, Arc::new(FrameBuffer::new()), None);

        sup.step();
        assert_eq!(sup.state().health, Health::Synthetic);
        sup.step();
        assert!(sup.pending_probe.is_some());

        sup.request_restart();
        sup.step();
        assert!(sup.pending_probe.is_none());
        assert_eq!(probes.load(Ordering::SeqCst), 3);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(sup.state().health, Health::Synthetic);
    }

    #[test]
    fn repeated_failures_fall_back_to_synthetic() {
        let buffer = Arc::new(FrameBuffer::new());
        let mut sup = CaptureSupervisor::new(
            &fast_config(),
            chain_with(vec![false; 10]),
            buffer.clone(),
            None,
        );

        let mut seen = vec![];
        for _ in 0..8 {
            sup.step();
            let health = sup.state().health;
            if seen.last() != Some(&health) {
                seen.push(health);
            }
        }

        assert_eq!(
            seen,
            vec![
                Health::Healthy,
                Health::Degraded,
                Health::Retrying,
                Health::Synthetic
            ]
        );
        assert!(buffer.latest().unwrap().is_synthetic());
    }

    #[test]
    fn synthetic_only_chain_goes_straight_to_synthetic() {
        let buffer = Arc::new(FrameBuffer::new());
        let chain = BackendChain::synthetic_only(SyntheticGenerator::new(8, 6));
        let mut sup = CaptureSupervisor::new(&fast_config(), chain, buffer.clone(), None);

        sup.step();
        assert_eq!(sup.state().health, Health::Synthetic);
        sup.step();
        assert!(buffer.latest().unwrap().is_synthetic());
    }

    #[test]
    fn restart_command_reprobes() {
        let buffer = Arc::new(FrameBuffer::new());
        let mut sup = CaptureSupervisor::new(&fast_config(), chain_with(vec![]), buffer, None);
        sup.step();
        assert_eq!(sup.state().health, Health::Healthy);

        sup.request_restart();
        // Probe script is spent, so the re-probe fails and we land on synthetic
        sup.step();
        assert_eq!(sup.state().health, Health::Synthetic);
    }

    #[test]
    fn tracker_result_rides_on_frame() {
        let buffer = Arc::new(FrameBuffer::new());
        let tracker = Arc::new(ObjectTracker::new(&TrackerConfig {
            enabled: true,
            ..TrackerConfig::default()
        }));
        let mut sup =
            CaptureSupervisor::new(&fast_config(), chain_with(vec![]), buffer.clone(), Some(tracker));

        sup.step();
        sup.step();
        let frame = buffer.latest().unwrap();
        assert_eq!(frame.tracked, Some(TrackResult::NOT_DETECTED));
    }

    #[test]
    fn spawned_supervisor_publishes_and_stops() {
        let buffer = Arc::new(FrameBuffer::new());
        let chain = BackendChain::synthetic_only(SyntheticGenerator::new(8, 6));
        let handle = CaptureSupervisor::new(&fast_config(), chain, buffer.clone(), None)
            .spawn()
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while buffer.sequence() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(buffer.sequence() >= 3);
        assert_eq!(handle.state().health, Health::Synthetic);

        handle.stop();
        handle.stop();
        assert!(!handle.is_running());
        assert!(!handle.restart());
    }
}
