//! Frame source capability and priority-ordered backend probing

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::capture::frame::{BackendKind, RawImage};
use crate::capture::process::ProcessCapture;
use crate::capture::synthetic::SyntheticGenerator;
use crate::error::{CaptureError, Result};
use crate::{BackendPreference, CaptureConfig};

/// Something that yields the next image or fails.
///
/// Implementations may block up to their own read timeout; the supervisor
/// never interrupts a call in flight.
pub trait FrameSource: Send {
    fn kind(&self) -> BackendKind;

    /// Pull the next image.
    fn capture(&mut self) -> Result<RawImage>;

    /// Release the underlying handle. Called before a backend is dropped
    /// by the supervisor; must be idempotent.
    fn release(&mut self) {}
}

/// Opens a backend. Returns `BackendUnavailable` when the backend cannot
/// be used at all on this host.
pub type Probe = Arc<dyn Fn() -> Result<Box<dyn FrameSource>> + Send + Sync>;

/// Real backends in priority order, plus the synthetic fallback.
#[derive(Clone)]
pub struct BackendChain {
    probes: Vec<(BackendKind, Probe)>,
    synthetic: SyntheticGenerator,
    synthetic_only: bool,
}

impl BackendChain {
    pub fn new(synthetic: SyntheticGenerator) -> Self {
        Self {
            probes: Vec::new(),
            synthetic,
            synthetic_only: false,
        }
    }

    /// Chain that never touches a real backend (explicit test mode).
    pub fn synthetic_only(synthetic: SyntheticGenerator) -> Self {
        Self {
            probes: Vec::new(),
            synthetic,
            synthetic_only: true,
        }
    }

    /// Register a probe. Probes run in backend priority order.
    pub fn with_probe(mut self, kind: BackendKind, probe: Probe) -> Self {
        self.probes.push((kind, probe));
        self.probes.sort_by_key(|(kind, _)| *kind);
        self
    }

    /// Build the chain described by the capture configuration.
    pub fn from_config(config: &CaptureConfig) -> Self {
        let synthetic = SyntheticGenerator::new(config.width, config.height);
        if config.backend == BackendPreference::Synthetic {
            return Self::synthetic_only(synthetic);
        }

        let mut chain = Self::new(synthetic);

        if matches!(
            config.backend,
            BackendPreference::Auto | BackendPreference::Device
        ) {
            chain = with_device_probe(chain, config);
        }

        if matches!(
            config.backend,
            BackendPreference::Auto | BackendPreference::Process
        ) {
            let process_config = config.process.clone();
            chain = chain.with_probe(
                BackendKind::ExternalProcess,
                Arc::new(move || {
                    let capture = ProcessCapture::probe(process_config.clone())?;
                    Ok(Box::new(capture) as Box<dyn FrameSource>)
                }),
            );
        }

        chain
    }

    pub fn is_synthetic_only(&self) -> bool {
        self.synthetic_only || self.probes.is_empty()
    }

    pub fn synthetic(&self) -> SyntheticGenerator {
        self.synthetic.clone()
    }

    /// Try every real backend in priority order; first success wins.
    pub fn probe_real(&self) -> Result<Box<dyn FrameSource>> {
        if self.synthetic_only {
            return Err(CaptureError::BackendUnavailable(
                "synthetic mode requested".into(),
            ));
        }

        let mut last_error = None;
        for (kind, probe) in &self.probes {
            debug!(backend = %kind, "Probing backend");
            match probe() {
                Ok(source) => {
                    info!(backend = %kind, "Backend available");
                    return Ok(source);
                }
                Err(e) => {
                    warn!(backend = %kind, "Probe failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            CaptureError::BackendUnavailable("no real backends configured".into())
        }))
    }
}

#[cfg(feature = "device-v4l")]
fn with_device_probe(chain: BackendChain, config: &CaptureConfig) -> BackendChain {
    let device_config = config.clone();
    chain.with_probe(
        BackendKind::Device,
        Arc::new(move || {
            let capture = crate::capture::v4l2::V4l2Capture::open(&device_config)?;
            Ok(Box::new(capture) as Box<dyn FrameSource>)
        }),
    )
}

#[cfg(not(feature = "device-v4l"))]
fn with_device_probe(chain: BackendChain, _config: &CaptureConfig) -> BackendChain {
    debug!("Device capture not compiled in, skipping");
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(BackendKind);

    impl FrameSource for Fixed {
        fn kind(&self) -> BackendKind {
            self.0
        }

        fn capture(&mut self) -> Result<RawImage> {
            Ok(RawImage::rgb(vec![0u8; 3], 1, 1))
        }
    }

    fn ok_probe(kind: BackendKind) -> Probe {
        Arc::new(move || Ok(Box::new(Fixed(kind)) as Box<dyn FrameSource>))
    }

    fn failing_probe() -> Probe {
        Arc::new(|| Err(CaptureError::BackendUnavailable("absent".into())))
    }

    #[test]
    fn device_is_preferred_over_process() {
        let chain = BackendChain::new(SyntheticGenerator::new(4, 4))
            .with_probe(BackendKind::ExternalProcess, ok_probe(BackendKind::ExternalProcess))
            .with_probe(BackendKind::Device, ok_probe(BackendKind::Device));

        let source = chain.probe_real().unwrap();
        assert_eq!(source.kind(), BackendKind::Device);
    }

    #[test]
    fn falls_through_to_next_backend() {
        let chain = BackendChain::new(SyntheticGenerator::new(4, 4))
            .with_probe(BackendKind::Device, failing_probe())
            .with_probe(BackendKind::ExternalProcess, ok_probe(BackendKind::ExternalProcess));

        let source = chain.probe_real().unwrap();
        assert_eq!(source.kind(), BackendKind::ExternalProcess);
    }

    #[test]
    fn exhausted_chain_reports_last_error() {
        let chain = BackendChain::new(SyntheticGenerator::new(4, 4))
            .with_probe(BackendKind::Device, failing_probe());

        let err = chain.probe_real().err().unwrap();
        assert!(matches!(err, CaptureError::BackendUnavailable(_)));
    }

    #[test]
    fn synthetic_only_never_probes() {
        let chain = BackendChain::synthetic_only(SyntheticGenerator::new(4, 4));
        assert!(chain.is_synthetic_only());
        assert!(chain.probe_real().is_err());
    }

    #[test]
    fn synthetic_preference_builds_synthetic_only_chain() {
        let config = CaptureConfig {
            backend: BackendPreference::Synthetic,
            ..CaptureConfig::default()
        };
        assert!(BackendChain::from_config(&config).is_synthetic_only());
    }
}
