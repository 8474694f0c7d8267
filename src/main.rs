//! framecast: live capture with a multipart MJPEG stream

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use color_eyre::{eyre::WrapErr, Result};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use framecast::capture::BackendChain;
use framecast::pipeline::{CaptureSupervisor, FrameBuffer};
use framecast::server::{self, AppState};
use framecast::tracker::ObjectTracker;
use framecast::{BackendPreference, Config};

#[derive(Parser, Debug)]
#[command(name = "framecast", about = "Camera capture with an MJPEG stream over HTTP")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "FRAMECAST_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Per-client stream rate
    #[arg(long)]
    fps: Option<u32>,

    /// Capture backend
    #[arg(long, value_enum)]
    backend: Option<BackendPreference>,

    /// Enable colour tracking
    #[arg(long)]
    track: bool,

    /// Verbose logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    color_eyre::install()?;
    let default_filter = if args.debug { "framecast=debug" } else { "framecast=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("framecast launching...");

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(fps) = args.fps {
        config.stream.target_fps = fps;
    }
    if let Some(backend) = args.backend {
        config.capture.backend = backend;
    }
    config.tracker.enabled |= args.track;

    info!(
        backend = ?config.capture.backend,
        format = ?config.codec.format,
        fps = config.stream.target_fps,
        tracking = config.tracker.enabled,
        "Configuration loaded"
    );

    let buffer = Arc::new(FrameBuffer::new());
    let tracker = config
        .tracker
        .enabled
        .then(|| Arc::new(ObjectTracker::new(&config.tracker)));

    let chain = BackendChain::from_config(&config.capture);
    let supervisor = CaptureSupervisor::new(&config, chain, Arc::clone(&buffer), tracker.clone())
        .spawn()
        .wrap_err("Failed to start capture thread")?;
    let supervisor = Arc::new(supervisor);

    let streaming = Arc::new(AtomicBool::new(true));
    let state = AppState {
        buffer,
        supervisor: Arc::clone(&supervisor),
        tracker,
        streaming: Arc::clone(&streaming),
        stream: config.stream.clone(),
    };

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind {addr}"))?;

    let shutdown = {
        let streaming = Arc::clone(&streaming);
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Shutting down");
            streaming.store(false, Ordering::Relaxed);
        }
    };

    let served = server::serve(listener, state, shutdown).await;

    // Capture thread joins on a blocking thread so the runtime stays free
    let stopper = Arc::clone(&supervisor);
    tokio::task::spawn_blocking(move || stopper.stop())
        .await
        .wrap_err("Capture thread did not stop cleanly")?;

    served.wrap_err("HTTP server failed")?;
    info!("framecast stopped");
    Ok(())
}
