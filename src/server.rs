//! HTTP surface
//!
//! Thin axum layer over the pipeline. Handlers only read the frame buffer
//! and the supervisor's shared state; nothing here touches a backend.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::pipeline::{CaptureState, FrameBuffer, SupervisorHandle};
use crate::stream::{self, MultipartStreamer};
use crate::tracker::{Adjustment, ColorBand, ObjectTracker, TrackResult};
use crate::StreamConfig;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>framecast</title></head>
<body style="margin:0;background:#111;color:#ddd;font-family:sans-serif">
<img src="/video_feed" style="display:block;margin:0 auto;max-width:100%">
<pre id="status" style="text-align:center"></pre>
<script>
setInterval(async () => {
  const r = await fetch('/status');
  document.getElementById('status').textContent = JSON.stringify(await r.json(), null, 2);
}, 1000);
</script>
</body>
</html>
"#;

/// Everything a handler may touch
#[derive(Clone)]
pub struct AppState {
    pub buffer: Arc<FrameBuffer>,
    pub supervisor: Arc<SupervisorHandle>,
    pub tracker: Option<Arc<ObjectTracker>>,
    /// Producer-wide switch; clearing it ends every session
    pub streaming: Arc<AtomicBool>,
    pub stream: StreamConfig,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub capture: CaptureState,
    pub streaming: bool,
    pub sequence: u64,
    pub tracking: Option<TrackResult>,
    pub band: Option<ColorBand>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/video_feed", get(video_feed))
        .route("/status", get(status))
        .route("/health", get(status))
        .route("/stats", get(stats))
        .route("/restart", post(restart))
        .route("/adjust/:action", post(adjust))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{}", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn video_feed(State(state): State<AppState>) -> impl IntoResponse {
    debug!("Streaming client attached");
    let session = MultipartStreamer::new(state.buffer, state.streaming, &state.stream);
    (
        [
            (header::CONTENT_TYPE, stream::CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(session.into_stream()),
    )
}

pub async fn status(State(state): State<AppState>) -> Json<StatusReport> {
    let latest = state.buffer.latest().ok();
    Json(StatusReport {
        capture: state.supervisor.state(),
        streaming: state.streaming.load(Ordering::Relaxed),
        sequence: latest.as_ref().map_or(0, |frame| frame.sequence),
        tracking: latest.and_then(|frame| frame.tracked),
        band: state.tracker.as_ref().map(|tracker| tracker.band()),
    })
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.supervisor.stats())
}

pub async fn restart(State(state): State<AppState>) -> Response {
    if state.supervisor.restart() {
        info!("Restart requested over HTTP");
        (StatusCode::ACCEPTED, Json(json!({ "status": "restarting" }))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "capture supervisor is not running" })),
        )
            .into_response()
    }
}

pub async fn adjust(State(state): State<AppState>, Path(action): Path<String>) -> Response {
    let Some(tracker) = state.tracker else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "tracking is disabled" })),
        )
            .into_response();
    };

    match action.parse::<Adjustment>() {
        Ok(adjustment) => Json(tracker.adjust(adjustment)).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({ "error": e }))).into_response(),
    }
}
