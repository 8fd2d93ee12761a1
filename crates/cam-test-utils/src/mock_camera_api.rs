// mock_camera_api: A mock HTTP endpoint for stream metadata and snapshots.
//
// Serves the two REST calls the stream client makes, with scriptable
// responses and hit counters so tests can assert metadata caching and
// snapshot poll cadence.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use base64::Engine as _;
use cam_protocol::{QualityLevel, SnapshotResponse, StreamInfo};
use tokio::sync::Mutex;

#[derive(Clone)]
struct MetadataScript {
    status: u16,
    available: bool,
    /// `None` derives `/ws/cameras/{id}/stream` from the requested id.
    websocket_path: Option<String>,
}

impl Default for MetadataScript {
    fn default() -> Self {
        Self {
            status: 200,
            available: true,
            websocket_path: None,
        }
    }
}

#[derive(Clone)]
struct SnapshotScript {
    status: u16,
    success: bool,
    image: Vec<u8>,
    /// Hold each response this long before sending it.
    delay: Option<Duration>,
}

impl Default for SnapshotScript {
    fn default() -> Self {
        Self {
            status: 200,
            success: true,
            image: b"mock-jpeg-frame".to_vec(),
            delay: None,
        }
    }
}

#[derive(Default)]
struct ApiState {
    metadata_hits: AtomicUsize,
    snapshot_hits: AtomicUsize,
    metadata: Mutex<MetadataScript>,
    snapshot: Mutex<SnapshotScript>,
}

/// A mock camera HTTP API for integration testing.
///
/// Serves `GET /cameras/{id}/stream` and `GET /cameras/{id}/stream/snapshot`
/// on a random port. Defaults: metadata advertises low/medium/high with a
/// `medium` default and `is_available == true`; snapshots succeed with a
/// fixed placeholder image.
pub struct MockCameraApi {
    addr: SocketAddr,
    state: Arc<ApiState>,
    /// Handle to the background server; detached when the mock drops.
    _task: tokio::task::JoinHandle<()>,
}

impl MockCameraApi {
    /// Start the mock API, binding to a random available port.
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let state = Arc::new(ApiState::default());
        let app = Router::new()
            .route("/cameras/{id}/stream", get(stream_info))
            .route("/cameras/{id}/stream/snapshot", get(snapshot))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            addr,
            state,
            _task: task,
        })
    }

    /// Return the address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// `http://` base URL, usable as the client's API base.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of metadata requests served.
    pub fn metadata_hits(&self) -> usize {
        self.state.metadata_hits.load(Ordering::SeqCst)
    }

    /// Number of snapshot requests served.
    pub fn snapshot_hits(&self) -> usize {
        self.state.snapshot_hits.load(Ordering::SeqCst)
    }

    /// Respond to metadata requests with this HTTP status instead of 200.
    pub async fn set_metadata_status(&self, status: u16) {
        self.state.metadata.lock().await.status = status;
    }

    /// Script whether the camera advertises itself as able to stream.
    pub async fn set_available(&self, available: bool) {
        self.state.metadata.lock().await.available = available;
    }

    /// Override the advertised socket path.
    pub async fn set_websocket_path(&self, path: impl Into<String>) {
        self.state.metadata.lock().await.websocket_path = Some(path.into());
    }

    /// Respond to snapshot requests with this HTTP status instead of 200.
    pub async fn set_snapshot_status(&self, status: u16) {
        self.state.snapshot.lock().await.status = status;
    }

    /// Script the snapshot body's `success` flag.
    pub async fn set_snapshot_success(&self, success: bool) {
        self.state.snapshot.lock().await.success = success;
    }

    /// Serve this image (base64-encoded) from the snapshot endpoint.
    pub async fn set_snapshot_image(&self, image: impl Into<Vec<u8>>) {
        self.state.snapshot.lock().await.image = image.into();
    }

    /// Hold every snapshot response for this long before replying.  The hit
    /// counter still ticks on arrival, so tests can catch a client with a
    /// request in flight.
    pub async fn set_snapshot_delay(&self, delay: Duration) {
        self.state.snapshot.lock().await.delay = Some(delay);
    }
}

async fn stream_info(
    State(state): State<Arc<ApiState>>,
    Path(camera_id): Path<String>,
) -> Response {
    state.metadata_hits.fetch_add(1, Ordering::SeqCst);
    let script = state.metadata.lock().await.clone();
    if script.status != 200 {
        return status_response(script.status);
    }
    let websocket_path = script
        .websocket_path
        .unwrap_or_else(|| format!("/ws/cameras/{camera_id}/stream"));
    Json(StreamInfo {
        websocket_path,
        quality_options: vec![QualityLevel::Low, QualityLevel::Medium, QualityLevel::High],
        default_quality: QualityLevel::Medium,
        is_available: script.available,
    })
    .into_response()
}

async fn snapshot(State(state): State<Arc<ApiState>>, Path(_camera_id): Path<String>) -> Response {
    state.snapshot_hits.fetch_add(1, Ordering::SeqCst);
    let script = state.snapshot.lock().await.clone();
    if let Some(delay) = script.delay {
        tokio::time::sleep(delay).await;
    }
    if script.status != 200 {
        return status_response(script.status);
    }
    Json(SnapshotResponse {
        success: script.success,
        timestamp: "2026-08-23T10:00:00Z".to_owned(),
        quality: "medium".to_owned(),
        image_base64: base64::engine::general_purpose::STANDARD.encode(&script.image),
    })
    .into_response()
}

fn status_response(code: u16) -> Response {
    StatusCode::from_u16(code)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        .into_response()
}
