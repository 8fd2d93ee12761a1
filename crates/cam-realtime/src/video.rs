//! Per-camera video stream client.
//!
//! Owns one binary-frame socket for exactly one camera: metadata lookup,
//! quality selection, bounded redials for transient drops, reserved
//! close-code handling, and a snapshot-polling degraded mode when the server
//! asks for it.
//!
//! # State machine
//! `idle --activate--> connecting --open--> connected
//! --close(code)--> {error | snapshot-fallback | connecting}`.
//! The reserved close codes resolve immediately (4429/4004 to an error
//! state, 4503 to snapshot fallback); any other drop takes the bounded
//! retry path and lands in `error` once the attempt budget is spent.  Error
//! and fallback states are left only by [`VideoStream::retry`],
//! [`VideoStream::set_quality`], or teardown.
//!
//! Socket, timers, and transitions all live on one spawned task, mirroring
//! [`crate::event_channel`]; the handle passes commands and watches results.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use bytes::Bytes;
use cam_protocol::{QualityLevel, SnapshotResponse, StreamClose, StreamInfo};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::connector::{BoxedSocket, Connector, WsConnector};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Configuration for one camera's stream client.
#[derive(Debug, Clone)]
pub struct VideoStreamConfig {
    /// REST base for metadata and snapshot calls, no trailing slash,
    /// e.g. `https://dash.example.com/api`.
    pub api_base_url: String,
    /// Socket base joined with the server-reported `websocket_path`,
    /// e.g. `wss://dash.example.com`.
    pub ws_base_url: String,
    pub camera_id: String,
    /// Operator-facing camera name; log lines only.
    pub display_name: String,
    /// Poll cadence while in snapshot fallback.
    pub snapshot_interval: Duration,
    /// Transient failures tolerated back to back before the client parks in
    /// an error state.  Always finite; reserved close codes never retry.
    pub max_retries: u32,
    /// Redial delay schedule.
    pub backoff: BackoffPolicy,
}

impl VideoStreamConfig {
    pub fn new(
        api_base_url: impl Into<String>,
        ws_base_url: impl Into<String>,
        camera_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ws_base_url: ws_base_url.into(),
            camera_id: camera_id.into(),
            display_name: display_name.into(),
            snapshot_interval: Duration::from_secs(5),
            max_retries: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Connection state of the stream.  Exactly one value at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Idle,
    Connecting,
    Connected,
    /// Degraded mode: periodic stills instead of live frames.  Deliberate
    /// and server-requested, not an error.
    SnapshotFallback,
    Error(StreamError),
}

/// Why the stream settled in [`StreamStatus::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamError {
    pub kind: StreamErrorKind,
    /// Ready-to-display text for the caller's banner.
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamErrorKind {
    /// Server refused the socket: too many concurrent streams (close 4429).
    LimitReached,
    /// Camera id unknown to the server (close 4004, or metadata 404).
    CameraNotFound,
    /// Camera exists but cannot stream right now (metadata 503, or
    /// `is_available == false`).
    StreamUnavailable,
    /// Transport failure with no server-assigned meaning.
    Unknown,
}

impl StreamError {
    pub fn limit_reached() -> Self {
        Self {
            kind: StreamErrorKind::LimitReached,
            message: "Maximum concurrent streams reached".to_owned(),
        }
    }

    pub fn camera_not_found() -> Self {
        Self {
            kind: StreamErrorKind::CameraNotFound,
            message: "Camera not found".to_owned(),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            kind: StreamErrorKind::StreamUnavailable,
            message: "Stream is currently unavailable".to_owned(),
        }
    }

    pub fn unknown() -> Self {
        Self {
            kind: StreamErrorKind::Unknown,
            message: "Video stream connection failed".to_owned(),
        }
    }

    /// UI hint: whether a retry control belongs next to the message.  A
    /// stream slot can free up and an unavailable camera can come back; a
    /// camera the server does not know will not appear by retrying.
    pub fn is_retryable(&self) -> bool {
        self.kind != StreamErrorKind::CameraNotFound
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// One displayable frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// Encoded image bytes, exactly as received.
    pub data: Bytes,
    pub source: FrameSource,
    /// Server-reported capture time; snapshot frames only.
    pub timestamp: Option<String>,
}

/// Which path produced a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSource {
    Live,
    Snapshot,
}

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

/// Callback bundle supplied at construction.  Callbacks run on the stream
/// task, one at a time, and never after teardown.
#[derive(Default)]
pub struct VideoCallbacks {
    /// Invoked synchronously on every status transition.
    pub on_status: Option<Box<dyn Fn(StreamStatus) + Send + Sync>>,
    /// Invoked for every frame, live or snapshot.
    pub on_frame: Option<Box<dyn Fn(VideoFrame) + Send + Sync>>,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

enum Command {
    SetQuality(QualityLevel),
    Retry,
    Shutdown,
}

/// Handle to one camera's stream client.
///
/// Construction spawns the stream task and activates immediately: metadata
/// fetch, then socket dial.  Dropping the handle tears the stream down (the
/// task observes the closed command channel before touching the socket or
/// timers again).
pub struct VideoStream {
    cmd_tx: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<StreamStatus>,
    frame_rx: watch::Receiver<Option<VideoFrame>>,
    quality_rx: watch::Receiver<Option<QualityLevel>>,
    camera_id: String,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl VideoStream {
    /// Create the client with the production connector.
    pub fn new(config: VideoStreamConfig, callbacks: VideoCallbacks) -> Self {
        Self::with_connector(config, callbacks, Arc::new(WsConnector))
    }

    /// Create the client with an injected socket factory.
    pub fn with_connector(
        config: VideoStreamConfig,
        callbacks: VideoCallbacks,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(StreamStatus::Idle);
        let (frame_tx, frame_rx) = watch::channel(None);
        let (quality_tx, quality_rx) = watch::channel(None);
        let camera_id = config.camera_id.clone();
        let task = StreamTask {
            config,
            callbacks,
            connector,
            http: reqwest::Client::new(),
            status_tx,
            frame_tx,
            quality_tx,
            cmd_rx,
            info: None,
            quality: None,
            attempts: 0,
        };
        let task = tokio::spawn(task.run());
        Self {
            cmd_tx,
            status_rx,
            frame_rx,
            quality_rx,
            camera_id,
            task: Some(task),
        }
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    /// Current status snapshot.
    pub fn status(&self) -> StreamStatus {
        self.status_rx.borrow().clone()
    }

    /// Watch stream of status values, for callers that prefer awaiting
    /// changes over callbacks.
    pub fn watch_status(&self) -> watch::Receiver<StreamStatus> {
        self.status_rx.clone()
    }

    /// Most recent frame from either path, if any has arrived yet.
    pub fn latest_frame(&self) -> Option<VideoFrame> {
        self.frame_rx.borrow().clone()
    }

    /// Watch stream of frames.  Only the newest frame is retained; a slow
    /// observer skips frames, it never lags behind.
    pub fn watch_frames(&self) -> watch::Receiver<Option<VideoFrame>> {
        self.frame_rx.clone()
    }

    /// Currently selected quality; `None` until metadata supplies the
    /// default or the caller picks one.
    pub fn quality(&self) -> Option<QualityLevel> {
        *self.quality_rx.borrow()
    }

    pub fn watch_quality(&self) -> watch::Receiver<Option<QualityLevel>> {
        self.quality_rx.clone()
    }

    /// Switch quality.  A live stream closes its socket first, then redials
    /// at the new quality; error and fallback states treat this as a retry
    /// at the new quality.
    pub fn set_quality(&self, quality: QualityLevel) {
        let _ = self.cmd_tx.send(Command::SetQuality(quality));
    }

    /// Leave an error or fallback state and try the full stream again.
    /// Ignored while already connecting or connected.
    pub fn retry(&self) {
        let _ = self.cmd_tx.send(Command::Retry);
    }

    /// Tear down: close the socket (or stop the poll timer) at most once
    /// and wait for the task to finish.  No callbacks fire after this
    /// returns.
    pub async fn close(mut self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                warn!("video stream task did not stop within grace period");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Stream task
// ---------------------------------------------------------------------------

/// Where the task goes next; returned by every phase driver.
enum Phase {
    Activate,
    Live(BoxedSocket),
    Fallback,
    /// Parked in an error state until the caller acts.
    Parked,
    Stopped,
}

/// Outcome of the metadata call.
enum FetchEnd {
    Info(StreamInfo),
    Error(StreamError),
    Stopped,
}

/// Outcome of a dial attempt.
enum DialEnd {
    Open(BoxedSocket),
    Failed,
    /// A quality change landed mid-handshake; redial at the new quality.
    Superseded,
    Stopped,
}

struct StreamTask {
    config: VideoStreamConfig,
    callbacks: VideoCallbacks,
    connector: Arc<dyn Connector>,
    http: reqwest::Client,
    status_tx: watch::Sender<StreamStatus>,
    frame_tx: watch::Sender<Option<VideoFrame>>,
    quality_tx: watch::Sender<Option<QualityLevel>>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    /// Cached after the first successful fetch.  A failed fetch leaves this
    /// `None` so the next activation refetches.
    info: Option<StreamInfo>,
    quality: Option<QualityLevel>,
    /// Consecutive transient failures since the last successful open.
    attempts: u32,
}

impl StreamTask {
    async fn run(mut self) {
        let mut phase = Phase::Activate;
        loop {
            phase = match phase {
                Phase::Activate => self.activate().await,
                Phase::Live(ws) => self.drive_live(ws).await,
                Phase::Fallback => self.run_fallback().await,
                Phase::Parked => self.park().await,
                Phase::Stopped => return,
            };
        }
    }

    /// Metadata (cached across redials) then dial, retrying transient dial
    /// failures through the backoff schedule.
    async fn activate(&mut self) -> Phase {
        self.set_status(StreamStatus::Connecting);

        let info = match self.info.clone() {
            Some(info) => info,
            None => match self.fetch_stream_info().await {
                FetchEnd::Info(info) => {
                    if !info.is_available {
                        return self.fail(StreamError::unavailable());
                    }
                    if self.quality.is_none() {
                        self.select_quality(info.default_quality);
                    }
                    self.info = Some(info.clone());
                    info
                }
                FetchEnd::Error(err) => return self.fail(err),
                FetchEnd::Stopped => return Phase::Stopped,
            },
        };

        loop {
            let url = stream_url(
                &self.config.ws_base_url,
                &info.websocket_path,
                self.selected_quality(),
            );
            match self.dial(&url).await {
                DialEnd::Open(ws) => {
                    self.attempts = 0;
                    self.set_status(StreamStatus::Connected);
                    info!(
                        camera = %self.config.camera_id,
                        name = %self.config.display_name,
                        quality = %self.selected_quality(),
                        "video stream connected"
                    );
                    return Phase::Live(ws);
                }
                DialEnd::Failed => {
                    if let Some(phase) = self.note_failure().await {
                        return phase;
                    }
                }
                DialEnd::Superseded => {}
                DialEnd::Stopped => return Phase::Stopped,
            }
        }
    }

    /// `GET {api_base}/cameras/{id}/stream`, staying responsive to commands
    /// so teardown can abandon an in-flight request.
    async fn fetch_stream_info(&mut self) -> FetchEnd {
        let url = format!(
            "{}/cameras/{}/stream",
            self.config.api_base_url, self.config.camera_id
        );
        let request = self.http.get(&url).send();
        tokio::pin!(request);
        loop {
            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::SetQuality(q)) => self.select_quality(q),
                    Some(Command::Retry) => debug!("retry ignored: activation in progress"),
                    Some(Command::Shutdown) | None => return FetchEnd::Stopped,
                },
                res = &mut request => return self.read_stream_info(res).await,
            }
        }
    }

    /// Decode the metadata response, mapping the status codes the server
    /// uses for "no such camera" and "cannot stream right now".
    async fn read_stream_info(&self, res: Result<reqwest::Response, reqwest::Error>) -> FetchEnd {
        let response = match res {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, camera = %self.config.camera_id, "stream metadata request failed");
                return FetchEnd::Error(StreamError::unknown());
            }
        };
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return FetchEnd::Error(StreamError::camera_not_found());
        }
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return FetchEnd::Error(StreamError::unavailable());
        }
        if !status.is_success() {
            warn!(%status, camera = %self.config.camera_id, "stream metadata request rejected");
            return FetchEnd::Error(StreamError::unknown());
        }
        match response.json::<StreamInfo>().await {
            Ok(info) => FetchEnd::Info(info),
            Err(e) => {
                warn!(error = %e, camera = %self.config.camera_id, "stream metadata decode failed");
                FetchEnd::Error(StreamError::unknown())
            }
        }
    }

    /// Dial the stream socket, staying responsive to commands so teardown
    /// or a quality change can abandon an in-flight handshake.
    async fn dial(&mut self, url: &str) -> DialEnd {
        debug!(camera = %self.config.camera_id, url, "dialing video stream");
        let dial = self.connector.connect(url);
        tokio::pin!(dial);
        loop {
            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::SetQuality(q)) => {
                        // Dropping the dial future closes its half-open
                        // connection before the replacement dial begins.
                        self.select_quality(q);
                        self.attempts = 0;
                        return DialEnd::Superseded;
                    }
                    Some(Command::Retry) => debug!("retry ignored: dial in progress"),
                    Some(Command::Shutdown) | None => return DialEnd::Stopped,
                },
                res = &mut dial => match res {
                    Ok(ws) => return DialEnd::Open(ws),
                    Err(e) => {
                        warn!(error = %e, camera = %self.config.camera_id, "video stream dial failed");
                        return DialEnd::Failed;
                    }
                },
            }
        }
    }

    /// Pump the live socket: binary frames in, commands raced, reserved
    /// close codes decoded per the server contract.
    async fn drive_live(&mut self, mut ws: BoxedSocket) -> Phase {
        loop {
            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::SetQuality(q)) => {
                        if self.quality == Some(q) {
                            debug!(quality = %q, "quality already selected");
                            continue;
                        }
                        // Close before redialing so no stale frame arrives
                        // after the switch and the server slot is freed.
                        let _ = ws.close().await;
                        self.select_quality(q);
                        self.attempts = 0;
                        return Phase::Activate;
                    }
                    Some(Command::Retry) => debug!("retry ignored: stream already live"),
                    Some(Command::Shutdown) | None => {
                        let _ = ws.close().await;
                        return Phase::Stopped;
                    }
                },
                msg = ws.next() => match msg {
                    None => {
                        debug!(camera = %self.config.camera_id, "video socket stream ended");
                        return self.after_interruption().await;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, camera = %self.config.camera_id, "video socket error");
                        return self.after_interruption().await;
                    }
                    Some(Ok(Message::Binary(data))) => self.publish_frame(VideoFrame {
                        data,
                        source: FrameSource::Live,
                        timestamp: None,
                    }),
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = ws.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return match frame {
                            Some(f) => self.on_close(StreamClose::from_code(f.code.into())).await,
                            None => self.after_interruption().await,
                        };
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    /// Apply the close-code contract: reserved codes resolve immediately,
    /// anything else is a transient drop.
    async fn on_close(&mut self, close: StreamClose) -> Phase {
        match close {
            StreamClose::LimitReached => self.fail(StreamError::limit_reached()),
            StreamClose::CameraNotFound => self.fail(StreamError::camera_not_found()),
            StreamClose::SnapshotFallback => {
                info!(camera = %self.config.camera_id, "server requested snapshot fallback");
                Phase::Fallback
            }
            StreamClose::Normal => {
                debug!(camera = %self.config.camera_id, "video socket closed normally");
                self.after_interruption().await
            }
            StreamClose::Abnormal(code) => {
                warn!(code, camera = %self.config.camera_id, "video socket closed abnormally");
                self.after_interruption().await
            }
        }
    }

    /// Transient interruption: redial through the backoff schedule, or park
    /// in an error state once the attempt budget is spent.
    async fn after_interruption(&mut self) -> Phase {
        match self.note_failure().await {
            Some(phase) => phase,
            None => Phase::Activate,
        }
    }

    /// Record one transient failure and wait out its backoff delay.  `Some`
    /// short-circuits the dial loop; `None` means redial now.
    async fn note_failure(&mut self) -> Option<Phase> {
        self.attempts += 1;
        if self.attempts > self.config.max_retries {
            warn!(
                camera = %self.config.camera_id,
                attempts = self.attempts,
                "video stream retries exhausted"
            );
            return Some(self.fail(StreamError::unknown()));
        }
        self.set_status(StreamStatus::Connecting);
        let delay = self.config.backoff.delay(self.attempts);
        debug!(camera = %self.config.camera_id, attempt = self.attempts, ?delay, "scheduling video redial");
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::SetQuality(q)) => {
                        self.select_quality(q);
                        self.attempts = 0;
                        return None;
                    }
                    Some(Command::Retry) => {
                        self.attempts = 0;
                        return None;
                    }
                    Some(Command::Shutdown) | None => return Some(Phase::Stopped),
                },
                () = &mut sleep => return None,
            }
        }
    }

    /// Degraded mode: poll stills on a fixed cadence until the caller
    /// retries the live stream.  The first poll fires immediately.
    async fn run_fallback(&mut self) -> Phase {
        self.set_status(StreamStatus::SnapshotFallback);
        self.attempts = 0;
        let mut ticker = tokio::time::interval(self.config.snapshot_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => return self.on_fallback_command(cmd),
                _ = ticker.tick() => {
                    if let Some(phase) = self.poll_snapshot().await {
                        return phase;
                    }
                }
            }
        }
    }

    /// A command landing anywhere in fallback leaves it: retry and quality
    /// changes go back through activation, teardown stops the task.
    fn on_fallback_command(&mut self, cmd: Option<Command>) -> Phase {
        match cmd {
            Some(Command::Retry) => Phase::Activate,
            Some(Command::SetQuality(q)) => {
                self.select_quality(q);
                Phase::Activate
            }
            Some(Command::Shutdown) | None => Phase::Stopped,
        }
    }

    /// One snapshot poll, staying responsive to commands so teardown or a
    /// caller action can abandon an in-flight request.  Failures log and
    /// wait for the next tick; degraded mode never escalates into an error
    /// state.  `Some` leaves fallback, `None` keeps polling.
    async fn poll_snapshot(&mut self) -> Option<Phase> {
        let url = format!(
            "{}/cameras/{}/stream/snapshot",
            self.config.api_base_url, self.config.camera_id
        );
        let request = self.http.get(&url).send();
        let response = tokio::select! {
            biased;
            cmd = self.cmd_rx.recv() => return Some(self.on_fallback_command(cmd)),
            res = request => res,
        };
        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, camera = %self.config.camera_id, "snapshot request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(status = %response.status(), camera = %self.config.camera_id, "snapshot request rejected");
            return None;
        }
        let body = response.json::<SnapshotResponse>();
        let snapshot = tokio::select! {
            biased;
            cmd = self.cmd_rx.recv() => return Some(self.on_fallback_command(cmd)),
            res = body => res,
        };
        let snapshot = match snapshot {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, camera = %self.config.camera_id, "snapshot decode failed");
                return None;
            }
        };
        if !snapshot.success {
            warn!(camera = %self.config.camera_id, "snapshot endpoint reported failure");
            return None;
        }
        match base64::engine::general_purpose::STANDARD.decode(&snapshot.image_base64) {
            Ok(image) => self.publish_frame(VideoFrame {
                data: image.into(),
                source: FrameSource::Snapshot,
                timestamp: Some(snapshot.timestamp),
            }),
            Err(e) => {
                warn!(error = %e, camera = %self.config.camera_id, "snapshot image is not valid base64");
            }
        }
        None
    }

    /// Wait in an error state for a caller action.
    async fn park(&mut self) -> Phase {
        match self.cmd_rx.recv().await {
            Some(Command::Retry) => {
                self.attempts = 0;
                Phase::Activate
            }
            Some(Command::SetQuality(q)) => {
                self.select_quality(q);
                self.attempts = 0;
                Phase::Activate
            }
            Some(Command::Shutdown) | None => Phase::Stopped,
        }
    }

    /// Park in an error state; only a caller action leaves it.
    fn fail(&mut self, err: StreamError) -> Phase {
        warn!(
            camera = %self.config.camera_id,
            kind = ?err.kind,
            message = %err.message,
            "video stream entered error state"
        );
        self.set_status(StreamStatus::Error(err));
        Phase::Parked
    }

    fn selected_quality(&self) -> QualityLevel {
        self.quality.unwrap_or(QualityLevel::Medium)
    }

    /// Record the selection and publish it to observers.
    fn select_quality(&mut self, quality: QualityLevel) {
        self.quality = Some(quality);
        let _ = self.quality_tx.send(Some(quality));
    }

    /// Publish the newest frame.  The watch retains only the latest value;
    /// stale frames are superseded, never queued.
    fn publish_frame(&self, frame: VideoFrame) {
        let _ = self.frame_tx.send(Some(frame.clone()));
        if let Some(cb) = &self.callbacks.on_frame {
            cb(frame);
        }
    }

    /// Publish a transition.  Watch first, so `status()` already reflects
    /// the new value when the callback observes it; repeated values do not
    /// fire.
    fn set_status(&self, next: StreamStatus) {
        if *self.status_tx.borrow() == next {
            return;
        }
        let _ = self.status_tx.send(next.clone());
        if let Some(cb) = &self.callbacks.on_status {
            cb(next);
        }
    }
}

/// Build the socket URL from the server-reported path and the selection.
fn stream_url(ws_base: &str, path: &str, quality: QualityLevel) -> String {
    format!("{ws_base}{path}?quality={quality}")
}
