//! App-wide control channel.
//!
//! Owns the dashboard's single control socket: typed JSON messages in, manual
//! sends out, bare `"ping"`/`"pong"` heartbeat replies, and automatic
//! reconnects with exponential backoff.
//!
//! # State machine
//! `disconnected --connect()--> connecting --open--> connected
//! --unexpected close--> reconnecting --delay elapses--> connecting (loop)`.
//! `disconnect()` parks the channel in `disconnected` until the next
//! `connect()`; so does exhausting the retry budget.  A close that follows a
//! manual disconnect never triggers reconnection.
//!
//! All socket ownership and state transitions live on one spawned task; the
//! public handle only passes commands.  Status and message callbacks
//! therefore fire in exact transition/delivery order, one at a time, and
//! never after teardown.

use std::sync::Arc;
use std::time::Duration;

use cam_protocol::ControlMessage;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::connector::{BoxedSocket, Connector, WsConnector, WsError};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Configuration for the control channel.
#[derive(Debug, Clone)]
pub struct EventChannelConfig {
    /// WebSocket URL of the control endpoint, e.g. `wss://dash.example.com/ws`.
    /// Fixed for the lifetime of the channel; no per-connection parameters.
    pub url: String,
    /// Consecutive failed attempts tolerated before the channel parks itself
    /// in `Disconnected`.  `None` retries forever.
    pub max_retries: Option<u32>,
    /// Reconnect delay schedule.
    pub backoff: BackoffPolicy,
}

impl EventChannelConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_retries: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Connection state of the control channel.  Exactly one value at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

/// Callback bundle supplied at construction.
///
/// Every slot is optional; a message whose slot is `None` is still parsed,
/// then dropped.  Callbacks run on the channel task in delivery order.
#[derive(Default)]
pub struct EventCallbacks {
    /// Invoked synchronously on every status transition.
    pub on_status: Option<Box<dyn Fn(ChannelStatus) + Send + Sync>>,
    pub on_notification: Option<Box<dyn Fn(cam_protocol::NotificationPayload) + Send + Sync>>,
    pub on_alert_triggered: Option<Box<dyn Fn(cam_protocol::AlertTriggeredPayload) + Send + Sync>>,
    pub on_new_event: Option<Box<dyn Fn(cam_protocol::NewEventPayload) + Send + Sync>>,
    pub on_camera_status_changed:
        Option<Box<dyn Fn(cam_protocol::CameraStatusPayload) + Send + Sync>>,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

enum Command {
    Connect,
    Disconnect,
    Send(ControlMessage),
    Shutdown,
}

/// Handle to the control channel.
///
/// Construction spawns the channel task but does not dial; call
/// [`EventChannel::connect`].  Dropping the handle tears the channel down
/// (the task observes the closed command channel before touching the socket
/// again).
pub struct EventChannel {
    cmd_tx: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<ChannelStatus>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl EventChannel {
    /// Create the channel with the production connector.
    pub fn new(config: EventChannelConfig, callbacks: EventCallbacks) -> Self {
        Self::with_connector(config, callbacks, Arc::new(WsConnector))
    }

    /// Create the channel with an injected socket factory.
    pub fn with_connector(
        config: EventChannelConfig,
        callbacks: EventCallbacks,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ChannelStatus::Disconnected);
        let task = ChannelTask {
            config,
            callbacks,
            connector,
            status_tx,
            cmd_rx,
        };
        let task = tokio::spawn(task.run());
        Self {
            cmd_tx,
            status_rx,
            task: Some(task),
        }
    }

    /// Open the socket.  No-op while already connecting or connected; during
    /// a reconnect wait this cancels the pending timer, resets the retry
    /// streak, and dials immediately.
    pub fn connect(&self) {
        let _ = self.cmd_tx.send(Command::Connect);
    }

    /// Close the socket if open and stop automatic reconnection until the
    /// next [`EventChannel::connect`].
    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect);
    }

    /// Send one control message, best effort.  Unless the channel is
    /// currently connected the message is dropped with a warning; nothing is
    /// ever queued.
    pub fn send(&self, msg: ControlMessage) {
        if *self.status_rx.borrow() != ChannelStatus::Connected {
            warn!("dropping control message: channel not connected");
            return;
        }
        let _ = self.cmd_tx.send(Command::Send(msg));
    }

    /// Current status snapshot.
    pub fn status(&self) -> ChannelStatus {
        *self.status_rx.borrow()
    }

    /// Watch stream of status values, for callers that prefer awaiting
    /// changes over callbacks.
    pub fn watch_status(&self) -> watch::Receiver<ChannelStatus> {
        self.status_rx.clone()
    }

    /// Tear down: close the socket at most once and wait for the task to
    /// finish.  No callbacks fire after this returns.
    pub async fn close(mut self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                warn!("event channel task did not stop within grace period");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Channel task
// ---------------------------------------------------------------------------

/// Socket-pump failure; resolved internally by dropping the socket.
#[derive(Debug, thiserror::Error)]
enum PumpError {
    #[error("WS: {0}")]
    Ws(#[from] WsError),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// What ended an established session.
enum SocketEnd {
    /// Unexpected close, read error, or failed write.
    Dropped,
    ManualDisconnect,
    Shutdown,
}

/// Why a connect/reconnect cycle returned control to the idle loop.
enum CycleEnd {
    Idle,
    Shutdown,
}

/// Outcome of a cancellable backoff wait.
enum WaitEnd {
    Elapsed,
    ManualConnect,
    ManualDisconnect,
    Shutdown,
}

struct ChannelTask {
    config: EventChannelConfig,
    callbacks: EventCallbacks,
    connector: Arc<dyn Connector>,
    status_tx: watch::Sender<ChannelStatus>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
}

impl ChannelTask {
    /// Idle loop: parked in `Disconnected` until a connect command (or the
    /// end of the handle's life).
    async fn run(mut self) {
        loop {
            match self.cmd_rx.recv().await {
                Some(Command::Connect) => {
                    if let CycleEnd::Shutdown = self.run_cycle().await {
                        return;
                    }
                }
                Some(Command::Disconnect) => debug!("disconnect ignored: already disconnected"),
                Some(Command::Send(_)) => {
                    warn!("dropping control message: channel not connected");
                }
                Some(Command::Shutdown) | None => return,
            }
        }
    }

    /// One connect/reconnect cycle: dial, pump, retry with backoff.  Returns
    /// once the channel parks itself back in `Disconnected` (manual
    /// disconnect or exhausted retries) or the owner is gone.
    async fn run_cycle(&mut self) -> CycleEnd {
        let mut attempt: u32 = 0;
        loop {
            self.set_status(ChannelStatus::Connecting);
            match self.dial().await {
                DialEnd::Open(ws) => {
                    attempt = 0;
                    self.set_status(ChannelStatus::Connected);
                    info!(url = %self.config.url, "control channel connected");
                    match self.drive_socket(ws).await {
                        SocketEnd::Dropped => {}
                        SocketEnd::ManualDisconnect => {
                            self.set_status(ChannelStatus::Disconnected);
                            return CycleEnd::Idle;
                        }
                        SocketEnd::Shutdown => return CycleEnd::Shutdown,
                    }
                }
                DialEnd::Failed => {}
                DialEnd::ManualDisconnect => {
                    self.set_status(ChannelStatus::Disconnected);
                    return CycleEnd::Idle;
                }
                DialEnd::Shutdown => return CycleEnd::Shutdown,
            }

            // Unexpected close or failed dial.
            attempt += 1;
            if exceeds_retry_cap(attempt, self.config.max_retries) {
                warn!(attempt, "control channel retries exhausted; staying disconnected");
                self.set_status(ChannelStatus::Disconnected);
                return CycleEnd::Idle;
            }
            self.set_status(ChannelStatus::Reconnecting);
            let delay = self.config.backoff.delay(attempt);
            debug!(attempt, ?delay, "scheduling control channel reconnect");
            match self.wait_for_reconnect(delay).await {
                WaitEnd::Elapsed => {}
                WaitEnd::ManualConnect => attempt = 0,
                WaitEnd::ManualDisconnect => {
                    self.set_status(ChannelStatus::Disconnected);
                    return CycleEnd::Idle;
                }
                WaitEnd::Shutdown => return CycleEnd::Shutdown,
            }
        }
    }

    /// Dial the configured URL, staying responsive to commands so a
    /// disconnect can abandon an in-flight handshake.
    async fn dial(&mut self) -> DialEnd {
        let dial = self.connector.connect(&self.config.url);
        tokio::pin!(dial);
        loop {
            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Connect) => debug!("connect ignored: dial in progress"),
                    Some(Command::Disconnect) => return DialEnd::ManualDisconnect,
                    Some(Command::Send(_)) => {
                        warn!("dropping control message: channel not connected");
                    }
                    Some(Command::Shutdown) | None => return DialEnd::Shutdown,
                },
                res = &mut dial => match res {
                    Ok(ws) => return DialEnd::Open(ws),
                    Err(e) => {
                        warn!(error = %e, url = %self.config.url, "control channel dial failed");
                        return DialEnd::Failed;
                    }
                },
            }
        }
    }

    /// Pump one established socket until something ends it.
    async fn drive_socket(&mut self, mut ws: BoxedSocket) -> SocketEnd {
        loop {
            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Connect) => debug!("connect ignored: already connected"),
                    Some(Command::Disconnect) => {
                        let _ = ws.close().await;
                        return SocketEnd::ManualDisconnect;
                    }
                    Some(Command::Send(msg)) => match send_message(&mut ws, &msg).await {
                        Ok(()) => {}
                        Err(PumpError::Json(e)) => {
                            warn!(error = %e, "dropping unserializable control message");
                        }
                        Err(PumpError::Ws(e)) => {
                            warn!(error = %e, "control channel send failed");
                            return SocketEnd::Dropped;
                        }
                    },
                    Some(Command::Shutdown) | None => {
                        let _ = ws.close().await;
                        return SocketEnd::Shutdown;
                    }
                },
                msg = ws.next() => match msg {
                    None => {
                        debug!("control socket stream ended");
                        return SocketEnd::Dropped;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "control socket error");
                        return SocketEnd::Dropped;
                    }
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = self.handle_text(text.as_str(), &mut ws).await {
                            warn!(error = %e, "control channel reply failed");
                            return SocketEnd::Dropped;
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = ws.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!("control socket closed by server");
                        return SocketEnd::Dropped;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    /// One inbound text frame.  The bare `"ping"`/`"pong"` heartbeat is
    /// checked before any JSON handling; the heartbeat frames are not JSON.
    async fn handle_text(&self, text: &str, ws: &mut BoxedSocket) -> Result<(), WsError> {
        if text == "ping" {
            ws.send(Message::Text("pong".into())).await?;
            return Ok(());
        }
        if text == "pong" {
            return Ok(());
        }
        match serde_json::from_str::<ControlMessage>(text) {
            Ok(msg) => self.dispatch(msg, ws).await?,
            Err(e) => {
                // Valid JSON with an unrecognized shape is ignored quietly;
                // non-JSON noise gets a warning.  Neither ends the channel.
                if serde_json::from_str::<serde_json::Value>(text).is_ok() {
                    debug!(error = %e, "ignoring unrecognized control message");
                } else {
                    warn!(error = %e, "dropping malformed control frame");
                }
            }
        }
        Ok(())
    }

    /// Exhaustive dispatch by message type.  Enveloped PING mirrors the bare
    /// heartbeat reply; neither heartbeat form reaches a callback.
    async fn dispatch(&self, msg: ControlMessage, ws: &mut BoxedSocket) -> Result<(), WsError> {
        match msg {
            ControlMessage::Ping => ws.send(Message::Text("pong".into())).await?,
            ControlMessage::Pong => {}
            ControlMessage::Notification(payload) => {
                if let Some(cb) = &self.callbacks.on_notification {
                    cb(payload);
                }
            }
            ControlMessage::AlertTriggered(payload) => {
                if let Some(cb) = &self.callbacks.on_alert_triggered {
                    cb(payload);
                }
            }
            ControlMessage::NewEvent(payload) => {
                if let Some(cb) = &self.callbacks.on_new_event {
                    cb(payload);
                }
            }
            ControlMessage::CameraStatusChanged(payload) => {
                if let Some(cb) = &self.callbacks.on_camera_status_changed {
                    cb(payload);
                }
            }
        }
        Ok(())
    }

    /// Sleep out the backoff delay, interruptible by commands.
    async fn wait_for_reconnect(&mut self, delay: Duration) -> WaitEnd {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Connect) => return WaitEnd::ManualConnect,
                    Some(Command::Disconnect) => return WaitEnd::ManualDisconnect,
                    Some(Command::Send(_)) => {
                        warn!("dropping control message: channel not connected");
                    }
                    Some(Command::Shutdown) | None => return WaitEnd::Shutdown,
                },
                () = &mut sleep => return WaitEnd::Elapsed,
            }
        }
    }

    /// Publish a transition.  Watch first, so `status()` already reflects the
    /// new value when the callback observes it; repeated values do not fire.
    fn set_status(&self, next: ChannelStatus) {
        if *self.status_tx.borrow() == next {
            return;
        }
        let _ = self.status_tx.send(next);
        if let Some(cb) = &self.callbacks.on_status {
            cb(next);
        }
    }
}

enum DialEnd {
    Open(BoxedSocket),
    Failed,
    ManualDisconnect,
    Shutdown,
}

/// Serialize and write one control message.
async fn send_message(ws: &mut BoxedSocket, msg: &ControlMessage) -> Result<(), PumpError> {
    let json = serde_json::to_string(msg)?;
    ws.send(Message::Text(json.into())).await?;
    Ok(())
}

fn exceeds_retry_cap(attempt: u32, max_retries: Option<u32>) -> bool {
    max_retries.is_some_and(|max| attempt > max)
}
