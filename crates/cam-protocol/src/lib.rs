// cam-protocol: Camera dashboard realtime wire contract.
//
// Control-channel messages use a top-level `type` field for discriminated
// deserialization, with the payload nested under `data`.  The enum variants
// map 1:1 to the server's message types.  Video-socket failures are signaled
// through close codes only; the reserved values live in `close_codes` and the
// `StreamClose` mapping.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Control message payloads
// ---------------------------------------------------------------------------

/// Payload of a `NOTIFICATION` message: a free-form banner for the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub message: String,
    /// Server-reported ISO 8601 timestamp; accepted as-is, no adjustment.
    pub timestamp: String,
}

/// Payload of an `ALERT_TRIGGERED` message.
///
/// Emitted when a detection matches a configured alert rule.  The camera
/// name is denormalized so the client can render without a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertTriggeredPayload {
    pub alert_id: u64,
    pub camera_id: String,
    pub camera_name: String,
    pub rule_name: String,
    pub message: String,
    pub timestamp: String,
}

/// Payload of a `NEW_EVENT` message: one detection event entering the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEventPayload {
    pub event_id: u64,
    pub camera_id: String,
    /// E.g. "person_detected" or "motion".
    pub label: String,
    /// 0 = info .. 3 = critical.
    pub severity: i32,
    pub timestamp: String,
}

/// Payload of a `CAMERA_STATUS_CHANGED` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraStatusPayload {
    pub camera_id: String,
    pub online: bool,
    /// Last time a frame was seen from this camera, if ever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_frame_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Top-level discriminated union
// ---------------------------------------------------------------------------

/// All structured control-channel messages.
///
/// Serializes/deserializes using the `type` field as tag and `data` as the
/// payload container:
///
/// ```json
/// { "type": "NEW_EVENT", "data": { ... } }
/// ```
///
/// `PING`/`PONG` carry no payload.  Note the server's lightweight heartbeat
/// is the *bare* text frame `"ping"`/`"pong"` outside any JSON envelope;
/// these variants only cover the enveloped form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    Ping,
    Pong,
    Notification(NotificationPayload),
    AlertTriggered(AlertTriggeredPayload),
    NewEvent(NewEventPayload),
    CameraStatusChanged(CameraStatusPayload),
}

// ---------------------------------------------------------------------------
// Video stream quality
// ---------------------------------------------------------------------------

/// Requested/delivered quality for a video stream socket.
///
/// Closed set by contract; the server advertises the supported subset and a
/// default in [`StreamInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Low,
    Medium,
    High,
}

impl QualityLevel {
    /// Wire form, as used in the `quality` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            QualityLevel::Low => "low",
            QualityLevel::Medium => "medium",
            QualityLevel::High => "high",
        }
    }
}

impl std::fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// HTTP API response types (frozen schema definitions)
// ---------------------------------------------------------------------------

/// Response for `GET {api_base}/cameras/{id}/stream`.
///
/// Fetched once per client activation; the socket URL is built from
/// `websocket_path` plus the selected quality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Path component of the stream socket URL, e.g. `/ws/cameras/7/stream`.
    pub websocket_path: String,
    /// Qualities this camera can serve.
    pub quality_options: Vec<QualityLevel>,
    pub default_quality: QualityLevel,
    /// False when the camera exists but cannot stream right now.
    pub is_available: bool,
}

/// Response for `GET {api_base}/cameras/{id}/stream/snapshot`.
///
/// Served during snapshot fallback.  `image_base64` is a standard-alphabet
/// base64 still frame; `quality` reports what the server actually rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub success: bool,
    pub timestamp: String,
    pub quality: String,
    pub image_base64: String,
}

// ---------------------------------------------------------------------------
// Video socket close codes
// ---------------------------------------------------------------------------

/// Reserved close-code values on the video socket.
///
/// Close codes are the *only* error-signaling channel on that socket; there
/// is no JSON error body on close.
pub mod close_codes {
    /// Clean shutdown (RFC 6455 normal closure).
    pub const NORMAL: u16 = 1000;
    /// Server-side concurrent stream limit hit.
    pub const STREAM_LIMIT: u16 = 4429;
    /// Camera id unknown to the server.
    pub const CAMERA_NOT_FOUND: u16 = 4004;
    /// Live streaming unavailable; client should degrade to snapshots.
    pub const SNAPSHOT_FALLBACK: u16 = 4503;
}

/// Decoded meaning of a video-socket close code.
///
/// | Code      | Variant            |
/// |-----------|--------------------|
/// | 1000      | `Normal`           |
/// | 4429      | `LimitReached`     |
/// | 4004      | `CameraNotFound`   |
/// | 4503      | `SnapshotFallback` |
/// | all other | `Abnormal(code)`   |
///
/// Keeps the numeric literals out of client control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamClose {
    Normal,
    LimitReached,
    CameraNotFound,
    SnapshotFallback,
    Abnormal(u16),
}

impl StreamClose {
    pub fn from_code(code: u16) -> Self {
        match code {
            close_codes::NORMAL => StreamClose::Normal,
            close_codes::STREAM_LIMIT => StreamClose::LimitReached,
            close_codes::CAMERA_NOT_FOUND => StreamClose::CameraNotFound,
            close_codes::SNAPSHOT_FALLBACK => StreamClose::SnapshotFallback,
            other => StreamClose::Abnormal(other),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            StreamClose::Normal => close_codes::NORMAL,
            StreamClose::LimitReached => close_codes::STREAM_LIMIT,
            StreamClose::CameraNotFound => close_codes::CAMERA_NOT_FOUND,
            StreamClose::SnapshotFallback => close_codes::SNAPSHOT_FALLBACK,
            StreamClose::Abnormal(code) => code,
        }
    }
}
