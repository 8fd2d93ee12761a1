// cam-realtime: Client-side realtime transport for the camera dashboard.
//
// Two self-healing channels against the dashboard server: the app-wide
// control-message channel (`event_channel`) and the per-camera video frame
// channel (`video`).  Both own their socket inside a spawned task and expose
// state through watch channels plus optional callbacks; nothing here panics
// or returns errors across the public API.

pub mod backoff;
pub mod connector;
pub mod event_channel;
pub mod video;

pub use backoff::BackoffPolicy;
pub use connector::{BoxedSocket, Connector, WsConnector};
pub use event_channel::{ChannelStatus, EventCallbacks, EventChannel, EventChannelConfig};
pub use video::{
    FrameSource, StreamError, StreamErrorKind, StreamStatus, VideoCallbacks, VideoFrame,
    VideoStream, VideoStreamConfig,
};
