// cam-test-utils: Shared test utilities for the realtime transport suite.
//
// Provides mock control-socket, video-socket, and camera HTTP servers for
// integration testing of the event channel and the video stream client.

pub mod mock_camera_api;
pub mod mock_control_server;
pub mod mock_video_server;

pub use mock_camera_api::MockCameraApi;
pub use mock_control_server::MockControlServer;
pub use mock_video_server::MockVideoServer;
