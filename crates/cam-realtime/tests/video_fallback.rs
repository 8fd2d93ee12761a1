//! Integration tests for snapshot fallback: the 4503 close contract, poll
//! cadence, degraded-mode resilience, and the paths back to a live stream.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cam_protocol::QualityLevel;
use cam_realtime::{
    BackoffPolicy, FrameSource, StreamStatus, VideoCallbacks, VideoFrame, VideoStream,
    VideoStreamConfig,
};
use cam_test_utils::{MockCameraApi, MockVideoServer};

async fn start_backend() -> (MockCameraApi, MockVideoServer) {
    let api = MockCameraApi::start().await.unwrap();
    let video = MockVideoServer::start().await.unwrap();
    (api, video)
}

fn config_with_interval(
    api: &MockCameraApi,
    video: &MockVideoServer,
    interval: Duration,
) -> VideoStreamConfig {
    let mut config = VideoStreamConfig::new(api.url(), video.url(), "7", "Test Camera");
    config.backoff = BackoffPolicy {
        base: Duration::from_millis(10),
        cap: Duration::from_millis(40),
    };
    config.snapshot_interval = interval;
    config
}

/// Records statuses and frames in one callback bundle.
fn recording_callbacks(
    statuses: &Arc<Mutex<Vec<StreamStatus>>>,
    frames: &Arc<Mutex<Vec<VideoFrame>>>,
) -> VideoCallbacks {
    let statuses = Arc::clone(statuses);
    let frames = Arc::clone(frames);
    VideoCallbacks {
        on_status: Some(Box::new(move |status| {
            statuses.lock().unwrap().push(status);
        })),
        on_frame: Some(Box::new(move |frame| frames.lock().unwrap().push(frame))),
    }
}

async fn wait_for_status(stream: &VideoStream, want: StreamStatus) {
    let mut rx = stream.watch_status();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == want))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for status {want:?}"))
        .unwrap();
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn fallback_close_degrades_to_snapshots_without_an_error() {
    let (api, video) = start_backend().await;
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let frames = Arc::new(Mutex::new(Vec::new()));
    // Hour-long interval: only the immediate first poll can fire.
    let stream = VideoStream::new(
        config_with_interval(&api, &video, Duration::from_secs(3600)),
        recording_callbacks(&statuses, &frames),
    );
    wait_for_status(&stream, StreamStatus::Connected).await;

    video.close_current(4503).await.unwrap();
    wait_for_status(&stream, StreamStatus::SnapshotFallback).await;
    wait_until("the first snapshot", || !frames.lock().unwrap().is_empty()).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(api.snapshot_hits(), 1, "only the immediate poll may fire");

    let frame = frames.lock().unwrap()[0].clone();
    assert_eq!(frame.source, FrameSource::Snapshot);
    assert_eq!(frame.data.as_ref(), b"mock-jpeg-frame");
    assert_eq!(frame.timestamp.as_deref(), Some("2026-08-23T10:00:00Z"));

    assert_eq!(
        *statuses.lock().unwrap(),
        vec![
            StreamStatus::Connecting,
            StreamStatus::Connected,
            StreamStatus::SnapshotFallback,
        ],
        "degrading must never pass through an error status"
    );
    stream.close().await;
}

#[tokio::test]
async fn fallback_polls_on_the_configured_cadence() {
    let (api, video) = start_backend().await;
    let stream = VideoStream::new(
        config_with_interval(&api, &video, Duration::from_millis(100)),
        VideoCallbacks::default(),
    );
    wait_for_status(&stream, StreamStatus::Connected).await;

    video.close_current(4503).await.unwrap();
    wait_for_status(&stream, StreamStatus::SnapshotFallback).await;

    wait_until("repeated snapshot polls", || api.snapshot_hits() >= 3).await;
    stream.close().await;
}

#[tokio::test]
async fn retry_from_fallback_redials_the_live_stream() {
    let (api, video) = start_backend().await;
    let stream = VideoStream::new(
        config_with_interval(&api, &video, Duration::from_secs(3600)),
        VideoCallbacks::default(),
    );
    wait_for_status(&stream, StreamStatus::Connected).await;

    video.close_current(4503).await.unwrap();
    wait_for_status(&stream, StreamStatus::SnapshotFallback).await;
    wait_until("the immediate poll", || api.snapshot_hits() == 1).await;

    stream.retry();
    wait_for_status(&stream, StreamStatus::Connected).await;
    assert_eq!(video.connection_count(), 2);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(api.snapshot_hits(), 1, "polling must stop once live again");
    stream.close().await;
}

#[tokio::test]
async fn quality_change_from_fallback_redials_at_the_new_quality() {
    let (api, video) = start_backend().await;
    let stream = VideoStream::new(
        config_with_interval(&api, &video, Duration::from_secs(3600)),
        VideoCallbacks::default(),
    );
    wait_for_status(&stream, StreamStatus::Connected).await;

    video.close_current(4503).await.unwrap();
    wait_for_status(&stream, StreamStatus::SnapshotFallback).await;

    stream.set_quality(QualityLevel::Low);
    wait_for_status(&stream, StreamStatus::Connected).await;

    let uris = video.connected_uris().await;
    assert_eq!(uris[1], "/ws/cameras/7/stream?quality=low");
    stream.close().await;
}

#[tokio::test]
async fn snapshot_failures_stay_in_degraded_mode() {
    let (api, video) = start_backend().await;
    api.set_snapshot_success(false).await;
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let frames = Arc::new(Mutex::new(Vec::new()));
    let stream = VideoStream::new(
        config_with_interval(&api, &video, Duration::from_millis(100)),
        recording_callbacks(&statuses, &frames),
    );
    wait_for_status(&stream, StreamStatus::Connected).await;

    video.close_current(4503).await.unwrap();
    wait_for_status(&stream, StreamStatus::SnapshotFallback).await;
    wait_until("failed polls to repeat", || api.snapshot_hits() >= 2).await;

    assert!(frames.lock().unwrap().is_empty(), "failed polls made frames");
    assert_eq!(
        *statuses.lock().unwrap(),
        vec![
            StreamStatus::Connecting,
            StreamStatus::Connected,
            StreamStatus::SnapshotFallback,
        ],
        "snapshot failures must not escalate"
    );

    // The endpoint recovering is picked up on the next tick.
    api.set_snapshot_success(true).await;
    wait_until("a frame after recovery", || !frames.lock().unwrap().is_empty()).await;
    assert_eq!(
        frames.lock().unwrap()[0].source,
        FrameSource::Snapshot
    );
    stream.close().await;
}

#[tokio::test]
async fn snapshot_http_errors_stay_in_degraded_mode() {
    let (api, video) = start_backend().await;
    api.set_snapshot_status(500).await;
    let frames = Arc::new(Mutex::new(Vec::new()));
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let stream = VideoStream::new(
        config_with_interval(&api, &video, Duration::from_millis(100)),
        recording_callbacks(&statuses, &frames),
    );
    wait_for_status(&stream, StreamStatus::Connected).await;

    video.close_current(4503).await.unwrap();
    wait_for_status(&stream, StreamStatus::SnapshotFallback).await;
    wait_until("failed polls to repeat", || api.snapshot_hits() >= 2).await;

    assert!(frames.lock().unwrap().is_empty());
    assert_eq!(stream.status(), StreamStatus::SnapshotFallback);
    stream.close().await;
}

#[tokio::test]
async fn teardown_abandons_a_stalled_snapshot_poll() {
    let (api, video) = start_backend().await;
    // Hold snapshot responses long enough to close mid-request.
    api.set_snapshot_delay(Duration::from_millis(400)).await;
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let frames = Arc::new(Mutex::new(Vec::new()));
    let stream = VideoStream::new(
        config_with_interval(&api, &video, Duration::from_secs(3600)),
        recording_callbacks(&statuses, &frames),
    );
    wait_for_status(&stream, StreamStatus::Connected).await;

    video.close_current(4503).await.unwrap();
    wait_for_status(&stream, StreamStatus::SnapshotFallback).await;
    wait_until("the poll to reach the server", || api.snapshot_hits() == 1).await;

    // The poll is in flight and its response is being held; close must
    // abandon it rather than wait it out.
    let begun = tokio::time::Instant::now();
    stream.close().await;
    assert!(
        begun.elapsed() < Duration::from_millis(300),
        "close blocked on the held snapshot response: {:?}",
        begun.elapsed()
    );

    // Past the scripted delay: the abandoned response must not surface.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(
        frames.lock().unwrap().is_empty(),
        "a frame callback fired after close returned"
    );
    assert_eq!(
        *statuses.lock().unwrap(),
        vec![
            StreamStatus::Connecting,
            StreamStatus::Connected,
            StreamStatus::SnapshotFallback,
        ]
    );
}
