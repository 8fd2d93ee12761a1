//! Integration tests for the control channel: connect, heartbeat, message
//! dispatch, manual send, and teardown against a real WebSocket server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cam_protocol::{
    AlertTriggeredPayload, CameraStatusPayload, ControlMessage, NewEventPayload,
    NotificationPayload,
};
use cam_realtime::{BackoffPolicy, ChannelStatus, EventCallbacks, EventChannel, EventChannelConfig};
use cam_test_utils::MockControlServer;

fn fast_config(url: String) -> EventChannelConfig {
    let mut config = EventChannelConfig::new(url);
    config.backoff = BackoffPolicy {
        base: Duration::from_millis(10),
        cap: Duration::from_millis(40),
    };
    config
}

/// Callbacks that append every status transition to a shared vec.
fn recording_callbacks(statuses: &Arc<Mutex<Vec<ChannelStatus>>>) -> EventCallbacks {
    let statuses = Arc::clone(statuses);
    EventCallbacks {
        on_status: Some(Box::new(move |status| {
            statuses.lock().unwrap().push(status);
        })),
        ..EventCallbacks::default()
    }
}

/// Callbacks that tag which typed slot fired, without looking at payloads.
fn tagging_callbacks(tags: &Arc<Mutex<Vec<&'static str>>>) -> EventCallbacks {
    let notification = Arc::clone(tags);
    let alert = Arc::clone(tags);
    let event = Arc::clone(tags);
    let camera = Arc::clone(tags);
    EventCallbacks {
        on_notification: Some(Box::new(move |_| {
            notification.lock().unwrap().push("notification");
        })),
        on_alert_triggered: Some(Box::new(move |_| {
            alert.lock().unwrap().push("alert_triggered");
        })),
        on_new_event: Some(Box::new(move |_| {
            event.lock().unwrap().push("new_event");
        })),
        on_camera_status_changed: Some(Box::new(move |_| {
            camera.lock().unwrap().push("camera_status_changed");
        })),
        ..EventCallbacks::default()
    }
}

async fn wait_for_status(channel: &EventChannel, want: ChannelStatus) {
    let mut rx = channel.watch_status();
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
async fn connect_reports_connecting_then_connected() {
    let server = MockControlServer::start().await.unwrap();
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let channel = EventChannel::new(fast_config(server.url()), recording_callbacks(&statuses));
    assert_eq!(channel.status(), ChannelStatus::Disconnected);

    channel.connect();
    wait_for_status(&channel, ChannelStatus::Connected).await;

    assert_eq!(
        *statuses.lock().unwrap(),
        vec![ChannelStatus::Connecting, ChannelStatus::Connected]
    );
    assert_eq!(server.connection_count(), 1);
    channel.close().await;
}

#[tokio::test]
async fn bare_ping_is_answered_with_bare_pong() {
    let server = MockControlServer::start().await.unwrap();
    let tags = Arc::new(Mutex::new(Vec::new()));
    let channel = EventChannel::new(fast_config(server.url()), tagging_callbacks(&tags));
    channel.connect();
    wait_for_status(&channel, ChannelStatus::Connected).await;

    server.send_text("ping").await.unwrap();
    server.wait_for_received(1).await;

    assert_eq!(server.received_texts().await, vec!["pong"]);
    assert!(tags.lock().unwrap().is_empty(), "heartbeat hit a callback");
    channel.close().await;
}

#[tokio::test]
async fn enveloped_ping_is_answered_with_bare_pong() {
    let server = MockControlServer::start().await.unwrap();
    let tags = Arc::new(Mutex::new(Vec::new()));
    let channel = EventChannel::new(fast_config(server.url()), tagging_callbacks(&tags));
    channel.connect();
    wait_for_status(&channel, ChannelStatus::Connected).await;

    server.send_text(r#"{"type":"PING"}"#).await.unwrap();
    server.wait_for_received(1).await;

    assert_eq!(server.received_texts().await, vec!["pong"]);
    assert!(tags.lock().unwrap().is_empty(), "heartbeat hit a callback");
    channel.close().await;
}

#[tokio::test]
async fn new_event_reaches_only_its_callback() {
    let server = MockControlServer::start().await.unwrap();
    let events: Arc<Mutex<Vec<NewEventPayload>>> = Arc::new(Mutex::new(Vec::new()));
    let tags: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let mut callbacks = tagging_callbacks(&tags);
    let captured = Arc::clone(&events);
    callbacks.on_new_event = Some(Box::new(move |payload| {
        captured.lock().unwrap().push(payload);
    }));

    let channel = EventChannel::new(fast_config(server.url()), callbacks);
    channel.connect();
    wait_for_status(&channel, ChannelStatus::Connected).await;

    server
        .send_text(
            r#"{"type":"NEW_EVENT","data":{"event_id":42,"camera_id":"7","label":"person_detected","severity":2,"timestamp":"2026-08-23T10:00:00Z"}}"#,
        )
        .await
        .unwrap();
    wait_until("the NEW_EVENT callback", || !events.lock().unwrap().is_empty()).await;

    assert_eq!(
        *events.lock().unwrap(),
        vec![NewEventPayload {
            event_id: 42,
            camera_id: "7".to_owned(),
            label: "person_detected".to_owned(),
            severity: 2,
            timestamp: "2026-08-23T10:00:00Z".to_owned(),
        }]
    );
    assert!(tags.lock().unwrap().is_empty(), "another slot fired");
    channel.close().await;
}

#[tokio::test]
async fn every_tagged_frame_lands_on_its_own_callback() {
    let server = MockControlServer::start().await.unwrap();
    let tags = Arc::new(Mutex::new(Vec::new()));
    let channel = EventChannel::new(fast_config(server.url()), tagging_callbacks(&tags));
    channel.connect();
    wait_for_status(&channel, ChannelStatus::Connected).await;

    server
        .send_message(&ControlMessage::Notification(NotificationPayload {
            title: "Storage".to_owned(),
            message: "Recording disk almost full".to_owned(),
            timestamp: "2026-08-23T09:00:00Z".to_owned(),
        }))
        .await
        .unwrap();
    server
        .send_message(&ControlMessage::AlertTriggered(AlertTriggeredPayload {
            alert_id: 5,
            camera_id: "7".to_owned(),
            camera_name: "Front door".to_owned(),
            rule_name: "after-hours motion".to_owned(),
            message: "Motion detected after hours".to_owned(),
            timestamp: "2026-08-23T09:01:00Z".to_owned(),
        }))
        .await
        .unwrap();
    server
        .send_message(&ControlMessage::NewEvent(NewEventPayload {
            event_id: 6,
            camera_id: "7".to_owned(),
            label: "motion".to_owned(),
            severity: 1,
            timestamp: "2026-08-23T09:02:00Z".to_owned(),
        }))
        .await
        .unwrap();
    server
        .send_message(&ControlMessage::CameraStatusChanged(CameraStatusPayload {
            camera_id: "7".to_owned(),
            online: false,
            last_frame_at: Some("2026-08-23T09:02:30Z".to_owned()),
        }))
        .await
        .unwrap();

    wait_until("all four callbacks", || tags.lock().unwrap().len() >= 4).await;
    assert_eq!(
        *tags.lock().unwrap(),
        vec![
            "notification",
            "alert_triggered",
            "new_event",
            "camera_status_changed",
        ]
    );
    channel.close().await;
}

#[tokio::test]
async fn malformed_and_unknown_frames_do_not_drop_the_channel() {
    let server = MockControlServer::start().await.unwrap();
    let tags = Arc::new(Mutex::new(Vec::new()));
    let channel = EventChannel::new(fast_config(server.url()), tagging_callbacks(&tags));
    channel.connect();
    wait_for_status(&channel, ChannelStatus::Connected).await;

    server.send_text("this is not json {{{").await.unwrap();
    server
        .send_text(r#"{"type":"SOME_FUTURE_MESSAGE","data":{"x":1}}"#)
        .await
        .unwrap();
    server
        .send_text(
            r#"{"type":"NEW_EVENT","data":{"event_id":1,"camera_id":"9","label":"motion","severity":0,"timestamp":"2026-08-23T11:00:00Z"}}"#,
        )
        .await
        .unwrap();

    // The valid frame arriving proves the two garbage frames were survived
    // in order.
    wait_until("the trailing NEW_EVENT", || {
        tags.lock().unwrap().contains(&"new_event")
    })
    .await;

    assert_eq!(*tags.lock().unwrap(), vec!["new_event"]);
    assert_eq!(channel.status(), ChannelStatus::Connected);
    assert_eq!(server.connection_count(), 1);
    channel.close().await;
}

#[tokio::test]
async fn send_writes_json_while_connected() {
    let server = MockControlServer::start().await.unwrap();
    let channel = EventChannel::new(fast_config(server.url()), EventCallbacks::default());
    channel.connect();
    wait_for_status(&channel, ChannelStatus::Connected).await;

    channel.send(ControlMessage::Ping);
    server.wait_for_received(1).await;

    assert_eq!(server.received_texts().await, vec![r#"{"type":"PING"}"#]);
    channel.close().await;
}

#[tokio::test]
async fn send_while_disconnected_is_dropped() {
    let server = MockControlServer::start().await.unwrap();
    let channel = EventChannel::new(fast_config(server.url()), EventCallbacks::default());

    channel.send(ControlMessage::Ping);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(channel.status(), ChannelStatus::Disconnected);
    assert_eq!(server.connection_count(), 0, "send must not dial");
    assert!(server.received_texts().await.is_empty());
    channel.close().await;
}

#[tokio::test]
async fn manual_disconnect_stays_down() {
    let server = MockControlServer::start().await.unwrap();
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let channel = EventChannel::new(fast_config(server.url()), recording_callbacks(&statuses));
    channel.connect();
    wait_for_status(&channel, ChannelStatus::Connected).await;

    channel.disconnect();
    wait_for_status(&channel, ChannelStatus::Disconnected).await;

    // Several backoff periods; a broken disconnect would have redialed.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.connection_count(), 1);
    assert_eq!(
        *statuses.lock().unwrap(),
        vec![
            ChannelStatus::Connecting,
            ChannelStatus::Connected,
            ChannelStatus::Disconnected,
        ]
    );
    channel.close().await;
}

#[tokio::test]
async fn teardown_closes_the_socket_exactly_once() {
    let server = MockControlServer::start().await.unwrap();
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let channel = EventChannel::new(fast_config(server.url()), recording_callbacks(&statuses));
    channel.connect();
    wait_for_status(&channel, ChannelStatus::Connected).await;
    let transitions_before = statuses.lock().unwrap().len();

    channel.close().await;
    server.wait_for_client_closes(1).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.client_close_count(), 1);
    assert_eq!(
        statuses.lock().unwrap().len(),
        transitions_before,
        "teardown fired a status callback"
    );
}

#[tokio::test]
async fn dropping_the_handle_tears_down() {
    let server = MockControlServer::start().await.unwrap();
    let channel = EventChannel::new(fast_config(server.url()), EventCallbacks::default());
    channel.connect();
    wait_for_status(&channel, ChannelStatus::Connected).await;

    drop(channel);
    server.wait_for_client_closes(1).await;
    assert_eq!(server.client_close_count(), 1);
}
