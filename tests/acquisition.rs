//! End-to-end acquisition scenarios over the feed transport: a real
//! `DeviceSession` pump decoding pushed frames, fanning out through an
//! `AcquisitionEngine`, with captures exported and parsed back.

use std::time::Duration;

use tokio::sync::mpsc::Receiver;

use igeb_rs::engine::{AcquisitionEngine, EngineConfig};
use igeb_rs::error::SessionError;
use igeb_rs::feed::{FeedHandle, RemoteFeed};
use igeb_rs::quality::QualityTier;
use igeb_rs::recording::RecordingStatus;
use igeb_rs::session::{DeviceSession, SessionConfig, SessionState};
use igeb_rs::types::{Role, SensorEvent};

fn le(value: u16) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

async fn recv_event(rx: &mut Receiver<SensorEvent>) -> SensorEvent {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("event channel closed")
}

/// Feed events into the engine until `n` samples have been delivered.
async fn deliver_samples(
    rx: &mut Receiver<SensorEvent>,
    engine: &mut AcquisitionEngine,
    n: usize,
) {
    let mut seen = 0;
    while seen < n {
        let event = recv_event(rx).await;
        if matches!(event, SensorEvent::Sample(_)) {
            seen += 1;
        }
        engine.handle(event).await;
    }
}

/// Connected, subscribed session over a feed, with the `Connected` event
/// already delivered to the engine.
async fn connected_pipeline(
    config: EngineConfig,
) -> (
    DeviceSession<RemoteFeed>,
    Receiver<SensorEvent>,
    FeedHandle,
    AcquisitionEngine,
) {
    let (feed, handle) = RemoteFeed::new("IGEB-TEST");
    let (mut session, mut rx) = DeviceSession::new(feed, SessionConfig::default());
    session.connect().await.expect("connect");
    session.subscribe_all().await.expect("subscribe");

    let mut engine = AcquisitionEngine::new(config);
    match recv_event(&mut rx).await {
        SensorEvent::Connected(name) => {
            assert_eq!(name, "IGEB-TEST");
            engine.handle(SensorEvent::Connected(name)).await;
        }
        other => panic!("expected Connected, got {other:?}"),
    }
    (session, rx, handle, engine)
}

fn csv_values(payload: &[u8]) -> Vec<f64> {
    let text = String::from_utf8(payload.to_vec()).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("Timestamp,Value"));
    lines
        .map(|row| row.split_once(',').unwrap().1.parse().unwrap())
        .collect()
}

// ── Scenario: samples before start are excluded ───────────────────────────────

#[tokio::test]
async fn capture_covers_only_the_active_span() {
    let (_session, mut rx, handle, mut engine) =
        connected_pipeline(EngineConfig::default()).await;

    for v in [10, 11, 12] {
        handle.push(Role::Signal, le(v));
    }
    deliver_samples(&mut rx, &mut engine, 3).await;

    engine.start_recording(None).await.unwrap();
    for v in [13, 14] {
        handle.push(Role::Signal, le(v));
    }
    deliver_samples(&mut rx, &mut engine, 2).await;
    engine.stop_recording().await;

    assert_eq!(engine.recording_status().await, RecordingStatus::Completed);
    assert_eq!(csv_values(&engine.export().await), vec![13.0, 14.0]);
}

// ── Scenario: deadline stops the capture on its own ──────────────────────────

#[tokio::test(start_paused = true)]
async fn deadline_closes_the_capture_without_a_manual_stop() {
    let (_session, mut rx, handle, mut engine) =
        connected_pipeline(EngineConfig::default()).await;

    engine.start_recording(Some(2)).await.unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await; // t = 1 s
    handle.push(Role::Signal, le(500));
    deliver_samples(&mut rx, &mut engine, 1).await;

    tokio::time::sleep(Duration::from_millis(1500)).await; // t = 2.5 s
    assert_eq!(engine.recording_status().await, RecordingStatus::Completed);

    handle.push(Role::Signal, le(501)); // arrives after completion
    deliver_samples(&mut rx, &mut engine, 1).await;

    assert_eq!(csv_values(&engine.export().await), vec![500.0]);
}

// ── Scenario: malformed payloads are dropped, not fatal ──────────────────────

#[tokio::test]
async fn malformed_payload_reaches_neither_window_nor_capture() {
    let (_session, mut rx, handle, mut engine) = connected_pipeline(EngineConfig {
        record_impedance: true,
        ..EngineConfig::default()
    })
    .await;

    engine.start_recording(None).await.unwrap();

    handle.push(Role::Impedance, vec![]); // too short for the decode scheme
    handle.push(Role::Impedance, le(42));
    deliver_samples(&mut rx, &mut engine, 1).await; // only the valid one lands

    assert_eq!(engine.window().snapshot(), vec![42.0]);
    assert_eq!(engine.recorded_count().await, 1);
    assert_eq!(engine.quality(), QualityTier::Excellent);
    assert_eq!(engine.recording_status().await, RecordingStatus::Active);
}

// ── Re-subscription must not duplicate delivery ──────────────────────────────

#[tokio::test(start_paused = true)]
async fn resubscribing_does_not_double_deliver() {
    let (mut session, mut rx, handle, mut engine) =
        connected_pipeline(EngineConfig::default()).await;

    session.subscribe_all().await.expect("re-subscribe");

    handle.push(Role::Signal, le(7));
    deliver_samples(&mut rx, &mut engine, 1).await;

    // No second listener, so no second copy.
    assert!(
        tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .is_err()
    );
}

// ── Disconnect semantics ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn nothing_is_delivered_after_disconnect_is_observable() {
    let (mut session, mut rx, handle, mut engine) =
        connected_pipeline(EngineConfig::default()).await;

    session.disconnect().await.unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);

    loop {
        match recv_event(&mut rx).await {
            SensorEvent::Disconnected => break,
            other => engine.handle(other).await,
        }
    }

    handle.push(Role::Signal, le(99));
    assert!(
        tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .is_err()
    );

    // Disconnect is idempotent, and an explicit reconnect re-enters the
    // lifecycle from scratch.
    session.disconnect().await.unwrap();
    session.reconnect().await.unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    assert!(matches!(
        recv_event(&mut rx).await,
        SensorEvent::Connected(_)
    ));
}

// ── Discovery failures are terminal and leave Disconnected ───────────────────

#[tokio::test(start_paused = true)]
async fn offline_relay_times_out_discovery() {
    let (feed, handle) = RemoteFeed::new("IGEB-TEST");
    handle.set_online(false);
    let (mut session, _rx) = DeviceSession::new(feed, SessionConfig::default());

    match session.connect().await {
        Err(SessionError::DiscoveryTimeout(15)) => {}
        other => panic!("expected DiscoveryTimeout, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn name_filter_mismatch_times_out_discovery() {
    let (feed, _handle) = RemoteFeed::new("OTHER-DEVICE");
    let (mut session, _rx) = DeviceSession::new(feed, SessionConfig::default());

    assert!(matches!(
        session.connect().await,
        Err(SessionError::DiscoveryTimeout(_))
    ));
    assert_eq!(session.state(), SessionState::Disconnected);
}

// ── Battery readout and the polling fallback ─────────────────────────────────

#[tokio::test]
async fn battery_is_reported_once_after_connect() {
    let (feed, handle) = RemoteFeed::new("IGEB-0042");
    handle.set_battery(Some(87));
    let (mut session, mut rx) = DeviceSession::new(feed, SessionConfig::default());
    session.connect().await.unwrap();

    assert!(matches!(
        recv_event(&mut rx).await,
        SensorEvent::Connected(_)
    ));
    match recv_event(&mut rx).await {
        SensorEvent::Battery(percent) => assert_eq!(percent, 87),
        other => panic!("expected Battery, got {other:?}"),
    }
}

#[tokio::test]
async fn poll_once_reads_without_a_subscription() {
    let (feed, handle) = RemoteFeed::new("IGEB-0042");
    let (mut session, mut rx) = DeviceSession::new(feed, SessionConfig::default());
    session.connect().await.unwrap();
    let _ = recv_event(&mut rx).await; // Connected

    handle.push(Role::Impedance, le(120)); // retained as the latest value

    let sample = session
        .poll_once(Role::Impedance)
        .await
        .unwrap()
        .expect("well-formed payload");
    assert_eq!(sample.value, 120.0);
    assert_eq!(sample.role, Role::Impedance);

    // The polled sample is also published on the event channel.
    match recv_event(&mut rx).await {
        SensorEvent::Sample(s) => assert_eq!(s.value, 120.0),
        other => panic!("expected Sample, got {other:?}"),
    }
}

#[tokio::test]
async fn poll_once_requires_a_connection() {
    let (feed, _handle) = RemoteFeed::new("IGEB-0042");
    let (mut session, _rx) = DeviceSession::new(feed, SessionConfig::default());
    assert!(matches!(
        session.poll_once(Role::Impedance).await,
        Err(SessionError::NotConnected)
    ));
}

// ── Remote-side capture request pair ─────────────────────────────────────────

#[tokio::test]
async fn capture_requests_round_trip_to_the_relay() {
    let (feed, mut handle) = RemoteFeed::new("IGEB-0042");

    let relay = tokio::spawn(async move {
        let request = handle.capture_requests.recv().await.expect("request");
        assert!(request.active);
        request.ack.send(()).unwrap();
        let request = handle.capture_requests.recv().await.expect("request");
        assert!(!request.active);
        request.ack.send(()).unwrap();
    });

    feed.request_capture(true).await.unwrap();
    feed.request_capture(false).await.unwrap();
    relay.await.unwrap();
}

// ── GATT diagnostics ─────────────────────────────────────────────────────────

#[tokio::test]
async fn gatt_tree_lists_both_roles() {
    let (feed, _handle) = RemoteFeed::new("IGEB-0042");
    let (mut session, _rx) = DeviceSession::new(feed, SessionConfig::default());
    session.connect().await.unwrap();

    let services = session.describe_gatt().await.unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].characteristics.len(), 2);
}
