// Integration tests for the recording orchestrator
//
// These tests drive a recording end to end with a scripted audio source and
// an in-memory server, covering pre-connect buffering, the stop handshake,
// cancellation races and event forwarding.

mod common;

use common::{
    accept, eventually, only_keepalives, result, token, MockConnector, MockServer, ScriptedSource,
};
use realtime_stt::{
    ApiKey, AudioSourceError, ErrorKind, FinalizeOptions, PermissionResolver, PermissionResult,
    PermissionStatus, PermissionType, Recording, RecordingEvent, RecordingEventKind,
    RecordingOptions, RecordingState, SessionOptions,
};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

type Events = Arc<Mutex<Vec<RecordingEvent>>>;

fn options(source: Arc<ScriptedSource>, connector: Arc<MockConnector>) -> RecordingOptions {
    let mut options = RecordingOptions::new("test-key", source);
    options.connector = connector;
    options.session_options = SessionOptions {
        keepalive_interval: Duration::from_millis(20),
        ..Default::default()
    };
    options
}

fn record_events(recording: &Recording) -> Events {
    let events = Arc::new(Mutex::new(Vec::new()));
    for kind in RecordingEventKind::ALL {
        let events = Arc::clone(&events);
        recording.on(kind, move |event| events.lock().unwrap().push(event.clone()));
    }
    events
}

fn states(events: &Events) -> Vec<RecordingState> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            RecordingEvent::StateChange { new_state, .. } => Some(*new_state),
            _ => None,
        })
        .collect()
}

fn first_error(events: &Events) -> Option<realtime_stt::SttError> {
    events.lock().unwrap().iter().find_map(|e| match e {
        RecordingEvent::Error(err) => Some(err.clone()),
        _ => None,
    })
}

fn has_event(events: &Events, wanted: &RecordingEvent) -> bool {
    events.lock().unwrap().iter().any(|e| e == wanted)
}

/// Start a recording and wait until it is live.
async fn live_recording(
    source: Arc<ScriptedSource>,
) -> (Recording, MockServer, Events, mpsc::UnboundedReceiver<common::MockServer>) {
    let (connector, mut servers) = MockConnector::new();
    let recording = Recording::new(options(source, connector));
    let events = record_events(&recording);
    recording.start();

    let mut server = accept(&mut servers).await;
    server.handshake().await;
    eventually("recording state", || recording.state() == RecordingState::Recording).await;
    (recording, server, events, servers)
}

async fn stop_with_server(recording: &Recording, server: &mut MockServer) {
    let stopping = {
        let recording = recording.clone();
        tokio::spawn(async move { recording.stop().await })
    };
    assert_eq!(server.next_text().await, "");
    server.send_finished();
    stopping.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_start_transitions_to_recording() {
    let source = ScriptedSource::new();
    let (recording, _server, events, _servers) = live_recording(Arc::clone(&source)).await;

    assert_eq!(
        states(&events),
        vec![
            RecordingState::Starting,
            RecordingState::Connecting,
            RecordingState::Recording
        ]
    );
    assert!(has_event(&events, &RecordingEvent::Connected));
    assert_eq!(source.starts.load(Ordering::SeqCst), 1);

    // A second start is ignored
    recording.start();
    assert_eq!(source.starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_audio_before_connect_is_drained_in_order() {
    let source = ScriptedSource::new();
    let (connector, mut servers, gate) = MockConnector::gated();
    let recording = Recording::new(options(Arc::clone(&source), connector));
    recording.start();

    eventually("connecting", || recording.state() == RecordingState::Connecting).await;
    source.push(&[1]);
    source.push(&[2, 2]);
    assert_eq!(recording.stats().buffered_chunks, 2);

    gate.notify_one();
    let mut server = accept(&mut servers).await;
    server.handshake().await;
    assert_eq!(server.next_binary().await, vec![1]);
    assert_eq!(server.next_binary().await, vec![2, 2]);

    eventually("recording state", || recording.state() == RecordingState::Recording).await;
    source.push(&[3, 3, 3]);
    assert_eq!(server.next_binary().await, vec![3, 3, 3]);

    let stats = recording.stats();
    assert_eq!(stats.chunks_sent, 3);
    assert_eq!(stats.bytes_sent, 6);
    assert_eq!(stats.buffered_chunks, 0);
    assert!(stats.session_id.is_some());
    assert!(stats.started_at.is_some());
}

#[tokio::test]
async fn test_buffer_overflow_fails_recording() {
    let source = ScriptedSource::new();
    let (connector, _servers, _gate) = MockConnector::gated();
    let mut opts = options(Arc::clone(&source), connector);
    opts.buffer_queue_size = 3;
    let recording = Recording::new(opts);
    let events = record_events(&recording);
    recording.start();

    eventually("connecting", || recording.state() == RecordingState::Connecting).await;
    for i in 0..4u8 {
        source.push(&[i]);
    }

    assert_eq!(recording.state(), RecordingState::Error);
    let err = first_error(&events).expect("error event");
    assert_eq!(err.kind, ErrorKind::StateError);
    assert_eq!(err.message, "Audio buffer queue size exceeded");
    assert!(source.stop_count() >= 1);
    assert_eq!(recording.stats().buffered_chunks, 0);
}

#[tokio::test]
async fn test_stop_waits_for_finished() {
    let source = ScriptedSource::new();
    let (recording, mut server, events, _servers) = live_recording(Arc::clone(&source)).await;

    server.send_result(&result(vec![token("hi", 0, 100)], 100));
    stop_with_server(&recording, &mut server).await;

    assert_eq!(recording.state(), RecordingState::Stopped);
    assert!(source.stop_count() >= 1);

    let events = events.lock().unwrap();
    let tail: Vec<_> = events.iter().rev().take(2).cloned().collect();
    assert_eq!(tail[0], RecordingEvent::Finished);
    assert_eq!(
        tail[1],
        RecordingEvent::StateChange {
            old_state: RecordingState::Stopping,
            new_state: RecordingState::Stopped
        }
    );
    assert!(events
        .iter()
        .any(|e| matches!(e, RecordingEvent::Token(t) if t.text == "hi")));
}

#[tokio::test]
async fn test_stop_before_connect_finishes_after_drain() {
    let source = ScriptedSource::new();
    let (connector, mut servers, gate) = MockConnector::gated();
    let recording = Recording::new(options(Arc::clone(&source), connector));
    let events = record_events(&recording);
    recording.start();

    eventually("connecting", || recording.state() == RecordingState::Connecting).await;
    source.push(&[7, 7]);

    let stopping = {
        let recording = recording.clone();
        tokio::spawn(async move { recording.stop().await })
    };
    eventually("stopping", || recording.state() == RecordingState::Stopping).await;

    gate.notify_one();
    let mut server = accept(&mut servers).await;
    server.handshake().await;
    assert_eq!(server.next_binary().await, vec![7, 7]);
    assert_eq!(server.next_text().await, "");
    server.send_finished();

    stopping.await.unwrap().unwrap();
    assert_eq!(recording.state(), RecordingState::Stopped);
    assert!(!states(&events).contains(&RecordingState::Recording));
}

#[tokio::test]
async fn test_stop_when_idle_and_after_end() {
    let source = ScriptedSource::new();
    let (connector, _servers) = MockConnector::new();
    let recording = Recording::new(options(Arc::clone(&source), connector));

    recording.stop().await.unwrap();
    assert_eq!(recording.state(), RecordingState::Stopped);

    // Already terminal: resolves immediately and start is ignored
    recording.stop().await.unwrap();
    recording.start();
    assert_eq!(recording.state(), RecordingState::Stopped);
    assert_eq!(source.starts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancel_while_connecting_discards_late_connection() {
    let source = ScriptedSource::new();
    let (connector, mut servers, gate) = MockConnector::gated();
    let recording = Recording::new(options(Arc::clone(&source), connector));
    let events = record_events(&recording);
    recording.start();

    eventually("connecting", || recording.state() == RecordingState::Connecting).await;
    let stopping = {
        let recording = recording.clone();
        tokio::spawn(async move { recording.stop().await })
    };
    eventually("stopping", || recording.state() == RecordingState::Stopping).await;

    recording.cancel();
    assert_eq!(recording.state(), RecordingState::Canceled);
    let err = stopping.await.unwrap().unwrap_err();
    assert!(err.is_aborted());

    // The connection that completes afterwards must not revive the recording
    gate.notify_one();
    let _server = accept(&mut servers).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(recording.state(), RecordingState::Canceled);
    assert!(!has_event(&events, &RecordingEvent::Connected));
    assert!(first_error(&events).is_none());

    // Idempotent
    recording.cancel();
    recording.stop().await.unwrap();
    assert_eq!(recording.state(), RecordingState::Canceled);
}

#[tokio::test]
async fn test_credential_failure_stops_source() {
    let source = ScriptedSource::new();
    let (connector, _servers) = MockConnector::new();
    let mut opts = options(Arc::clone(&source), Arc::clone(&connector));
    opts.api_key =
        ApiKey::fetch(|| async { Err::<String, _>(anyhow::anyhow!("backend unavailable")) });
    let recording = Recording::new(opts);
    let events = record_events(&recording);
    recording.start();

    eventually("error state", || recording.state() == RecordingState::Error).await;
    let err = first_error(&events).expect("error event");
    assert_eq!(err.kind, ErrorKind::Auth);
    assert!(source.stop_count() >= 1);
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_fetched_credential_is_sent_in_handshake() {
    let source = ScriptedSource::new();
    let (connector, mut servers) = MockConnector::new();
    let mut opts = options(source, connector);
    opts.api_key = ApiKey::fetch(|| async { Ok::<_, anyhow::Error>("temporary-key".to_string()) });
    let recording = Recording::new(opts);
    recording.start();

    let mut server = accept(&mut servers).await;
    let config = server.handshake().await;
    assert_eq!(config["api_key"], "temporary-key");
}

#[tokio::test]
async fn test_source_start_failure() {
    let source = ScriptedSource::failing(AudioSourceError::DeviceNotFound("mic".to_string()));
    let (connector, _servers) = MockConnector::new();
    let recording = Recording::new(options(source, Arc::clone(&connector)));
    let events = record_events(&recording);
    recording.start();

    eventually("error state", || recording.state() == RecordingState::Error).await;
    assert_eq!(first_error(&events).unwrap().kind, ErrorKind::DeviceNotFound);
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_source_failure_does_not_wait_for_credential() {
    let source = ScriptedSource::failing(AudioSourceError::DeviceNotFound("mic".to_string()));
    let (connector, _servers) = MockConnector::new();
    let mut opts = options(source, Arc::clone(&connector));
    // Never resolves
    opts.api_key = ApiKey::fetch(futures::future::pending::<anyhow::Result<String>>);
    let recording = Recording::new(opts);
    let events = record_events(&recording);
    recording.start();

    eventually("error state", || recording.state() == RecordingState::Error).await;
    assert_eq!(first_error(&events).unwrap().kind, ErrorKind::DeviceNotFound);
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_source_error_while_recording() {
    let source = ScriptedSource::new();
    let (recording, _server, events, _servers) = live_recording(Arc::clone(&source)).await;

    source.fail(AudioSourceError::CaptureUnavailable("device unplugged".to_string()));

    assert_eq!(recording.state(), RecordingState::Error);
    assert_eq!(first_error(&events).unwrap().kind, ErrorKind::AudioUnavailable);
}

#[tokio::test]
async fn test_connect_failure_fails_recording() {
    let source = ScriptedSource::new();
    let connector =
        MockConnector::failing(realtime_stt::SttError::from_status(402, "Out of credit"));
    let recording = Recording::new(options(Arc::clone(&source), connector));
    let events = record_events(&recording);
    recording.start();

    eventually("error state", || recording.state() == RecordingState::Error).await;
    assert_eq!(first_error(&events).unwrap().kind, ErrorKind::QuotaExceeded);
    assert!(source.stop_count() >= 1);
}

#[tokio::test]
async fn test_session_error_fails_recording_and_rejects_stop() {
    let source = ScriptedSource::new();
    let (recording, mut server, events, _servers) = live_recording(Arc::clone(&source)).await;

    let stopping = {
        let recording = recording.clone();
        tokio::spawn(async move { recording.stop().await })
    };
    assert_eq!(server.next_text().await, "");
    server.send_text(r#"{"error_code": 503, "error_message": "Service unavailable"}"#);

    let err = stopping.await.unwrap().unwrap_err();
    assert_eq!(err.kind, ErrorKind::NetworkError);
    assert_eq!(recording.state(), RecordingState::Error);

    let errors: Vec<_> = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, RecordingEvent::Error(_)))
        .cloned()
        .collect();
    assert_eq!(errors.len(), 1);
}

#[tokio::test]
async fn test_pause_and_resume() {
    let source = ScriptedSource::new();
    let (recording, mut server, events, _servers) = live_recording(Arc::clone(&source)).await;

    recording.pause();
    assert_eq!(recording.state(), RecordingState::Paused);
    assert_eq!(source.pauses.load(Ordering::SeqCst), 1);
    assert_eq!(server.next_json().await["type"], "keepalive");

    // Pausing again is a no-op
    recording.pause();
    assert_eq!(source.pauses.load(Ordering::SeqCst), 1);

    recording.resume();
    assert_eq!(recording.state(), RecordingState::Recording);
    assert_eq!(source.resumes.load(Ordering::SeqCst), 1);

    let transitions = states(&events);
    assert!(transitions.ends_with(&[RecordingState::Paused, RecordingState::Recording]));
}

#[tokio::test]
async fn test_mute_is_ignored_before_recording() {
    let source = ScriptedSource::new();
    let (connector, mut servers, gate) = MockConnector::gated();
    let recording = Recording::new(options(Arc::clone(&source), connector));
    let events = record_events(&recording);
    recording.start();

    eventually("connecting", || recording.state() == RecordingState::Connecting).await;
    source.mute();
    assert!(!has_event(&events, &RecordingEvent::SourceMuted));

    gate.notify_one();
    let mut server = accept(&mut servers).await;
    server.handshake().await;
    eventually("recording state", || recording.state() == RecordingState::Recording).await;

    source.mute();
    assert!(has_event(&events, &RecordingEvent::SourceMuted));
    // Muted capture keeps the session alive with keepalives
    assert_eq!(server.next_json().await["type"], "keepalive");

    source.unmute();
    assert!(has_event(&events, &RecordingEvent::SourceUnmuted));
    assert_eq!(recording.state(), RecordingState::Recording);
}

#[tokio::test]
async fn test_muted_source_audio_is_not_streamed() {
    let source = ScriptedSource::new();
    let (_recording, mut server, _events, _servers) = live_recording(Arc::clone(&source)).await;

    source.mute();
    source.push(&[9, 9]);
    let frames = server.frames_within(Duration::from_millis(90)).await;
    assert!(only_keepalives(&frames), "unexpected frames: {:?}", frames);

    source.unmute();
    source.push(&[4]);
    assert_eq!(server.next_binary_after_keepalives().await, vec![4]);
}

#[tokio::test]
async fn test_unmute_does_not_override_pause() {
    let source = ScriptedSource::new();
    let (recording, mut server, events, _servers) = live_recording(Arc::clone(&source)).await;

    recording.pause();
    assert_eq!(server.next_json().await["type"], "keepalive");

    source.unmute();
    assert!(has_event(&events, &RecordingEvent::SourceUnmuted));
    assert_eq!(recording.state(), RecordingState::Paused);

    source.push(&[1, 2]);
    let frames = server.frames_within(Duration::from_millis(90)).await;
    assert!(only_keepalives(&frames), "unexpected frames: {:?}", frames);

    recording.resume();
    source.push(&[3]);
    assert_eq!(server.next_binary_after_keepalives().await, vec![3]);
}

#[tokio::test]
async fn test_resume_keeps_session_idle_while_source_muted() {
    let source = ScriptedSource::new();
    let (recording, mut server, events, _servers) = live_recording(Arc::clone(&source)).await;

    source.mute();
    recording.pause();
    recording.resume();
    assert_eq!(recording.state(), RecordingState::Recording);

    source.push(&[5, 5]);
    let frames = server.frames_within(Duration::from_millis(90)).await;
    assert!(only_keepalives(&frames), "unexpected frames: {:?}", frames);

    source.unmute();
    assert!(has_event(&events, &RecordingEvent::SourceUnmuted));
    source.push(&[8]);
    assert_eq!(server.next_binary_after_keepalives().await, vec![8]);
}

#[tokio::test]
async fn test_finalize_forwards_control_frame() {
    let source = ScriptedSource::new();
    let (connector, _servers) = MockConnector::new();
    let idle = Recording::new(options(Arc::clone(&source), connector));
    let err = idle.finalize(FinalizeOptions::default()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::StateError);

    let (recording, mut server, events, _servers) = live_recording(ScriptedSource::new()).await;
    recording
        .finalize(FinalizeOptions {
            trailing_silence_ms: Some(300),
        })
        .unwrap();

    let frame = server.next_json().await;
    assert_eq!(frame["type"], "finalize");
    assert_eq!(frame["trailing_silence_ms"], 300);

    server.send_result(&result(vec![token("done", 0, 50), token("<fin>", 50, 50)], 50));
    eventually("finalized event", || has_event(&events, &RecordingEvent::Finalized)).await;
}

struct DenyingResolver;

#[async_trait::async_trait]
impl PermissionResolver for DenyingResolver {
    async fn check(&self, _permission: PermissionType) -> PermissionResult {
        PermissionResult {
            status: PermissionStatus::Denied,
            can_request: false,
        }
    }

    async fn request(&self, _permission: PermissionType) -> PermissionResult {
        unreachable!("denied permission cannot be requested")
    }
}

#[tokio::test]
async fn test_denied_permission_skips_source() {
    let source = ScriptedSource::new();
    let (connector, _servers) = MockConnector::new();
    let mut opts = options(Arc::clone(&source), connector);
    opts.permissions = Some(Arc::new(DenyingResolver));
    let recording = Recording::new(opts);
    let events = record_events(&recording);
    recording.start();

    eventually("error state", || recording.state() == RecordingState::Error).await;
    assert_eq!(first_error(&events).unwrap().kind, ErrorKind::PermissionDenied);
    assert_eq!(source.starts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_event_stream_ends_after_finished() {
    let source = ScriptedSource::new();
    let (connector, mut servers) = MockConnector::new();
    let recording = Recording::new(options(Arc::clone(&source), connector));
    let mut stream = recording.events();
    recording.start();

    let mut server = accept(&mut servers).await;
    server.handshake().await;
    eventually("recording state", || recording.state() == RecordingState::Recording).await;
    server.send_result(&result(vec![token("one", 0, 40)], 40));
    stop_with_server(&recording, &mut server).await;

    let mut seen = Vec::new();
    while let Some(event) = stream.next().await.unwrap() {
        seen.push(event);
    }
    assert!(seen.contains(&RecordingEvent::Connected));
    assert!(seen.iter().any(|e| matches!(e, RecordingEvent::Result(_))));
    assert_eq!(seen.last(), Some(&RecordingEvent::Finished));

    // A stream opened after the end is already closed
    let mut late = recording.events();
    assert_eq!(late.next().await.unwrap(), None);
}

#[tokio::test]
async fn test_event_stream_aborts_on_cancel() {
    use futures::StreamExt;

    let source = ScriptedSource::new();
    let (connector, _servers, _gate) = MockConnector::gated();
    let recording = Recording::new(options(source, connector));
    let stream = recording.events().into_stream();
    recording.start();

    eventually("connecting", || recording.state() == RecordingState::Connecting).await;
    recording.cancel();

    let items: Vec<_> = stream.collect().await;
    let err = items
        .last()
        .expect("stream yielded nothing")
        .clone()
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Aborted);
}
