// Shared test doubles: an in-memory connector standing in for the service
// and a scripted audio source driven directly by the test.

#![allow(dead_code)]

use realtime_stt::{
    AudioSink, AudioSource, AudioSourceError, Connection, Connector, InboundFrame, OutboundFrame,
    RealtimeResult, RealtimeToken, SttError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

pub const WAIT: Duration = Duration::from_secs(2);

/// Server side of one in-memory connection
pub struct MockServer {
    pub from_client: mpsc::UnboundedReceiver<OutboundFrame>,
    pub to_client: mpsc::UnboundedSender<InboundFrame>,
}

impl MockServer {
    pub async fn next_frame(&mut self) -> OutboundFrame {
        tokio::time::timeout(WAIT, self.from_client.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("client closed the connection")
    }

    pub async fn next_text(&mut self) -> String {
        match self.next_frame().await {
            OutboundFrame::Text(text) => text,
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    pub async fn next_json(&mut self) -> serde_json::Value {
        serde_json::from_str(&self.next_text().await).expect("client sent invalid JSON")
    }

    pub async fn next_binary(&mut self) -> Vec<u8> {
        match self.next_frame().await {
            OutboundFrame::Binary(bytes) => bytes,
            other => panic!("expected binary frame, got {:?}", other),
        }
    }

    /// Every frame the client sends during `window`.
    pub async fn frames_within(&mut self, window: Duration) -> Vec<OutboundFrame> {
        let mut frames = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        while let Ok(Some(frame)) =
            tokio::time::timeout_at(deadline, self.from_client.recv()).await
        {
            frames.push(frame);
        }
        frames
    }

    /// Next audio frame, ignoring any keepalives sent before it.
    pub async fn next_binary_after_keepalives(&mut self) -> Vec<u8> {
        loop {
            match self.next_frame().await {
                OutboundFrame::Binary(bytes) => return bytes,
                OutboundFrame::Text(text) if is_keepalive(&text) => continue,
                other => panic!("expected audio or keepalive, got {:?}", other),
            }
        }
    }

    /// Consume the opening configuration frame.
    pub async fn handshake(&mut self) -> serde_json::Value {
        self.next_json().await
    }

    pub fn send_result(&self, result: &RealtimeResult) {
        let text = serde_json::to_string(result).unwrap();
        let _ = self.to_client.send(InboundFrame::Text(text));
    }

    pub fn send_text(&self, text: &str) {
        let _ = self.to_client.send(InboundFrame::Text(text.to_string()));
    }

    pub fn send_finished(&self) {
        self.send_result(&RealtimeResult {
            finished: true,
            ..Default::default()
        });
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.to_client.send(InboundFrame::Closed {
            code: Some(code),
            reason: reason.to_string(),
        });
    }
}

pub fn is_keepalive(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text)
        .map(|v| v["type"] == "keepalive")
        .unwrap_or(false)
}

/// True when every frame is a keepalive and there is at least one.
pub fn only_keepalives(frames: &[OutboundFrame]) -> bool {
    !frames.is_empty()
        && frames
            .iter()
            .all(|f| matches!(f, OutboundFrame::Text(text) if is_keepalive(text)))
}

/// Connector that hands each accepted connection to the test.
pub struct MockConnector {
    servers: mpsc::UnboundedSender<MockServer>,
    failure: Mutex<Option<SttError>>,
    /// When set, `connect` waits for a permit before completing
    gate: Option<Arc<Notify>>,
    pub attempts: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockServer>) {
        Self::build(None)
    }

    /// Connector whose `connect` blocks until `gate.notify_one()`.
    pub fn gated() -> (Arc<Self>, mpsc::UnboundedReceiver<MockServer>, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let (connector, servers) = Self::build(Some(Arc::clone(&gate)));
        (connector, servers, gate)
    }

    pub fn failing(err: SttError) -> Arc<Self> {
        let (connector, _servers) = Self::build(None);
        *connector.failure.lock().unwrap() = Some(err);
        connector
    }

    fn build(gate: Option<Arc<Notify>>) -> (Arc<Self>, mpsc::UnboundedReceiver<MockServer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            servers: tx,
            failure: Mutex::new(None),
            gate,
            attempts: AtomicUsize::new(0),
        });
        (connector, rx)
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<Connection, SttError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let _ = self.servers.send(MockServer {
            from_client: out_rx,
            to_client: in_tx,
        });
        Ok(Connection {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub async fn accept(servers: &mut mpsc::UnboundedReceiver<MockServer>) -> MockServer {
    tokio::time::timeout(WAIT, servers.recv())
        .await
        .expect("timed out waiting for connection")
        .expect("connector dropped")
}

/// Audio source the test pushes chunks through by hand.
#[derive(Default)]
pub struct ScriptedSource {
    sink: Mutex<Option<Arc<dyn AudioSink>>>,
    start_error: Mutex<Option<AudioSourceError>>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub pauses: AtomicUsize,
    pub resumes: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(err: AudioSourceError) -> Arc<Self> {
        let source = Self::default();
        *source.start_error.lock().unwrap() = Some(err);
        Arc::new(source)
    }

    pub fn is_started(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }

    fn sink(&self) -> Arc<dyn AudioSink> {
        self.sink.lock().unwrap().clone().expect("source not started")
    }

    pub fn push(&self, chunk: &[u8]) {
        self.sink().on_data(chunk.to_vec());
    }

    pub fn mute(&self) {
        self.sink().on_muted();
    }

    pub fn unmute(&self) {
        self.sink().on_unmuted();
    }

    pub fn fail(&self, err: AudioSourceError) {
        self.sink().on_error(err);
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AudioSource for ScriptedSource {
    async fn start(&self, sink: Arc<dyn AudioSink>) -> Result<(), AudioSourceError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.start_error.lock().unwrap().clone() {
            return Err(err);
        }
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn pause(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.resumes.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Poll `condition` until it holds or the wait budget runs out.
pub async fn eventually<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn token(text: &str, start_ms: u64, end_ms: u64) -> RealtimeToken {
    RealtimeToken::new(text, start_ms, end_ms)
}

pub fn result(tokens: Vec<RealtimeToken>, final_audio_proc_ms: u64) -> RealtimeResult {
    RealtimeResult {
        tokens,
        final_audio_proc_ms,
        total_audio_proc_ms: final_audio_proc_ms,
        finished: false,
    }
}
