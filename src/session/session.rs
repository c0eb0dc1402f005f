use super::config::{SessionConfig, SessionOptions};
use super::events::{SessionEvent, SessionEventKind};
use super::state::SessionState;
use crate::error::{ErrorKind, SttError};
use crate::events::{EventChannel, ListenerId};
use crate::transport::{
    parse_inbound, Connector, ControlMessage, InboundFrame, InboundMessage, OutboundFrame,
    SessionStartMessage, END_OF_AUDIO,
};
use crate::transcript::RealtimeResult;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type FinishWaiter = oneshot::Sender<Result<(), SttError>>;

/// One streaming connection to the transcription service.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct RealtimeSession {
    shared: Arc<SessionShared>,
}

struct SessionShared {
    id: Uuid,
    api_key: String,
    config: SessionConfig,
    options: SessionOptions,
    connector: Arc<dyn Connector>,
    events: EventChannel<SessionEvent>,
    inner: Mutex<SessionInner>,
}

struct SessionInner {
    state: SessionState,
    outgoing: Option<mpsc::UnboundedSender<OutboundFrame>>,
    reader: Option<JoinHandle<()>>,
    keepalive: Option<JoinHandle<()>>,
    finish_waiters: Vec<FinishWaiter>,
}

/// Work left over after tearing a session down, run once the lock is released.
struct Teardown {
    old_state: SessionState,
    waiters: Vec<FinishWaiter>,
}

impl RealtimeSession {
    pub fn new(
        api_key: impl Into<String>,
        config: SessionConfig,
        options: SessionOptions,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let id = Uuid::new_v4();
        debug!("Creating session {} (model: {})", id, config.model);

        Self {
            shared: Arc::new(SessionShared {
                id,
                api_key: api_key.into(),
                config,
                options,
                connector,
                events: EventChannel::new(),
                inner: Mutex::new(SessionInner {
                    state: SessionState::Idle,
                    outgoing: None,
                    reader: None,
                    keepalive: None,
                    finish_waiters: Vec::new(),
                }),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    pub fn is_paused(&self) -> bool {
        self.shared.lock().keepalive.is_some()
    }

    pub fn on<F>(&self, kind: SessionEventKind, callback: F) -> ListenerId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.shared.events.on(kind, callback)
    }

    pub fn once<F>(&self, kind: SessionEventKind, callback: F) -> ListenerId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.shared.events.once(kind, callback)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.shared.events.off(id)
    }

    /// Open the stream and send the configuration frame.
    pub async fn connect(&self) -> Result<(), SttError> {
        let shared = &self.shared;
        {
            let mut inner = shared.lock();
            if inner.state != SessionState::Idle {
                return Err(SttError::state(format!(
                    "connect() requires idle session, current state is {}",
                    inner.state
                )));
            }
            inner.state = SessionState::Connecting;
        }
        shared.emit_state_change(SessionState::Idle, SessionState::Connecting);

        info!("Session {} connecting via {}", shared.id, shared.connector.name());

        let connect = shared.connector.connect(&shared.options.url);
        let connection = match tokio::time::timeout(shared.options.connect_timeout, connect).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                error!("Session {} failed to connect: {}", shared.id, e);
                shared.abandon_connect();
                return Err(e);
            }
            Err(_) => {
                let e = SttError::network(format!(
                    "Connection timed out after {:?}",
                    shared.options.connect_timeout
                ));
                error!("Session {} failed to connect: {}", shared.id, e);
                shared.abandon_connect();
                return Err(e);
            }
        };

        let start = SessionStartMessage {
            api_key: &shared.api_key,
            config: &shared.config,
        };
        let start = match serde_json::to_string(&start) {
            Ok(start) => start,
            Err(e) => {
                let e = SttError::new(ErrorKind::BadRequest, e.to_string());
                error!("Session {} failed to encode configuration: {}", shared.id, e);
                shared.abandon_connect();
                return Err(e);
            }
        };

        let (go_tx, go_rx) = oneshot::channel::<()>();
        {
            let mut inner = shared.lock();
            if inner.state != SessionState::Connecting {
                // Closed or canceled while the transport was being established.
                return Err(SttError::aborted(format!(
                    "Session ended while connecting ({})",
                    inner.state
                )));
            }
            if connection.outgoing.send(OutboundFrame::Text(start)).is_err() {
                drop(inner);
                let e = SttError::connection("Transport closed before configuration was sent");
                shared.abandon_connect();
                return Err(e);
            }
            inner.state = SessionState::Connected;
            inner.outgoing = Some(connection.outgoing);

            // The reader is held back until `connected` has been emitted so
            // results can never overtake it.
            let reader_shared = Arc::clone(shared);
            let incoming = connection.incoming;
            inner.reader = Some(tokio::spawn(async move {
                if go_rx.await.is_ok() {
                    read_loop(reader_shared, incoming).await;
                }
            }));
        }

        info!("Session {} connected", shared.id);
        shared.emit_state_change(SessionState::Connecting, SessionState::Connected);
        shared.emit(SessionEvent::Connected);
        let _ = go_tx.send(());
        Ok(())
    }

    /// Forward one audio chunk. Never waits on the transport.
    pub fn send_audio(&self, chunk: Vec<u8>) -> Result<(), SttError> {
        let inner = self.shared.lock();
        if inner.state != SessionState::Connected {
            if self.shared.options.strict_audio_state {
                return Err(SttError::state(format!(
                    "Cannot send audio while session is {}",
                    inner.state
                )));
            }
            debug!("Dropping audio chunk, session is {}", inner.state);
            return Ok(());
        }
        if chunk.is_empty() {
            // An empty binary frame would read as end-of-audio on some servers.
            return Ok(());
        }
        if inner.keepalive.is_some() {
            debug!("Dropping audio chunk, session {} is paused", self.shared.id);
            return Ok(());
        }
        match &inner.outgoing {
            Some(tx) => tx
                .send(OutboundFrame::Binary(chunk))
                .map_err(|_| SttError::connection("Transport closed")),
            None => Err(SttError::connection("Transport closed")),
        }
    }

    /// Ask the server to finalize everything heard so far.
    pub fn finalize(&self, trailing_silence_ms: Option<u64>) -> Result<(), SttError> {
        let inner = self.shared.lock();
        if inner.state != SessionState::Connected {
            return Err(SttError::state(format!(
                "Cannot finalize while session is {}",
                inner.state
            )));
        }
        send_control(&inner, &ControlMessage::Finalize { trailing_silence_ms })
    }

    /// Send end-of-audio and wait for the server's final result.
    pub async fn finish(&self) -> Result<(), SttError> {
        let shared = &self.shared;
        let (tx, rx) = oneshot::channel();
        let changed = {
            let mut inner = shared.lock();
            match inner.state {
                SessionState::Connected => {
                    inner.state = SessionState::Finishing;
                    if let Some(keepalive) = inner.keepalive.take() {
                        keepalive.abort();
                    }
                    if let Some(out) = &inner.outgoing {
                        let _ = out.send(OutboundFrame::Text(END_OF_AUDIO.to_string()));
                    }
                    inner.finish_waiters.push(tx);
                    true
                }
                SessionState::Finishing => {
                    inner.finish_waiters.push(tx);
                    false
                }
                SessionState::Finished => return Ok(()),
                other => {
                    return Err(SttError::state(format!("Cannot finish while session is {}", other)))
                }
            }
        };

        if changed {
            info!("Session {} finishing", shared.id);
            shared.emit_state_change(SessionState::Connected, SessionState::Finishing);
        }

        rx.await
            .unwrap_or_else(|_| Err(SttError::aborted("Session dropped before finishing")))
    }

    /// Start sending keepalive frames so the idle stream is not dropped.
    pub fn pause(&self) {
        let mut inner = self.shared.lock();
        if inner.state != SessionState::Connected || inner.keepalive.is_some() {
            return;
        }
        let Some(out) = inner.outgoing.clone() else {
            return;
        };

        debug!(
            "Session {} paused, keepalive every {:?}",
            self.shared.id, self.shared.options.keepalive_interval
        );

        let period = self.shared.options.keepalive_interval;
        inner.keepalive = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            let frame = match serde_json::to_string(&ControlMessage::Keepalive) {
                Ok(frame) => frame,
                Err(_) => return,
            };
            loop {
                interval.tick().await;
                if out.send(OutboundFrame::Text(frame.clone())).is_err() {
                    return;
                }
            }
        }));
    }

    pub fn resume(&self) {
        let mut inner = self.shared.lock();
        if let Some(keepalive) = inner.keepalive.take() {
            keepalive.abort();
            debug!("Session {} resumed", self.shared.id);
        }
    }

    /// Hard close. No events follow except the state change.
    pub fn close(&self) {
        self.shared
            .shutdown(SessionState::Closed, SttError::aborted("Session closed"));
    }

    pub fn cancel(&self) {
        self.shared
            .shutdown(SessionState::Canceled, SttError::aborted("Session canceled"));
    }
}

fn send_control(inner: &SessionInner, msg: &ControlMessage) -> Result<(), SttError> {
    let text = serde_json::to_string(msg).map_err(|e| SttError::state(e.to_string()))?;
    match &inner.outgoing {
        Some(out) => out
            .send(OutboundFrame::Text(text))
            .map_err(|_| SttError::connection("Transport closed")),
        None => Err(SttError::connection("Transport closed")),
    }
}

impl SessionShared {
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state(&self) -> SessionState {
        self.lock().state
    }

    fn emit(&self, event: SessionEvent) {
        self.events.emit(&event);
    }

    fn emit_state_change(&self, old_state: SessionState, new_state: SessionState) {
        debug!("Session {} state: {} -> {}", self.id, old_state, new_state);
        self.emit(SessionEvent::StateChange { old_state, new_state });
    }

    /// Move to `to` and release transport resources, unless already terminal.
    fn teardown(&self, to: SessionState) -> Option<Teardown> {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            return None;
        }
        let old_state = inner.state;
        inner.state = to;
        inner.outgoing = None;
        if let Some(keepalive) = inner.keepalive.take() {
            keepalive.abort();
        }
        if to != SessionState::Finished {
            if let Some(reader) = inner.reader.take() {
                reader.abort();
            }
        }
        Some(Teardown {
            old_state,
            waiters: std::mem::take(&mut inner.finish_waiters),
        })
    }

    fn abandon_connect(&self) {
        if let Some(teardown) = self.teardown(SessionState::Error) {
            self.emit_state_change(teardown.old_state, SessionState::Error);
        }
    }

    fn shutdown(&self, to: SessionState, err: SttError) {
        let Some(teardown) = self.teardown(to) else {
            return;
        };
        info!("Session {} {}", self.id, to);
        for waiter in teardown.waiters {
            let _ = waiter.send(Err(err.clone()));
        }
        self.emit_state_change(teardown.old_state, to);
    }

    fn fail(&self, err: SttError) {
        let Some(teardown) = self.teardown(SessionState::Error) else {
            return;
        };
        error!("Session {} error: {}", self.id, err);
        self.emit(SessionEvent::Error(err.clone()));
        self.emit_state_change(teardown.old_state, SessionState::Error);
        for waiter in teardown.waiters {
            let _ = waiter.send(Err(err.clone()));
        }
    }

    fn complete_finish(&self) {
        let Some(teardown) = self.teardown(SessionState::Finished) else {
            return;
        };
        info!("Session {} finished", self.id);
        self.emit_state_change(teardown.old_state, SessionState::Finished);
        self.emit(SessionEvent::Finished);
        for waiter in teardown.waiters {
            let _ = waiter.send(Ok(()));
        }
    }

    fn handle_result(&self, mut result: RealtimeResult) {
        let endpoint = result.tokens.iter().any(|t| t.is_endpoint());
        let finalized = result.tokens.iter().any(|t| t.is_finalized_marker());
        result.tokens.retain(|t| !t.is_sentinel());
        let finished = result.finished;

        self.emit(SessionEvent::Result(result.clone()));
        for token in result.tokens {
            self.emit(SessionEvent::Token(token));
        }
        if endpoint {
            self.emit(SessionEvent::Endpoint);
        }
        if finalized {
            self.emit(SessionEvent::Finalized);
        }
        if finished {
            self.complete_finish();
        }
    }

    fn handle_remote_close(&self, code: Option<u16>, reason: String) {
        debug!("Session {} transport closed (code: {:?}, reason: {:?})", self.id, code, reason);
        self.emit(SessionEvent::Disconnected {
            code,
            reason: reason.clone(),
        });
        if !self.state().is_terminal() {
            let detail = if reason.is_empty() {
                "no reason given".to_string()
            } else {
                reason
            };
            self.fail(SttError::connection(format!(
                "Connection closed by server before finishing: {}",
                detail
            )));
        }
    }
}

async fn read_loop(
    shared: Arc<SessionShared>,
    mut incoming: mpsc::UnboundedReceiver<InboundFrame>,
) {
    while let Some(frame) = incoming.recv().await {
        match shared.state() {
            SessionState::Closed | SessionState::Canceled | SessionState::Error => return,
            // After the final result only the close notification is still reported.
            SessionState::Finished if !matches!(frame, InboundFrame::Closed { .. }) => continue,
            _ => {}
        }

        match frame {
            InboundFrame::Text(text) => match parse_inbound(&text) {
                Ok(InboundMessage::Result(result)) => shared.handle_result(result),
                Ok(InboundMessage::Error(err)) => {
                    shared.fail(err);
                    return;
                }
                Err(err) => {
                    warn!("Session {} received malformed frame", shared.id);
                    shared.fail(err);
                    return;
                }
            },
            InboundFrame::Binary(bytes) => {
                debug!("Session {} ignoring {} byte binary frame", shared.id, bytes.len());
            }
            InboundFrame::Closed { code, reason } => {
                shared.handle_remote_close(code, reason);
                return;
            }
            InboundFrame::Error(err) => {
                shared.fail(err);
                return;
            }
        }
    }

    if matches!(
        shared.state(),
        SessionState::Connected | SessionState::Finishing | SessionState::Finished
    ) {
        shared.handle_remote_close(None, String::new());
    }
}
