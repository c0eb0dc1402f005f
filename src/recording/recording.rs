use super::config::{FinalizeOptions, RecordingOptions};
use super::events::{RecordingEvent, RecordingEventKind};
use super::state::RecordingState;
use super::stats::RecordingStats;
use super::stream::EventStream;
use crate::audio::{AudioChunk, AudioSink};
use crate::error::{AudioSourceError, ErrorKind, SttError};
use crate::events::{AsyncQueue, EventChannel, ListenerId};
use crate::permissions::{ensure_permission, PermissionStatus, PermissionType};
use crate::session::{RealtimeSession, SessionEvent, SessionEventKind};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

type StopWaiter = oneshot::Sender<Result<(), SttError>>;

/// Top-level lifecycle coordinator for one recording attempt.
///
/// Audio capture starts right away; chunks produced before the session is
/// connected are held in a bounded FIFO and drained, in order, once it is.
/// A recording is never reused after reaching a terminal state.
#[derive(Clone)]
pub struct Recording {
    shared: Arc<RecordingShared>,
}

struct RecordingShared {
    options: RecordingOptions,
    events: Arc<EventChannel<RecordingEvent>>,
    inner: Mutex<RecordingInner>,
    /// Bumped on every terminal transition; continuations holding an older
    /// value discard their results.
    epoch: AtomicU64,
}

struct RecordingInner {
    state: RecordingState,
    buffer: VecDeque<AudioChunk>,
    /// Backlog drained, chunks go straight to the session
    live: bool,
    session: Option<RealtimeSession>,
    session_listeners: Vec<ListenerId>,
    source_muted: bool,
    stop_waiters: Vec<StopWaiter>,
    started_at: Option<chrono::DateTime<Utc>>,
    chunks_sent: u64,
    bytes_sent: u64,
}

/// Everything released by a terminal transition, handled after unlocking
struct Terminated {
    old_state: RecordingState,
    session: Option<RealtimeSession>,
    waiters: Vec<StopWaiter>,
}

impl Recording {
    pub fn new(options: RecordingOptions) -> Self {
        Self {
            shared: Arc::new(RecordingShared {
                options,
                events: Arc::new(EventChannel::new()),
                inner: Mutex::new(RecordingInner {
                    state: RecordingState::Idle,
                    buffer: VecDeque::new(),
                    live: false,
                    session: None,
                    session_listeners: Vec::new(),
                    source_muted: false,
                    stop_waiters: Vec::new(),
                    started_at: None,
                    chunks_sent: 0,
                    bytes_sent: 0,
                }),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Kick off the start sequence in the background.
    ///
    /// Attach listeners before calling this; the first `state_change` is
    /// emitted synchronously. Calling it again has no effect.
    pub fn start(&self) {
        {
            let mut inner = self.shared.lock();
            if inner.state != RecordingState::Idle {
                warn!("Recording already started ({})", inner.state);
                return;
            }
            inner.state = RecordingState::Starting;
            inner.started_at = Some(Utc::now());
        }
        info!("Starting recording with source: {}", self.shared.options.source.name());
        self.shared
            .emit_state_change(RecordingState::Idle, RecordingState::Starting);

        let shared = Arc::clone(&self.shared);
        let epoch = shared.epoch.load(Ordering::SeqCst);
        tokio::spawn(async move {
            shared.run(epoch).await;
        });
    }

    pub fn state(&self) -> RecordingState {
        self.shared.lock().state
    }

    pub fn on<F>(&self, kind: RecordingEventKind, callback: F) -> ListenerId
    where
        F: Fn(&RecordingEvent) + Send + Sync + 'static,
    {
        self.shared.events.on(kind, callback)
    }

    pub fn once<F>(&self, kind: RecordingEventKind, callback: F) -> ListenerId
    where
        F: Fn(&RecordingEvent) + Send + Sync + 'static,
    {
        self.shared.events.once(kind, callback)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.shared.events.off(id)
    }

    /// Pull-style view of every event emitted from now on.
    ///
    /// The stream ends after `finished` and fails on `error` or cancellation.
    pub fn events(&self) -> EventStream {
        let queue = Arc::new(AsyncQueue::new());
        let listeners = RecordingEventKind::ALL
            .iter()
            .map(|&kind| {
                let queue = Arc::clone(&queue);
                self.shared.events.on(kind, move |event| match event {
                    RecordingEvent::Error(err) => queue.abort(err.clone()),
                    RecordingEvent::Finished => {
                        queue.push(event.clone());
                        queue.end();
                    }
                    RecordingEvent::StateChange {
                        new_state: RecordingState::Canceled,
                        ..
                    } => queue.abort(SttError::aborted("Recording canceled")),
                    _ => {
                        queue.push(event.clone());
                    }
                })
            })
            .collect();

        match self.state() {
            RecordingState::Stopped => queue.end(),
            RecordingState::Canceled => queue.abort(SttError::aborted("Recording canceled")),
            RecordingState::Error => queue.abort(SttError::state("Recording already failed")),
            _ => {}
        }

        EventStream::new(queue, Arc::downgrade(&self.shared.events), listeners)
    }

    /// Gracefully end the recording.
    ///
    /// Resolves once the server has confirmed the final result, right away if
    /// the recording never started or already ended.
    pub async fn stop(&self) -> Result<(), SttError> {
        let shared = &self.shared;
        let (tx, rx) = oneshot::channel();
        let (old_state, finish_session) = {
            let mut inner = shared.lock();
            let old_state = inner.state;
            match old_state {
                s if s.is_terminal() => return Ok(()),
                RecordingState::Idle => {
                    inner.state = RecordingState::Stopped;
                    shared.epoch.fetch_add(1, Ordering::SeqCst);
                    drop(inner);
                    shared.emit_state_change(old_state, RecordingState::Stopped);
                    return Ok(());
                }
                RecordingState::Stopping => {
                    inner.stop_waiters.push(tx);
                    (None, None)
                }
                RecordingState::Starting | RecordingState::Connecting => {
                    // The start sequence finishes the session once the backlog is drained.
                    inner.state = RecordingState::Stopping;
                    inner.stop_waiters.push(tx);
                    (Some(old_state), None)
                }
                RecordingState::Recording | RecordingState::Paused => {
                    inner.state = RecordingState::Stopping;
                    inner.stop_waiters.push(tx);
                    (Some(old_state), inner.session.clone())
                }
                _ => return Ok(()),
            }
        };

        if let Some(old_state) = old_state {
            info!("Stopping recording");
            shared.options.source.stop();
            shared.emit_state_change(old_state, RecordingState::Stopping);
        }

        if let Some(session) = finish_session {
            let shared = Arc::clone(shared);
            tokio::spawn(async move {
                if let Err(e) = session.finish().await {
                    shared.fail(e);
                }
            });
        }

        rx.await
            .unwrap_or_else(|_| Err(SttError::aborted("Recording dropped before stopping")))
    }

    /// Abort immediately without waiting for the server.
    pub fn cancel(&self) {
        let shared = &self.shared;
        let Some(terminated) = shared.terminate(RecordingState::Canceled) else {
            return;
        };
        info!("Recording canceled");
        shared.options.source.stop();
        if let Some(session) = &terminated.session {
            session.cancel();
        }
        for waiter in terminated.waiters {
            let _ = waiter.send(Err(SttError::aborted("Recording canceled")));
        }
        shared.emit_state_change(terminated.old_state, RecordingState::Canceled);
    }

    /// Ask the server to finalize pending tokens without ending the stream.
    pub fn finalize(&self, options: FinalizeOptions) -> Result<(), SttError> {
        let session = {
            let inner = self.shared.lock();
            match inner.state {
                RecordingState::Recording | RecordingState::Paused => inner.session.clone(),
                other => {
                    return Err(SttError::state(format!("Cannot finalize while {}", other)));
                }
            }
        };
        match session {
            Some(session) => session.finalize(options.trailing_silence_ms),
            None => Err(SttError::state("No session to finalize")),
        }
    }

    /// Pause capture and keep the session alive with keepalive frames.
    pub fn pause(&self) {
        let session = {
            let mut inner = self.shared.lock();
            if inner.state != RecordingState::Recording {
                debug!("Ignoring pause while {}", inner.state);
                return;
            }
            inner.state = RecordingState::Paused;
            inner.session.clone()
        };
        self.shared.options.source.pause();
        if let Some(session) = session {
            session.pause();
        }
        self.shared
            .emit_state_change(RecordingState::Recording, RecordingState::Paused);
    }

    /// Resume capture. The session stays in keepalive while the source is
    /// muted externally.
    pub fn resume(&self) {
        let (session, muted) = {
            let mut inner = self.shared.lock();
            if inner.state != RecordingState::Paused {
                debug!("Ignoring resume while {}", inner.state);
                return;
            }
            inner.state = RecordingState::Recording;
            (inner.session.clone(), inner.source_muted)
        };
        self.shared.options.source.resume();
        if let Some(session) = session {
            if !muted {
                session.resume();
            }
        }
        self.shared
            .emit_state_change(RecordingState::Paused, RecordingState::Recording);
    }

    pub fn stats(&self) -> RecordingStats {
        let inner = self.shared.lock();
        RecordingStats {
            state: inner.state,
            started_at: inner.started_at,
            session_id: inner.session.as_ref().map(RealtimeSession::id),
            chunks_sent: inner.chunks_sent,
            bytes_sent: inner.bytes_sent,
            buffered_chunks: inner.buffer.len(),
        }
    }
}

impl RecordingShared {
    fn lock(&self) -> MutexGuard<'_, RecordingInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state(&self) -> RecordingState {
        self.lock().state
    }

    fn is_stale(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) != epoch
    }

    fn emit(&self, event: RecordingEvent) {
        self.events.emit(&event);
    }

    fn emit_state_change(&self, old_state: RecordingState, new_state: RecordingState) {
        debug!("Recording state: {} -> {}", old_state, new_state);
        self.emit(RecordingEvent::StateChange { old_state, new_state });
    }

    /// Move into a terminal state, unless already in one.
    fn terminate(&self, to: RecordingState) -> Option<Terminated> {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            return None;
        }
        let old_state = inner.state;
        inner.state = to;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        inner.buffer.clear();
        inner.live = false;

        let session = inner.session.clone();
        if to != RecordingState::Stopped {
            // Nothing from the session is wanted after cancel or failure.
            if let Some(session) = &session {
                for id in inner.session_listeners.drain(..) {
                    session.off(id);
                }
            }
        }

        Some(Terminated {
            old_state,
            session,
            waiters: std::mem::take(&mut inner.stop_waiters),
        })
    }

    fn fail(&self, err: SttError) {
        let Some(terminated) = self.terminate(RecordingState::Error) else {
            debug!("Ignoring error after recording ended: {}", err);
            return;
        };
        error!("Recording failed: {}", err);
        self.options.source.stop();
        if let Some(session) = &terminated.session {
            session.close();
        }
        for waiter in terminated.waiters {
            let _ = waiter.send(Err(err.clone()));
        }
        self.emit(RecordingEvent::Error(err));
        self.emit_state_change(terminated.old_state, RecordingState::Error);
    }

    fn handle_session_finished(&self) {
        let Some(terminated) = self.terminate(RecordingState::Stopped) else {
            return;
        };
        info!("Recording finished");
        self.options.source.stop();
        self.emit_state_change(terminated.old_state, RecordingState::Stopped);
        self.emit(RecordingEvent::Finished);
        for waiter in terminated.waiters {
            let _ = waiter.send(Ok(()));
        }
    }

    fn handle_audio(&self, chunk: AudioChunk) {
        let overflow = {
            let mut inner = self.lock();
            if inner.state.is_terminal() {
                return;
            }
            if inner.live {
                if let Some(session) = &inner.session {
                    let len = chunk.len() as u64;
                    match session.send_audio(chunk) {
                        Ok(()) => {
                            inner.chunks_sent += 1;
                            inner.bytes_sent += len;
                        }
                        Err(e) => debug!("Audio chunk not forwarded: {}", e),
                    }
                }
                return;
            }
            if inner.buffer.len() >= self.options.buffer_queue_size {
                true
            } else {
                inner.buffer.push_back(chunk);
                false
            }
        };

        if overflow {
            self.fail(SttError::new(
                ErrorKind::StateError,
                "Audio buffer queue size exceeded",
            ));
        }
    }

    fn handle_source_error(&self, err: AudioSourceError) {
        warn!("Audio source error: {}", err);
        self.fail(err.into());
    }

    fn handle_mute(&self, muted: bool) {
        let (session, state) = {
            let mut inner = self.lock();
            if !matches!(inner.state, RecordingState::Recording | RecordingState::Paused) {
                return;
            }
            inner.source_muted = muted;
            (inner.session.clone(), inner.state)
        };

        if let Some(session) = session {
            if muted {
                session.pause();
            } else if state == RecordingState::Recording {
                // A user pause wins over the source coming back.
                session.resume();
            }
        }

        if muted {
            info!("Audio source muted");
            self.emit(RecordingEvent::SourceMuted);
        } else {
            info!("Audio source unmuted");
            self.emit(RecordingEvent::SourceUnmuted);
        }
    }

    /// Forward a session event unless the recording already ended.
    fn forward(&self, event: &SessionEvent) {
        let mapped = match event {
            SessionEvent::Result(result) => RecordingEvent::Result(result.clone()),
            SessionEvent::Token(token) => RecordingEvent::Token(token.clone()),
            SessionEvent::Endpoint => RecordingEvent::Endpoint,
            SessionEvent::Finalized => RecordingEvent::Finalized,
            SessionEvent::Connected => RecordingEvent::Connected,
            _ => return,
        };
        if self.state().is_terminal() {
            return;
        }
        self.emit(mapped);
    }

    fn wire_session(self: &Arc<Self>, session: &RealtimeSession) -> Vec<ListenerId> {
        let mut ids = Vec::new();
        for kind in [
            SessionEventKind::Result,
            SessionEventKind::Token,
            SessionEventKind::Endpoint,
            SessionEventKind::Finalized,
            SessionEventKind::Connected,
        ] {
            let weak = Arc::downgrade(self);
            ids.push(session.on(kind, move |event| {
                if let Some(shared) = weak.upgrade() {
                    shared.forward(event);
                }
            }));
        }

        let weak = Arc::downgrade(self);
        ids.push(session.on(SessionEventKind::Error, move |event| {
            if let (Some(shared), SessionEvent::Error(err)) = (weak.upgrade(), event) {
                shared.fail(err.clone());
            }
        }));

        let weak = Arc::downgrade(self);
        ids.push(session.on(SessionEventKind::Finished, move |_| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_session_finished();
            }
        }));

        ids
    }

    /// The start sequence. Every suspension point is followed by an epoch
    /// check so a late success cannot revive an ended recording.
    async fn run(self: Arc<Self>, epoch: u64) {
        if let Some(resolver) = self.options.permissions.clone() {
            let outcome = ensure_permission(resolver.as_ref(), PermissionType::Microphone).await;
            if self.is_stale(epoch) {
                return;
            }
            if outcome.status != PermissionStatus::Granted {
                self.fail(SttError::new(
                    ErrorKind::PermissionDenied,
                    format!("Microphone permission is {:?}", outcome.status),
                ));
                return;
            }
        }

        let sink: Arc<dyn AudioSink> = Arc::new(RecordingSink {
            shared: Arc::downgrade(&self),
        });
        let mut source_start = self.options.source.start(sink);
        let resolve_key = self.options.api_key.resolve();
        tokio::pin!(resolve_key);

        // A capture failure is reported without waiting on the credential.
        let (source_started, api_key) = tokio::select! {
            started = &mut source_start => match started {
                Ok(()) => (Ok(()), Some(resolve_key.as_mut().await)),
                Err(e) => (Err(e), None),
            },
            key = &mut resolve_key => ((&mut source_start).await, Some(key)),
        };

        if self.is_stale(epoch) {
            self.options.source.stop();
            return;
        }
        if let Err(e) = source_started {
            self.handle_source_error(e);
            return;
        }
        let api_key = match api_key {
            Some(Ok(key)) => key,
            Some(Err(e)) => {
                self.fail(e);
                return;
            }
            None => return,
        };

        let session = RealtimeSession::new(
            api_key,
            self.options.session_config.clone(),
            self.options.session_options.clone(),
            Arc::clone(&self.options.connector),
        );
        let listeners = self.wire_session(&session);

        let stop_requested = {
            let mut inner = self.lock();
            if self.is_stale(epoch) {
                drop(inner);
                for id in listeners {
                    session.off(id);
                }
                return;
            }
            inner.session = Some(session.clone());
            inner.session_listeners = listeners;
            if inner.state == RecordingState::Starting {
                inner.state = RecordingState::Connecting;
                false
            } else {
                true
            }
        };
        if stop_requested {
            // Stop may have raced the source start; make sure capture is off.
            self.options.source.stop();
        } else {
            self.emit_state_change(RecordingState::Starting, RecordingState::Connecting);
        }

        let connected = session.connect().await;
        if self.is_stale(epoch) {
            session.close();
            return;
        }
        if let Err(e) = connected {
            self.fail(e);
            return;
        }

        // Drain the backlog and switch to live forwarding in one critical
        // section so no chunk can slip between the two.
        let (finish_now, went_live) = {
            let mut inner = self.lock();
            if inner.state.is_terminal() {
                return;
            }
            let backlog = std::mem::take(&mut inner.buffer);
            let drained = backlog.len();
            for chunk in backlog {
                let len = chunk.len() as u64;
                if session.send_audio(chunk).is_ok() {
                    inner.chunks_sent += 1;
                    inner.bytes_sent += len;
                }
            }
            inner.live = true;
            debug!("Drained {} buffered chunk(s) into session", drained);

            match inner.state {
                RecordingState::Stopping => (true, false),
                RecordingState::Connecting => {
                    inner.state = RecordingState::Recording;
                    (false, true)
                }
                _ => (false, false),
            }
        };

        if went_live {
            info!("Recording live (session {})", session.id());
            self.emit_state_change(RecordingState::Connecting, RecordingState::Recording);
        }

        if finish_now {
            info!("Stop requested before connect, finishing session");
            if let Err(e) = session.finish().await {
                self.fail(e);
            }
        }
    }
}

/// Audio sink handed to the source; holds the recording weakly so a
/// source that outlives it does not keep it alive.
struct RecordingSink {
    shared: Weak<RecordingShared>,
}

impl AudioSink for RecordingSink {
    fn on_data(&self, chunk: AudioChunk) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_audio(chunk);
        }
    }

    fn on_error(&self, error: AudioSourceError) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_source_error(error);
        }
    }

    fn on_muted(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_mute(true);
        }
    }

    fn on_unmuted(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_mute(false);
        }
    }
}
