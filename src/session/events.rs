use super::state::SessionState;
use crate::error::{ErrorKind, SttError};
use crate::events::ChannelEvent;
use crate::transcript::{RealtimeResult, RealtimeToken};

/// Events emitted by a [`RealtimeSession`](super::RealtimeSession)
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Result(RealtimeResult),
    Token(RealtimeToken),
    Error(SttError),
    Endpoint,
    Finalized,
    Finished,
    Connected,
    Disconnected { code: Option<u16>, reason: String },
    StateChange { old_state: SessionState, new_state: SessionState },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    Result,
    Token,
    Error,
    Endpoint,
    Finalized,
    Finished,
    Connected,
    Disconnected,
    StateChange,
}

impl ChannelEvent for SessionEvent {
    type Kind = SessionEventKind;

    fn kind(&self) -> SessionEventKind {
        match self {
            SessionEvent::Result(_) => SessionEventKind::Result,
            SessionEvent::Token(_) => SessionEventKind::Token,
            SessionEvent::Error(_) => SessionEventKind::Error,
            SessionEvent::Endpoint => SessionEventKind::Endpoint,
            SessionEvent::Finalized => SessionEventKind::Finalized,
            SessionEvent::Finished => SessionEventKind::Finished,
            SessionEvent::Connected => SessionEventKind::Connected,
            SessionEvent::Disconnected { .. } => SessionEventKind::Disconnected,
            SessionEvent::StateChange { .. } => SessionEventKind::StateChange,
        }
    }

    fn listener_failure(message: String) -> Option<Self> {
        Some(SessionEvent::Error(SttError::new(ErrorKind::StateError, message)))
    }
}
