use super::state::RecordingState;
use crate::error::SttError;
use crate::events::ChannelEvent;
use crate::transcript::{RealtimeResult, RealtimeToken};

/// Events emitted by a [`Recording`](super::Recording)
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingEvent {
    Result(RealtimeResult),
    Token(RealtimeToken),
    Error(SttError),
    Endpoint,
    Finalized,
    Finished,
    Connected,
    StateChange { old_state: RecordingState, new_state: RecordingState },
    SourceMuted,
    SourceUnmuted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordingEventKind {
    Result,
    Token,
    Error,
    Endpoint,
    Finalized,
    Finished,
    Connected,
    StateChange,
    SourceMuted,
    SourceUnmuted,
}

impl RecordingEventKind {
    pub const ALL: [RecordingEventKind; 10] = [
        RecordingEventKind::Result,
        RecordingEventKind::Token,
        RecordingEventKind::Error,
        RecordingEventKind::Endpoint,
        RecordingEventKind::Finalized,
        RecordingEventKind::Finished,
        RecordingEventKind::Connected,
        RecordingEventKind::StateChange,
        RecordingEventKind::SourceMuted,
        RecordingEventKind::SourceUnmuted,
    ];
}

impl ChannelEvent for RecordingEvent {
    type Kind = RecordingEventKind;

    fn kind(&self) -> RecordingEventKind {
        match self {
            RecordingEvent::Result(_) => RecordingEventKind::Result,
            RecordingEvent::Token(_) => RecordingEventKind::Token,
            RecordingEvent::Error(_) => RecordingEventKind::Error,
            RecordingEvent::Endpoint => RecordingEventKind::Endpoint,
            RecordingEvent::Finalized => RecordingEventKind::Finalized,
            RecordingEvent::Finished => RecordingEventKind::Finished,
            RecordingEvent::Connected => RecordingEventKind::Connected,
            RecordingEvent::StateChange { .. } => RecordingEventKind::StateChange,
            RecordingEvent::SourceMuted => RecordingEventKind::SourceMuted,
            RecordingEvent::SourceUnmuted => RecordingEventKind::SourceUnmuted,
        }
    }

    fn listener_failure(message: String) -> Option<Self> {
        Some(RecordingEvent::Error(SttError::state(message)))
    }
}
