use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a recording: audio capture plus the session it feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    Idle,
    /// Source starting, credential resolving
    Starting,
    Connecting,
    Recording,
    Paused,
    /// Waiting for the finish handshake
    Stopping,
    Stopped,
    Error,
    Canceled,
}

impl RecordingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordingState::Stopped | RecordingState::Error | RecordingState::Canceled)
    }
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordingState::Idle => "idle",
            RecordingState::Starting => "starting",
            RecordingState::Connecting => "connecting",
            RecordingState::Recording => "recording",
            RecordingState::Paused => "paused",
            RecordingState::Stopping => "stopping",
            RecordingState::Stopped => "stopped",
            RecordingState::Error => "error",
            RecordingState::Canceled => "canceled",
        };
        f.write_str(name)
    }
}
