use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one streaming connection.
///
/// ```text
/// idle -> connecting -> connected -> finishing -> finished
///                          |             |
///                          +-- close ----+--> closed
/// any --(error)--> error      any --(cancel)--> canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Finishing,
    Finished,
    Canceled,
    Closed,
    Error,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Finished
                | SessionState::Canceled
                | SessionState::Closed
                | SessionState::Error
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Finishing => "finishing",
            SessionState::Finished => "finished",
            SessionState::Canceled => "canceled",
            SessionState::Closed => "closed",
            SessionState::Error => "error",
        };
        f.write_str(name)
    }
}
