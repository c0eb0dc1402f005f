use super::state::RecordingState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Snapshot of a recording's progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingStats {
    pub state: RecordingState,

    /// When `start()` was called
    pub started_at: Option<DateTime<Utc>>,

    /// Id of the session audio is streamed to, once created
    pub session_id: Option<Uuid>,

    /// Chunks handed to the session (backlog included)
    pub chunks_sent: u64,

    pub bytes_sent: u64,

    /// Chunks waiting for the session to connect
    pub buffered_chunks: usize,
}
