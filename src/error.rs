//! Error taxonomy shared by the session, recording and audio layers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of failure categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Credential rejected (HTTP 401).
    Auth,
    /// Invalid session configuration (HTTP 400).
    BadRequest,
    /// Rate limit or quota exhaustion (HTTP 402/429).
    QuotaExceeded,
    /// Transient network or server failure (HTTP 408/500/503, local I/O).
    NetworkError,
    /// Transport failure establishing or maintaining the stream.
    ConnectionError,
    /// Caller-initiated cancellation.
    Aborted,
    /// Operation invalid for the current state.
    StateError,
    PermissionDenied,
    DeviceNotFound,
    AudioUnavailable,
}

impl ErrorKind {
    /// Map a transport or server status code to an error kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorKind::Auth,
            400 => ErrorKind::BadRequest,
            402 | 429 => ErrorKind::QuotaExceeded,
            408 | 500 | 503 => ErrorKind::NetworkError,
            _ => ErrorKind::ConnectionError,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::ConnectionError => "connection_error",
            ErrorKind::Aborted => "aborted",
            ErrorKind::StateError => "state_error",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::DeviceNotFound => "device_not_found",
            ErrorKind::AudioUnavailable => "audio_unavailable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by the streaming client.
///
/// `status_code` is set when the failure came from a server status (HTTP
/// upgrade response or an error frame), `raw` keeps the offending server
/// payload when there was one.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct SttError {
    pub kind: ErrorKind,
    pub message: String,
    pub status_code: Option<u16>,
    pub raw: Option<serde_json::Value>,
}

impl SttError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            raw: None,
        }
    }

    /// Build an error from a status code, picking the kind with [`ErrorKind::from_status`].
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::from_status(status),
            message: message.into(),
            status_code: Some(status),
            raw: None,
        }
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkError, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectionError, message)
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Aborted, message)
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StateError, message)
    }

    pub fn is_aborted(&self) -> bool {
        self.kind == ErrorKind::Aborted
    }
}

/// Failure reported by an audio source when capture cannot begin or breaks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AudioSourceError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),
}

impl From<AudioSourceError> for SttError {
    fn from(err: AudioSourceError) -> Self {
        let kind = match &err {
            AudioSourceError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            AudioSourceError::DeviceNotFound(_) => ErrorKind::DeviceNotFound,
            AudioSourceError::CaptureUnavailable(_) => ErrorKind::AudioUnavailable,
        };
        SttError::new(kind, err.to_string())
    }
}

/// Invalid buffer limits passed to the transcript buffers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferConfigError {
    #[error("max_tokens must be a positive number")]
    InvalidMaxTokens,
    #[error("max_ms must be a positive number")]
    InvalidMaxMs,
}
