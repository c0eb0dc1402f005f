use super::credential::ApiKey;
use crate::audio::AudioSource;
use crate::permissions::PermissionResolver;
use crate::session::{SessionConfig, SessionOptions};
use crate::transport::{Connector, WebSocketConnector};
use std::sync::Arc;

pub const DEFAULT_BUFFER_QUEUE_SIZE: usize = 1000;

/// Configuration for a recording
#[derive(Clone)]
pub struct RecordingOptions {
    /// Credential, resolved once per recording
    pub api_key: ApiKey,

    /// Audio capture
    pub source: Arc<dyn AudioSource>,

    /// Transport used to reach the service
    pub connector: Arc<dyn Connector>,

    /// Recognition settings sent when the session opens
    pub session_config: SessionConfig,

    pub session_options: SessionOptions,

    /// Chunks held while no session is connected. Overflow fails the recording.
    /// Default: 1000
    pub buffer_queue_size: usize,

    /// Checked before the source is started, when present
    pub permissions: Option<Arc<dyn PermissionResolver>>,
}

impl RecordingOptions {
    pub fn new(api_key: impl Into<ApiKey>, source: Arc<dyn AudioSource>) -> Self {
        Self {
            api_key: api_key.into(),
            source,
            connector: Arc::new(WebSocketConnector::new()),
            session_config: SessionConfig::default(),
            session_options: SessionOptions::default(),
            buffer_queue_size: DEFAULT_BUFFER_QUEUE_SIZE,
            permissions: None,
        }
    }
}

/// Options for [`Recording::finalize`](super::Recording::finalize)
#[derive(Debug, Clone, Copy, Default)]
pub struct FinalizeOptions {
    /// Silence the server should assume after the last chunk
    pub trailing_silence_ms: Option<u64>,
}
