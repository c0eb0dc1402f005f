use crate::error::AudioSourceError;
use std::sync::Arc;

/// Raw audio bytes in the session's configured format, ordered by capture time
pub type AudioChunk = Vec<u8>;

/// Receiver side of an audio source.
///
/// Callbacks are invoked synchronously from the source's capture context and
/// must not block.
pub trait AudioSink: Send + Sync {
    fn on_data(&self, chunk: AudioChunk);

    /// Capture broke after a successful start
    fn on_error(&self, error: AudioSourceError);

    /// Input was muted outside the application (e.g. OS-level mute)
    fn on_muted(&self) {}

    fn on_unmuted(&self) {}
}

/// Audio capture capability
///
/// Platform-specific implementations provide microphone or system capture;
/// [`FileAudioSource`](super::FileAudioSource) streams a WAV file.
#[async_trait::async_trait]
pub trait AudioSource: Send + Sync {
    /// Begin capturing. Chunks must only be delivered after this is called.
    async fn start(&self, sink: Arc<dyn AudioSink>) -> Result<(), AudioSourceError>;

    /// Stop capturing. Idempotent.
    fn stop(&self);

    fn pause(&self) {}

    fn resume(&self) {}

    /// Source name for logging
    fn name(&self) -> &str;
}
