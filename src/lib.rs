pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod permissions;
pub mod recording;
pub mod session;
pub mod transcript;
pub mod transport;

pub use audio::{AudioChunk, AudioFile, AudioSink, AudioSource, FileAudioSource};
pub use config::Config;
pub use error::{AudioSourceError, BufferConfigError, ErrorKind, SttError};
pub use events::{AsyncQueue, ChannelEvent, EventChannel, ListenerId};
pub use permissions::{PermissionResolver, PermissionResult, PermissionStatus, PermissionType};
pub use recording::{
    ApiKey, EventStream, FinalizeOptions, Recording, RecordingEvent, RecordingEventKind,
    RecordingOptions, RecordingState, RecordingStats,
};
pub use session::{
    RealtimeSession, SessionConfig, SessionEvent, SessionEventKind, SessionOptions, SessionState,
    TranslationConfig,
};
pub use transcript::{
    GroupKey, RealtimeResult, RealtimeSegment, RealtimeToken, RealtimeUtterance, SegmentBuffer,
    SegmentBufferOptions, TranslationStatus, UtteranceBuffer,
};
pub use transport::{Connection, Connector, InboundFrame, OutboundFrame, WebSocketConnector};
