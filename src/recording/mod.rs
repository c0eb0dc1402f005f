//! Recording orchestration
//!
//! A [`Recording`] ties an [`AudioSource`](crate::audio::AudioSource) to a
//! [`RealtimeSession`](crate::session::RealtimeSession): capture begins
//! immediately, audio is buffered until the session is ready, and session
//! events are re-emitted alongside the recording's own lifecycle.

mod config;
mod credential;
mod events;
mod recording;
mod state;
mod stats;
mod stream;

pub use config::{FinalizeOptions, RecordingOptions, DEFAULT_BUFFER_QUEUE_SIZE};
pub use credential::ApiKey;
pub use events::{RecordingEvent, RecordingEventKind};
pub use recording::Recording;
pub use state::RecordingState;
pub use stats::RecordingStats;
pub use stream::EventStream;
