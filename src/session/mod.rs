//! Streaming session protocol
//!
//! This module provides the `RealtimeSession` state machine that owns one
//! connection to the transcription service:
//! - Connection establishment and the configuration handshake
//! - Fire-and-forget audio forwarding while connected
//! - Finalize requests and the end-of-audio finish handshake
//! - Keepalive while paused
//! - Result, token, endpoint and error events

mod config;
mod events;
mod session;
mod state;

pub use config::{SessionConfig, SessionOptions, TranslationConfig, DEFAULT_MODEL, DEFAULT_URL};
pub use events::{SessionEvent, SessionEventKind};
pub use session::RealtimeSession;
pub use state::SessionState;
