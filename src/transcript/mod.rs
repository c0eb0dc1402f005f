//! Token-to-text assembly
//!
//! Turns the revisable token stream into stable segments (grouped by speaker
//! and language) and endpoint-delimited utterances.

mod segment;
mod types;
mod utterance;

pub use segment::{GroupKey, SegmentBuffer, SegmentBufferOptions};
pub use types::{
    RealtimeResult, RealtimeSegment, RealtimeToken, RealtimeUtterance, TranslationStatus,
    ENDPOINT_TOKEN, FINALIZED_TOKEN,
};
pub use utterance::UtteranceBuffer;
