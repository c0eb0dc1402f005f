//! Event primitives shared by the session and recording layers.

mod channel;
mod queue;

pub use channel::{ChannelEvent, EventChannel, ListenerId};
pub use queue::AsyncQueue;
