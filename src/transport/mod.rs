//! Streaming transport
//!
//! A [`Connector`] establishes the bidirectional stream and hands back a
//! [`Connection`]: an unbounded outbound sender (so audio framing never
//! blocks the caller) and an inbound receiver. Dropping the outbound sender
//! closes the stream.

pub mod messages;
mod websocket;

pub use messages::{
    parse_inbound, ControlMessage, InboundMessage, SessionStartMessage, END_OF_AUDIO,
};
pub use websocket::WebSocketConnector;

use crate::error::SttError;
use tokio::sync::mpsc;

/// Frame written to the server
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Frame or condition observed on the inbound side
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
    /// Remote end closed the stream
    Closed { code: Option<u16>, reason: String },
    /// Transport failed while the stream was open
    Error(SttError),
}

pub struct Connection {
    pub outgoing: mpsc::UnboundedSender<OutboundFrame>,
    pub incoming: mpsc::UnboundedReceiver<InboundFrame>,
}

/// Establishes the streaming connection for a session.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Open a stream to `url`. Failures map onto the error taxonomy
    /// (auth, bad request, quota, network, connection).
    async fn connect(&self, url: &str) -> Result<Connection, SttError>;

    /// Connector name for logging
    fn name(&self) -> &str;
}
