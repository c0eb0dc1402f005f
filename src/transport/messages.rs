use crate::error::SttError;
use crate::session::SessionConfig;
use crate::transcript::RealtimeResult;
use serde::{Deserialize, Serialize};

/// First text frame of every session: credentials plus recognition settings
#[derive(Debug, Serialize)]
pub struct SessionStartMessage<'a> {
    pub api_key: &'a str,
    #[serde(flatten)]
    pub config: &'a SessionConfig,
}

/// Control frames sent as JSON text during a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Finalize {
        #[serde(skip_serializing_if = "Option::is_none")]
        trailing_silence_ms: Option<u64>,
    },
    Keepalive,
}

/// Error frame received from the server
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorMessage {
    pub error_code: u16,
    #[serde(default)]
    pub error_message: String,
}

/// Parsed inbound text frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Result(RealtimeResult),
    Error(SttError),
}

/// End-of-audio marker: an empty text frame.
pub const END_OF_AUDIO: &str = "";

/// Parse a server text frame into a result or a mapped error.
pub fn parse_inbound(text: &str) -> Result<InboundMessage, SttError> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| SttError::connection(format!("Malformed server frame: {}", e)))?;

    if value.get("error_code").is_some() {
        let msg: ErrorMessage = serde_json::from_value(value.clone())
            .map_err(|e| SttError::connection(format!("Malformed error frame: {}", e)))?;
        let err = SttError::from_status(msg.error_code, msg.error_message).with_raw(value);
        return Ok(InboundMessage::Error(err));
    }

    let result: RealtimeResult = serde_json::from_value(value)
        .map_err(|e| SttError::connection(format!("Malformed result frame: {}", e)))?;
    Ok(InboundMessage::Result(result))
}
