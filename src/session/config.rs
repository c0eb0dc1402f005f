use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_URL: &str = "wss://stt-rt.soniox.com/transcribe-websocket";
pub const DEFAULT_MODEL: &str = "stt-rt-preview";

/// Recognition settings sent to the server in the opening frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Recognition model name
    pub model: String,

    /// Audio encoding of the binary frames (e.g. "pcm_s16le", "auto")
    pub audio_format: String,

    /// Required for raw PCM formats
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_channels: Option<u16>,

    /// Expected spoken languages (ISO codes)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub language_hints: Vec<String>,

    #[serde(default)]
    pub enable_speaker_diarization: bool,

    #[serde(default)]
    pub enable_language_identification: bool,

    /// Ask the server to emit `<end>` tokens at detected endpoints
    #[serde(default)]
    pub enable_endpoint_detection: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<TranslationConfig>,

    /// Free-form domain context to bias recognition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_reference_id: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            audio_format: "pcm_s16le".to_string(),
            sample_rate: Some(16000), // 16kHz mono PCM
            num_channels: Some(1),
            language_hints: Vec::new(),
            enable_speaker_diarization: false,
            enable_language_identification: false,
            enable_endpoint_detection: true,
            translation: None,
            context: None,
            client_reference_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranslationConfig {
    OneWay { target_language: String },
    TwoWay { language_a: String, language_b: String },
}

/// Client-side behaviour of a session (not sent to the server)
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Streaming endpoint
    pub url: String,

    /// Interval between keepalive frames while paused
    /// Default: 5 seconds
    pub keepalive_interval: Duration,

    /// Upper bound on connection establishment
    /// Default: 10 seconds
    pub connect_timeout: Duration,

    /// Reject `send_audio` outside `connected` instead of ignoring it
    pub strict_audio_state: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            keepalive_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            strict_audio_state: false,
        }
    }
}
