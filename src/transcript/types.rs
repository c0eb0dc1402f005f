use serde::{Deserialize, Serialize};

/// Sentinel token text marking a server-detected endpoint.
pub const ENDPOINT_TOKEN: &str = "<end>";

/// Sentinel token text marking completion of a finalize request.
pub const FINALIZED_TOKEN: &str = "<fin>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationStatus {
    None,
    Original,
    Translation,
}

/// Smallest timed unit of recognized text, as received from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeToken {
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_ms: Option<u64>,

    /// Tokens without an end time cannot take part in stability decisions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_ms: Option<u64>,

    #[serde(default)]
    pub confidence: f32,

    #[serde(default)]
    pub is_final: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation_status: Option<TranslationStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_language: Option<String>,
}

impl RealtimeToken {
    /// A final token with timing and no grouping attributes.
    pub fn new(text: impl Into<String>, start_ms: u64, end_ms: u64) -> Self {
        Self {
            text: text.into(),
            start_ms: Some(start_ms),
            end_ms: Some(end_ms),
            confidence: 1.0,
            is_final: true,
            speaker: None,
            language: None,
            translation_status: None,
            source_language: None,
        }
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn non_final(mut self) -> Self {
        self.is_final = false;
        self
    }

    pub fn is_endpoint(&self) -> bool {
        self.text == ENDPOINT_TOKEN
    }

    pub fn is_finalized_marker(&self) -> bool {
        self.text == FINALIZED_TOKEN
    }

    pub fn is_sentinel(&self) -> bool {
        self.is_endpoint() || self.is_finalized_marker()
    }
}

/// One inbound result frame.
///
/// `final_audio_proc_ms` is a watermark: tokens ending at or before it will
/// not be revised again.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RealtimeResult {
    #[serde(default)]
    pub tokens: Vec<RealtimeToken>,

    #[serde(default)]
    pub final_audio_proc_ms: u64,

    #[serde(default)]
    pub total_audio_proc_ms: u64,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub finished: bool,
}

/// A maximal run of tokens sharing the configured grouping key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeSegment {
    pub text: String,
    pub tokens: Vec<RealtimeToken>,
    pub speaker: Option<String>,
    pub language: Option<String>,
    pub start_ms: Option<u64>,
    pub end_ms: Option<u64>,
}

impl RealtimeSegment {
    /// Build a segment from a non-empty run of tokens.
    pub(crate) fn from_tokens(tokens: Vec<RealtimeToken>) -> Self {
        let text = tokens.iter().map(|t| t.text.as_str()).collect();
        let first = tokens.first();
        let speaker = first.and_then(|t| t.speaker.clone());
        let language = first.and_then(|t| t.language.clone());
        let start_ms = tokens.iter().find_map(|t| t.start_ms);
        let end_ms = tokens.iter().rev().find_map(|t| t.end_ms);
        Self {
            text,
            tokens,
            speaker,
            language,
            start_ms,
            end_ms,
        }
    }
}

/// Segments collected between two endpoints.
///
/// `speaker` and `language` are only set when every segment agrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeUtterance {
    pub text: String,
    pub segments: Vec<RealtimeSegment>,
    pub tokens: Vec<RealtimeToken>,
    pub speaker: Option<String>,
    pub language: Option<String>,
    pub start_ms: Option<u64>,
    pub end_ms: Option<u64>,
    pub final_audio_proc_ms: u64,
    pub total_audio_proc_ms: u64,
}
