use crate::recording::DEFAULT_BUFFER_QUEUE_SIZE;
use crate::session::{SessionConfig, SessionOptions, DEFAULT_MODEL, DEFAULT_URL};
use crate::transcript::SegmentBufferOptions;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub recording: RecordingConfig,
    pub transcript: TranscriptConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub url: String,
    pub model: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Duration of each chunk streamed by file sources
    pub chunk_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            chunk_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub buffer_queue_size: usize,
    pub keepalive_interval_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            buffer_queue_size: DEFAULT_BUFFER_QUEUE_SIZE,
            keepalive_interval_ms: 5_000,
            connect_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TranscriptConfig {
    pub max_tokens: Option<usize>,
    pub max_ms: Option<u64>,
}

impl Config {
    /// Load `path` (any format the `config` crate understands, extension
    /// optional) overlaid with `STT_*` environment variables, e.g.
    /// `STT_SERVICE__MODEL`. A missing file falls back to defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("STT")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            model: self.service.model.clone(),
            sample_rate: Some(self.audio.sample_rate),
            num_channels: Some(self.audio.channels),
            ..SessionConfig::default()
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            url: self.service.url.clone(),
            keepalive_interval: Duration::from_millis(self.recording.keepalive_interval_ms),
            connect_timeout: Duration::from_millis(self.recording.connect_timeout_ms),
            ..SessionOptions::default()
        }
    }

    pub fn segment_options(&self) -> SegmentBufferOptions {
        SegmentBufferOptions {
            max_tokens: self.transcript.max_tokens,
            max_ms: self.transcript.max_ms,
            ..SegmentBufferOptions::default()
        }
    }
}
