use super::source::{AudioSink, AudioSource};
use crate::error::AudioSourceError;
use anyhow::{Context, Result};
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// 16-bit PCM WAV file loaded into memory
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            anyhow::bail!(
                "Unsupported WAV encoding: {} bit {:?}, expected 16-bit PCM",
                spec.bits_per_sample,
                spec.sample_format
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Little-endian PCM bytes (`pcm_s16le`)
    pub fn pcm_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    /// Byte length of `chunk_ms` of audio, rounded to whole frames
    pub fn chunk_bytes(&self, chunk_ms: u64) -> usize {
        let frame_bytes = self.channels as usize * 2;
        let frames = (self.sample_rate as u64 * chunk_ms / 1000).max(1) as usize;
        frames * frame_bytes
    }
}

/// Audio source that replays a WAV file in fixed-size chunks.
///
/// Chunks are paced in real time by default so the server sees the same
/// timing as live capture.
pub struct FileAudioSource {
    path: PathBuf,
    preloaded: Mutex<Option<AudioFile>>,
    chunk_ms: u64,
    paced: bool,
    started: AtomicBool,
    control: Arc<PlaybackControl>,
    task: Mutex<Option<JoinHandle<()>>>,
    drained_tx: watch::Sender<bool>,
}

struct PlaybackControl {
    paused: AtomicBool,
    stopped: AtomicBool,
}

impl FileAudioSource {
    /// Source that loads `path` when started.
    pub fn new(path: impl Into<PathBuf>, chunk_ms: u64) -> Self {
        Self::build(path.into(), None, chunk_ms)
    }

    /// Source over an already loaded file.
    pub fn from_audio(audio: AudioFile, chunk_ms: u64) -> Self {
        let path = PathBuf::from(&audio.path);
        Self::build(path, Some(audio), chunk_ms)
    }

    fn build(path: PathBuf, preloaded: Option<AudioFile>, chunk_ms: u64) -> Self {
        let (drained_tx, _) = watch::channel(false);
        Self {
            path,
            preloaded: Mutex::new(preloaded),
            chunk_ms: chunk_ms.max(1),
            paced: true,
            started: AtomicBool::new(false),
            control: Arc::new(PlaybackControl {
                paused: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            }),
            task: Mutex::new(None),
            drained_tx,
        }
    }

    /// Emit chunks as fast as possible instead of in real time.
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    /// Resolves once every chunk of the file has been delivered or the source stopped.
    pub async fn wait_until_drained(&self) {
        let mut rx = self.drained_tx.subscribe();
        let _ = rx.wait_for(|drained| *drained).await;
    }

    fn load(&self) -> Result<AudioFile, AudioSourceError> {
        let preloaded = self
            .preloaded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(audio) = preloaded {
            return Ok(audio);
        }
        if !self.path.exists() {
            return Err(AudioSourceError::DeviceNotFound(self.path.display().to_string()));
        }
        AudioFile::open(&self.path)
            .map_err(|e| AudioSourceError::CaptureUnavailable(format!("{:#}", e)))
    }
}

#[async_trait::async_trait]
impl AudioSource for FileAudioSource {
    async fn start(&self, sink: Arc<dyn AudioSink>) -> Result<(), AudioSourceError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(AudioSourceError::CaptureUnavailable(
                "File source already started".to_string(),
            ));
        }

        let audio = self.load()?;
        let chunk_bytes = audio.chunk_bytes(self.chunk_ms);
        let pcm = audio.pcm_bytes();
        let period = Duration::from_millis(self.chunk_ms);
        let paced = self.paced;
        let control = Arc::clone(&self.control);
        let drained_tx = self.drained_tx.clone();

        debug!(
            "Streaming {} ({} bytes in {}-byte chunks)",
            audio.path,
            pcm.len(),
            chunk_bytes
        );

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            for chunk in pcm.chunks(chunk_bytes) {
                loop {
                    if paced {
                        interval.tick().await;
                    } else {
                        tokio::task::yield_now().await;
                    }
                    if control.stopped.load(Ordering::SeqCst) {
                        let _ = drained_tx.send_replace(true);
                        return;
                    }
                    if !control.paused.load(Ordering::SeqCst) {
                        break;
                    }
                }
                sink.on_data(chunk.to_vec());
            }

            debug!("File source drained");
            let _ = drained_tx.send_replace(true);
        });

        *self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(task);
        Ok(())
    }

    fn stop(&self) {
        if self.control.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            task.abort();
        }
        let _ = self.drained_tx.send_replace(true);
        debug!("File source stopped");
    }

    fn pause(&self) {
        self.control.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.control.paused.store(false, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}
