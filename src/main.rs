use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use realtime_stt::{
    AudioFile, Config, FileAudioSource, Recording, RecordingEvent, RecordingEventKind,
    RecordingOptions, RealtimeUtterance, UtteranceBuffer,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "realtime-stt")]
#[command(about = "Stream audio to a realtime speech-to-text service")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/realtime-stt")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Transcribe a 16-bit PCM WAV file as if it were live audio
    Transcribe {
        file: PathBuf,

        /// Service API key
        #[arg(long, env = "STT_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Language hint (repeatable)
        #[arg(short, long)]
        language: Vec<String>,

        /// Enable speaker diarization
        #[arg(long)]
        diarize: bool,
    },
}

fn print_utterance(utterance: &RealtimeUtterance) {
    let speaker = utterance
        .speaker
        .as_deref()
        .map(|s| format!("[speaker {}] ", s))
        .unwrap_or_default();
    let span = match (utterance.start_ms, utterance.end_ms) {
        (Some(start), Some(end)) => format!(
            "{:>7.2}s-{:>7.2}s ",
            start as f64 / 1000.0,
            end as f64 / 1000.0
        ),
        _ => String::new(),
    };
    println!("{}{}{}", span, speaker, utterance.text.trim());
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    match cli.command {
        Command::Transcribe {
            file,
            api_key,
            language,
            diarize,
        } => transcribe(&cfg, file, api_key, language, diarize).await,
    }
}

async fn transcribe(
    cfg: &Config,
    file: PathBuf,
    api_key: String,
    language: Vec<String>,
    diarize: bool,
) -> Result<()> {
    let audio = AudioFile::open(&file)
        .with_context(|| format!("Cannot read {}", file.display()))?;

    let mut session_config = cfg.session_config();
    session_config.sample_rate = Some(audio.sample_rate);
    session_config.num_channels = Some(audio.channels);
    session_config.language_hints = language;
    session_config.enable_speaker_diarization = diarize;

    info!(
        "Transcribing {} ({:.1}s) with model {}",
        file.display(),
        audio.duration_seconds,
        session_config.model
    );

    let source = Arc::new(FileAudioSource::from_audio(audio, cfg.audio.chunk_ms));
    let mut options = RecordingOptions::new(api_key, source.clone());
    options.session_config = session_config;
    options.session_options = cfg.session_options();
    options.buffer_queue_size = cfg.recording.buffer_queue_size;

    let utterances = Arc::new(Mutex::new(UtteranceBuffer::new(cfg.segment_options())?));
    let recording = Recording::new(options);

    let buffer = Arc::clone(&utterances);
    recording.on(RecordingEventKind::Result, move |event| {
        if let RecordingEvent::Result(result) = event {
            if let Ok(mut buffer) = buffer.lock() {
                buffer.add_result(result);
            }
        }
    });

    // Endpoint and finished both close the current utterance.
    for kind in [RecordingEventKind::Endpoint, RecordingEventKind::Finished] {
        let buffer = Arc::clone(&utterances);
        recording.on(kind, move |_| {
            let utterance = buffer.lock().ok().and_then(|mut b| b.mark_endpoint());
            if let Some(utterance) = utterance {
                print_utterance(&utterance);
            }
        });
    }

    let failure = Arc::new(Mutex::new(None));
    let last_error = Arc::clone(&failure);
    recording.on(RecordingEventKind::Error, move |event| {
        if let RecordingEvent::Error(err) = event {
            if let Ok(mut slot) = last_error.lock() {
                *slot = Some(err.clone());
            }
        }
    });

    recording.on(RecordingEventKind::StateChange, |event| {
        if let RecordingEvent::StateChange { old_state, new_state } = event {
            info!("Recording {} -> {}", old_state, new_state);
        }
    });

    recording.start();

    tokio::select! {
        _ = source.wait_until_drained() => {
            info!("End of file reached, waiting for final results");
            recording.stop().await?;
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            warn!("Interrupted, canceling recording");
            recording.cancel();
        }
    }

    let stats = recording.stats();
    info!(
        "Done: {} chunks ({} bytes) sent, final state {}",
        stats.chunks_sent, stats.bytes_sent, stats.state
    );

    let failure = failure.lock().ok().and_then(|mut slot| slot.take());
    match failure {
        Some(err) => Err(err).context("Recording failed"),
        None => Ok(()),
    }
}
