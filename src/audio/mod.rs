pub mod file;
pub mod source;

pub use file::{AudioFile, FileAudioSource};
pub use source::{AudioChunk, AudioSink, AudioSource};
