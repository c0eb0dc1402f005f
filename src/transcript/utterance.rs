use super::segment::{SegmentBuffer, SegmentBufferOptions};
use super::types::{RealtimeResult, RealtimeSegment, RealtimeUtterance};
use crate::error::BufferConfigError;

/// Composes segment-buffer output into utterances flushed at endpoints.
#[derive(Debug)]
pub struct UtteranceBuffer {
    segments: SegmentBuffer,
    pending: Vec<RealtimeSegment>,
    final_audio_proc_ms: u64,
    total_audio_proc_ms: u64,
}

impl UtteranceBuffer {
    pub fn new(options: SegmentBufferOptions) -> Result<Self, BufferConfigError> {
        Ok(Self {
            segments: SegmentBuffer::new(options)?,
            pending: Vec::new(),
            final_audio_proc_ms: 0,
            total_audio_proc_ms: 0,
        })
    }

    /// Feed a result; stable segments are held until the next endpoint.
    pub fn add_result(&mut self, result: &RealtimeResult) {
        let stable = self.segments.add(result);
        self.pending.extend(stable);
        self.final_audio_proc_ms = result.final_audio_proc_ms;
        self.total_audio_proc_ms = result.total_audio_proc_ms;
    }

    /// Close the current utterance. Returns `None` when nothing was buffered.
    pub fn mark_endpoint(&mut self) -> Option<RealtimeUtterance> {
        let mut segments = std::mem::take(&mut self.pending);
        segments.extend(self.segments.flush_all());
        if segments.is_empty() {
            return None;
        }

        let text = segments.iter().map(|s| s.text.as_str()).collect();
        let tokens = segments.iter().flat_map(|s| s.tokens.iter().cloned()).collect();
        let speaker = common_value(&segments, |s| &s.speaker);
        let language = common_value(&segments, |s| &s.language);
        let start_ms = segments.iter().find_map(|s| s.start_ms);
        let end_ms = segments.iter().rev().find_map(|s| s.end_ms);

        Some(RealtimeUtterance {
            text,
            segments,
            tokens,
            speaker,
            language,
            start_ms,
            end_ms,
            final_audio_proc_ms: self.final_audio_proc_ms,
            total_audio_proc_ms: self.total_audio_proc_ms,
        })
    }

    /// Segments released so far for the utterance in progress.
    pub fn pending_segments(&self) -> &[RealtimeSegment] {
        &self.pending
    }

    pub fn buffered_tokens(&self) -> usize {
        self.segments.size()
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.segments.reset();
    }
}

fn common_value<F>(segments: &[RealtimeSegment], field: F) -> Option<String>
where
    F: Fn(&RealtimeSegment) -> &Option<String>,
{
    let first = field(segments.first()?).as_ref()?;
    segments
        .iter()
        .all(|s| field(s).as_ref() == Some(first))
        .then(|| first.clone())
}
