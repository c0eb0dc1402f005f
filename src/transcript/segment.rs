// Segment buffer
//
// Accumulates timed tokens and releases grouped segments once their right
// edge is at or before the result watermark. The trailing group is always
// withheld because more tokens of the same group may still arrive; only
// `flush_all` releases it.

use super::types::{RealtimeResult, RealtimeSegment, RealtimeToken};
use crate::error::BufferConfigError;
use std::collections::VecDeque;
use tracing::debug;

/// Token attribute that starts a new segment when it changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Speaker,
    Language,
    TranslationStatus,
}

impl GroupKey {
    fn same(&self, a: &RealtimeToken, b: &RealtimeToken) -> bool {
        match self {
            GroupKey::Speaker => a.speaker == b.speaker,
            GroupKey::Language => a.language == b.language,
            GroupKey::TranslationStatus => a.translation_status == b.translation_status,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SegmentBufferOptions {
    /// Drop non-final tokens before buffering (default: true)
    pub final_only: bool,
    /// Fields whose change marks a segment boundary (default: speaker, language)
    pub group_by: Vec<GroupKey>,
    /// Upper bound on buffered tokens, oldest dropped first
    pub max_tokens: Option<usize>,
    /// Sliding window measured back from the latest token end time
    pub max_ms: Option<u64>,
}

impl Default for SegmentBufferOptions {
    fn default() -> Self {
        Self {
            final_only: true,
            group_by: vec![GroupKey::Speaker, GroupKey::Language],
            max_tokens: None,
            max_ms: None,
        }
    }
}

#[derive(Debug)]
pub struct SegmentBuffer {
    options: SegmentBufferOptions,
    tokens: VecDeque<RealtimeToken>,
}

impl SegmentBuffer {
    pub fn new(options: SegmentBufferOptions) -> Result<Self, BufferConfigError> {
        if options.max_tokens == Some(0) {
            return Err(BufferConfigError::InvalidMaxTokens);
        }
        if options.max_ms == Some(0) {
            return Err(BufferConfigError::InvalidMaxMs);
        }
        Ok(Self {
            options,
            tokens: VecDeque::new(),
        })
    }

    /// Number of buffered tokens.
    pub fn size(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Buffer the result's tokens and return the segments that became stable.
    pub fn add(&mut self, result: &RealtimeResult) -> Vec<RealtimeSegment> {
        let final_only = self.options.final_only;
        self.tokens.extend(
            result
                .tokens
                .iter()
                .filter(|t| !final_only || t.is_final)
                .cloned(),
        );

        let watermark = result.final_audio_proc_ms;
        let runs = self.group_runs();
        let mut stable = Vec::new();
        let mut released = 0;

        // Every run except the last is a candidate; stop at the first one
        // whose right edge is not yet final.
        for &len in runs.iter().take(runs.len().saturating_sub(1)) {
            let last_end = self.tokens[released + len - 1].end_ms;
            match last_end {
                Some(end) if end <= watermark => {
                    stable.push(len);
                    released += len;
                }
                _ => break,
            }
        }

        let segments = stable
            .into_iter()
            .map(|len| RealtimeSegment::from_tokens(self.tokens.drain(..len).collect()))
            .collect::<Vec<_>>();

        self.trim();

        if !segments.is_empty() {
            debug!(
                "Released {} stable segment(s), {} token(s) still buffered",
                segments.len(),
                self.tokens.len()
            );
        }
        segments
    }

    /// Release everything still buffered, including the trailing segment.
    pub fn flush_all(&mut self) -> Vec<RealtimeSegment> {
        let runs = self.group_runs();
        runs.into_iter()
            .map(|len| RealtimeSegment::from_tokens(self.tokens.drain(..len).collect()))
            .collect()
    }

    pub fn reset(&mut self) {
        self.tokens.clear();
    }

    /// Lengths of consecutive runs sharing the grouping key.
    fn group_runs(&self) -> Vec<usize> {
        let mut runs = Vec::new();
        let mut iter = self.tokens.iter();
        let Some(mut prev) = iter.next() else {
            return runs;
        };
        let mut len = 1;
        for token in iter {
            if self.options.group_by.iter().all(|key| key.same(prev, token)) {
                len += 1;
            } else {
                runs.push(len);
                len = 1;
            }
            prev = token;
        }
        runs.push(len);
        runs
    }

    fn trim(&mut self) {
        if let Some(max_tokens) = self.options.max_tokens {
            let excess = self.tokens.len().saturating_sub(max_tokens);
            if excess > 0 {
                self.tokens.drain(..excess);
            }
        }

        if let Some(max_ms) = self.options.max_ms {
            let Some(latest) = self.tokens.iter().rev().find_map(|t| t.end_ms) else {
                return;
            };
            // Untimed tokens at the front cannot be placed in the window and are kept.
            while let Some(end) = self.tokens.front().and_then(|t| t.end_ms) {
                if latest.saturating_sub(end) <= max_ms {
                    break;
                }
                self.tokens.pop_front();
            }
        }
    }
}
